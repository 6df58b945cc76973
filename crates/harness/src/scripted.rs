//! An inference session that replays canned responses.
//!
//! Responses are grouped per test case. Each `set_tools_and_reset` (the
//! harness calls it once at the start of every case) moves on to the next
//! group, so a case that fails early never shifts the script of later ones.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    pocketcall_agents::{Error, InferenceSession, Result, TextStream},
    pocketcall_protocol::ToolDescriptor,
    tracing::debug,
};

#[derive(Debug, Default)]
struct LogInner {
    prompts: Vec<String>,
    resets: usize,
    tool_sets: Vec<Vec<String>>,
}

/// What the session saw; cloned handles share one log.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    inner: Arc<Mutex<LogInner>>,
}

impl SessionLog {
    pub fn prompts(&self) -> Vec<String> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).prompts.clone()
    }

    pub fn resets(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).resets
    }

    /// Tool names handed over by each `set_tools_and_reset`.
    pub fn tool_sets(&self) -> Vec<Vec<String>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tool_sets
            .clone()
    }

    fn with<R>(&self, f: impl FnOnce(&mut LogInner) -> R) -> R {
        f(&mut self.inner.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

pub struct ScriptedSession {
    cases: VecDeque<VecDeque<String>>,
    current: VecDeque<String>,
    chunk_chars: usize,
    log: SessionLog,
}

impl ScriptedSession {
    /// `chunk_chars` is the size of each streamed chunk, in characters.
    pub fn new(chunk_chars: usize) -> Self {
        Self {
            cases: VecDeque::new(),
            current: VecDeque::new(),
            chunk_chars: chunk_chars.max(1),
            log: SessionLog::default(),
        }
    }

    /// Queue the responses for the next test case.
    #[must_use]
    pub fn with_case<I, S>(mut self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cases
            .push_back(responses.into_iter().map(Into::into).collect());
        self
    }

    pub fn log(&self) -> SessionLog {
        self.log.clone()
    }

    fn next_response(&mut self, prompt: &str) -> Result<String> {
        self.log.with(|log| log.prompts.push(prompt.to_string()));
        self.current
            .pop_front()
            .ok_or_else(|| Error::session("script exhausted"))
    }
}

/// Split on character boundaries into chunks of `size` characters.
fn chunks_of(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl InferenceSession for ScriptedSession {
    async fn prompt_once(&mut self, prompt: &str) -> Result<Option<String>> {
        self.next_response(prompt).map(Some)
    }

    async fn prompt_streaming(&mut self, prompt: &str) -> Result<TextStream> {
        let chunks = chunks_of(&self.next_response(prompt)?, self.chunk_chars);
        Ok(Box::pin(async_stream::stream! {
            for chunk in chunks {
                yield Ok::<_, Error>(chunk);
            }
        }))
    }

    async fn reset_conversation(&mut self) -> Result<()> {
        self.log.with(|log| log.resets += 1);
        Ok(())
    }

    async fn set_tools_and_reset(&mut self, tools: &[ToolDescriptor]) -> Result<()> {
        let names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
        self.log.with(|log| {
            log.resets += 1;
            log.tool_sets.push(names);
        });
        self.current = self.cases.pop_front().unwrap_or_default();
        debug!(responses = self.current.len(), "scripted session advanced to next case");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, futures::StreamExt};

    #[test]
    fn chunks_respect_char_boundaries() {
        assert_eq!(chunks_of("héllo", 2), ["hé", "ll", "o"]);
        assert!(chunks_of("", 3).is_empty());
    }

    #[tokio::test]
    async fn each_reset_starts_the_next_case() {
        let mut session = ScriptedSession::new(4).with_case(["a1", "a2"]).with_case(["b1"]);
        let log = session.log();

        session.set_tools_and_reset(&[]).await.unwrap();
        assert_eq!(session.prompt_once("p").await.unwrap().as_deref(), Some("a1"));

        session
            .set_tools_and_reset(&[ToolDescriptor::new("GetLocation", "")])
            .await
            .unwrap();
        assert_eq!(session.prompt_once("q").await.unwrap().as_deref(), Some("b1"));
        assert!(session.prompt_once("r").await.is_err());

        assert_eq!(log.prompts(), ["p", "q", "r"]);
        assert_eq!(log.resets(), 2);
        assert_eq!(log.tool_sets()[1], ["GetLocation"]);
    }

    #[tokio::test]
    async fn streaming_replays_in_chunks() {
        let mut session = ScriptedSession::new(3).with_case(["<think>x</think>ok"]);
        session.set_tools_and_reset(&[]).await.unwrap();
        let stream = session.prompt_streaming("p").await.unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), "<think>x</think>ok");
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
    }
}
