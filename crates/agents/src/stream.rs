//! Classify live model output into content, thinking and tool spans.
//!
//! Tags can arrive split across chunks, so the tail of the buffer that could
//! still grow into a tag (at most `window` characters) is held back until
//! the next chunk decides it.

use {
    pocketcall_config::{ClassifierConfig, TagPair},
    pocketcall_protocol::{FrameKind, StreamFrame},
    tracing::{debug, warn},
};

pub struct TagClassifier {
    enabled: bool,
    window: usize,
    tags: Vec<TagPair>,
    mode: FrameKind,
    /// Closing tag of the open span, if any.
    closer: Option<String>,
    /// Received but not yet classified.
    pending: String,
    accumulated: String,
}

impl TagClassifier {
    /// With `enabled == false` every chunk passes through as content.
    pub fn new(config: &ClassifierConfig, enabled: bool) -> Self {
        Self {
            enabled,
            window: config.window,
            tags: config.tags.clone(),
            mode: FrameKind::Content,
            closer: None,
            pending: String::new(),
            accumulated: String::new(),
        }
    }

    pub fn mode(&self) -> FrameKind {
        self.mode
    }

    /// Feed one chunk and get the frames it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamFrame> {
        if !self.enabled {
            let mut frames = Vec::new();
            self.emit(&mut frames, chunk);
            return frames;
        }

        self.pending.push_str(chunk);
        let mut frames = Vec::new();
        loop {
            match self.next_transition() {
                Some((at, tag_len, next)) => {
                    let before: String = self.pending.drain(..at).collect();
                    self.pending.drain(..tag_len);
                    self.emit(&mut frames, &before);
                    self.transition(next);
                },
                None => {
                    let hold = self.held_back_start();
                    let visible: String = self.pending.drain(..hold).collect();
                    self.emit(&mut frames, &visible);
                    break;
                },
            }
        }
        frames
    }

    /// End of stream: release anything held back. An unclosed span stays
    /// open; its text is emitted with the span's kind.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        let rest = std::mem::take(&mut self.pending);
        self.emit(&mut frames, &rest);
        if self.mode != FrameKind::Content {
            warn!(mode = ?self.mode, "stream ended inside an unclosed span");
        }
        frames
    }

    /// Start over for a new response.
    pub fn reset(&mut self) {
        self.mode = FrameKind::Content;
        self.closer = None;
        self.pending.clear();
        self.accumulated.clear();
    }

    fn emit(&mut self, frames: &mut Vec<StreamFrame>, text: &str) {
        if text.is_empty() {
            return;
        }
        self.accumulated.push_str(text);
        frames.push(StreamFrame {
            kind: self.mode,
            chunk: text.to_string(),
            accumulated: self.accumulated.clone(),
        });
    }

    /// Earliest tag in `pending` that changes state: `(offset, tag length,
    /// transition)`.
    fn next_transition(&self) -> Option<(usize, usize, Transition)> {
        match &self.closer {
            Some(closer) => self
                .pending
                .find(closer.as_str())
                .map(|at| (at, closer.len(), Transition::Close)),
            None => self
                .tags
                .iter()
                .enumerate()
                .filter_map(|(idx, pair)| self.pending.find(pair.open.as_str()).map(|at| (at, idx)))
                .min_by_key(|&(at, idx)| (at, std::cmp::Reverse(self.tags[idx].open.len())))
                .map(|(at, idx)| (at, self.tags[idx].open.len(), Transition::Open(idx))),
        }
    }

    fn transition(&mut self, next: Transition) {
        match next {
            Transition::Open(idx) => {
                let pair = &self.tags[idx];
                debug!(tag = %pair.open, kind = ?pair.kind, "span opened");
                self.mode = pair.kind;
                self.closer = Some(pair.close.clone());
            },
            Transition::Close => {
                debug!(kind = ?self.mode, "span closed");
                self.mode = FrameKind::Content;
                self.closer = None;
                self.accumulated.clear();
            },
        }
    }

    /// Byte offset where the possibly-partial tag at the end of `pending`
    /// begins; `pending.len()` when nothing needs holding.
    fn held_back_start(&self) -> usize {
        let candidates: Vec<&str> = match &self.closer {
            Some(closer) => vec![closer.as_str()],
            None => self.tags.iter().map(|t| t.open.as_str()).collect(),
        };
        let earliest = self
            .pending
            .char_indices()
            .rev()
            .take(self.window)
            .last()
            .map_or(self.pending.len(), |(i, _)| i);

        self.pending
            .char_indices()
            .map(|(i, _)| i)
            .filter(|&i| i >= earliest)
            .find(|&i| {
                let tail = &self.pending[i..];
                candidates
                    .iter()
                    .any(|tag| tag.len() > tail.len() && tag.starts_with(tail))
            })
            .unwrap_or(self.pending.len())
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Open(usize),
    Close,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn classifier() -> TagClassifier {
        TagClassifier::new(&ClassifierConfig::default(), true)
    }

    fn run(chunks: &[&str]) -> Vec<StreamFrame> {
        let mut c = classifier();
        let mut frames: Vec<StreamFrame> = chunks.iter().flat_map(|ch| c.push(ch)).collect();
        frames.extend(c.finish());
        frames
    }

    fn text_of(frames: &[StreamFrame], kind: FrameKind) -> String {
        frames
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.chunk.as_str())
            .collect()
    }

    #[test]
    fn think_then_content_at_every_split() {
        let input = "<think>A</think>B";
        for split in 0..=input.len() {
            let frames = run(&[&input[..split], &input[split..]]);
            let last_thinking = frames.iter().rposition(|f| f.kind == FrameKind::Thinking);
            let first_content = frames.iter().position(|f| f.kind == FrameKind::Content);
            let (t, c) = (last_thinking.unwrap(), first_content.unwrap());
            assert!(t < c, "split {split}: thinking after content");
            assert_eq!(frames[t].accumulated, "A", "split {split}");
            assert_eq!(frames.last().unwrap().accumulated, "B", "split {split}");
            assert_eq!(frames.last().unwrap().kind, FrameKind::Content);
        }
    }

    #[test]
    fn one_char_chunks() {
        let input = "Hi <thinking>plan</thinking>done";
        let chunks: Vec<String> = input.chars().map(String::from).collect();
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let frames = run(&refs);
        assert_eq!(text_of(&frames, FrameKind::Thinking), "plan");
        assert_eq!(text_of(&frames, FrameKind::Content), "Hi done");
        assert_eq!(frames.last().unwrap().accumulated, "done");
    }

    #[test]
    fn closing_tag_does_not_leak_span_text_forward() {
        let frames = run(&["<think>secret</think>visible"]);
        let content: Vec<&StreamFrame> =
            frames.iter().filter(|f| f.kind == FrameKind::Content).collect();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].accumulated, "visible");
    }

    #[test]
    fn accumulator_grows_across_open_tag() {
        let frames = run(&["Hello ", "<think>x"]);
        assert_eq!(frames[0].accumulated, "Hello ");
        assert_eq!(frames[1].kind, FrameKind::Thinking);
        assert_eq!(frames[1].accumulated, "Hello x");
    }

    #[test]
    fn tool_span_is_classified() {
        let frames = run(&["<tool_call>{\"name\":", "\"GetLocation\"}</tool_call>"]);
        assert_eq!(
            text_of(&frames, FrameKind::ToolSpan),
            "{\"name\":\"GetLocation\"}"
        );
    }

    #[test]
    fn unclosed_span_stays_stuck() {
        let mut c = classifier();
        c.push("<think>still thinking ");
        let frames = c.push("and more");
        assert_eq!(frames[0].kind, FrameKind::Thinking);
        c.finish();
        assert_eq!(c.mode(), FrameKind::Thinking);
    }

    #[rstest]
    #[case("a < b")]
    #[case("x <th")]
    #[case("</think> stray")]
    fn lookalikes_are_released(#[case] input: &str) {
        let frames = run(&[input]);
        assert_eq!(text_of(&frames, FrameKind::Content), input);
    }

    #[test]
    fn partial_tag_held_until_decided() {
        let mut c = classifier();
        let frames = c.push("ok <thi");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].chunk, "ok ");
        let frames = c.push("s is text");
        assert_eq!(frames[0].chunk, "<this is text");
        assert_eq!(frames[0].kind, FrameKind::Content);
    }

    #[test]
    fn disabled_passes_everything_through() {
        let mut c = TagClassifier::new(&ClassifierConfig::default(), false);
        let frames = c.push("<think>A</think>B");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Content);
        assert_eq!(frames[0].chunk, "<think>A</think>B");
        assert!(c.finish().is_empty());
    }

    #[test]
    fn configured_tag_pairs() {
        let config = ClassifierConfig {
            window: 16,
            tags: vec![TagPair::new("[[r]]", "[[/r]]", FrameKind::Thinking)],
        };
        let mut c = TagClassifier::new(&config, true);
        let mut frames = c.push("[[r]]why[[/r]]because");
        frames.extend(c.finish());
        assert_eq!(text_of(&frames, FrameKind::Thinking), "why");
        assert_eq!(text_of(&frames, FrameKind::Content), "because");
    }

    #[test]
    fn multibyte_text_is_safe() {
        let frames = run(&["héllo <thi", "nk>ünï</think>çà"]);
        assert_eq!(text_of(&frames, FrameKind::Thinking), "ünï");
        assert_eq!(text_of(&frames, FrameKind::Content), "héllo çà");
    }
}
