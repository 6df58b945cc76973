//! Generic turn driver: one loop for every dialect.
//!
//! prompt → parse → dispatch tools → feed results back, until the model
//! answers in text or the round-trip budget runs out.

use std::{fmt::Write, sync::Arc};

use {
    futures::StreamExt,
    pocketcall_config::{ClassifierConfig, PocketcallConfig},
    pocketcall_protocol::{ConversationMessage, FrameKind, ParsedOutcome, StreamFrame, ToolDescriptor},
    serde_json::{Value, json},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    dialect::Dialect,
    loop_guard,
    session::InferenceSession,
    stream::TagClassifier,
    tool_registry::{ToolRegistry, render_tool_output},
    turn::TurnManager,
};

/// Maximum length for synthetic tool call IDs.
const TOOL_CALL_ID_MAX_LEN: usize = 40;

fn new_tool_call_id() -> String {
    let mut id = String::new();
    let _ = write!(&mut id, "call_{}", uuid::Uuid::new_v4().simple());
    id.truncate(TOOL_CALL_ID_MAX_LEN);
    id
}

/// Callback for classified stream frames.
pub type OnFrame<'a> = &'a (dyn Fn(StreamFrame) + Send + Sync);

/// Result of one user query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// Text shown to the user.
    pub answer: String,
    /// The text-class outcome that ended the loop.
    pub outcome: ParsedOutcome,
    /// Tools actually dispatched.
    pub tool_calls: usize,
    /// Prompts sent to the session.
    pub prompts: usize,
}

pub struct TurnDriver {
    dialect: Arc<dyn Dialect>,
    session: Box<dyn InferenceSession>,
    registry: ToolRegistry,
    tools: Vec<ToolDescriptor>,
    turns: TurnManager,
    history: Vec<ConversationMessage>,
    max_iterations: usize,
    classifier: ClassifierConfig,
    cancel: CancellationToken,
}

impl TurnDriver {
    pub fn new(
        dialect: Arc<dyn Dialect>,
        session: Box<dyn InferenceSession>,
        config: &PocketcallConfig,
    ) -> Self {
        Self {
            turns: TurnManager::new(Arc::clone(&dialect), &[]),
            dialect,
            session,
            registry: ToolRegistry::new(),
            tools: Vec::new(),
            history: Vec::new(),
            max_iterations: config.driver.max_iterations,
            classifier: config.classifier.clone(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the driver at the next chunk or step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_first_turn(&self) -> bool {
        self.turns.is_first_turn()
    }

    /// Start a new conversation with `registry` as the only tools.
    pub async fn reset(&mut self, system_prompt: &str, registry: ToolRegistry) -> Result<()> {
        let tools = registry.descriptors();
        self.session.set_tools_and_reset(&tools).await?;
        self.turns.set_tools(&tools);
        self.registry = registry;
        self.tools = tools;
        self.history.clear();
        if !system_prompt.trim().is_empty() {
            self.history.push(ConversationMessage::system(system_prompt));
        }
        debug!(dialect = %self.dialect.kind(), tools = self.tools.len(), "driver reset");
        Ok(())
    }

    /// Forget the conversation but keep system prompt and tools.
    pub async fn reset_conversation(&mut self) -> Result<()> {
        self.session.reset_conversation().await?;
        self.turns.reset();
        self.history.retain(ConversationMessage::is_system);
        Ok(())
    }

    pub async fn run_query(&mut self, query: &str) -> Result<QueryOutcome> {
        self.run(query, None).await
    }

    /// Like [`run_query`](Self::run_query), but every response is streamed
    /// through the tag classifier and each frame is handed to `on_frame`.
    pub async fn run_query_streaming(
        &mut self,
        query: &str,
        parse_tags: bool,
        on_frame: OnFrame<'_>,
    ) -> Result<QueryOutcome> {
        self.run(query, Some((parse_tags, on_frame))).await
    }

    async fn run(
        &mut self,
        query: &str,
        streaming: Option<(bool, OnFrame<'_>)>,
    ) -> Result<QueryOutcome> {
        self.history.push(ConversationMessage::user(query));
        let mut tool_calls = 0;
        let mut prompts = 0;
        let mut rounds = 0;

        loop {
            self.check_cancelled()?;
            let prompt = self
                .turns
                .build_prompt(&self.history)
                .ok_or_else(|| Error::message("nothing to send to the session"))?;

            let (response, reasoning) = match streaming {
                Some((parse_tags, on_frame)) => {
                    self.stream_response(&prompt, parse_tags, on_frame).await?
                },
                None => {
                    let response = self
                        .session
                        .prompt_once(&prompt)
                        .await?
                        .filter(|r| !r.trim().is_empty())
                        .ok_or(Error::EmptyResponse)?;
                    let reasoning = self.reasoning_of(&response);
                    (response, reasoning)
                },
            };
            prompts += 1;
            self.turns.complete_exchange();
            debug!(prompts, chars = response.len(), "model responded");

            let outcomes = self.dialect.parse(&response, &self.tools, &self.history);
            if !reasoning.trim().is_empty() {
                self.history.push(ConversationMessage::Reasoning {
                    content: reasoning.trim().to_string(),
                });
            }

            let (invocations, others): (Vec<_>, Vec<_>) =
                outcomes.into_iter().partition(ParsedOutcome::is_tool_invocation);

            if invocations.is_empty() {
                let outcome = others
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| ParsedOutcome::text_answer(""));
                let answer = outcome.answer_text().unwrap_or_default();
                self.history.push(ConversationMessage::assistant(answer.clone()));
                return Ok(QueryOutcome {
                    answer,
                    outcome,
                    tool_calls,
                    prompts,
                });
            }
            if !others.is_empty() {
                debug!(skipped = others.len(), "ignoring non-dispatchable calls next to valid ones");
            }
            if rounds == self.max_iterations {
                warn!(max_iterations = self.max_iterations, "tool round-trip budget exhausted");
                return Err(Error::IterationLimit(self.max_iterations));
            }
            rounds += 1;

            for invocation in invocations {
                if let ParsedOutcome::ToolInvocation { name, arguments } = invocation {
                    self.check_cancelled()?;
                    if loop_guard::repeated_result(&self.history, &name).is_some() {
                        warn!(tool = %name, "loop guard skipped repeat call in the same response");
                        continue;
                    }
                    self.dispatch(name, arguments).await;
                    tool_calls += 1;
                }
            }
        }
    }

    /// Run one tool and append the call and its result to the history.
    /// A failing tool reports the failure to the model instead of aborting.
    async fn dispatch(&mut self, name: String, arguments: Value) {
        let id = new_tool_call_id();
        info!(tool = %name, call_id = %id, %arguments, "executing tool");
        self.history.push(ConversationMessage::ToolCall {
            id,
            name: name.clone(),
            arguments: arguments.clone(),
        });

        let content = match self.registry.get(&name) {
            Some(tool) => match tool.execute(arguments).await {
                Ok(output) => render_tool_output(&output),
                Err(source) => {
                    let err = Error::Tool {
                        name: name.clone(),
                        source,
                    };
                    warn!(tool = %name, error = %err, "tool execution failed");
                    json!({ "error": err.to_string() }).to_string()
                },
            },
            None => {
                warn!(tool = %name, "tool has a descriptor but no handler");
                json!({ "error": format!("tool {name} has no handler") }).to_string()
            },
        };
        self.history.push(ConversationMessage::tool_result(name, content));
    }

    async fn stream_response(
        &mut self,
        prompt: &str,
        parse_tags: bool,
        on_frame: OnFrame<'_>,
    ) -> Result<(String, String)> {
        let mut stream = self.session.prompt_streaming(prompt).await?;
        let mut classifier = TagClassifier::new(&self.classifier, parse_tags);
        let mut raw = String::new();
        let mut reasoning = String::new();

        let forward = |frame: StreamFrame, reasoning: &mut String| {
            if frame.kind == FrameKind::Thinking {
                reasoning.push_str(&frame.chunk);
            }
            on_frame(frame);
        };

        while let Some(chunk) = stream.next().await {
            self.check_cancelled()?;
            let chunk = chunk?;
            raw.push_str(&chunk);
            for frame in classifier.push(&chunk) {
                forward(frame, &mut reasoning);
            }
        }
        for frame in classifier.finish() {
            forward(frame, &mut reasoning);
        }

        if raw.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }
        Ok((raw, reasoning))
    }

    fn reasoning_of(&self, response: &str) -> String {
        let mut classifier = TagClassifier::new(&self.classifier, true);
        let mut frames = classifier.push(response);
        frames.extend(classifier.finish());
        frames
            .into_iter()
            .filter(|f| f.kind == FrameKind::Thinking)
            .map(|f| f.chunk)
            .collect()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            debug!("driver cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use {
        super::*,
        crate::{
            dialect::{ReactDialect, XmlDialect},
            session::TextStream,
            tool_registry::AgentTool,
        },
        async_trait::async_trait,
    };

    #[derive(Default)]
    struct Replay {
        responses: VecDeque<String>,
        prompts: Arc<Mutex<Vec<String>>>,
        resets: Arc<Mutex<usize>>,
    }

    impl Replay {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: responses.iter().map(|r| (*r).to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl InferenceSession for Replay {
        async fn prompt_once(&mut self, prompt: &str) -> Result<Option<String>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.responses.pop_front())
        }

        async fn prompt_streaming(&mut self, prompt: &str) -> Result<TextStream> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let text = self.responses.pop_front().unwrap_or_default();
            let chars: Vec<char> = text.chars().collect();
            let chunks: Vec<Result<String>> =
                chars.chunks(3).map(|c| Ok(c.iter().collect())).collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn reset_conversation(&mut self) -> Result<()> {
            *self.resets.lock().unwrap() += 1;
            Ok(())
        }

        async fn set_tools_and_reset(&mut self, _tools: &[ToolDescriptor]) -> Result<()> {
            *self.resets.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct FixedTool {
        descriptor: ToolDescriptor,
        output: anyhow::Result<Value>,
    }

    #[async_trait]
    impl AgentTool for FixedTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _arguments: Value) -> anyhow::Result<Value> {
            match &self.output {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    fn tool(name: &str, output: anyhow::Result<Value>) -> Arc<dyn AgentTool> {
        Arc::new(FixedTool {
            descriptor: ToolDescriptor::new(name, "test tool"),
            output,
        })
    }

    fn registry(tools: Vec<Arc<dyn AgentTool>>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for t in tools {
            registry.register(t).unwrap();
        }
        registry
    }

    fn location_registry() -> ToolRegistry {
        registry(vec![tool(
            "GetLocation",
            Ok(json!("latitude 40.4168, longitude -3.7038")),
        )])
    }

    const CALL_LOCATION: &str = "<tool_call>{\"name\": \"GetLocation\", \"arguments\": {}}</tool_call>";

    async fn xml_driver(session: Replay, registry: ToolRegistry) -> TurnDriver {
        let mut driver = TurnDriver::new(
            Arc::new(XmlDialect),
            Box::new(session),
            &PocketcallConfig::default(),
        );
        driver.reset("You are helpful.", registry).await.unwrap();
        driver
    }

    #[tokio::test]
    async fn tool_round_trip_sends_only_the_result_back() {
        let session = Replay::new(&[CALL_LOCATION, "You are in Madrid."]);
        let prompts = Arc::clone(&session.prompts);
        let mut driver = xml_driver(session, location_registry()).await;

        let outcome = driver.run_query("Where am I?").await.unwrap();
        assert_eq!(outcome.answer, "You are in Madrid.");
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.prompts, 2);

        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("<tools>"));
        assert!(prompts[0].ends_with("Where am I?"));
        assert_eq!(
            prompts[1],
            "<tool_response>\nlatitude 40.4168, longitude -3.7038\n</tool_response>"
        );

        let call_id = driver.history().iter().find_map(|m| match m {
            ConversationMessage::ToolCall { id, .. } => Some(id.clone()),
            _ => None,
        });
        let call_id = call_id.unwrap();
        assert!(call_id.starts_with("call_"));
        assert!(call_id.len() <= TOOL_CALL_ID_MAX_LEN);
    }

    #[tokio::test]
    async fn same_tool_twice_in_one_response_dispatches_once() {
        let doubled = format!("{CALL_LOCATION}\n{CALL_LOCATION}");
        let session = Replay::new(&[&doubled, "You are in Madrid."]);
        let mut driver = xml_driver(session, location_registry()).await;

        let outcome = driver.run_query("Where am I?").await.unwrap();
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.answer, "You are in Madrid.");
        let calls = driver
            .history()
            .iter()
            .filter(|m| matches!(m, ConversationMessage::ToolCall { .. }))
            .count();
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn repeat_call_answers_from_prior_result() {
        let session = Replay::new(&[CALL_LOCATION, CALL_LOCATION]);
        let mut driver = xml_driver(session, location_registry()).await;

        let outcome = driver.run_query("Where am I?").await.unwrap();
        assert_eq!(outcome.tool_calls, 1);
        assert!(matches!(outcome.outcome, ParsedOutcome::LoopBreak { .. }));
        assert_eq!(outcome.answer, "latitude 40.4168, longitude -3.7038");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_apology_not_an_error() {
        let call = "<tool_call>{\"name\": \"GetWeather\", \"arguments\": {}}</tool_call>";
        let mut driver = xml_driver(Replay::new(&[call]), location_registry()).await;
        let outcome = driver.run_query("What's the weather?").await.unwrap();
        assert_eq!(outcome.tool_calls, 0);
        assert!(outcome.answer.contains("GetWeather"));
    }

    #[tokio::test]
    async fn failing_tool_reports_error_to_model() {
        let session = Replay::new(&[CALL_LOCATION, "I could not find you."]);
        let prompts = Arc::clone(&session.prompts);
        let registry = registry(vec![tool("GetLocation", Err(anyhow::anyhow!("gps off")))]);
        let mut driver = xml_driver(session, registry).await;

        let outcome = driver.run_query("Where am I?").await.unwrap();
        assert_eq!(outcome.answer, "I could not find you.");
        let prompts = prompts.lock().unwrap();
        assert!(prompts[1].contains("\"error\""));
        assert!(prompts[1].contains("gps off"));
    }

    #[tokio::test]
    async fn iteration_budget_is_enforced() {
        let call_time = "<tool_call>{\"name\": \"GetTime\", \"arguments\": {}}</tool_call>";
        let session = Replay::new(&[CALL_LOCATION, call_time]);
        let registry = registry(vec![
            tool("GetLocation", Ok(json!("Madrid"))),
            tool("GetTime", Ok(json!("noon"))),
        ]);
        let mut config = PocketcallConfig::default();
        config.driver.max_iterations = 1;
        let mut driver = TurnDriver::new(Arc::new(XmlDialect), Box::new(session), &config);
        driver.reset("", registry).await.unwrap();

        let err = driver.run_query("Time here?").await.unwrap_err();
        assert!(matches!(err, Error::IterationLimit(1)));
    }

    #[tokio::test]
    async fn cancellation_is_distinguished() {
        let mut driver = xml_driver(Replay::new(&["hi"]), location_registry()).await;
        driver.cancellation_token().cancel();
        let err = driver.run_query("Hello").await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn missing_response_is_an_error() {
        let mut driver = xml_driver(Replay::new(&[]), location_registry()).await;
        let err = driver.run_query("Hello").await.unwrap_err();
        assert!(matches!(err, Error::EmptyResponse));
    }

    #[tokio::test]
    async fn streaming_classifies_and_records_reasoning() {
        let session = Replay::new(&["<think>small talk</think>Hello there!"]);
        let mut driver = xml_driver(session, location_registry()).await;
        let frames = Mutex::new(Vec::new());

        let outcome = driver
            .run_query_streaming("Hi", true, &|f| frames.lock().unwrap().push(f))
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Hello there!");
        let frames = frames.into_inner().unwrap();
        let last = frames.last().unwrap();
        assert_eq!(last.kind, FrameKind::Content);
        assert_eq!(last.accumulated, "Hello there!");
        assert!(driver.history().iter().any(
            |m| matches!(m, ConversationMessage::Reasoning { content } if content == "small talk")
        ));
    }

    #[tokio::test]
    async fn react_driver_round_trip() {
        let session = Replay::new(&[
            "Thought: I need the position.\nAction: I should use the tool `GetLocation` with input `no parameters`",
            "Final Answer: You are in Madrid.",
        ]);
        let prompts = Arc::clone(&session.prompts);
        let mut driver = TurnDriver::new(
            Arc::new(ReactDialect),
            Box::new(session),
            &PocketcallConfig::default(),
        );
        driver.reset("", location_registry()).await.unwrap();

        let outcome = driver.run_query("Where am I?").await.unwrap();
        assert_eq!(outcome.answer, "You are in Madrid.");
        assert_eq!(
            prompts.lock().unwrap()[1],
            "Observation: latitude 40.4168, longitude -3.7038"
        );
    }

    #[tokio::test]
    async fn reset_restores_first_turn_and_clears_history() {
        let session = Replay::new(&["Hi!", "Hello again"]);
        let resets = Arc::clone(&session.resets);
        let prompts = Arc::clone(&session.prompts);
        let mut driver = xml_driver(session, location_registry()).await;

        driver.run_query("Hello").await.unwrap();
        assert!(!driver.is_first_turn());

        driver.reset_conversation().await.unwrap();
        assert!(driver.is_first_turn());
        assert_eq!(driver.history().len(), 1);
        assert_eq!(*resets.lock().unwrap(), 2);

        driver.run_query("Hello").await.unwrap();
        assert!(prompts.lock().unwrap()[1].contains("<tools>"));
    }
}
