//! Drive test cases end to end and report frames as they happen.

use std::{sync::Arc, time::Instant};

use {
    pocketcall_agents::{Dialect, InferenceSession, TurnDriver},
    pocketcall_config::PocketcallConfig,
    pocketcall_protocol::StreamFrame,
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    Error, Result,
    ledger::{CallLedger, ToolCallRecord},
    mock, rules,
    suite::{TestCase, TestSuite},
};

/// Observable progress of a suite run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum HarnessFrame {
    Description {
        test_id: String,
        name: String,
        lines: Vec<String>,
    },
    Query {
        test_id: String,
        index: usize,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Stream {
        test_id: String,
        #[serde(rename = "stream_frame")]
        frame: StreamFrame,
    },
    Validation {
        test_id: String,
        passed: bool,
        duration_ms: u64,
        content: String,
        failures: Vec<String>,
    },
}

pub type OnHarnessFrame = Arc<dyn Fn(HarnessFrame) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    pub id: String,
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub content: String,
    pub failures: Vec<String>,
    pub calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteReport {
    pub results: Vec<CaseResult>,
    pub passed: usize,
    pub failed: usize,
}

impl SuiteReport {
    fn push(&mut self, result: CaseResult) {
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

pub struct HarnessRunner {
    driver: TurnDriver,
    ledger: CallLedger,
    on_frame: Option<OnHarnessFrame>,
}

impl HarnessRunner {
    /// The runner owns `session` exclusively for its lifetime.
    pub fn new(
        dialect: Arc<dyn Dialect>,
        session: Box<dyn InferenceSession>,
        config: &PocketcallConfig,
    ) -> Self {
        Self {
            driver: TurnDriver::new(dialect, session, config),
            ledger: CallLedger::new(),
            on_frame: None,
        }
    }

    #[must_use]
    pub fn with_on_frame(mut self, on_frame: OnHarnessFrame) -> Self {
        self.on_frame = Some(on_frame);
        self
    }

    /// Cancelling stops the run silently: no failure is recorded for the
    /// interrupted case.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.driver.cancellation_token()
    }

    pub fn ledger(&self) -> &CallLedger {
        &self.ledger
    }

    /// Run every case in order. A failing case never stops the suite;
    /// cancellation does.
    pub async fn run_suite(&mut self, suite: &TestSuite) -> SuiteReport {
        let mut report = SuiteReport::default();
        for case in &suite.tests {
            match self.run_case(case).await {
                Some(result) => report.push(result),
                None => {
                    info!(test = %case.id, "suite cancelled");
                    break;
                },
            }
        }
        info!(passed = report.passed, failed = report.failed, "suite finished");
        report
    }

    /// `None` when the run was cancelled.
    pub async fn run_case(&mut self, case: &TestCase) -> Option<CaseResult> {
        self.emit(HarnessFrame::Description {
            test_id: case.id.clone(),
            name: case.name.clone(),
            lines: case.description.clone(),
        });

        let start = Instant::now();
        let mut failures = Vec::new();
        let content = match self.execute(case).await {
            Ok(content) => content,
            Err(err) => {
                if let Error::Agent(agent) = &err
                    && agent.is_cancelled()
                {
                    return None;
                }
                warn!(test = %case.id, error = %err, "case failed to execute");
                failures.push(format!("execution failed: {err}"));
                String::new()
            },
        };

        let calls = self.ledger.snapshot();
        if failures.is_empty() {
            failures = rules::evaluate_all(&case.rules, &content, &calls);
        }
        let passed = failures.is_empty();
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(test = %case.id, passed, duration_ms, calls = calls.len(), "case finished");

        self.emit(HarnessFrame::Validation {
            test_id: case.id.clone(),
            passed,
            duration_ms,
            content: content.clone(),
            failures: failures.clone(),
        });
        Some(CaseResult {
            id: case.id.clone(),
            name: case.name.clone(),
            passed,
            duration_ms,
            content,
            failures,
            calls,
        })
    }

    /// Reset the session to this case's tools, send every query and return
    /// the answers joined by newlines.
    async fn execute(&mut self, case: &TestCase) -> Result<String> {
        self.ledger.clear();
        let registry = mock::registry_for(&case.tools, &self.ledger)?;
        self.driver.reset(&case.system_prompt, registry).await?;

        let forward = {
            let on_frame = self.on_frame.clone();
            let test_id = case.id.clone();
            move |frame: StreamFrame| {
                if let Some(on_frame) = &on_frame {
                    on_frame(HarnessFrame::Stream {
                        test_id: test_id.clone(),
                        frame,
                    });
                }
            }
        };

        let mut answers = Vec::with_capacity(case.queries.len());
        for (index, query) in case.queries.iter().enumerate() {
            self.emit(HarnessFrame::Query {
                test_id: case.id.clone(),
                index,
                text: query.text.clone(),
                description: query.description.clone(),
            });
            let outcome = self
                .driver
                .run_query_streaming(&query.text, case.parse_thinking_tags, &forward)
                .await?;
            answers.push(outcome.answer);
        }
        Ok(answers.join("\n"))
    }

    fn emit(&self, frame: HarnessFrame) {
        if let Some(on_frame) = &self.on_frame {
            on_frame(frame);
        }
    }
}
