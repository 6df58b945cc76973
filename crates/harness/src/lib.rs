//! Declarative harness: load a suite, run each case against an inference
//! session with mock tools, and validate the results.

pub mod error;
pub mod ledger;
pub mod mock;
pub mod rules;
pub mod runner;
pub mod scripted;
pub mod suite;

pub use {
    error::{Error, Result},
    ledger::{CallLedger, ToolCallRecord},
    mock::MockTool,
    runner::{CaseResult, HarnessFrame, HarnessRunner, OnHarnessFrame, SuiteReport},
    scripted::{ScriptedSession, SessionLog},
    suite::{Query, TestCase, TestSuite, ToolSpec, ValidationRule},
};
