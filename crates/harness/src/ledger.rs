//! Record of tool invocations made during one test case.
//!
//! One ledger is shared by the harness and every mock handler of a case.
//! Handlers may run on another task than the stream consumer, so access is
//! behind a mutex; readers get snapshots.

use std::sync::{Arc, Mutex};

use {
    serde::Serialize,
    serde_json::{Map, Value},
    time::OffsetDateTime,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub timestamp: OffsetDateTime,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CallLedger {
    calls: Arc<Mutex<Vec<ToolCallRecord>>>,
}

impl CallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call. Non-object arguments are recorded as an empty map.
    pub fn record(&self, name: &str, arguments: &Value) {
        let arguments = arguments.as_object().cloned().unwrap_or_default();
        let record = ToolCallRecord {
            name: name.to_string(),
            timestamp: OffsetDateTime::now_utc(),
            arguments,
        };
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    pub fn snapshot(&self) -> Vec<ToolCallRecord> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn clones_share_one_record() {
        let ledger = CallLedger::new();
        let handle = ledger.clone();
        handle.record("GetLocation", &json!({}));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.snapshot()[0].name, "GetLocation");
    }

    #[test]
    fn snapshot_is_detached() {
        let ledger = CallLedger::new();
        ledger.record("a", &json!({"x": 1}));
        let snapshot = ledger.snapshot();
        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].arguments["x"], 1);
    }

    #[test]
    fn non_object_arguments_become_empty() {
        let ledger = CallLedger::new();
        ledger.record("a", &json!("oops"));
        assert!(ledger.snapshot()[0].arguments.is_empty());
    }

    #[test]
    fn concurrent_appends() {
        let ledger = CallLedger::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.record(&format!("t{i}"), &json!({})))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.len(), 8);
    }
}
