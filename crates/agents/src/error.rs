use thiserror::Error;

/// Failures of the turn driver and its collaborators.
///
/// Parsing never produces one of these: malformed model output degrades to
/// a text answer instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("inference session: {0}")]
    Session(String),

    #[error("inference session returned no response")]
    EmptyResponse,

    #[error("cancelled")]
    Cancelled,

    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("tool {name} failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no final answer after {0} tool round-trips")]
    IterationLimit(usize),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    #[must_use]
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Cancellation unwinds silently; callers must not report it as a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<String>("not-json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn cancelled_is_distinguished() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::EmptyResponse.is_cancelled());
        assert!(!Error::session("boom").is_cancelled());
    }

    #[test]
    fn tool_error_mentions_name() {
        let err = Error::Tool {
            name: "GetLocation".into(),
            source: anyhow::anyhow!("gps off"),
        };
        assert_eq!(err.to_string(), "tool GetLocation failed: gps off");
    }
}
