use {
    pocketcall_protocol::{DialectKind, FrameKind, markers},
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result};

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketcallConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub dialect: DialectConfig,
    pub classifier: ClassifierConfig,
    pub driver: DriverConfig,
    pub harness: HarnessConfig,
}

impl Default for PocketcallConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            dialect: DialectConfig::default(),
            classifier: ClassifierConfig::default(),
            driver: DriverConfig::default(),
            harness: HarnessConfig::default(),
        }
    }
}

impl PocketcallConfig {
    /// Reject configurations the classifier or driver cannot honor.
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        if self.driver.max_iterations == 0 {
            return Err(Error::invalid("driver.max_iterations must be at least 1"));
        }
        if self.harness.stream_chunk_chars == 0 {
            return Err(Error::invalid("harness.stream_chunk_chars must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectConfig {
    pub kind: DialectKind,
}

/// An opening/closing tag pair recognized by the stream classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPair {
    pub open: String,
    pub close: String,
    pub kind: FrameKind,
}

impl TagPair {
    pub fn new(open: impl Into<String>, close: impl Into<String>, kind: FrameKind) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            kind,
        }
    }
}

/// Streaming tag classifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Trailing-window size in characters. Must hold the longest tag so a tag
    /// split across chunks is still found.
    pub window: usize,
    pub tags: Vec<TagPair>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window: 24,
            tags: vec![
                TagPair::new(markers::THINK_OPEN, markers::THINK_CLOSE, FrameKind::Thinking),
                TagPair::new(
                    markers::THINKING_OPEN,
                    markers::THINKING_CLOSE,
                    FrameKind::Thinking,
                ),
                TagPair::new(
                    markers::TOOL_CALL_OPEN,
                    markers::TOOL_CALL_CLOSE,
                    FrameKind::ToolSpan,
                ),
            ],
        }
    }
}

impl ClassifierConfig {
    /// Length in characters of the longest configured tag.
    #[must_use]
    pub fn longest_tag(&self) -> usize {
        self.tags
            .iter()
            .flat_map(|t| [t.open.chars().count(), t.close.chars().count()])
            .max()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        for pair in &self.tags {
            if pair.open.is_empty() || pair.close.is_empty() {
                return Err(Error::invalid("classifier tags must not be empty"));
            }
            if pair.kind == FrameKind::Content {
                return Err(Error::invalid(format!(
                    "classifier tag {} cannot open a content span",
                    pair.open
                )));
            }
        }
        let longest = self.longest_tag();
        if self.window < longest {
            return Err(Error::invalid(format!(
                "classifier.window ({}) is shorter than the longest tag ({longest})",
                self.window
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Tool round-trips allowed per user query.
    pub max_iterations: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_iterations: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Chunk size used when a scripted session replays a response as a stream.
    pub stream_chunk_chars: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            stream_chunk_chars: 8,
        }
    }
}
