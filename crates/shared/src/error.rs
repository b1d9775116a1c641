use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorKind {
    Timeout,
    NotConnected,
    Unauthorized,
    Server,
    MalformedResponse,
}

impl PageErrorKind {
    /// Classifies a failure by its human-readable message. Connection and
    /// authentication failures take precedence over timeouts.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        if mentions_missing_connection(&lowered) {
            Self::NotConnected
        } else if lowered.contains("authentication") || lowered.contains("unauthorized") {
            Self::Unauthorized
        } else if lowered.contains("timeout") {
            Self::Timeout
        } else {
            Self::Server
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Server)
    }
}

// Matches "no <anything> connected", e.g. "No Shopify store connected".
fn mentions_missing_connection(lowered: &str) -> bool {
    let mut words = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty());
    words.by_ref().any(|word| word == "no") && words.any(|word| word.starts_with("connected"))
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct PageError {
    pub kind: PageErrorKind,
    pub message: String,
}

impl PageError {
    pub fn new(kind: PageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: PageErrorKind::classify(&message),
            message,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(PageErrorKind::MalformedResponse, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn notice(&self) -> ErrorNotice {
        match self.kind {
            PageErrorKind::Timeout => ErrorNotice::new(
                "Request Timeout",
                "The request took too long to complete. Please try again or contact support if the issue persists.",
            ),
            PageErrorKind::NotConnected => ErrorNotice::new(
                "No Store Connected",
                "Please connect your store first to view this list.",
            ),
            PageErrorKind::Unauthorized => {
                ErrorNotice::new("Authentication Error", "Please log in again to continue.")
            }
            PageErrorKind::Server | PageErrorKind::MalformedResponse => {
                ErrorNotice::new("Error loading data", self.message.clone())
            }
        }
    }
}

/// User-facing summary of a failure, picked so the view can offer a
/// corrective action instead of a generic retry prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub title: String,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}
