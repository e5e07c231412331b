use thiserror::Error;

/// Failure produced by a fetcher, or by the engine while running one.
///
/// Cloneable so a single failed fetch can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{context}: {status}")]
    Upstream { context: String, status: String },
    #[error("{context}: {detail}")]
    Malformed { context: String, detail: String },
    #[error("{context}: {detail}")]
    Transport { context: String, detail: String },
    #[error("failed to serialize payload: {detail}")]
    Serialize { detail: String },
    #[error("fetcher panicked: {detail}")]
    Panicked { detail: String },
    #[error("fetch task aborted: {detail}")]
    Aborted { detail: String },
}

impl FetchError {
    pub fn upstream(context: impl Into<String>, status: impl Into<String>) -> Self {
        Self::Upstream {
            context: context.into(),
            status: status.into(),
        }
    }

    pub fn malformed(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn transport(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn serialize(detail: impl Into<String>) -> Self {
        Self::Serialize {
            detail: detail.into(),
        }
    }

    /// Short machine-friendly label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream { .. } => "upstream",
            Self::Malformed { .. } => "malformed",
            Self::Transport { .. } => "transport",
            Self::Serialize { .. } => "serialize",
            Self::Panicked { .. } => "panicked",
            Self::Aborted { .. } => "aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_renders_context_and_status() {
        let err = FetchError::upstream("tiles", "503 Service Unavailable");
        assert_eq!(err.to_string(), "tiles: 503 Service Unavailable");
        assert_eq!(err.kind(), "upstream");
    }

    #[test]
    fn malformed_error_renders_detail() {
        let err = FetchError::malformed("story events", "expected array response");
        assert_eq!(err.to_string(), "story events: expected array response");
    }
}
