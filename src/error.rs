use crate::model::Pk;

/// Errors surfaced by table operations. None of them are retried; each one
/// abandons the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// Connection failure, timeout, or a payload that does not parse as the
    /// expected shape.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server rejected request (HTTP {status}){}", detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    ServerRejection { status: u16, detail: Option<String> },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("another operation is already in progress for PK {0}")]
    Busy(Pk),
    #[error("no deletion preview is awaiting confirmation")]
    NoPendingPreview,
}

impl TableError {
    /// Human-readable detail supplied by the server, if any.
    pub fn server_detail(&self) -> Option<&str> {
        match self {
            TableError::ServerRejection { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TableError {
    fn from(e: reqwest::Error) -> Self {
        TableError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for TableError {
    fn from(e: serde_json::Error) -> Self {
        TableError::Transport(format!("malformed response: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_message_includes_detail() {
        let e = TableError::ServerRejection {
            status: 400,
            detail: Some("too long".into()),
        };
        assert_eq!(e.to_string(), "server rejected request (HTTP 400): too long");
        assert_eq!(e.server_detail(), Some("too long"));
    }

    #[test]
    fn rejection_without_detail() {
        let e = TableError::ServerRejection {
            status: 500,
            detail: None,
        };
        assert_eq!(e.to_string(), "server rejected request (HTTP 500)");
        assert_eq!(e.server_detail(), None);
    }

    #[test]
    fn malformed_json_is_transport() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(TableError::from(parse), TableError::Transport(_)));
    }
}
