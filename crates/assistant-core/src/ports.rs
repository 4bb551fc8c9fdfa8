use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::records::{MarketRecord, Operation};

/// Failures from the text-completion service.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    /// Transport-level failure or timeout reaching the service.
    #[error("completion service unavailable: {0}")]
    Unavailable(String),
    /// The service answered, but the value could not be coerced to the
    /// requested shape.
    #[error("completion output violated schema: {0}")]
    Schema(String),
}

/// Failures from the market-data service, captured per operation.
#[derive(Debug, Clone, Error)]
pub enum MarketError {
    #[error("no data found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed upstream data: {0}")]
    Malformed(String),
}

impl MarketError {
    /// Short tag used in user-facing "unavailable" markers.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::NotFound(_) => "not_found",
            MarketError::Transport(_) => "transport",
            MarketError::Malformed(_) => "malformed",
        }
    }
}

/// Capability interface to an external classification/generation service.
///
/// `context` is carried as the system message; `json` requests JSON-only
/// output where the provider supports it.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        context: Option<&str>,
        json: bool,
    ) -> Result<String, CompletionError>;
}

/// Capability interface to the external market-data source.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn fetch(&self, op: Operation, symbol: &str) -> Result<MarketRecord, MarketError>;
}

/// Coerce a JSON-mode completion into a typed value.
///
/// Providers occasionally wrap the object in code fences; strip them
/// before parsing. A parse failure is a schema violation, not transport.
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, CompletionError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| CompletionError::Schema(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Verdict {
        category: String,
    }

    #[test]
    fn decodes_plain_json() {
        let v: Verdict = decode_json(r#"{"category": "report"}"#).unwrap();
        assert_eq!(v.category, "report");
    }

    #[test]
    fn decodes_fenced_json() {
        let v: Verdict = decode_json("```json\n{\"category\": \"chat\"}\n```").unwrap();
        assert_eq!(v.category, "chat");
    }

    #[test]
    fn parse_failure_is_schema_violation() {
        let err = decode_json::<Verdict>("not json at all").unwrap_err();
        assert!(matches!(err, CompletionError::Schema(_)));
    }
}
