use serde::Deserialize;
use tracing::debug;

use crate::ports::{decode_json, CompletionError, CompletionPort};

/// Outcome of symbol resolution. `Unknown` is terminal for the turn's
/// data path and surfaced to the user, never silently defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Symbol(String),
    Unknown,
}

/// Sentinel the completion service is instructed to return when no
/// symbol can be extracted even with context.
const UNRESOLVED: &str = "UNKNOWN";

#[derive(Debug, Deserialize)]
struct Extraction {
    symbol: String,
}

const RESOLVE_PROMPT: &str = r#"You extract stock ticker symbols from user requests.

Rules:
- Convert company names to tickers: "Apple" -> "AAPL", "Tesla" -> "TSLA".
- Resolve pronouns and references ("it", "that company", "the company",
  "its") against the symbols previously discussed in the conversation
  context. When several could match, prefer the most recently mentioned.
- Always return the symbol in uppercase.
- If no symbol can be determined even with context, return "UNKNOWN".

Return JSON only: {"symbol": "<TICKER or UNKNOWN>"}"#;

pub struct SymbolResolver;

impl SymbolResolver {
    /// Resolve the symbol a message is about, disambiguating with the
    /// conversation context. Does not mutate the known-symbol set; the
    /// orchestrator records a successful resolution.
    pub async fn resolve<C: CompletionPort>(
        port: &C,
        message: &str,
        context: &str,
    ) -> Result<Resolution, CompletionError> {
        let prompt = format!("{}\n\nUser request: \"{}\"", RESOLVE_PROMPT, message);
        let raw = port.complete(&prompt, Some(context), true).await?;
        let extraction: Extraction = decode_json(&raw)?;

        let symbol = extraction.symbol.trim().to_uppercase();
        if symbol.is_empty() || symbol == UNRESOLVED {
            debug!(message, "no symbol resolved");
            return Ok(Resolution::Unknown);
        }
        debug!(%symbol, "symbol resolved");
        Ok(Resolution::Symbol(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedCompletion;

    #[tokio::test]
    async fn resolves_and_uppercases() {
        let port = ScriptedCompletion::replies(vec![r#"{"symbol": "aapl"}"#]);
        let res = SymbolResolver::resolve(&port, "price of apple?", "")
            .await
            .unwrap();
        assert_eq!(res, Resolution::Symbol("AAPL".into()));
    }

    #[tokio::test]
    async fn sentinel_maps_to_unknown() {
        let port = ScriptedCompletion::replies(vec![r#"{"symbol": "UNKNOWN"}"#]);
        let res = SymbolResolver::resolve(&port, "price of what?", "")
            .await
            .unwrap();
        assert_eq!(res, Resolution::Unknown);
    }

    #[tokio::test]
    async fn schema_violation_propagates() {
        let port = ScriptedCompletion::replies(vec!["not json"]);
        let err = SymbolResolver::resolve(&port, "price?", "").await.unwrap_err();
        assert!(matches!(err, CompletionError::Schema(_)));
    }
}
