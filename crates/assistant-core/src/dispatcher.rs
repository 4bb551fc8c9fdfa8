use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ports::{decode_json, CompletionPort};

/// Closed set of execution paths a user turn can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestCategory {
    IncomeStatement,
    CompanyFinancials,
    StockPrice,
    Report,
    Chat,
}

impl RequestCategory {
    /// Map a raw label to a category. Trims and case-folds; anything
    /// unrecognized is None so the caller can apply its fallback.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "income_statement" => Some(RequestCategory::IncomeStatement),
            "company_financials" => Some(RequestCategory::CompanyFinancials),
            "stock_price" => Some(RequestCategory::StockPrice),
            "report" => Some(RequestCategory::Report),
            "chat" => Some(RequestCategory::Chat),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestCategory::IncomeStatement => "income_statement",
            RequestCategory::CompanyFinancials => "company_financials",
            RequestCategory::StockPrice => "stock_price",
            RequestCategory::Report => "report",
            RequestCategory::Chat => "chat",
        }
    }

    /// Whether this path needs a resolved symbol before it can fetch.
    pub fn needs_symbol(&self) -> bool {
        !matches!(self, RequestCategory::Chat)
    }
}

/// Structured verdict requested from the completion service.
#[derive(Debug, Deserialize)]
struct RouterVerdict {
    category: String,
    #[allow(dead_code)]
    confidence: Option<f32>,
    #[allow(dead_code)]
    reasoning: Option<String>,
}

const CLASSIFY_PROMPT: &str = r#"You are a request router for a financial assistant.

Categorize the user request into exactly one of:
- income_statement: revenue, profit, earnings, margins for one company
- company_financials: ratios, valuation, P/E, market cap, debt for one company
- stock_price: current price, quote, trading data for one company
- report: a comprehensive overview or analysis of one company
- chat: general finance questions, definitions, greetings, anything else

Use the conversation summary to classify follow-up questions: "and its
income statement?" after a price request is income_statement.

Return JSON only: {"category": "<label>", "confidence": 0.0-1.0, "reasoning": "<brief>"}"#;

pub struct Dispatcher;

impl Dispatcher {
    /// Classify a message into a RequestCategory. Never fails: a port
    /// failure, schema violation, or unrecognized label degrades to
    /// Chat so the turn always proceeds.
    pub async fn classify<C: CompletionPort>(
        port: &C,
        message: &str,
        context: &str,
    ) -> RequestCategory {
        let prompt = format!("{}\n\nUser request: \"{}\"", CLASSIFY_PROMPT, message);
        let raw = match port.complete(&prompt, Some(context), true).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "classification unavailable, falling back to chat");
                return RequestCategory::Chat;
            }
        };

        match decode_json::<RouterVerdict>(&raw) {
            Ok(verdict) => RequestCategory::from_label(&verdict.category).unwrap_or_else(|| {
                warn!(label = %verdict.category, "unrecognized category, falling back to chat");
                RequestCategory::Chat
            }),
            Err(e) => {
                warn!(error = %e, "unparseable router verdict, falling back to chat");
                RequestCategory::Chat
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_normalization_is_case_and_space_insensitive() {
        assert_eq!(
            RequestCategory::from_label("  Stock_Price \n"),
            Some(RequestCategory::StockPrice)
        );
        assert_eq!(RequestCategory::from_label("REPORT"), Some(RequestCategory::Report));
        assert_eq!(RequestCategory::from_label("weather"), None);
    }

    #[test]
    fn chat_is_the_only_path_without_a_symbol() {
        assert!(!RequestCategory::Chat.needs_symbol());
        assert!(RequestCategory::Report.needs_symbol());
        assert!(RequestCategory::StockPrice.needs_symbol());
    }
}
