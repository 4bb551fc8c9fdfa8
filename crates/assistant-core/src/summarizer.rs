use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ports::{decode_json, CompletionPort};
use crate::session::{ConversationState, Role, Summary};

/// New messages required since the last summary before a regeneration
/// is triggered. Fixed at build time, not user-tunable.
pub const SUMMARY_THRESHOLD: usize = 5;

const SUMMARIZE_PROMPT: &str = r#"You maintain a running summary of a financial assistant conversation.

Fold the new messages into the previous summary. Track key topics, the
companies discussed, and the user's recurring interests. Keep it concise
but complete enough to classify follow-up questions.

Return JSON only:
{"text": "<updated summary>", "topics": ["..."], "symbols": ["TICKERS"]}"#;

#[derive(Debug, Deserialize)]
struct SummaryDraft {
    text: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    symbols: Vec<String>,
}

pub struct SummaryCompressor;

impl SummaryCompressor {
    /// Regenerate the conversation summary once enough new messages have
    /// accumulated. Below threshold this is a no-op, so repeated calls
    /// without intervening appends are idempotent. On any generation
    /// failure the prior summary and cursor are left untouched; a
    /// summary is an optimization, not a correctness requirement.
    pub async fn maybe_update<C: CompletionPort>(
        port: &C,
        state: &mut ConversationState,
    ) -> Option<Summary> {
        let pending = state.message_count() - state.summary_cursor();
        if pending < SUMMARY_THRESHOLD {
            return None;
        }

        let mut prompt = String::from(SUMMARIZE_PROMPT);
        prompt.push_str("\n\nPrevious summary: ");
        match &state.summary {
            Some(s) => prompt.push_str(&s.text),
            None => prompt.push_str("(none)"),
        }
        prompt.push_str("\n\nNew messages:\n");
        for msg in state.messages_since_summary() {
            let who = match msg.role {
                Role::User => "User",
                Role::Agent => "Agent",
            };
            prompt.push_str(&format!("- {}: {}\n", who, msg.content));
        }

        let raw = match port.complete(&prompt, None, true).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "summary generation skipped");
                return None;
            }
        };
        let draft: SummaryDraft = match decode_json(&raw) {
            Ok(draft) => draft,
            Err(e) => {
                warn!(error = %e, "malformed summary output, update skipped");
                return None;
            }
        };

        let summary = Summary {
            text: draft.text,
            topics: draft.topics,
            symbols: draft.symbols,
            generated_at: Utc::now(),
            message_count_at_generation: state.message_count(),
        };
        state.replace_summary(summary.clone());
        debug!(
            cursor = state.summary_cursor(),
            "conversation summary regenerated"
        );
        Some(summary)
    }
}
