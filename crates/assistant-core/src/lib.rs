pub mod aggregator;
pub mod blocking;
pub mod composer;
pub mod dispatcher;
pub mod mocks;
pub mod ports;
pub mod records;
pub mod resolver;
pub mod session;
pub mod summarizer;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use aggregator::{fetch_with_timeout, Aggregator};
use composer::{Composer, ResponsePayload};
use dispatcher::{Dispatcher, RequestCategory};
use ports::{CompletionError, CompletionPort, MarketDataPort};
use records::Operation;
use resolver::{Resolution, SymbolResolver};
use session::{ConversationStore, Message, Origin, SessionId};
use summarizer::SummaryCompressor;

pub use composer::ResponsePayload as Payload;

/// Per-invocation knobs supplied by the embedding application.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Deadline applied to every individual port call.
    pub request_timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Headless assistant core: consumes one user message per turn, runs the
/// classify/resolve/fetch/compose pipeline, and maintains per-session
/// conversation memory. Generic over its two external ports.
pub struct Assistant<C: CompletionPort, M: MarketDataPort> {
    completion: C,
    market: M,
    store: ConversationStore,
    config: AssistantConfig,
}

impl<C: CompletionPort, M: MarketDataPort> Assistant<C, M> {
    pub fn new(completion: C, market: M) -> Self {
        Self::with_config(completion, market, AssistantConfig::default())
    }

    pub fn with_config(completion: C, market: M, config: AssistantConfig) -> Self {
        Self {
            completion,
            market,
            store: ConversationStore::new(),
            config,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Forget a session's conversation. The session id stays usable.
    pub async fn reset(&self, id: &SessionId) {
        self.store.reset(id).await;
    }

    /// Entry point for one turn. The session's state is locked for the
    /// whole invocation, so turns for one session run strictly one at a
    /// time while unrelated sessions proceed concurrently.
    ///
    /// Every failure mode below produces a well-formed payload; only a
    /// persistence failure would propagate as an error.
    pub async fn handle(&self, id: &SessionId, message: &str) -> Result<ResponsePayload> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(ResponsePayload {
                text: "No message provided.".to_string(),
                category: RequestCategory::Chat,
                symbol: None,
                attachment: None,
            });
        }

        let completion = Timed {
            inner: &self.completion,
            deadline: self.config.request_timeout,
        };

        let entry = self.store.entry(id);
        let mut state = entry.lock().await;

        state.append(Message::user(message));
        let context = state.context_for_completion();

        let category = Dispatcher::classify(&completion, message, &context).await;
        info!(session = %id.key(), category = category.label(), "turn classified");
        state.append(
            Message::agent(category.label(), Origin::Dispatcher)
                .with_attachment(json!({ "category": category.label() })),
        );

        let payload = if !category.needs_symbol() {
            Composer::compose_chat(&completion, message, &context).await
        } else {
            match SymbolResolver::resolve(&completion, message, &context).await {
                Ok(Resolution::Symbol(symbol)) => {
                    state.append(
                        Message::agent(format!("Resolved symbol: {}", symbol), Origin::Resolver)
                            .with_attachment(json!({ "symbol": symbol })),
                    );
                    state.record_symbol(&symbol);
                    self.fetch_and_compose(category, &symbol).await
                }
                Ok(Resolution::Unknown) => {
                    state.append(Message::agent(
                        "Resolved symbol: UNKNOWN",
                        Origin::Resolver,
                    ));
                    Composer::compose_unresolved(category)
                }
                Err(e) => {
                    warn!(error = %e, "symbol resolution unavailable");
                    Composer::compose_unavailable(category)
                }
            }
        };

        let origin = match category {
            RequestCategory::Chat => Origin::Chat,
            _ => Origin::Composer,
        };
        let mut agent_message = Message::agent(payload.text.clone(), origin);
        if let Some(attachment) = &payload.attachment {
            agent_message = agent_message.with_attachment(attachment.clone());
        }
        state.append(agent_message);

        // The response must be in the log before the compressor counts.
        SummaryCompressor::maybe_update(&completion, &mut state).await;

        Ok(payload)
    }

    async fn fetch_and_compose(&self, category: RequestCategory, symbol: &str) -> ResponsePayload {
        match category.operation() {
            None => {
                // Report path: all operations concurrently, join-all.
                let result = Aggregator::fetch_all(
                    &self.market,
                    symbol,
                    &Operation::REPORT_SET,
                    self.config.request_timeout,
                )
                .await;
                Composer::compose_report(symbol, &result)
            }
            Some(op) => {
                let outcome =
                    fetch_with_timeout(&self.market, op, symbol, self.config.request_timeout)
                        .await;
                Composer::compose_single(symbol, category, &outcome)
            }
        }
    }
}

impl RequestCategory {
    /// The one lookup a single-path category maps to; None for the
    /// aggregated report and chat.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            RequestCategory::StockPrice => Some(Operation::StockPrice),
            RequestCategory::IncomeStatement => Some(Operation::IncomeStatement),
            RequestCategory::CompanyFinancials => Some(Operation::CompanyFinancials),
            RequestCategory::Report | RequestCategory::Chat => None,
        }
    }
}

/// Applies the caller-supplied deadline to every completion call.
struct Timed<'a, C: CompletionPort> {
    inner: &'a C,
    deadline: Duration,
}

#[async_trait]
impl<C: CompletionPort> CompletionPort for Timed<'_, C> {
    async fn complete(
        &self,
        prompt: &str,
        context: Option<&str>,
        json: bool,
    ) -> Result<String, CompletionError> {
        match tokio::time::timeout(self.deadline, self.inner.complete(prompt, context, json)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(CompletionError::Unavailable(format!(
                "completion timed out after {:?}",
                self.deadline
            ))),
        }
    }
}
