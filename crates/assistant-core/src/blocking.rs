//! Blocking facade over the async engine.
//!
//! There is exactly one implementation of the turn pipeline (the async
//! one); this wrapper just drives it to completion on an owned runtime
//! for callers without an executor of their own.

use anyhow::Result;

use crate::composer::ResponsePayload;
use crate::ports::{CompletionPort, MarketDataPort};
use crate::session::SessionId;
use crate::AssistantConfig;

pub struct Assistant<C: CompletionPort, M: MarketDataPort> {
    inner: crate::Assistant<C, M>,
    runtime: tokio::runtime::Runtime,
}

impl<C: CompletionPort, M: MarketDataPort> Assistant<C, M> {
    pub fn new(completion: C, market: M) -> Result<Self> {
        Self::with_config(completion, market, AssistantConfig::default())
    }

    pub fn with_config(completion: C, market: M, config: AssistantConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            inner: crate::Assistant::with_config(completion, market, config),
            runtime,
        })
    }

    pub fn handle(&self, id: &SessionId, message: &str) -> Result<ResponsePayload> {
        self.runtime.block_on(self.inner.handle(id, message))
    }

    pub fn reset(&self, id: &SessionId) {
        self.runtime.block_on(self.inner.reset(id));
    }
}
