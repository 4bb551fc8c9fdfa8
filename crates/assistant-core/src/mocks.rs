//! In-crate mocks for tests and the demo binary.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{CompletionError, CompletionPort, MarketDataPort, MarketError};
use crate::records::{CompanyFinancials, IncomeStatement, MarketRecord, Operation, StockQuote};

/// Completion port that plays back a fixed sequence of replies.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedCompletion {
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl CompletionPort for ScriptedCompletion {
    async fn complete(
        &self,
        _prompt: &str,
        _context: Option<&str>,
        _json: bool,
    ) -> Result<String, CompletionError> {
        self.replies
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .ok_or_else(|| CompletionError::Unavailable("script exhausted".into()))
    }
}

/// Completion port that is always down.
pub struct FailingCompletion;

#[async_trait]
impl CompletionPort for FailingCompletion {
    async fn complete(
        &self,
        _prompt: &str,
        _context: Option<&str>,
        _json: bool,
    ) -> Result<String, CompletionError> {
        Err(CompletionError::Unavailable("mock outage".into()))
    }
}

pub fn sample_quote(symbol: &str) -> StockQuote {
    StockQuote {
        symbol: symbol.to_string(),
        name: format!("{} Inc.", symbol),
        price: 231.5,
        change: 2.75,
        change_percent: 1.2,
        previous_close: 228.75,
        open: 229.1,
        day_high: 233.0,
        day_low: 228.4,
        volume: 48_000_000,
        avg_volume: 52_000_000,
        market_cap: 3.4e12,
        pe_ratio: 31.2,
        eps: 7.42,
        year_high: 250.0,
        year_low: 164.0,
        exchange: "NASDAQ".to_string(),
    }
}

pub fn sample_income(symbol: &str) -> IncomeStatement {
    IncomeStatement {
        symbol: symbol.to_string(),
        date: "2024-09-28".to_string(),
        period: "annual".to_string(),
        revenue: 391e9,
        gross_profit: 180e9,
        operating_income: 123e9,
        net_income: 93.7e9,
        eps: 6.11,
        gross_profit_ratio: 0.46,
        operating_income_ratio: 0.315,
        net_income_ratio: 0.24,
        research_and_development: 31e9,
    }
}

pub fn sample_financials(symbol: &str) -> CompanyFinancials {
    CompanyFinancials {
        symbol: symbol.to_string(),
        company_name: format!("{} Inc.", symbol),
        market_cap: 3.4e12,
        beta: 1.25,
        pe_ratio: 31.2,
        price_to_book: 47.0,
        price_to_sales: 8.7,
        debt_to_equity: 1.45,
        current_ratio: 0.95,
        roe: 1.36,
        roa: 0.27,
        revenue_growth: 0.02,
        gross_margin: 0.46,
        operating_margin: 0.315,
        net_margin: 0.24,
        enterprise_value: 3.45e12,
        date: "2024-09-28".to_string(),
    }
}

/// Market-data port serving canned records, with per-operation failure
/// and delay injection.
pub struct MockMarket {
    symbol: String,
    failures: HashMap<Operation, MarketError>,
    delays: HashMap<Operation, Duration>,
}

impl MockMarket {
    /// A market where every operation succeeds for the given symbol.
    pub fn healthy(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            failures: HashMap::new(),
            delays: HashMap::new(),
        }
    }

    pub fn failing(mut self, op: Operation, error: MarketError) -> Self {
        self.failures.insert(op, error);
        self
    }

    pub fn delayed(mut self, op: Operation, delay: Duration) -> Self {
        self.delays.insert(op, delay);
        self
    }
}

#[async_trait]
impl MarketDataPort for MockMarket {
    async fn fetch(&self, op: Operation, symbol: &str) -> Result<MarketRecord, MarketError> {
        if let Some(delay) = self.delays.get(&op) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(&op) {
            return Err(error.clone());
        }
        if !symbol.eq_ignore_ascii_case(&self.symbol) {
            return Err(MarketError::NotFound(format!("no data for {}", symbol)));
        }
        Ok(match op {
            Operation::StockPrice => MarketRecord::StockPrice(sample_quote(symbol)),
            Operation::IncomeStatement => MarketRecord::IncomeStatement(sample_income(symbol)),
            Operation::CompanyFinancials => {
                MarketRecord::CompanyFinancials(sample_financials(symbol))
            }
        })
    }
}
