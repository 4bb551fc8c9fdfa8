use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::debug;

use crate::ports::{MarketDataPort, MarketError};
use crate::records::{MarketRecord, Operation};

/// Per-invocation outcome map: exactly one entry per requested
/// operation, each either a record or a captured failure.
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    outcomes: BTreeMap<Operation, Result<MarketRecord, MarketError>>,
}

impl AggregationResult {
    pub fn get(&self, op: Operation) -> Option<&Result<MarketRecord, MarketError>> {
        self.outcomes.get(&op)
    }

    pub fn record(&self, op: Operation) -> Option<&MarketRecord> {
        match self.outcomes.get(&op) {
            Some(Ok(record)) => Some(record),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_ok()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Operation, &Result<MarketRecord, MarketError>)> {
        self.outcomes.iter().map(|(op, outcome)| (*op, outcome))
    }

    /// Successful records only, in stable operation order.
    pub fn successes(&self) -> Vec<&MarketRecord> {
        self.outcomes.values().filter_map(|o| o.as_ref().ok()).collect()
    }
}

/// One lookup bounded by the caller-supplied deadline. A timeout is
/// reported as a transport failure, never an unhandled error.
pub async fn fetch_with_timeout<M: MarketDataPort>(
    market: &M,
    op: Operation,
    symbol: &str,
    deadline: Duration,
) -> Result<MarketRecord, MarketError> {
    match tokio::time::timeout(deadline, market.fetch(op, symbol)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(MarketError::Transport(format!(
            "{} timed out after {:?}",
            op.label(),
            deadline
        ))),
    }
}

pub struct Aggregator;

impl Aggregator {
    /// Fetch every requested operation concurrently and wait for all of
    /// them to settle. A failure in one operation never cancels the
    /// others; partial results are a first-class outcome. No retries
    /// happen here; retry policy belongs to the data-source client.
    pub async fn fetch_all<M: MarketDataPort>(
        market: &M,
        symbol: &str,
        operations: &[Operation],
        deadline: Duration,
    ) -> AggregationResult {
        let fetches = operations.iter().map(|&op| async move {
            let outcome = fetch_with_timeout(market, op, symbol, deadline).await;
            if let Err(e) = &outcome {
                debug!(op = op.label(), error = %e, "lookup failed");
            }
            (op, outcome)
        });

        let outcomes = join_all(fetches).await.into_iter().collect();
        AggregationResult { outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockMarket;

    const OPS: [Operation; 3] = Operation::REPORT_SET;

    #[tokio::test]
    async fn one_entry_per_requested_operation() {
        let market = MockMarket::healthy("AAPL");
        let result = Aggregator::fetch_all(&market, "AAPL", &OPS, Duration::from_secs(5)).await;
        assert_eq!(result.len(), OPS.len());
        assert_eq!(result.success_count(), 3);
        for op in OPS {
            assert!(result.get(op).is_some());
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_poison_the_batch() {
        let market = MockMarket::healthy("AAPL")
            .failing(Operation::IncomeStatement, MarketError::Transport("boom".into()));
        let result = Aggregator::fetch_all(&market, "AAPL", &OPS, Duration::from_secs(5)).await;

        assert_eq!(result.len(), 3);
        assert_eq!(result.success_count(), 2);
        assert!(matches!(
            result.get(Operation::IncomeStatement),
            Some(Err(MarketError::Transport(_)))
        ));
        assert!(result.record(Operation::StockPrice).is_some());
    }

    #[tokio::test]
    async fn slow_operation_becomes_transport_failure() {
        let market = MockMarket::healthy("AAPL").delayed(Operation::StockPrice, Duration::from_secs(2));
        let result =
            Aggregator::fetch_all(&market, "AAPL", &OPS, Duration::from_millis(20)).await;

        assert_eq!(result.len(), 3);
        let outcome = result.get(Operation::StockPrice).unwrap();
        assert!(matches!(outcome, Err(MarketError::Transport(_))));
        // The other two still settled on their own.
        assert_eq!(result.success_count(), 2);
    }
}
