//! Financial Modeling Prep adapter.
//!
//! Implements the engine's market-data port against the FMP v3 REST
//! API. Each operation maps to one or more endpoints; responses are
//! arrays with the most recent period first.

use async_trait::async_trait;
use reqwest::Client as Http;
use serde_json::Value;
use tracing::debug;

use assistant_core::ports::{MarketDataPort, MarketError};
use assistant_core::records::{
    CompanyFinancials, IncomeStatement, MarketRecord, Operation, StockQuote,
};

const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";

#[derive(Clone, Debug)]
pub struct FmpClient {
    http: Http,
    base_url: String,
    api_key: String,
}

impl FmpClient {
    pub fn new(api_key: String) -> Result<Self, MarketError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Point the client at a different host, for local stubs.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, MarketError> {
        let http = Http::builder()
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| MarketError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// GET an endpoint and require a non-empty JSON array back.
    ///
    /// FMP signals "no such symbol" with `[]` and a 200, so an empty
    /// array is NotFound rather than Malformed.
    async fn get_rows(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Value>, MarketError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(endpoint, "fmp request");

        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| MarketError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MarketError::Transport(format!(
                "{} returned {}",
                endpoint, status
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| MarketError::Malformed(e.to_string()))?;
        rows_from_body(endpoint, body)
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<MarketRecord, MarketError> {
        let rows = self.get_rows(&format!("quote/{}", symbol), &[]).await?;
        Ok(MarketRecord::StockPrice(parse_quote(symbol, &rows[0])))
    }

    async fn fetch_income(&self, symbol: &str) -> Result<MarketRecord, MarketError> {
        let rows = self
            .get_rows(
                &format!("income-statement/{}", symbol),
                &[("period", "annual"), ("limit", "1")],
            )
            .await?;
        Ok(MarketRecord::IncomeStatement(parse_income(symbol, &rows[0])))
    }

    /// Financials blend three endpoints. Key metrics are required;
    /// ratios and profile degrade to empty objects when they fail.
    async fn fetch_financials(&self, symbol: &str) -> Result<MarketRecord, MarketError> {
        let metrics_path = format!("key-metrics/{}", symbol);
        let ratios_path = format!("ratios/{}", symbol);
        let profile_path = format!("profile/{}", symbol);
        let (metrics, ratios, profile) = tokio::join!(
            self.get_rows(&metrics_path, &[("limit", "1")]),
            self.get_rows(&ratios_path, &[("limit", "1")]),
            self.get_rows(&profile_path, &[]),
        );

        let metrics = metrics?;
        let empty = Value::Object(Default::default());
        let ratios = ratios
            .ok()
            .map(|mut r| r.remove(0))
            .unwrap_or_else(|| empty.clone());
        let profile = profile.ok().map(|mut r| r.remove(0)).unwrap_or(empty);

        Ok(MarketRecord::CompanyFinancials(parse_financials(
            symbol,
            &metrics[0],
            &ratios,
            &profile,
        )))
    }
}

#[async_trait]
impl MarketDataPort for FmpClient {
    async fn fetch(&self, op: Operation, symbol: &str) -> Result<MarketRecord, MarketError> {
        let symbol = symbol.to_ascii_uppercase();
        match op {
            Operation::StockPrice => self.fetch_quote(&symbol).await,
            Operation::IncomeStatement => self.fetch_income(&symbol).await,
            Operation::CompanyFinancials => self.fetch_financials(&symbol).await,
        }
    }
}

fn rows_from_body(endpoint: &str, body: Value) -> Result<Vec<Value>, MarketError> {
    match body {
        Value::Array(rows) if !rows.is_empty() => Ok(rows),
        Value::Array(_) => Err(MarketError::NotFound(endpoint.to_string())),
        other => Err(MarketError::Malformed(format!(
            "{} returned non-array: {}",
            endpoint,
            kind_of(&other)
        ))),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn num(row: &Value, key: &str) -> f64 {
    row.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn int(row: &Value, key: &str) -> u64 {
    row.get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .unwrap_or(0)
}

fn text(row: &Value, key: &str, fallback: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn parse_quote(symbol: &str, row: &Value) -> StockQuote {
    StockQuote {
        symbol: symbol.to_string(),
        name: text(row, "name", "Unknown"),
        price: num(row, "price"),
        change: num(row, "change"),
        change_percent: num(row, "changesPercentage"),
        previous_close: num(row, "previousClose"),
        open: num(row, "open"),
        day_high: num(row, "dayHigh"),
        day_low: num(row, "dayLow"),
        volume: int(row, "volume"),
        avg_volume: int(row, "avgVolume"),
        market_cap: num(row, "marketCap"),
        pe_ratio: num(row, "pe"),
        eps: num(row, "eps"),
        year_high: num(row, "yearHigh"),
        year_low: num(row, "yearLow"),
        exchange: text(row, "exchange", "Unknown"),
    }
}

fn parse_income(symbol: &str, row: &Value) -> IncomeStatement {
    IncomeStatement {
        symbol: symbol.to_string(),
        date: text(row, "date", "Unknown"),
        period: text(row, "period", "annual"),
        revenue: num(row, "revenue"),
        gross_profit: num(row, "grossProfit"),
        operating_income: num(row, "operatingIncome"),
        net_income: num(row, "netIncome"),
        eps: num(row, "eps"),
        gross_profit_ratio: num(row, "grossProfitRatio"),
        operating_income_ratio: num(row, "operatingIncomeRatio"),
        net_income_ratio: num(row, "netIncomeRatio"),
        research_and_development: num(row, "researchAndDevelopmentExpenses"),
    }
}

fn parse_financials(
    symbol: &str,
    metrics: &Value,
    ratios: &Value,
    profile: &Value,
) -> CompanyFinancials {
    CompanyFinancials {
        symbol: symbol.to_string(),
        company_name: text(profile, "companyName", "Unknown"),
        market_cap: num(profile, "mktCap"),
        beta: num(profile, "beta"),
        pe_ratio: num(metrics, "peRatio"),
        price_to_book: num(ratios, "priceToBookRatio"),
        price_to_sales: num(ratios, "priceToSalesRatio"),
        debt_to_equity: num(ratios, "debtEquityRatio"),
        current_ratio: num(ratios, "currentRatio"),
        roe: num(ratios, "returnOnEquity"),
        roa: num(ratios, "returnOnAssets"),
        revenue_growth: num(metrics, "revenueGrowth"),
        gross_margin: num(ratios, "grossProfitMargin"),
        operating_margin: num(ratios, "operatingProfitMargin"),
        net_margin: num(ratios, "netProfitMargin"),
        enterprise_value: num(metrics, "enterpriseValue"),
        date: text(metrics, "date", "Unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_row_maps_to_record() {
        let row: Value = serde_json::from_str(
            r#"{
                "symbol": "AAPL",
                "name": "Apple Inc.",
                "price": 227.52,
                "change": 1.13,
                "changesPercentage": 0.499,
                "previousClose": 226.39,
                "open": 226.8,
                "dayHigh": 228.2,
                "dayLow": 225.9,
                "volume": 44923941,
                "avgVolume": 54722160,
                "marketCap": 3459390277600.0,
                "pe": 34.58,
                "eps": 6.58,
                "yearHigh": 237.23,
                "yearLow": 164.08,
                "exchange": "NASDAQ"
            }"#,
        )
        .unwrap();

        let q = parse_quote("AAPL", &row);
        assert_eq!(q.name, "Apple Inc.");
        assert_eq!(q.price, 227.52);
        assert_eq!(q.volume, 44_923_941);
        assert_eq!(q.year_high, 237.23);
        assert_eq!(q.exchange, "NASDAQ");
    }

    #[test]
    fn income_row_maps_to_record() {
        let row: Value = serde_json::from_str(
            r#"{
                "date": "2023-09-30",
                "period": "FY",
                "revenue": 383285000000,
                "grossProfit": 169148000000,
                "operatingIncome": 114301000000,
                "netIncome": 96995000000,
                "eps": 6.16,
                "grossProfitRatio": 0.4413,
                "operatingIncomeRatio": 0.2982,
                "netIncomeRatio": 0.2531,
                "researchAndDevelopmentExpenses": 29915000000
            }"#,
        )
        .unwrap();

        let i = parse_income("AAPL", &row);
        assert_eq!(i.date, "2023-09-30");
        assert_eq!(i.revenue, 383_285_000_000.0);
        assert_eq!(i.net_income_ratio, 0.2531);
    }

    #[test]
    fn financials_blend_three_rows() {
        let metrics: Value = serde_json::from_str(
            r#"{"date": "2023-09-30", "peRatio": 29.8, "revenueGrowth": 0.02, "enterpriseValue": 2800000000000.0}"#,
        )
        .unwrap();
        let ratios: Value = serde_json::from_str(
            r#"{"priceToBookRatio": 45.2, "debtEquityRatio": 1.78, "returnOnEquity": 1.56, "netProfitMargin": 0.2531}"#,
        )
        .unwrap();
        let profile: Value = serde_json::from_str(
            r#"{"companyName": "Apple Inc.", "mktCap": 3459390277600.0, "beta": 1.24}"#,
        )
        .unwrap();

        let f = parse_financials("AAPL", &metrics, &ratios, &profile);
        assert_eq!(f.company_name, "Apple Inc.");
        assert_eq!(f.pe_ratio, 29.8);
        assert_eq!(f.debt_to_equity, 1.78);
        assert_eq!(f.date, "2023-09-30");
    }

    #[test]
    fn empty_array_is_not_found() {
        let err = rows_from_body("quote/ZZZZ", serde_json::json!([])).unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
    }

    #[test]
    fn non_array_body_is_malformed() {
        let body = serde_json::json!({"Error Message": "Invalid API KEY."});
        let err = rows_from_body("quote/AAPL", body).unwrap_err();
        assert!(matches!(err, MarketError::Malformed(_)));
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let row: Value = serde_json::from_str(r#"{"price": 10.0}"#).unwrap();
        let q = parse_quote("XYZ", &row);
        assert_eq!(q.price, 10.0);
        assert_eq!(q.eps, 0.0);
        assert_eq!(q.volume, 0);
        assert_eq!(q.name, "Unknown");
    }
}
