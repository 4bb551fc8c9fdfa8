use serde::{Deserialize, Serialize};

/// A single market-data fetch the engine knows how to request.
///
/// `Ord` so aggregated results iterate in a stable order regardless of
/// which fetch settled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    StockPrice,
    IncomeStatement,
    CompanyFinancials,
}

impl Operation {
    /// The full set fetched for a comprehensive report.
    pub const REPORT_SET: [Operation; 3] = [
        Operation::StockPrice,
        Operation::IncomeStatement,
        Operation::CompanyFinancials,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Operation::StockPrice => "stock_price",
            Operation::IncomeStatement => "income_statement",
            Operation::CompanyFinancials => "company_financials",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Operation::StockPrice => "Stock Price & Market Data",
            Operation::IncomeStatement => "Income Statement",
            Operation::CompanyFinancials => "Company Financials & Ratios",
        }
    }
}

/// Real-time quote and trading data for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub previous_close: f64,
    pub open: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub volume: u64,
    pub avg_volume: u64,
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub eps: f64,
    pub year_high: f64,
    pub year_low: f64,
    pub exchange: String,
}

/// Most recent income statement for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub symbol: String,
    pub date: String,
    pub period: String,
    pub revenue: f64,
    pub gross_profit: f64,
    pub operating_income: f64,
    pub net_income: f64,
    pub eps: f64,
    pub gross_profit_ratio: f64,
    pub operating_income_ratio: f64,
    pub net_income_ratio: f64,
    pub research_and_development: f64,
}

/// Valuation metrics and financial ratios for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyFinancials {
    pub symbol: String,
    pub company_name: String,
    pub market_cap: f64,
    pub beta: f64,
    pub pe_ratio: f64,
    pub price_to_book: f64,
    pub price_to_sales: f64,
    pub debt_to_equity: f64,
    pub current_ratio: f64,
    pub roe: f64,
    pub roa: f64,
    pub revenue_growth: f64,
    pub gross_margin: f64,
    pub operating_margin: f64,
    pub net_margin: f64,
    pub enterprise_value: f64,
    pub date: String,
}

/// Sum type over everything a lookup can return, tagged by operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketRecord {
    StockPrice(StockQuote),
    IncomeStatement(IncomeStatement),
    CompanyFinancials(CompanyFinancials),
}

impl MarketRecord {
    pub fn operation(&self) -> Operation {
        match self {
            MarketRecord::StockPrice(_) => Operation::StockPrice,
            MarketRecord::IncomeStatement(_) => Operation::IncomeStatement,
            MarketRecord::CompanyFinancials(_) => Operation::CompanyFinancials,
        }
    }

    pub fn as_quote(&self) -> Option<&StockQuote> {
        match self {
            MarketRecord::StockPrice(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_income(&self) -> Option<&IncomeStatement> {
        match self {
            MarketRecord::IncomeStatement(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_financials(&self) -> Option<&CompanyFinancials> {
        match self {
            MarketRecord::CompanyFinancials(f) => Some(f),
            _ => None,
        }
    }
}
