use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::aggregator::AggregationResult;
use crate::dispatcher::RequestCategory;
use crate::ports::{CompletionPort, MarketError};
use crate::records::{CompanyFinancials, IncomeStatement, MarketRecord, Operation, StockQuote};

/// Final answer for one turn. `attachment` carries the structured data
/// that backed the text, when any was fetched.
#[derive(Debug, Clone)]
pub struct ResponsePayload {
    pub text: String,
    pub category: RequestCategory,
    pub symbol: Option<String>,
    pub attachment: Option<serde_json::Value>,
}

const CHAT_PROMPT: &str = r#"You are a friendly, professional financial assistant.
Answer the user's question conversationally using the conversation context.
Explain financial concepts clearly and concisely. Reference companies and
topics already discussed when relevant."#;

pub struct Composer;

impl Composer {
    /// Deterministic comprehensive report. Failed sections are marked
    /// "unavailable: <kind>" rather than silently omitted, so partial
    /// success is always distinguishable from complete success.
    pub fn compose_report(symbol: &str, result: &AggregationResult) -> ResponsePayload {
        let quote = result.record(Operation::StockPrice).and_then(MarketRecord::as_quote);
        let income = result
            .record(Operation::IncomeStatement)
            .and_then(MarketRecord::as_income);
        let financials = result
            .record(Operation::CompanyFinancials)
            .and_then(MarketRecord::as_financials);

        let company_name = financials
            .map(|f| f.company_name.as_str())
            .or(quote.map(|q| q.name.as_str()))
            .filter(|n| !n.is_empty())
            .unwrap_or(symbol);

        let mut text = format!("# Financial Report - {} ({})\n\n", symbol, company_name);
        text.push_str(&format!(
            "## Executive Summary\nAnalysis of {} ({}) from {} of {} data sources.\n",
            company_name,
            symbol,
            result.success_count(),
            result.len()
        ));
        text.push_str(&format!(
            "**Data Quality Score**: {:.0}%\n",
            data_quality_score(quote, income, financials) * 100.0
        ));
        text.push_str(&format!(
            "**Data Completeness**: {:.0}%\n\n",
            completeness_score(result) * 100.0
        ));

        let insights = key_insights(quote, income, financials);
        if !insights.is_empty() {
            text.push_str("## Key Insights\n");
            for insight in &insights {
                text.push_str(&format!("- {}\n", insight));
            }
            text.push('\n');
        }

        text.push_str("## Financial Data\n\n");
        for (op, outcome) in result.iter() {
            text.push_str(&format!("### {}\n", op.title()));
            match outcome {
                Ok(record) => text.push_str(&format_record(record)),
                Err(e) => text.push_str(&format!("unavailable: {}\n", e.kind())),
            }
            text.push('\n');
        }

        let strengths = strengths(income, financials);
        let concerns = concerns(income, financials, quote);
        text.push_str("## Analysis Summary\n\n**Strengths:**\n");
        for s in &strengths {
            text.push_str(&format!("- {}\n", s));
        }
        text.push_str("\n**Areas of Attention:**\n");
        for c in &concerns {
            text.push_str(&format!("- {}\n", c));
        }
        text.push_str(&format!(
            "\n---\n*Report generated at {} UTC*\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));

        let attachment = json!({
            "symbol": symbol,
            "sections": result
                .iter()
                .map(|(op, outcome)| match outcome {
                    Ok(record) => json!({ "operation": op.label(), "record": record }),
                    Err(e) => json!({ "operation": op.label(), "unavailable": e.kind() }),
                })
                .collect::<Vec<_>>(),
        });

        ResponsePayload {
            text,
            category: RequestCategory::Report,
            symbol: Some(symbol.to_string()),
            attachment: Some(attachment),
        }
    }

    /// Single-lookup answer. A failure becomes a plain-language
    /// explanation of what could not be fetched and why.
    pub fn compose_single(
        symbol: &str,
        category: RequestCategory,
        outcome: &Result<MarketRecord, MarketError>,
    ) -> ResponsePayload {
        match outcome {
            Ok(record) => ResponsePayload {
                text: format_record(record),
                category,
                symbol: Some(symbol.to_string()),
                attachment: serde_json::to_value(record).ok(),
            },
            Err(e) => {
                let reason = match e {
                    MarketError::NotFound(_) => "no data is available for it",
                    MarketError::Transport(_) => "the data source could not be reached",
                    MarketError::Malformed(_) => "the data source returned unusable data",
                };
                ResponsePayload {
                    text: format!(
                        "I couldn't retrieve the {} for {}: {}. Please try again later.",
                        category.label().replace('_', " "),
                        symbol,
                        reason
                    ),
                    category,
                    symbol: Some(symbol.to_string()),
                    attachment: None,
                }
            }
        }
    }

    /// Conversational answer straight from the completion service; no
    /// data fetch involved. Port failure degrades to an apology payload
    /// rather than an error.
    pub async fn compose_chat<C: CompletionPort>(
        port: &C,
        message: &str,
        context: &str,
    ) -> ResponsePayload {
        let prompt = format!("{}\n\nUser: {}", CHAT_PROMPT, message);
        let text = match port.complete(&prompt, Some(context), false).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chat completion failed");
                "I'm having trouble answering right now. Please try again in a moment."
                    .to_string()
            }
        };
        ResponsePayload {
            text,
            category: RequestCategory::Chat,
            symbol: None,
            attachment: None,
        }
    }

    /// Terminal payload when the language service itself is down on a
    /// data path; plain language, no raw error.
    pub fn compose_unavailable(category: RequestCategory) -> ResponsePayload {
        ResponsePayload {
            text: "I couldn't process that request right now because the assistant's \
                   language service is unavailable. Please try again shortly."
                .to_string(),
            category,
            symbol: None,
            attachment: None,
        }
    }

    /// Terminal payload for a turn whose subject could not be resolved.
    pub fn compose_unresolved(category: RequestCategory) -> ResponsePayload {
        ResponsePayload {
            text: "I couldn't identify which company you mean. Please name a company \
                   or ticker symbol."
                .to_string(),
            category,
            symbol: None,
            attachment: None,
        }
    }
}

fn format_record(record: &MarketRecord) -> String {
    match record {
        MarketRecord::StockPrice(q) => format_quote(q),
        MarketRecord::IncomeStatement(i) => format_income(i),
        MarketRecord::CompanyFinancials(f) => format_financials(f),
    }
}

fn format_quote(q: &StockQuote) -> String {
    format!(
        "**{} ({})**\n\
         - Price: ${:.2} ({:+.2}, {:+.2}%)\n\
         - Previous close: ${:.2}, open: ${:.2}\n\
         - Day range: ${:.2} - ${:.2}\n\
         - Volume: {} (avg {})\n\
         - 52-week range: ${:.2} - ${:.2}\n\
         - Market cap: {}\n",
        q.name,
        q.symbol,
        q.price,
        q.change,
        q.change_percent,
        q.previous_close,
        q.open,
        q.day_low,
        q.day_high,
        q.volume,
        q.avg_volume,
        q.year_low,
        q.year_high,
        format_money(q.market_cap),
    )
}

fn format_income(i: &IncomeStatement) -> String {
    format!(
        "**Income Statement ({} {})**\n\
         - Revenue: {}\n\
         - Gross profit: {} ({:.1}% margin)\n\
         - Operating income: {} ({:.1}% margin)\n\
         - Net income: {} ({:.1}% margin)\n\
         - EPS: ${:.2}\n\
         - R&D expenses: {}\n",
        i.period,
        i.date,
        format_money(i.revenue),
        format_money(i.gross_profit),
        i.gross_profit_ratio * 100.0,
        format_money(i.operating_income),
        i.operating_income_ratio * 100.0,
        format_money(i.net_income),
        i.net_income_ratio * 100.0,
        i.eps,
        format_money(i.research_and_development),
    )
}

fn format_financials(f: &CompanyFinancials) -> String {
    format!(
        "**{} Financials ({})**\n\
         - Market cap: {}, enterprise value: {}\n\
         - P/E: {:.2}, P/B: {:.2}, P/S: {:.2}\n\
         - ROE: {:.1}%, ROA: {:.1}%\n\
         - Debt/equity: {:.2}, current ratio: {:.2}\n\
         - Margins: gross {:.1}%, operating {:.1}%, net {:.1}%\n\
         - Revenue growth: {:.1}%\n",
        f.company_name,
        f.date,
        format_money(f.market_cap),
        format_money(f.enterprise_value),
        f.pe_ratio,
        f.price_to_book,
        f.price_to_sales,
        f.roe * 100.0,
        f.roa * 100.0,
        f.debt_to_equity,
        f.current_ratio,
        f.gross_margin * 100.0,
        f.operating_margin * 100.0,
        f.net_margin * 100.0,
        f.revenue_growth * 100.0,
    )
}

fn format_money(value: f64) -> String {
    let abs = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };
    if abs >= 1e12 {
        format!("{}${:.2}T", sign, abs / 1e12)
    } else if abs >= 1e9 {
        format!("{}${:.2}B", sign, abs / 1e9)
    } else if abs >= 1e6 {
        format!("{}${:.2}M", sign, abs / 1e6)
    } else {
        format!("{}${:.0}", sign, abs)
    }
}

/// Insights derived only from the records that were actually fetched; an
/// insight whose inputs are missing is not emitted.
fn key_insights(
    quote: Option<&StockQuote>,
    income: Option<&IncomeStatement>,
    financials: Option<&CompanyFinancials>,
) -> Vec<String> {
    let mut insights = Vec::new();

    if let Some(i) = income {
        if i.revenue > 0.0 {
            insights.push(format!("Revenue: {}", format_money(i.revenue)));
        }
        if i.net_income_ratio > 0.0 {
            insights.push(format!("Net margin: {:.1}%", i.net_income_ratio * 100.0));
        }
    }

    let pe = financials
        .map(|f| f.pe_ratio)
        .filter(|pe| *pe > 0.0)
        .or(quote.map(|q| q.pe_ratio).filter(|pe| *pe > 0.0));
    if let Some(pe) = pe {
        insights.push(format!("P/E ratio: {:.2}", pe));
    }

    if let Some(q) = quote {
        if q.change_percent != 0.0 {
            let direction = if q.change_percent > 0.0 { "up" } else { "down" };
            insights.push(format!("Stock {} {:.2}% today", direction, q.change_percent.abs()));
        }
    }

    let market_cap = financials
        .map(|f| f.market_cap)
        .filter(|m| *m > 0.0)
        .or(quote.map(|q| q.market_cap).filter(|m| *m > 0.0));
    if let Some(cap) = market_cap {
        let bucket = if cap > 200e9 {
            "Large-cap company (>$200B)"
        } else if cap > 10e9 {
            "Mid-cap company ($10B-$200B)"
        } else {
            "Small-cap company (<$10B)"
        };
        insights.push(bucket.to_string());
    }

    insights
}

fn strengths(income: Option<&IncomeStatement>, financials: Option<&CompanyFinancials>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(i) = income {
        if i.net_income_ratio > 0.15 {
            out.push(format!(
                "Strong profitability with {:.1}% net margin",
                i.net_income_ratio * 100.0
            ));
        }
    }
    if let Some(f) = financials {
        if f.roe > 0.15 {
            out.push(format!("Excellent return on equity at {:.1}%", f.roe * 100.0));
        }
        if f.debt_to_equity > 0.0 && f.debt_to_equity < 0.3 {
            out.push("Conservative debt levels".to_string());
        }
        if f.revenue_growth > 0.1 {
            out.push(format!(
                "Strong revenue growth at {:.1}%",
                f.revenue_growth * 100.0
            ));
        }
    }
    if out.is_empty() {
        out.push("Detailed analysis requires additional data".to_string());
    }
    out
}

fn concerns(
    income: Option<&IncomeStatement>,
    financials: Option<&CompanyFinancials>,
    quote: Option<&StockQuote>,
) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(i) = income {
        if i.net_income_ratio < 0.0 {
            out.push("Company is currently unprofitable".to_string());
        } else if i.net_income_ratio < 0.05 {
            out.push("Low profit margins".to_string());
        }
    }
    if let Some(f) = financials {
        if f.debt_to_equity > 1.0 {
            out.push("High debt levels relative to equity".to_string());
        }
        if f.roe > 0.0 && f.roe < 0.05 {
            out.push("Low return on equity".to_string());
        }
    }
    let pe = financials
        .map(|f| f.pe_ratio)
        .filter(|pe| *pe > 0.0)
        .or(quote.map(|q| q.pe_ratio).filter(|pe| *pe > 0.0));
    if let Some(pe) = pe {
        if pe > 30.0 {
            out.push(format!(
                "High P/E ratio at {:.1} may indicate overvaluation",
                pe
            ));
        }
    }
    if out.is_empty() {
        out.push("No significant concerns identified".to_string());
    }
    out
}

/// Field-level fill ratio over the key fields of the report's records.
/// The denominator is fixed at the full field set, so a missing record
/// contributes its fields as unfilled rather than shrinking the base.
fn data_quality_score(
    quote: Option<&StockQuote>,
    income: Option<&IncomeStatement>,
    financials: Option<&CompanyFinancials>,
) -> f64 {
    let mut fields = [0.0f64; 11];
    if let Some(i) = income {
        fields[0] = i.revenue;
        fields[1] = i.net_income;
        fields[2] = i.eps;
        fields[3] = i.net_income_ratio;
    }
    if let Some(f) = financials {
        fields[4] = f.pe_ratio;
        fields[5] = f.market_cap;
        fields[6] = f.roe;
        fields[7] = f.debt_to_equity;
    }
    if let Some(q) = quote {
        fields[8] = q.price;
        fields[9] = q.change;
        fields[10] = q.volume as f64;
    }
    let filled = fields.iter().filter(|v| **v != 0.0).count();
    filled as f64 / fields.len() as f64
}

/// Share of report sections for which data actually arrived.
fn completeness_score(result: &AggregationResult) -> f64 {
    if result.is_empty() {
        return 0.0;
    }
    result.success_count() as f64 / result.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{sample_financials, sample_income, sample_quote, MockMarket};
    use crate::aggregator::Aggregator;
    use std::time::Duration;

    #[tokio::test]
    async fn report_marks_failed_sections() {
        let market = MockMarket::healthy("AAPL")
            .failing(Operation::IncomeStatement, MarketError::Transport("down".into()))
            .failing(Operation::CompanyFinancials, MarketError::Transport("down".into()));
        let result = Aggregator::fetch_all(
            &market,
            "AAPL",
            &Operation::REPORT_SET,
            Duration::from_secs(1),
        )
        .await;

        let payload = Composer::compose_report("AAPL", &result);
        assert_eq!(payload.text.matches("unavailable: transport").count(), 2);
        assert!(payload.text.contains("Stock Price & Market Data"));
        assert!(payload.text.contains("Price: $"));
    }

    #[test]
    fn insights_skip_missing_inputs() {
        // No income record: no revenue or margin insight may appear.
        let quote = sample_quote("AAPL");
        let insights = key_insights(Some(&quote), None, None);
        assert!(insights.iter().all(|i| !i.starts_with("Revenue")));
        assert!(insights.iter().all(|i| !i.starts_with("Net margin")));
        assert!(insights.iter().any(|i| i.contains("today")));
    }

    #[test]
    fn insights_use_all_sections_when_present() {
        let quote = sample_quote("AAPL");
        let income = sample_income("AAPL");
        let financials = sample_financials("AAPL");
        let insights = key_insights(Some(&quote), Some(&income), Some(&financials));
        assert!(insights.iter().any(|i| i.starts_with("Revenue")));
        assert!(insights.iter().any(|i| i.starts_with("P/E ratio")));
    }

    #[test]
    fn single_failure_is_user_facing_text() {
        let outcome = Err(MarketError::NotFound("no rows".into()));
        let payload = Composer::compose_single("ZZZZ", RequestCategory::StockPrice, &outcome);
        assert!(payload.text.contains("ZZZZ"));
        assert!(payload.text.contains("no data is available"));
        assert!(!payload.text.contains("no rows"));
        assert!(payload.attachment.is_none());
    }

    #[tokio::test]
    async fn report_emits_quality_and_completeness_scores() {
        let market = MockMarket::healthy("AAPL");
        let result = Aggregator::fetch_all(
            &market,
            "AAPL",
            &Operation::REPORT_SET,
            Duration::from_secs(1),
        )
        .await;

        let payload = Composer::compose_report("AAPL", &result);
        assert!(payload.text.contains("**Data Quality Score**: 100%"));
        assert!(payload.text.contains("**Data Completeness**: 100%"));
    }

    #[test]
    fn quality_score_counts_filled_fields() {
        let quote = sample_quote("AAPL");
        let income = sample_income("AAPL");
        let financials = sample_financials("AAPL");

        let full = data_quality_score(Some(&quote), Some(&income), Some(&financials));
        assert_eq!(full, 1.0);

        assert_eq!(data_quality_score(None, None, None), 0.0);

        // A missing income record leaves exactly its four fields unfilled.
        let partial = data_quality_score(Some(&quote), None, Some(&financials));
        assert!((partial - 7.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn money_formatting_buckets() {
        assert_eq!(format_money(2_500_000_000_000.0), "$2.50T");
        assert_eq!(format_money(85_300_000_000.0), "$85.30B");
        assert_eq!(format_money(12_000_000.0), "$12.00M");
        assert_eq!(format_money(-5_000_000_000.0), "-$5.00B");
    }
}
