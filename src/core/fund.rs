//! Fund, quote and history records plus the provider abstraction

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use super::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
pub enum HistoryPeriod {
    OneDay,
    FiveDays,
    #[default]
    OneMonth,
    ThreeMonths,
    OneYear,
    ThreeYears,
}

impl Display for HistoryPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                HistoryPeriod::OneDay => "1d",
                HistoryPeriod::FiveDays => "5d",
                HistoryPeriod::OneMonth => "1m",
                HistoryPeriod::ThreeMonths => "3m",
                HistoryPeriod::OneYear => "1y",
                HistoryPeriod::ThreeYears => "3y",
            }
        )
    }
}

impl HistoryPeriod {
    /// Number of trading-day samples requested for the period.
    pub fn sample_count(&self) -> usize {
        match self {
            HistoryPeriod::OneDay => 20,
            HistoryPeriod::FiveDays => 20,
            HistoryPeriod::OneMonth => 40,
            HistoryPeriod::ThreeMonths => 120,
            HistoryPeriod::OneYear => 260,
            HistoryPeriod::ThreeYears => 780,
        }
    }
}

impl FromStr for HistoryPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1d" => Ok(HistoryPeriod::OneDay),
            "5d" => Ok(HistoryPeriod::FiveDays),
            "1m" => Ok(HistoryPeriod::OneMonth),
            "3m" => Ok(HistoryPeriod::ThreeMonths),
            "1y" => Ok(HistoryPeriod::OneYear),
            "3y" => Ok(HistoryPeriod::ThreeYears),
            _ => Err(anyhow::anyhow!("Invalid history period: {}", s)),
        }
    }
}

/// Top disclosed stock position of a fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingEntry {
    pub index: usize,
    pub code: String,
    pub name: String,
    /// Portfolio weight in percent.
    pub weight: Option<f64>,
    pub price: Option<f64>,
    /// Today's change of the stock in percent.
    pub change: Option<f64>,
}

impl HoldingEntry {
    /// Attaches a live quote, discarding prices that cannot be real.
    pub fn with_quote(mut self, quote: Option<&StockQuote>) -> Self {
        self.price = quote.and_then(|q| sanitize_stock_price(q.current, &self.code));
        self.change = quote.and_then(|q| q.percent);
        self
    }
}

/// A price is rejected when it is not positive or when it merely echoes the
/// numeric value of the stock code (seen with mis-parsed feeds).
pub fn sanitize_stock_price(price: Option<f64>, stock_code: &str) -> Option<f64> {
    let price = price.filter(|p| p.is_finite() && *p > 0.0)?;
    let is_code = stock_code.len() == 6
        && stock_code.bytes().all(|b| b.is_ascii_digit())
        && stock_code
            .parse::<f64>()
            .is_ok_and(|code| (price - code).abs() < 0.000001);
    if is_code { None } else { Some(price) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundRealtimeRecord {
    pub code: String,
    pub name: String,
    /// Intraday estimated NAV (`gsz`).
    pub estimated_net_value: Option<f64>,
    /// Last confirmed unit NAV (`dwjz`).
    pub unit_net_value: Option<f64>,
    pub estimate_time: Option<NaiveDateTime>,
    pub net_value_date: Option<NaiveDate>,
    /// Estimated change in percent (`gszzl`).
    pub change_percent: Option<f64>,
    /// Set when no live estimate was available and only fallback data is shown.
    pub no_valuation: bool,
    pub holdings: Vec<HoldingEntry>,
}

impl FundRealtimeRecord {
    /// Record returned when every source failed.
    pub fn unavailable(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: default_fund_name(code),
            estimated_net_value: None,
            unit_net_value: None,
            estimate_time: None,
            net_value_date: None,
            change_percent: None,
            no_valuation: true,
            holdings: Vec::new(),
        }
    }

    /// True when the record carries no numbers at all ("temporarily unavailable").
    pub fn is_unavailable(&self) -> bool {
        self.estimated_net_value.is_none()
            && self.unit_net_value.is_none()
            && self.change_percent.is_none()
    }
}

pub fn default_fund_name(code: &str) -> String {
    format!("基金({code})")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub code: String,
    pub name: Option<String>,
    pub current: Option<f64>,
    pub change: Option<f64>,
    pub percent: Option<f64>,
}

/// A fund returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundSummary {
    pub code: String,
    pub name: String,
    pub fund_type: Option<String>,
    pub net_value: Option<f64>,
    pub net_value_date: Option<NaiveDate>,
}

/// One point of a fund NAV series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub net_value: f64,
    pub accumulated_value: Option<f64>,
    pub daily_growth_percent: Option<f64>,
}

/// One daily bar of a benchmark index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlinePoint {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

#[async_trait]
pub trait FundDataProvider: Send + Sync {
    async fn fetch_fund_realtime(&self, code: &str) -> Result<FundRealtimeRecord, FetchError>;

    async fn fetch_fund_holdings(&self, code: &str, force_refresh: bool) -> Vec<HoldingEntry>;

    async fn fetch_batch_stock_quotes(&self, codes: &[String]) -> HashMap<String, StockQuote>;

    async fn fetch_fund_history(
        &self,
        code: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<NavPoint>, FetchError>;

    async fn fetch_benchmark_history(
        &self,
        index_code: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<KlinePoint>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_sample_counts() {
        let cases = [
            ("1d", 20),
            ("5d", 20),
            ("1m", 40),
            ("3m", 120),
            ("1y", 260),
            ("3y", 780),
        ];
        for (raw, expected) in cases {
            let period: HistoryPeriod = raw.parse().unwrap();
            assert_eq!(period.sample_count(), expected);
            assert_eq!(period.to_string(), raw);
        }
        assert!("2w".parse::<HistoryPeriod>().is_err());
        assert_eq!(HistoryPeriod::default(), HistoryPeriod::OneMonth);
    }

    #[test]
    fn test_sanitize_stock_price_rejects_code_echo() {
        assert_eq!(sanitize_stock_price(Some(600519.0), "600519"), None);
        assert_eq!(sanitize_stock_price(Some(0.0), "600519"), None);
        assert_eq!(sanitize_stock_price(Some(f64::NAN), "600519"), None);
        assert_eq!(sanitize_stock_price(Some(1700.5), "600519"), Some(1700.5));
        assert_eq!(sanitize_stock_price(None, "600519"), None);
    }

    #[test]
    fn test_holding_with_quote() {
        let entry = HoldingEntry {
            index: 1,
            code: "000858".to_string(),
            name: "五粮液".to_string(),
            weight: Some(8.5),
            price: None,
            change: None,
        };
        let quote = StockQuote {
            code: "000858".to_string(),
            name: Some("五粮液".to_string()),
            current: Some(150.2),
            change: Some(1.2),
            percent: Some(0.81),
        };
        let enriched = entry.clone().with_quote(Some(&quote));
        assert_eq!(enriched.price, Some(150.2));
        assert_eq!(enriched.change, Some(0.81));

        let bare = entry.with_quote(None);
        assert_eq!(bare.price, None);
        assert_eq!(bare.change, None);
    }

    #[test]
    fn test_unavailable_record() {
        let record = FundRealtimeRecord::unavailable("000001");
        assert!(record.no_valuation);
        assert!(record.is_unavailable());
        assert_eq!(record.name, "基金(000001)");
    }
}
