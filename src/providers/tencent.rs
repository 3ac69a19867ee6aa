//! Simple-quote endpoint: batch stock quotes and the realtime fallback.

use crate::core::error::FetchError;
use crate::core::fund::{FundRealtimeRecord, StockQuote, default_fund_name};
use crate::providers::util::{
    cache_buster, is_stock_code, parse_date, tencent_market_prefix, to_number_or_null,
};
use crate::transport::scope::decode_string;
use crate::transport::{GlobalScope, ScriptLoader};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DEFAULT_TENCENT_URL: &str = "https://qt.gtimg.cn";

/// Fields of one `~`-delimited simple quote.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleQuote {
    pub name: String,
    pub current: Option<f64>,
    pub change: Option<f64>,
    pub percent: Option<f64>,
}

/// Parses a simple quote such as `1~贵州茅台~600519~1700.00~-5.00~-0.29~...`.
///
/// Some payloads carry the stock code in slot 2, pushing the price to slot 3.
/// Slot 2 is taken as a code when it is literally six digits, or when it reads
/// as a number in [100000, 999999] and slot 3 is a positive number below 100000.
pub fn parse_tencent_simple_quote(raw: &str) -> Option<SimpleQuote> {
    let parts: Vec<&str> = raw.split('~').collect();
    if parts.len() < 5 {
        return None;
    }

    let slot2 = to_number_or_null(parts[2]);
    let slot3 = to_number_or_null(parts[3]);
    let has_embedded_code = is_stock_code(parts[2]);
    let looks_like_code_in_price_slot = slot2.is_some_and(|v| (100_000.0..=999_999.0).contains(&v))
        && slot3.is_some_and(|v| v > 0.0 && v < 100_000.0);

    let price_index = if has_embedded_code || looks_like_code_in_price_slot {
        3
    } else {
        2
    };
    let slot = |index: usize| parts.get(index).and_then(|p| to_number_or_null(p));

    Some(SimpleQuote {
        name: parts[1].to_string(),
        current: slot(price_index),
        change: slot(price_index + 1),
        percent: slot(price_index + 2),
    })
}

/// Builds the fallback realtime record from a `v_jj{code}` payload: name in
/// slot 1, last unit NAV in slot 5, change in slot 7 and NAV date in slot 8.
pub fn parse_fund_fallback(code: &str, raw: &str) -> FundRealtimeRecord {
    let parts: Vec<&str> = raw.split('~').collect();
    let slot = |index: usize| parts.get(index).copied().unwrap_or("");

    let name = match slot(1).trim() {
        "" => default_fund_name(code),
        name => name.to_string(),
    };
    let unit_net_value = to_number_or_null(slot(5));
    let net_value_date = parse_date(&slot(8).chars().take(10).collect::<String>());

    FundRealtimeRecord {
        code: code.to_string(),
        name,
        estimated_net_value: unit_net_value,
        unit_net_value,
        estimate_time: None,
        net_value_date,
        change_percent: to_number_or_null(slot(7)),
        no_valuation: true,
        holdings: Vec::new(),
    }
}

pub struct TencentProvider {
    base_url: String,
    loader: Arc<ScriptLoader>,
}

impl TencentProvider {
    pub fn new(base_url: &str, loader: Arc<ScriptLoader>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            loader,
        }
    }

    /// Fetches simple quotes for valid six-digit codes in one request.
    /// A failed request yields an empty map.
    #[instrument(skip(self, codes), fields(count = codes.len()))]
    pub async fn fetch_simple_quotes(&self, codes: &[String]) -> HashMap<String, StockQuote> {
        let pairs: Vec<(&str, String)> = codes
            .iter()
            .filter_map(|code| {
                let prefix = tencent_market_prefix(code)?;
                Some((code.as_str(), format!("s_{prefix}{code}")))
            })
            .collect();
        if pairs.is_empty() {
            return HashMap::new();
        }

        let query = pairs
            .iter()
            .map(|(_, query_code)| query_code.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/q={}&t={}", self.base_url, query, cache_buster());

        let scope = match self.loader.load_isolated(&url).await {
            Ok(scope) => scope,
            Err(e) => {
                warn!(error = %e, "Quote request failed");
                return HashMap::new();
            }
        };

        let mut quotes = HashMap::new();
        for (code, query_code) in &pairs {
            let parsed = scope
                .take_var(&format!("v_{query_code}"))
                .and_then(|raw| decode_string(&raw))
                .and_then(|raw| parse_tencent_simple_quote(&raw));
            match parsed {
                Some(quote) => {
                    quotes.insert(
                        code.to_string(),
                        StockQuote {
                            code: code.to_string(),
                            name: Some(quote.name).filter(|n| !n.is_empty()),
                            current: quote.current,
                            change: quote.change,
                            percent: quote.percent,
                        },
                    );
                }
                None => debug!(code, "No usable quote in payload"),
            }
        }
        quotes
    }

    /// Last known NAV from the quote endpoint, used when no live estimate is
    /// available. The record always has `no_valuation` set.
    #[instrument(skip(self))]
    pub async fn fetch_fund_fallback(&self, code: &str) -> Result<FundRealtimeRecord, FetchError> {
        let url = format!("{}/q=jj{}&t={}", self.base_url, code, cache_buster());
        let scope: GlobalScope = self.loader.load_isolated(&url).await?;
        let raw = scope
            .take_var(&format!("v_jj{code}"))
            .and_then(|raw| decode_string(&raw))
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| FetchError::load_error(&url, format!("no v_jj{code} payload")))?;
        Ok(parse_fund_fallback(code, &raw))
    }
}
