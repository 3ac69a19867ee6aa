//! Eastmoney endpoints: live estimates, holdings archive, NAV history, fund
//! search and index K-lines.

use crate::core::error::FetchError;
use crate::core::fund::{FundRealtimeRecord, FundSummary, KlinePoint, NavPoint, default_fund_name};
use crate::providers::util::{
    cache_buster, china_date_from_millis, is_stock_code, json_number, json_text, json_timestamp,
    parse_date, to_number_or_null, unique_callback_name,
};
use crate::transport::ScriptLoader;
use crate::transport::scope::{GlobalScope, decode_json, decode_string, object_string_field};
use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DEFAULT_REALTIME_URL: &str = "https://fundgz.1234567.com.cn";
pub const DEFAULT_FUND_URL: &str = "https://fund.eastmoney.com";
pub const DEFAULT_ARCHIVE_URL: &str = "https://fundf10.eastmoney.com";
pub const DEFAULT_SEARCH_URL: &str = "https://fundsuggest.eastmoney.com";
pub const DEFAULT_KLINE_URL: &str = "https://push2his.eastmoney.com";

/// Fixed callback name used by the live estimate endpoint.
pub const REALTIME_CALLBACK: &str = "jsonpgz";
/// Globals written by the holdings archive and NAV history scripts.
pub const HOLDINGS_VAR: &str = "apidata";
pub const NET_WORTH_TREND_VAR: &str = "Data_netWorthTrend";
pub const AC_WORTH_TREND_VAR: &str = "Data_ACWorthTrend";
pub const FUND_CODE_VAR: &str = "fS_code";
pub const SCRATCH_VARS: [&str; 4] = [
    HOLDINGS_VAR,
    NET_WORTH_TREND_VAR,
    AC_WORTH_TREND_VAR,
    FUND_CODE_VAR,
];

lazy_static! {
    static ref SECID_REGEX: Regex = Regex::new(r"^[01]\.[0-9]{6}$").expect("Invalid regex pattern");
    static ref BENCHMARK_SECIDS: HashMap<&'static str, &'static str> = HashMap::from([
        ("000016", "1.000016"),
        ("000300", "1.000300"),
        ("000905", "1.000905"),
        ("000852", "1.000852"),
        ("399006", "0.399006"),
    ]);
}

/// Base URLs of the Eastmoney hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EastmoneyUrls {
    pub realtime_url: String,
    pub fund_url: String,
    pub archive_url: String,
    pub search_url: String,
    pub kline_url: String,
}

impl Default for EastmoneyUrls {
    fn default() -> Self {
        Self {
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            fund_url: DEFAULT_FUND_URL.to_string(),
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            kline_url: DEFAULT_KLINE_URL.to_string(),
        }
    }
}

impl EastmoneyUrls {
    /// Points every endpoint at one host.
    pub fn with_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            realtime_url: base.clone(),
            fund_url: base.clone(),
            archive_url: base.clone(),
            search_url: base.clone(),
            kline_url: base,
        }
    }
}

/// Resolves an index code to its market-qualified security id.
pub fn benchmark_secid(index_code: &str) -> Result<String, FetchError> {
    let index_code = index_code.trim();
    let secid = BENCHMARK_SECIDS
        .get(index_code)
        .copied()
        .unwrap_or(index_code);
    if SECID_REGEX.is_match(secid) {
        Ok(secid.to_string())
    } else {
        Err(FetchError::UnsupportedBenchmark(index_code.to_string()))
    }
}

/// Maps the live estimate payload
/// (`{"fundcode","name","jzrq","dwjz","gsz","gszzl","gztime"}`).
pub fn parse_realtime_payload(code: &str, payload: &Value) -> Option<FundRealtimeRecord> {
    let object = payload.as_object()?;
    let field = |key: &str| object.get(key).unwrap_or(&Value::Null);

    Some(FundRealtimeRecord {
        code: json_text(field("fundcode")).unwrap_or_else(|| code.to_string()),
        name: json_text(field("name")).unwrap_or_else(|| default_fund_name(code)),
        estimated_net_value: json_number(field("gsz")),
        unit_net_value: json_number(field("dwjz")),
        estimate_time: json_text(field("gztime"))
            .and_then(|t| NaiveDateTime::parse_from_str(&t, "%Y-%m-%d %H:%M").ok()),
        net_value_date: json_text(field("jzrq")).and_then(|d| parse_date(&d)),
        change_percent: json_number(field("gszzl")),
        no_valuation: false,
        holdings: Vec::new(),
    })
}

/// Joins the NAV and accumulated NAV trends written by the history script.
///
/// The series is discarded when the script reports a different fund code.
/// Points are ordered by their China Standard Time date, one per date, and
/// only the last `limit` are kept.
pub fn parse_fund_history(scope: &GlobalScope, fund_code: &str, limit: usize) -> Vec<NavPoint> {
    let resolved_code = scope
        .var(FUND_CODE_VAR)
        .and_then(|raw| decode_string(&raw))
        .unwrap_or_default();
    if !resolved_code.trim().is_empty() && resolved_code.trim() != fund_code {
        warn!(fund_code, resolved_code, "History payload belongs to another fund");
        return Vec::new();
    }

    let array_var = |name: &str| -> Vec<Value> {
        scope
            .var(name)
            .and_then(|raw| decode_json(&raw))
            .and_then(|value| match value {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default()
    };

    let accumulated: HashMap<i64, f64> = array_var(AC_WORTH_TREND_VAR)
        .iter()
        .filter_map(|item| {
            let pair = item.as_array().filter(|pair| pair.len() >= 2)?;
            Some((json_timestamp(&pair[0])?, json_number(&pair[1])?))
        })
        .collect();

    let mut points: Vec<NavPoint> = array_var(NET_WORTH_TREND_VAR)
        .iter()
        .filter_map(|item| {
            let timestamp = json_timestamp(item.get("x")?)?;
            let net_value = json_number(item.get("y")?).filter(|v| *v > 0.0)?;
            Some(NavPoint {
                date: china_date_from_millis(timestamp)?,
                net_value,
                accumulated_value: accumulated.get(&timestamp).copied(),
                daily_growth_percent: item.get("equityReturn").and_then(json_number),
            })
        })
        .collect();

    points.sort_by_key(|point| point.date);
    points.dedup_by_key(|point| point.date);
    let skip = points.len().saturating_sub(limit);
    points.split_off(skip)
}

/// Parses the K-line payload (`{"data":{"klines":["2024-01-02,o,c,h,l,v,..."]}}`).
pub fn parse_kline_payload(payload: &Value, limit: usize) -> Vec<KlinePoint> {
    let lines = payload
        .pointer("/data/klines")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut points: Vec<KlinePoint> = lines
        .iter()
        .filter_map(|line| {
            let line = line.as_str()?;
            let parts: Vec<&str> = line.split(',').collect();
            let slot = |index: usize| parts.get(index).and_then(|p| to_number_or_null(p));
            Some(KlinePoint {
                date: parse_date(parts.first()?)?,
                open: slot(1),
                close: slot(2)?,
                high: slot(3),
                low: slot(4),
                volume: slot(5),
            })
        })
        .collect();

    points.sort_by_key(|point| point.date);
    points.dedup_by_key(|point| point.date);
    let skip = points.len().saturating_sub(limit);
    points.split_off(skip)
}

/// Keeps fund entries of the search payload (`{"Datas":[...]}`).
pub fn parse_search_payload(payload: &Value) -> Vec<FundSummary> {
    let rows = payload
        .get("Datas")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    rows.iter()
        .filter(|item| {
            let category = item.get("CATEGORY");
            category.and_then(Value::as_i64) == Some(700)
                || category.and_then(Value::as_str) == Some("700")
                || item.get("CATEGORYDESC").and_then(Value::as_str) == Some("基金")
        })
        .filter_map(|item| {
            let code = item.get("CODE").and_then(json_text)?;
            let base_info = item.get("FundBaseInfo").unwrap_or(&Value::Null);
            Some(FundSummary {
                name: item
                    .get("NAME")
                    .and_then(json_text)
                    .unwrap_or_else(|| default_fund_name(&code)),
                fund_type: base_info.get("FTYPE").and_then(json_text),
                net_value: base_info.get("DWJZ").and_then(json_number),
                net_value_date: base_info
                    .get("FSRQ")
                    .and_then(json_text)
                    .and_then(|d| parse_date(&d)),
                code,
            })
        })
        .collect()
}

/// Client for the Eastmoney script endpoints.
///
/// Methods that read [`SCRATCH_VARS`] or the [`REALTIME_CALLBACK`] share one
/// global name per kind; callers serialize them.
pub struct EastmoneyProvider {
    urls: EastmoneyUrls,
    loader: Arc<ScriptLoader>,
}

impl EastmoneyProvider {
    pub fn new(urls: EastmoneyUrls, loader: Arc<ScriptLoader>) -> Self {
        Self { urls, loader }
    }

    #[instrument(skip(self))]
    pub async fn fetch_realtime(&self, code: &str) -> Result<FundRealtimeRecord, FetchError> {
        let url = format!(
            "{}/js/{}.js?rt={}",
            self.urls.realtime_url.trim_end_matches('/'),
            code,
            cache_buster()
        );
        let args = self
            .loader
            .load_jsonp(&url, REALTIME_CALLBACK, self.loader.default_timeout())
            .await?;
        decode_json(&args)
            .and_then(|payload| parse_realtime_payload(code, &payload))
            .ok_or_else(|| FetchError::load_error(&url, "estimate payload is not an object"))
    }

    /// Loads the holdings archive and returns its HTML fragment (empty when the
    /// script carried none).
    #[instrument(skip(self))]
    pub async fn fetch_holdings_html(&self, code: &str) -> Result<String, FetchError> {
        let url = format!(
            "{}/FundArchivesDatas.aspx?type=jjcc&code={}&topline=10&year=&month=&_={}",
            self.urls.archive_url.trim_end_matches('/'),
            code,
            cache_buster()
        );
        let scope = self.loader.scope();
        scope.clear_vars(&[HOLDINGS_VAR]);
        let result = self.loader.load_script(&url).await;
        let html = scope
            .take_var(HOLDINGS_VAR)
            .and_then(|raw| object_string_field(&raw, "content"))
            .unwrap_or_default();
        result.map(|_| html)
    }

    /// NAV history of a fund, last `limit` points. An invalid code yields an
    /// empty series without a request.
    #[instrument(skip(self))]
    pub async fn fetch_fund_history(
        &self,
        code: &str,
        limit: usize,
    ) -> Result<Vec<NavPoint>, FetchError> {
        let code = code.trim();
        if !is_stock_code(code) {
            debug!(code, "Skipping history for invalid fund code");
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/pingzhongdata/{}.js?v={}",
            self.urls.fund_url.trim_end_matches('/'),
            code,
            cache_buster()
        );
        let scope = self.loader.scope();
        scope.clear_vars(&SCRATCH_VARS);
        let result = self
            .loader
            .load_script(&url)
            .await
            .map(|_| parse_fund_history(scope, code, limit));
        scope.clear_vars(&SCRATCH_VARS);

        let points = result?;
        if points.is_empty() {
            return Err(FetchError::NoHistory(code.to_string()));
        }
        Ok(points)
    }

    #[instrument(skip(self))]
    pub async fn search_funds(&self, keyword: &str) -> Result<Vec<FundSummary>, FetchError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }

        let callback = unique_callback_name("FundSuggest");
        let url = format!(
            "{}/FundSearch/api/FundSearchAPI.ashx?m=1&key={}&callback={}&_={}",
            self.urls.search_url.trim_end_matches('/'),
            urlencoding::encode(keyword),
            callback,
            cache_buster()
        );
        // A body that never calls back counts as a timeout, not a failure.
        let mut registration = self.loader.scope().register_callback(&callback);
        match self
            .loader
            .load_script_with_timeout(&url, self.loader.default_timeout())
            .await
        {
            Ok(()) => match registration.try_take() {
                Some(args) => Ok(decode_json(&args)
                    .map(|payload| parse_search_payload(&payload))
                    .unwrap_or_default()),
                None => {
                    warn!(keyword, callback = %callback, "Fund search script did not invoke its callback");
                    Ok(Vec::new())
                }
            },
            Err(e) if e.is_timeout() => {
                warn!(keyword, "Fund search timed out");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch_benchmark_history(
        &self,
        index_code: &str,
        limit: usize,
    ) -> Result<Vec<KlinePoint>, FetchError> {
        let secid = benchmark_secid(index_code)?;
        let sanitized: String = index_code.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        let callback = unique_callback_name(&format!("BenchmarkHistory_{sanitized}"));
        let url = format!(
            "{}/api/qt/stock/kline/get?secid={}&klt=101&fqt=1&lmt={}&end=20500000&iscca=1\
             &fields1=f1,f2,f3,f4,f5,f6&fields2=f51,f52,f53,f54,f55,f56,f57,f58&cb={}&_={}",
            self.urls.kline_url.trim_end_matches('/'),
            secid,
            limit,
            callback,
            cache_buster()
        );
        let args = self
            .loader
            .load_jsonp(&url, &callback, self.loader.default_timeout())
            .await?;
        let points = decode_json(&args)
            .map(|payload| parse_kline_payload(&payload, limit))
            .unwrap_or_default();
        if points.is_empty() {
            return Err(FetchError::NoHistory(index_code.to_string()));
        }
        Ok(points)
    }
}
