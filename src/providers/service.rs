//! The fetch-layer facade handed to the rest of the application.

use crate::core::cache::{
    Clock, DEFAULT_HOLDINGS_CACHE_DURATION, HistoryCache, HoldingsCache, SystemClock,
};
use crate::core::error::FetchError;
use crate::core::fund::{
    FundDataProvider, FundRealtimeRecord, FundSummary, HistoryPeriod, HoldingEntry, KlinePoint,
    NavPoint, StockQuote,
};
use crate::providers::eastmoney::{EastmoneyProvider, EastmoneyUrls};
use crate::providers::holdings_parser::{ExtractionSource, HoldingsParse, extract_holdings};
use crate::providers::tencent::{DEFAULT_TENCENT_URL, TencentProvider};
use crate::providers::util::is_stock_code;
use crate::store::KeyValueStore;
use crate::transport::{GlobalScope, LoaderOptions, ScriptLoader, SerialQueue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

pub const HOLDINGS_COLLECTION: &str = "holdings";
pub const DEFAULT_HISTORY_LIFETIME: Duration = Duration::from_secs(300);
pub const MAX_HOLDINGS: usize = 10;

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub eastmoney: EastmoneyUrls,
    pub tencent_url: String,
    pub loader: LoaderOptions,
    pub holdings_cache_duration: Duration,
    pub history_lifetime: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            eastmoney: EastmoneyUrls::default(),
            tencent_url: DEFAULT_TENCENT_URL.to_string(),
            loader: LoaderOptions::default(),
            holdings_cache_duration: DEFAULT_HOLDINGS_CACHE_DURATION,
            history_lifetime: DEFAULT_HISTORY_LIFETIME,
        }
    }
}

/// How a holdings request was answered.
#[derive(Debug, Clone, PartialEq)]
pub enum HoldingsOutcome {
    Cached(Vec<HoldingEntry>),
    Parsed {
        source: ExtractionSource,
        holdings: Vec<HoldingEntry>,
    },
    /// The archive loaded but no holdings could be read from it. Either the
    /// fund discloses none or the page layout changed.
    Ambiguous,
    Unavailable(FetchError),
}

impl HoldingsOutcome {
    pub fn holdings(&self) -> &[HoldingEntry] {
        match self {
            HoldingsOutcome::Cached(holdings) | HoldingsOutcome::Parsed { holdings, .. } => {
                holdings
            }
            HoldingsOutcome::Ambiguous | HoldingsOutcome::Unavailable(_) => &[],
        }
    }

    pub fn into_holdings(self) -> Vec<HoldingEntry> {
        match self {
            HoldingsOutcome::Cached(holdings) | HoldingsOutcome::Parsed { holdings, .. } => {
                holdings
            }
            HoldingsOutcome::Ambiguous | HoldingsOutcome::Unavailable(_) => Vec::new(),
        }
    }
}

/// Owns the loader, the two serial queues and the caches.
///
/// The `realtime` queue guards the fixed live-estimate callback; the `scratch`
/// queue guards the globals shared by the holdings and history scripts.
pub struct FundService {
    loader: Arc<ScriptLoader>,
    eastmoney: EastmoneyProvider,
    tencent: TencentProvider,
    realtime_queue: SerialQueue,
    scratch_queue: SerialQueue,
    holdings_cache: HoldingsCache,
    fund_history: HistoryCache<NavPoint>,
    benchmark_history: HistoryCache<KlinePoint>,
}

impl FundService {
    pub fn new(options: ServiceOptions, store: &KeyValueStore) -> Result<Self, reqwest::Error> {
        Self::with_clock(options, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        options: ServiceOptions,
        store: &KeyValueStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        let loader = Arc::new(ScriptLoader::new(GlobalScope::new(), options.loader)?);
        Ok(Self {
            eastmoney: EastmoneyProvider::new(options.eastmoney, Arc::clone(&loader)),
            tencent: TencentProvider::new(&options.tencent_url, Arc::clone(&loader)),
            loader,
            realtime_queue: SerialQueue::new("realtime"),
            scratch_queue: SerialQueue::new("scratch"),
            holdings_cache: HoldingsCache::new(
                store.collection(HOLDINGS_COLLECTION, true),
                Arc::clone(&clock),
                options.holdings_cache_duration,
            ),
            fund_history: HistoryCache::new(Arc::clone(&clock), options.history_lifetime),
            benchmark_history: HistoryCache::new(clock, options.history_lifetime),
        })
    }

    pub fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    /// Live estimate with the quote endpoint as fallback. Only fails when no
    /// runtime is available; when both sources fail the record has no numbers.
    #[instrument(skip(self))]
    pub async fn fetch_fund_realtime(&self, code: &str) -> Result<FundRealtimeRecord, FetchError> {
        let result = self
            .realtime_queue
            .enqueue(|| async {
                match self.eastmoney.fetch_realtime(code).await {
                    Ok(record) => Ok(record),
                    Err(e @ FetchError::NoRuntimeEnvironment { .. }) => Err(e),
                    Err(e) => {
                        warn!(code, error = %e, "Live estimate failed, falling back to quote endpoint");
                        self.tencent.fetch_fund_fallback(code).await
                    }
                }
            })
            .await;

        match result {
            Ok(record) => Ok(record),
            Err(e @ FetchError::NoRuntimeEnvironment { .. }) => Err(e),
            Err(e) => {
                error!(code, error = %e, "No realtime data from any source");
                Ok(FundRealtimeRecord::unavailable(code))
            }
        }
    }

    /// Top holdings with live quotes, answered from the cache unless
    /// `force_refresh` is set. Only parsed holdings are cached.
    #[instrument(skip(self))]
    pub async fn fetch_fund_holdings_report(&self, code: &str, force_refresh: bool) -> HoldingsOutcome {
        if !force_refresh
            && let Some(cached) = self.holdings_cache.get(code)
        {
            debug!(code, "Using cached holdings");
            return HoldingsOutcome::Cached(cached);
        }

        let html = match self
            .scratch_queue
            .enqueue(|| self.eastmoney.fetch_holdings_html(code))
            .await
        {
            Ok(html) => html,
            Err(e) => {
                error!(code, error = %e, "Failed to fetch holdings");
                return HoldingsOutcome::Unavailable(e);
            }
        };

        let (source, mut holdings) = match extract_holdings(&html) {
            HoldingsParse::Parsed { source, holdings } => (source, holdings),
            HoldingsParse::Ambiguous => return HoldingsOutcome::Ambiguous,
        };
        holdings.truncate(MAX_HOLDINGS);

        let codes: Vec<String> = holdings.iter().map(|h| h.code.clone()).collect();
        let quotes = self.fetch_batch_stock_quotes(&codes).await;
        let holdings: Vec<HoldingEntry> = holdings
            .into_iter()
            .map(|holding| {
                let quote = quotes.get(&holding.code);
                holding.with_quote(quote)
            })
            .collect();

        self.holdings_cache.put(code, &holdings);
        HoldingsOutcome::Parsed { source, holdings }
    }

    pub async fn fetch_fund_holdings(&self, code: &str, force_refresh: bool) -> Vec<HoldingEntry> {
        self.fetch_fund_holdings_report(code, force_refresh)
            .await
            .into_holdings()
    }

    pub async fn fetch_stock_quote(&self, code: &str) -> Option<StockQuote> {
        let code = code.trim().to_string();
        self.fetch_batch_stock_quotes(std::slice::from_ref(&code))
            .await
            .remove(&code)
    }

    /// Quotes for the distinct valid six-digit codes among `codes`.
    pub async fn fetch_batch_stock_quotes(&self, codes: &[String]) -> HashMap<String, StockQuote> {
        let mut unique: Vec<String> = Vec::new();
        for code in codes.iter().map(|c| c.trim()) {
            if is_stock_code(code) && !unique.iter().any(|u| u == code) {
                unique.push(code.to_string());
            }
        }
        if unique.is_empty() {
            return HashMap::new();
        }
        self.tencent.fetch_simple_quotes(&unique).await
    }

    pub async fn search_funds(&self, keyword: &str) -> Result<Vec<FundSummary>, FetchError> {
        self.eastmoney.search_funds(keyword).await
    }

    /// NAV history for `period`. Fails when nothing could be resolved.
    #[instrument(skip(self))]
    pub async fn fetch_fund_history(
        &self,
        code: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<NavPoint>, FetchError> {
        let code = code.trim();
        if let Some(points) = self.fund_history.get(code, period) {
            return Ok(points);
        }

        let points = self
            .scratch_queue
            .enqueue(|| self.eastmoney.fetch_fund_history(code, period.sample_count()))
            .await?;
        if !points.is_empty() {
            self.fund_history.put(code, period, points.clone());
        }
        Ok(points)
    }

    #[instrument(skip(self))]
    pub async fn fetch_benchmark_history(
        &self,
        index_code: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<KlinePoint>, FetchError> {
        let index_code = index_code.trim();
        if let Some(points) = self.benchmark_history.get(index_code, period) {
            return Ok(points);
        }

        let points = self
            .eastmoney
            .fetch_benchmark_history(index_code, period.sample_count())
            .await?;
        self.benchmark_history
            .put(index_code, period, points.clone());
        Ok(points)
    }

    /// Clears one fund's cached holdings, or all of them.
    pub fn clear_holdings_cache(&self, code: Option<&str>) {
        self.holdings_cache.clear(code);
    }

    pub fn clear_history_caches(&self) {
        self.fund_history.clear();
        self.benchmark_history.clear();
    }
}

#[async_trait]
impl FundDataProvider for FundService {
    async fn fetch_fund_realtime(&self, code: &str) -> Result<FundRealtimeRecord, FetchError> {
        FundService::fetch_fund_realtime(self, code).await
    }

    async fn fetch_fund_holdings(&self, code: &str, force_refresh: bool) -> Vec<HoldingEntry> {
        FundService::fetch_fund_holdings(self, code, force_refresh).await
    }

    async fn fetch_batch_stock_quotes(&self, codes: &[String]) -> HashMap<String, StockQuote> {
        FundService::fetch_batch_stock_quotes(self, codes).await
    }

    async fn fetch_fund_history(
        &self,
        code: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<NavPoint>, FetchError> {
        FundService::fetch_fund_history(self, code, period).await
    }

    async fn fetch_benchmark_history(
        &self,
        index_code: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<KlinePoint>, FetchError> {
        FundService::fetch_benchmark_history(self, index_code, period).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::ManualClock;
    use tokio::time::Instant;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOLDINGS_SCRIPT: &str = r#"var apidata={ content:"<table><tbody><tr><td>1</td><td>600519</td><td>贵州茅台</td><td>9.87%</td></tr><tr><td>2</td><td>000858</td><td>五粮液</td><td>7.50%</td></tr></tbody></table>",arryear:[2024],curyear:2024};"#;
    const QUOTES_SCRIPT: &str = concat!(
        "v_s_sh600519=\"1~贵州茅台~600519~1700.00~-5.00~-0.29~1~2~~3~GP-A\";",
        "v_s_sz000858=\"51~五粮液~000858~150.20~1.20~0.81~1~2~~3~GP-A\";"
    );

    fn service(base_url: &str) -> FundService {
        service_with_clock(base_url, Arc::new(ManualClock::new(0)))
    }

    fn service_with_clock(base_url: &str, clock: Arc<dyn Clock>) -> FundService {
        let options = ServiceOptions {
            eastmoney: EastmoneyUrls::with_base(base_url),
            tencent_url: base_url.to_string(),
            loader: LoaderOptions {
                timeout: Duration::from_millis(300),
                ..LoaderOptions::default()
            },
            ..ServiceOptions::default()
        };
        FundService::with_clock(options, &KeyValueStore::in_memory(), clock).unwrap()
    }

    async fn mount_holdings(server: &MockServer, expected_archive_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/FundArchivesDatas.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOLDINGS_SCRIPT))
            .expect(expected_archive_calls)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/q=s_"))
            .respond_with(ResponseTemplate::new(200).set_body_string(QUOTES_SCRIPT))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_realtime_primary() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/000001.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"jsonpgz({"fundcode":"000001","name":"华夏成长混合","jzrq":"2024-01-04","dwjz":"1.0120","gsz":"1.0155","gszzl":"0.35","gztime":"2024-01-05 15:00"});"#,
            ))
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        let record = service.fetch_fund_realtime("000001").await.unwrap();
        assert_eq!(record.name, "华夏成长混合");
        assert_eq!(record.change_percent, Some(0.35));
        assert!(!record.no_valuation);
    }

    #[tokio::test]
    async fn test_realtime_falls_back_on_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/000001.js"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/q=jj000001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"v_jj000001="1~FundX~000001~~~1.234~~-0.12%~2024-01-04 00:00:00";"#,
            ))
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        let record = service.fetch_fund_realtime("000001").await.unwrap();
        assert_eq!(record.name, "FundX");
        assert!(record.no_valuation);
        assert_eq!(record.change_percent, Some(-0.12));
        assert_eq!(record.net_value_date, chrono::NaiveDate::from_ymd_opt(2024, 1, 4));
    }

    #[tokio::test]
    async fn test_realtime_all_sources_failed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        let record = service.fetch_fund_realtime("000001").await.unwrap();
        assert!(record.is_unavailable());
        assert_eq!(record, FundRealtimeRecord::unavailable("000001"));
    }

    #[tokio::test]
    async fn test_realtime_calls_are_serialized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/js/\d{6}\.js$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"jsonpgz({"fundcode":"000001","gsz":"1.0"});"#)
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        let started = Instant::now();
        let (a, b) = tokio::join!(
            service.fetch_fund_realtime("000001"),
            service.fetch_fund_realtime("000002")
        );
        assert!(!a.unwrap().no_valuation);
        assert!(!b.unwrap().no_valuation);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_holdings_are_enriched_and_cached() {
        let mock_server = MockServer::start().await;
        mount_holdings(&mock_server, 1).await;

        let service = service(&mock_server.uri());
        let outcome = service.fetch_fund_holdings_report("000001", false).await;
        let HoldingsOutcome::Parsed { source, holdings } = outcome else {
            panic!("expected parsed holdings");
        };
        assert_eq!(source, ExtractionSource::Dom);
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].price, Some(1700.0));
        assert_eq!(holdings[0].change, Some(-0.29));
        assert_eq!(holdings[1].price, Some(150.2));

        let cached = service.fetch_fund_holdings_report("000001", false).await;
        assert_eq!(cached, HoldingsOutcome::Cached(holdings));
    }

    #[tokio::test]
    async fn test_force_refresh_and_clear_bypass_cache() {
        let mock_server = MockServer::start().await;
        mount_holdings(&mock_server, 3).await;

        let service = service(&mock_server.uri());
        assert_eq!(service.fetch_fund_holdings("000001", false).await.len(), 2);
        assert_eq!(service.fetch_fund_holdings("000001", true).await.len(), 2);
        service.clear_holdings_cache(Some("000001"));
        assert!(matches!(
            service.fetch_fund_holdings_report("000001", false).await,
            HoldingsOutcome::Parsed { .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_holdings_are_refetched() {
        let mock_server = MockServer::start().await;
        mount_holdings(&mock_server, 2).await;

        let clock = Arc::new(ManualClock::new(0));
        let service = service_with_clock(&mock_server.uri(), clock.clone());
        service.fetch_fund_holdings("000001", false).await;
        clock.advance(DEFAULT_HOLDINGS_CACHE_DURATION + Duration::from_millis(1));
        assert!(matches!(
            service.fetch_fund_holdings_report("000001", false).await,
            HoldingsOutcome::Parsed { .. }
        ));
    }

    #[tokio::test]
    async fn test_ambiguous_holdings_are_not_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/FundArchivesDatas.aspx"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"var apidata={ content:"<div>暂无数据</div>",curyear:2024};"#),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        assert_eq!(
            service.fetch_fund_holdings_report("000001", false).await,
            HoldingsOutcome::Ambiguous
        );
        assert!(service.fetch_fund_holdings("000001", false).await.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_holdings() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        let outcome = service.fetch_fund_holdings_report("000001", false).await;
        assert!(matches!(outcome, HoldingsOutcome::Unavailable(_)));
        assert!(outcome.holdings().is_empty());
    }

    #[tokio::test]
    async fn test_batch_quotes_dedup_and_validate() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/q=s_sh600519&t=\d+$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(QUOTES_SCRIPT))
            .expect(1)
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        let codes = ["600519", " 600519 ", "60051", "abcdef"].map(String::from);
        let quotes = service.fetch_batch_stock_quotes(&codes).await;
        assert_eq!(quotes.len(), 1);
        assert!(service.fetch_batch_stock_quotes(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_quotes_skip_full_width_codes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(QUOTES_SCRIPT))
            .expect(0)
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        let quotes = service
            .fetch_batch_stock_quotes(&["６００５１９".to_string()])
            .await;
        assert!(quotes.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_memoized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pingzhongdata/000001.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"var fS_code = "000001";var Data_netWorthTrend = [{"x":1704124800000,"y":1.1,"equityReturn":0.1}];var Data_ACWorthTrend = [[1704124800000,2.1]];"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        let first = service
            .fetch_fund_history("000001", HistoryPeriod::OneMonth)
            .await
            .unwrap();
        let second = service
            .fetch_fund_history("000001", HistoryPeriod::OneMonth)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].accumulated_value, Some(2.1));
    }

    #[tokio::test]
    async fn test_benchmark_failures_are_not_memoized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/qt/stock/kline/get"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&mock_server)
            .await;

        let service = service(&mock_server.uri());
        for _ in 0..2 {
            let err = service
                .fetch_benchmark_history("000300", HistoryPeriod::OneMonth)
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::LoadError { .. }));
        }
    }
}
