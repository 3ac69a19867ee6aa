use fundpulse::core::comparison::load_comparison;
use fundpulse::core::config::AppConfig;
use fundpulse::core::fund::HistoryPeriod;
use fundpulse::providers::{FundService, HoldingsOutcome};
use fundpulse::store::KeyValueStore;
use std::fs;
use std::time::Duration;
use tracing::info;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

mod test_utils {
    use super::*;

    /// Responds with `{cb}(body)`, echoing the callback name of the request.
    pub fn jsonp_response(param: &'static str, body: &'static str) -> impl Fn(&Request) -> ResponseTemplate {
        move |request: &Request| {
            let callback = request
                .url
                .query_pairs()
                .find(|(k, _)| k == param)
                .map(|(_, v)| v.to_string())
                .unwrap_or_default();
            ResponseTemplate::new(200).set_body_string(format!("{callback}({body})"))
        }
    }

    pub async fn mount_script(server: &MockServer, url_path: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    pub fn write_config(server: &MockServer, data_dir: &std::path::Path, funds: &str) -> tempfile::NamedTempFile {
        let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        let uri = server.uri();
        let config_content = format!(
            r#"
funds:
{funds}
benchmark: "000300"
providers:
  eastmoney:
    realtime_url: "{uri}"
    fund_url: "{uri}"
    archive_url: "{uri}"
    search_url: "{uri}"
    kline_url: "{uri}"
  tencent:
    base_url: "{uri}"
requests:
  timeout_ms: 1000
  min_interval_ms: 0
data_path: "{}"
"#,
            data_dir.display()
        );
        fs::write(config_file.path(), config_content).expect("Failed to write config file");
        config_file
    }

    pub fn service_for(config_file: &tempfile::NamedTempFile) -> FundService {
        let config = AppConfig::load_from_path(config_file.path()).expect("Failed to load config");
        FundService::new(config.service_options(), &KeyValueStore::in_memory())
            .expect("Failed to build service")
    }
}

const REALTIME_SCRIPT: &str = r#"jsonpgz({"fundcode":"161725","name":"招商中证白酒指数","jzrq":"2024-01-04","dwjz":"1.0000","gsz":"1.1000","gszzl":"2.00","gztime":"2024-01-05 14:30"});"#;
const HOLDINGS_SCRIPT: &str = r#"var apidata={ content:"<table><tbody><tr><td>1</td><td>600519</td><td>贵州茅台</td><td>15.20%</td></tr><tr><td>2</td><td>000858</td><td>五粮液</td><td>14.10%</td></tr></tbody></table>",arryear:[2024],curyear:2024};"#;
const QUOTES_SCRIPT: &str = concat!(
    "v_s_sh600519=\"1~贵州茅台~600519~1700.00~-5.00~-0.29~1~2~~3~GP-A\";",
    "v_s_sz000858=\"51~五粮液~000858~150.20~1.20~0.81~1~2~~3~GP-A\";"
);
// 2024-01-02 and 2024-01-03, midnight UTC.
const HISTORY_SCRIPT: &str = r#"var fS_code = "161725";
var Data_netWorthTrend = [{"x":1704153600000,"y":1.1,"equityReturn":1.0},{"x":1704240000000,"y":1.2,"equityReturn":0.9}];
var Data_ACWorthTrend = [[1704153600000,2.1],[1704240000000,2.2]];"#;
const KLINE_BODY: &str = r#"{"data":{"code":"000300","klines":["2024-01-02,3400,3400,3410,3390,1000","2024-01-03,3400,3570,3580,3390,1200"]}}"#;

#[test_log::test(tokio::test)]
async fn test_realtime_falls_back_after_primary_timeout() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/js/000001.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"jsonpgz({"fundcode":"000001"});"#)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/q=jj000001"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"v_jj000001="1~FundX~000001~~~1.234~~+0.05%~20240101";"#),
        )
        .mount(&mock_server)
        .await;

    let data_dir = tempfile::TempDir::new().unwrap();
    let config_file = test_utils::write_config(&mock_server, data_dir.path(), "  []");
    let service = test_utils::service_for(&config_file);

    let record = service.fetch_fund_realtime("000001").await.unwrap();
    info!(?record, "Fallback record");
    assert_eq!(record.name, "FundX");
    assert!(record.no_valuation);
    assert_eq!(record.change_percent, Some(0.05));
    assert_eq!(record.unit_net_value, Some(1.234));
    assert_eq!(record.estimated_net_value, Some(1.234));
    assert_eq!(
        record.net_value_date,
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
    );
    assert_eq!(service.loader().in_flight(), 0);
}

#[test_log::test(tokio::test)]
async fn test_summary_flow_with_mock() {
    let mock_server = MockServer::start().await;
    test_utils::mount_script(&mock_server, "/js/161725.js", REALTIME_SCRIPT).await;
    test_utils::mount_script(&mock_server, "/FundArchivesDatas.aspx", HOLDINGS_SCRIPT).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/q=s_"))
        .respond_with(ResponseTemplate::new(200).set_body_string(QUOTES_SCRIPT))
        .mount(&mock_server)
        .await;

    let data_dir = tempfile::TempDir::new().unwrap();
    let config_file = test_utils::write_config(
        &mock_server,
        data_dir.path(),
        r#"  - code: "161725"
    amount: 10000
    cost_price: 1.0
    show_holdings: true
  - code: "000001"
    amount: 500
    existing_profit: 20"#,
    );

    let result = fundpulse::run_command(
        fundpulse::AppCommand::Summary,
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(
        result.is_ok(),
        "Summary failed with: {:?}",
        result.err()
    );

    let result = fundpulse::run_command(
        fundpulse::AppCommand::Alloc,
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Alloc failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_holdings_are_cached_between_requests() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/FundArchivesDatas.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(HOLDINGS_SCRIPT))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/q=s_"))
        .respond_with(ResponseTemplate::new(200).set_body_string(QUOTES_SCRIPT))
        .mount(&mock_server)
        .await;

    let data_dir = tempfile::TempDir::new().unwrap();
    let config_file = test_utils::write_config(&mock_server, data_dir.path(), "  []");
    let service = test_utils::service_for(&config_file);

    let first = service.fetch_fund_holdings_report("161725", false).await;
    let HoldingsOutcome::Parsed { holdings, .. } = &first else {
        panic!("expected parsed holdings");
    };
    assert_eq!(holdings.len(), 2);
    assert_eq!(holdings[0].price, Some(1700.0));
    assert_eq!(holdings[1].change, Some(0.81));

    let second = service.fetch_fund_holdings_report("161725", false).await;
    assert!(matches!(second, HoldingsOutcome::Cached(_)));
    assert_eq!(second.holdings(), first.holdings());
}

#[test_log::test(tokio::test)]
async fn test_compare_flow_with_mock() {
    let mock_server = MockServer::start().await;
    test_utils::mount_script(&mock_server, "/pingzhongdata/161725.js", HISTORY_SCRIPT).await;
    Mock::given(method("GET"))
        .and(path("/api/qt/stock/kline/get"))
        .respond_with(test_utils::jsonp_response("cb", KLINE_BODY))
        .mount(&mock_server)
        .await;

    let data_dir = tempfile::TempDir::new().unwrap();
    let funds = r#"  - code: "161725"
    amount: 1000
    cost_price: 1.0"#;
    let config_file = test_utils::write_config(&mock_server, data_dir.path(), funds);

    let config = AppConfig::load_from_path(config_file.path()).unwrap();
    let service = test_utils::service_for(&config_file);
    let points = load_comparison(&service, &config.funds, "000300", HistoryPeriod::OneMonth)
        .await
        .unwrap();
    assert_eq!(points.len(), 2);
    assert!((points[0].portfolio_return.unwrap() - 10.0).abs() < 1e-9);
    assert!((points[1].portfolio_return.unwrap() - 20.0).abs() < 1e-9);
    assert!((points[1].benchmark_return.unwrap() - 5.0).abs() < 1e-9);

    let result = fundpulse::run_command(
        fundpulse::AppCommand::Compare {
            period: HistoryPeriod::OneMonth,
            benchmark: None,
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Compare failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_search_and_clear_cache_commands() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/FundSearch/api/FundSearchAPI.ashx"))
        .respond_with(test_utils::jsonp_response(
            "callback",
            r#"{"Datas":[{"CODE":"161725","NAME":"招商中证白酒指数","CATEGORY":700,"FundBaseInfo":{"FTYPE":"指数型-股票","DWJZ":"1.0","FSRQ":"2024-01-04"}},{"CODE":"600519","NAME":"贵州茅台","CATEGORY":1}]}"#,
        ))
        .mount(&mock_server)
        .await;

    let data_dir = tempfile::TempDir::new().unwrap();
    let config_file = test_utils::write_config(&mock_server, data_dir.path(), "  []");
    let config_path = config_file.path().to_str().unwrap();

    let service = test_utils::service_for(&config_file);
    let funds = service.search_funds("白酒").await.unwrap();
    assert_eq!(funds.len(), 1);
    assert_eq!(funds[0].fund_type.as_deref(), Some("指数型-股票"));

    let result = fundpulse::run_command(
        fundpulse::AppCommand::Search {
            keyword: "白酒".to_string(),
        },
        Some(config_path),
    )
    .await;
    assert!(result.is_ok(), "Search failed with: {:?}", result.err());

    let result =
        fundpulse::run_command(fundpulse::AppCommand::ClearCache { code: None }, Some(config_path))
            .await;
    assert!(result.is_ok(), "Clear cache failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_unsupported_benchmark_fails_command() {
    let mock_server = MockServer::start().await;
    let data_dir = tempfile::TempDir::new().unwrap();
    let config_file = test_utils::write_config(&mock_server, data_dir.path(), "  []");

    let result = fundpulse::run_command(
        fundpulse::AppCommand::Benchmark {
            index: "123456".to_string(),
            period: HistoryPeriod::OneMonth,
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("Unsupported benchmark code: 123456"));
}
