//! Portfolio versus benchmark return series.
use crate::core::config::FundPosition;
use crate::core::error::FetchError;
use crate::core::fund::{FundDataProvider, HistoryPeriod, KlinePoint, NavPoint};
use crate::providers::util::is_stock_code;
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Benchmarks offered for comparison, with their display names.
pub const BENCHMARK_OPTIONS: [(&str, &str); 5] = [
    ("000300", "沪深300"),
    ("000016", "上证50"),
    ("000905", "中证500"),
    ("000852", "中证1000"),
    ("399006", "创业板指"),
];

pub fn benchmark_label(code: &str) -> &str {
    BENCHMARK_OPTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(code, |(_, label)| *label)
}

/// A position that can take part in the comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparedFund {
    pub code: String,
    pub amount: f64,
    pub cost_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonPoint {
    pub date: NaiveDate,
    pub portfolio_return: Option<f64>,
    pub benchmark_return: Option<f64>,
}

impl ComparisonPoint {
    pub fn excess_return(&self) -> Option<f64> {
        Some(self.portfolio_return? - self.benchmark_return?)
    }
}

/// Keeps positions with a six-digit code, a positive amount and a positive
/// cost price. Later duplicates replace earlier ones; output is sorted by code.
pub fn compared_funds(positions: &[FundPosition]) -> Vec<ComparedFund> {
    let mut by_code: BTreeMap<String, ComparedFund> = BTreeMap::new();
    for position in positions {
        let code = position.code.trim();
        let Some(cost_price) = position.cost_price.filter(|c| c.is_finite() && *c > 0.0) else {
            continue;
        };
        if !is_stock_code(code) || !(position.amount.is_finite() && position.amount > 0.0) {
            continue;
        }
        by_code.insert(
            code.to_string(),
            ComparedFund {
                code: code.to_string(),
                amount: position.amount,
                cost_price,
            },
        );
    }
    by_code.into_values().collect()
}

/// Amount-weighted return of the funds in percent, one point per date seen in
/// any history. A fund's NAV/cost ratio is carried forward between its own
/// dates and starts at 1; a fund without history counts at its amount.
pub fn portfolio_return_series(
    funds: &[ComparedFund],
    histories: &HashMap<String, Vec<NavPoint>>,
) -> Vec<(NaiveDate, f64)> {
    let total_invested: f64 = funds.iter().map(|f| f.amount).sum();
    if !(total_invested.is_finite() && total_invested > 0.0) {
        return Vec::new();
    }

    let mut ratios: HashMap<&str, Vec<(NaiveDate, f64)>> = HashMap::new();
    let mut dates = BTreeSet::new();
    for fund in funds {
        let mut series: Vec<(NaiveDate, f64)> = histories
            .get(&fund.code)
            .into_iter()
            .flatten()
            .filter(|p| p.net_value.is_finite() && p.net_value > 0.0)
            .map(|p| (p.date, p.net_value / fund.cost_price))
            .collect();
        if series.is_empty() {
            continue;
        }
        series.sort_by_key(|(date, _)| *date);
        dates.extend(series.iter().map(|(date, _)| *date));
        ratios.insert(fund.code.as_str(), series);
    }

    let mut cursors: HashMap<&str, usize> = HashMap::new();
    let mut last_ratio: HashMap<&str, f64> = HashMap::new();
    dates
        .into_iter()
        .filter_map(|date| {
            let mut value = 0.0;
            for fund in funds {
                let Some(series) = ratios.get(fund.code.as_str()) else {
                    value += fund.amount;
                    continue;
                };
                let cursor = cursors.entry(fund.code.as_str()).or_insert(0);
                while *cursor < series.len() && series[*cursor].0 <= date {
                    last_ratio.insert(fund.code.as_str(), series[*cursor].1);
                    *cursor += 1;
                }
                let ratio = last_ratio.get(fund.code.as_str()).copied().unwrap_or(1.0);
                value += fund.amount * ratio;
            }
            let portfolio_return = (value / total_invested - 1.0) * 100.0;
            portfolio_return.is_finite().then_some((date, portfolio_return))
        })
        .collect()
}

/// Return of the index in percent relative to its first close.
pub fn benchmark_return_series(history: &[KlinePoint]) -> Vec<(NaiveDate, f64)> {
    let mut points: Vec<(NaiveDate, f64)> = history
        .iter()
        .filter(|p| p.close.is_finite() && p.close > 0.0)
        .map(|p| (p.date, p.close))
        .collect();
    points.sort_by_key(|(date, _)| *date);

    let Some(&(_, base)) = points.first() else {
        return Vec::new();
    };
    points
        .into_iter()
        .map(|(date, close)| (date, (close / base - 1.0) * 100.0))
        .collect()
}

/// Joins both series over the union of their dates, carrying each value
/// forward. Dates before either series has a value are dropped.
pub fn merge_series(
    portfolio: &[(NaiveDate, f64)],
    benchmark: &[(NaiveDate, f64)],
) -> Vec<ComparisonPoint> {
    let portfolio: BTreeMap<NaiveDate, f64> = portfolio.iter().copied().collect();
    let benchmark: BTreeMap<NaiveDate, f64> = benchmark.iter().copied().collect();
    let dates: BTreeSet<NaiveDate> = portfolio.keys().chain(benchmark.keys()).copied().collect();

    let mut last_portfolio = None;
    let mut last_benchmark = None;
    dates
        .into_iter()
        .filter_map(|date| {
            if let Some(value) = portfolio.get(&date) {
                last_portfolio = Some(*value);
            }
            if let Some(value) = benchmark.get(&date) {
                last_benchmark = Some(*value);
            }
            if last_portfolio.is_none() && last_benchmark.is_none() {
                return None;
            }
            Some(ComparisonPoint {
                date,
                portfolio_return: last_portfolio,
                benchmark_return: last_benchmark,
            })
        })
        .collect()
}

/// Loads the histories and builds the merged series. A fund whose history
/// fails counts at its invested amount; a failed benchmark fails the whole
/// comparison.
pub async fn load_comparison(
    provider: &dyn FundDataProvider,
    positions: &[FundPosition],
    benchmark: &str,
    period: HistoryPeriod,
) -> Result<Vec<ComparisonPoint>, FetchError> {
    let funds = compared_funds(positions);
    if funds.is_empty() {
        debug!("No positions eligible for comparison");
        return Ok(Vec::new());
    }

    let fund_requests = join_all(funds.iter().map(|fund| async move {
        let result = provider.fetch_fund_history(&fund.code, period).await;
        (fund.code.clone(), result)
    }));
    let (fund_results, benchmark_history) = futures::join!(
        fund_requests,
        provider.fetch_benchmark_history(benchmark, period)
    );
    let benchmark_history = benchmark_history?;

    let mut histories = HashMap::new();
    for (code, result) in fund_results {
        match result {
            Ok(history) => {
                histories.insert(code, history);
            }
            Err(e) => warn!(code = %code, error = %e, "Fund history unavailable for comparison"),
        }
    }

    let portfolio = portfolio_return_series(&funds, &histories);
    let benchmark = benchmark_return_series(&benchmark_history);
    Ok(merge_series(&portfolio, &benchmark))
}
