//! Profit and return figures for the tracked fund positions.
use crate::core::config::FundPosition;
use crate::core::decimal::{divide, multiply, subtract, sum};
use crate::core::fund::{FundDataProvider, FundRealtimeRecord, HoldingEntry};
use crate::transport::batch_process;
use std::convert::Infallible;
use tracing::{debug, warn};

/// The computed state of one position after a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub position: FundPosition,
    /// `None` when no realtime data could be loaded.
    pub realtime: Option<FundRealtimeRecord>,
    pub holdings: Vec<HoldingEntry>,
    pub daily_profit: f64,
    /// Configured cost price, or the one derived from the recorded profit.
    pub cost_price: Option<f64>,
    pub total_profit: f64,
    /// Return on cost in percent.
    pub holding_return_rate: Option<f64>,
}

impl PositionSnapshot {
    pub fn new(position: FundPosition, realtime: Option<FundRealtimeRecord>) -> Self {
        let current = realtime.as_ref().and_then(|r| r.estimated_net_value);
        let change = realtime.as_ref().and_then(|r| r.change_percent);

        let daily_profit = daily_profit(position.amount, change);
        let cost_price = effective_cost_price(&position, current);
        let (total_profit, holding_return_rate) =
            holding_profit(position.amount, cost_price, current);

        Self {
            position,
            realtime,
            holdings: Vec::new(),
            daily_profit,
            cost_price,
            total_profit,
            holding_return_rate,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.realtime.as_ref().map(|r| r.name.as_str())
    }
}

/// Today's profit of `amount` given the estimated change in percent.
pub fn daily_profit(amount: f64, change_percent: Option<f64>) -> f64 {
    multiply(amount, divide(change_percent, 100.0))
}

/// Cost price implied by holding `amount` with `profit` already made at NAV
/// `current`, i.e. `current / (1 + profit / amount)`.
pub fn derive_cost_price(amount: f64, profit: Option<f64>, current: Option<f64>) -> Option<f64> {
    let profit = profit.filter(|p| p.is_finite())?;
    let current = current.filter(|c| c.is_finite() && *c > 0.0)?;
    if !(amount > 0.0) {
        return None;
    }

    let ratio_base = sum([1.0, divide(profit, amount)]);
    if !(ratio_base > 0.0) {
        return None;
    }
    let cost = divide(current, ratio_base);
    (cost.is_finite() && cost > 0.0).then_some(cost)
}

pub fn effective_cost_price(position: &FundPosition, current: Option<f64>) -> Option<f64> {
    match position.cost_price {
        Some(cost) if cost > 0.0 => Some(cost),
        _ => derive_cost_price(position.amount, position.existing_profit, current),
    }
}

/// Total profit and return rate (percent) of a position. Zero profit and no
/// rate unless amount, cost and current NAV are all positive.
pub fn holding_profit(amount: f64, cost: Option<f64>, current: Option<f64>) -> (f64, Option<f64>) {
    match (cost, current) {
        (Some(cost), Some(current)) if amount > 0.0 && cost > 0.0 && current > 0.0 => {
            let ratio = subtract(divide(current, cost), 1.0);
            (multiply(amount, ratio), Some(multiply(ratio, 100.0)))
        }
        _ => (0.0, None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortfolioTotals {
    pub assets: f64,
    pub daily_profit: f64,
    pub total_profit: f64,
    /// Total profit over assets, in percent.
    pub return_rate: f64,
}

impl PortfolioTotals {
    pub fn from_snapshots(snapshots: &[PositionSnapshot]) -> Self {
        let assets = sum(snapshots.iter().map(|s| s.position.amount));
        let daily_profit = sum(snapshots.iter().map(|s| s.daily_profit));
        let total_profit = sum(snapshots.iter().map(|s| s.total_profit));
        let return_rate = if assets > 0.0 {
            multiply(divide(total_profit, assets), 100.0)
        } else {
            0.0
        };
        Self {
            assets,
            daily_profit,
            total_profit,
            return_rate,
        }
    }
}

/// Orders snapshots by estimated change, highest first. Positions without a
/// change count as zero; equal changes keep their configured order.
pub fn sort_by_change_desc(snapshots: &mut [PositionSnapshot]) {
    let change = |s: &PositionSnapshot| {
        s.realtime
            .as_ref()
            .and_then(|r| r.change_percent)
            .unwrap_or(0.0)
    };
    snapshots.sort_by(|a, b| change(b).total_cmp(&change(a)));
}

/// Loads realtime data for every position with at most `max_concurrent`
/// requests in flight, then the holdings of positions that show them.
/// Calls `update_callback` once per completed position.
pub async fn refresh_positions(
    provider: &dyn FundDataProvider,
    positions: &[FundPosition],
    max_concurrent: usize,
    update_callback: &(dyn Fn() + Sync),
) -> Vec<PositionSnapshot> {
    let realtime = batch_process(
        positions.iter(),
        |position| async move {
            let record = match provider.fetch_fund_realtime(&position.code).await {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(code = %position.code, error = %e, "No realtime data for position");
                    None
                }
            };
            update_callback();
            Ok::<_, Infallible>(record)
        },
        max_concurrent,
    )
    .await;
    let Ok(realtime) = realtime;

    let mut snapshots: Vec<PositionSnapshot> = positions
        .iter()
        .cloned()
        .zip(realtime)
        .map(|(position, record)| PositionSnapshot::new(position, record))
        .collect();

    for snapshot in snapshots.iter_mut().filter(|s| s.position.show_holdings) {
        snapshot.holdings = provider
            .fetch_fund_holdings(&snapshot.position.code, false)
            .await;
        debug!(
            code = %snapshot.position.code,
            count = snapshot.holdings.len(),
            "Loaded holdings for position"
        );
    }

    snapshots
}
