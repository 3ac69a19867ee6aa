use crate::core::analytics::PositionSnapshot;
use crate::core::classify::sector_label;
use crate::core::decimal::{divide, multiply, sum};

/// A position counted towards a sector.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedFund {
    pub code: String,
    pub name: Option<String>,
    pub amount: f64,
}

/// Amount held in one sector and its share of the whole portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorAllocation {
    pub sector: &'static str,
    pub value: f64,
    /// Share of the total, in percent.
    pub percentage: f64,
    pub funds: Vec<AllocatedFund>,
}

/// Groups positions by sector label and sums their amounts.
///
/// Positions without a positive amount are left out. Sectors are ordered by
/// value, largest first, and funds within a sector by amount.
pub fn sector_allocation(snapshots: &[PositionSnapshot]) -> Vec<SectorAllocation> {
    let mut sectors: Vec<SectorAllocation> = Vec::new();

    for snapshot in snapshots {
        let amount = snapshot.position.amount;
        if !(amount.is_finite() && amount > 0.0) {
            continue;
        }
        let sector = sector_label(snapshot.name().unwrap_or_default(), None, &snapshot.holdings);
        let fund = AllocatedFund {
            code: snapshot.position.code.clone(),
            name: snapshot.name().map(str::to_string),
            amount,
        };
        match sectors.iter_mut().find(|s| s.sector == sector) {
            Some(existing) => existing.funds.push(fund),
            None => sectors.push(SectorAllocation {
                sector,
                value: 0.0,
                percentage: 0.0,
                funds: vec![fund],
            }),
        }
    }

    for allocation in &mut sectors {
        allocation.value = sum(allocation.funds.iter().map(|f| f.amount));
        allocation
            .funds
            .sort_by(|a, b| b.amount.total_cmp(&a.amount));
    }
    sectors.sort_by(|a, b| b.value.total_cmp(&a.value));

    let total = sum(sectors.iter().map(|s| s.value));
    for allocation in &mut sectors {
        allocation.percentage = if total > 0.0 {
            multiply(divide(allocation.value, total), 100.0)
        } else {
            0.0
        };
    }
    sectors
}
