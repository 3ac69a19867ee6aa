use super::ui;
use crate::core::allocation::{SectorAllocation, sector_allocation};
use crate::core::analytics;
use crate::core::config::AppConfig;
use crate::core::decimal::{divide, format_money, format_percent, multiply, sum};
use crate::core::fund::FundDataProvider;
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

fn allocation_table(allocation: &[SectorAllocation]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Sector"),
        ui::header_cell("Fund"),
        ui::header_cell("Amount"),
        ui::header_cell("Allocation"),
    ]);

    let total = sum(allocation.iter().map(|s| s.value));
    for sector in allocation {
        table.add_row(vec![
            Cell::new(sector.sector),
            Cell::new(""),
            Cell::new(format_money(sector.value)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{}%", format_percent(sector.percentage)))
                .set_alignment(CellAlignment::Right),
        ]);

        for fund in &sector.funds {
            let share = if total > 0.0 {
                multiply(divide(fund.amount, total), 100.0)
            } else {
                0.0
            };
            let label = match &fund.name {
                Some(name) => format!("{name} ({})", fund.code),
                None => fund.code.clone(),
            };
            table.add_row(vec![
                Cell::new(""),
                Cell::new(label),
                Cell::new(ui::style_text(&format_money(fund.amount), ui::StyleType::Subtle))
                    .set_alignment(CellAlignment::Right),
                Cell::new(ui::style_text(
                    &format!("{}%", format_percent(share)),
                    ui::StyleType::Subtle,
                ))
                .set_alignment(CellAlignment::Right),
            ]);
        }
    }
    table.to_string()
}

pub async fn run(provider: &dyn FundDataProvider, config: &AppConfig) -> Result<()> {
    if config.funds.is_empty() {
        println!("No funds configured. Add positions under `funds:` in the configuration file.");
        return Ok(());
    }

    let pb = ui::new_progress_bar(config.funds.len() as u64, true);
    pb.set_message("Classifying funds...");
    let snapshots = analytics::refresh_positions(
        provider,
        &config.funds,
        config.requests.max_concurrent,
        &|| pb.inc(1),
    )
    .await;
    pb.finish_and_clear();

    let allocation = sector_allocation(&snapshots);
    if allocation.is_empty() {
        println!("No positions with a positive amount");
        return Ok(());
    }

    println!("\n{}\n", ui::style_text("Sector allocation", ui::StyleType::Title));
    println!("{}", allocation_table(&allocation));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocation::AllocatedFund;

    #[test]
    fn test_allocation_table_lists_sectors_and_funds() {
        let allocation = vec![
            SectorAllocation {
                sector: "白酒消费",
                value: 750.0,
                percentage: 75.0,
                funds: vec![AllocatedFund {
                    code: "161725".to_string(),
                    name: Some("招商中证白酒指数".to_string()),
                    amount: 750.0,
                }],
            },
            SectorAllocation {
                sector: "混合/其他",
                value: 250.0,
                percentage: 25.0,
                funds: vec![AllocatedFund {
                    code: "000001".to_string(),
                    name: None,
                    amount: 250.0,
                }],
            },
        ];
        let table = allocation_table(&allocation);
        assert!(table.contains("白酒消费"));
        assert!(table.contains("招商中证白酒指数 (161725)"));
        assert!(table.contains("750.00"));
        assert!(table.contains("75.00%"));
        assert!(table.contains("25.00%"));
        assert!(table.contains("000001"));
    }
}
