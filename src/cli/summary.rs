use super::{holdings, ui};
use crate::core::analytics::{self, PortfolioTotals, PositionSnapshot};
use crate::core::classify::{market_status, sector_label};
use crate::core::config::AppConfig;
use crate::core::decimal::format_money;
use crate::core::fund::FundDataProvider;
use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, CellAlignment};

fn snapshot_table(snapshots: &[PositionSnapshot]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Fund"),
        ui::header_cell("Sector"),
        ui::header_cell("Amount"),
        ui::header_cell("Est. NAV"),
        ui::header_cell("Change"),
        ui::header_cell("Today"),
        ui::header_cell("Cost"),
        ui::header_cell("Profit"),
        ui::header_cell("Return"),
    ]);

    for snapshot in snapshots {
        let code = &snapshot.position.code;
        let fund = match snapshot.name() {
            Some(name) => format!("{name}\n{code}"),
            None => code.clone(),
        };
        let sector = sector_label(snapshot.name().unwrap_or_default(), None, &snapshot.holdings);
        let realtime = snapshot.realtime.as_ref();
        let estimate = realtime.and_then(|r| r.estimated_net_value);
        let nav_cell = match realtime {
            Some(r) if r.no_valuation && estimate.is_some() => {
                ui::format_optional_cell(estimate, |v| format!("{v:.4}*"))
            }
            _ => ui::format_optional_cell(estimate, |v| format!("{v:.4}")),
        };

        table.add_row(vec![
            Cell::new(fund),
            Cell::new(sector),
            Cell::new(format_money(snapshot.position.amount)).set_alignment(CellAlignment::Right),
            nav_cell,
            ui::change_cell(realtime.and_then(|r| r.change_percent)),
            ui::profit_cell(snapshot.daily_profit),
            ui::format_optional_cell(snapshot.cost_price, |c| format!("{c:.4}")),
            ui::profit_cell(snapshot.total_profit),
            ui::change_cell(snapshot.holding_return_rate),
        ]);
    }
    table.to_string()
}

fn totals_text(totals: &PortfolioTotals) -> String {
    format!(
        "{} {}   {} {}   {} {} ({})",
        ui::style_text("Assets:", ui::StyleType::TotalLabel),
        format_money(totals.assets),
        ui::style_text("Today:", ui::StyleType::TotalLabel),
        ui::style_signed(&ui::signed_money(totals.daily_profit), totals.daily_profit),
        ui::style_text("Profit:", ui::StyleType::TotalLabel),
        ui::style_signed(&ui::signed_money(totals.total_profit), totals.total_profit),
        ui::style_signed(&ui::signed_percent(totals.return_rate), totals.return_rate),
    )
}

pub async fn run(provider: &dyn FundDataProvider, config: &AppConfig) -> Result<()> {
    let status = market_status(&Utc::now());
    println!(
        "Portfolio {}\n",
        ui::style_text(&format!("[{status}]"), ui::StyleType::Subtle)
    );

    if config.funds.is_empty() {
        println!("No funds configured. Add positions under `funds:` in the configuration file.");
        return Ok(());
    }

    let pb = ui::new_progress_bar(config.funds.len() as u64, true);
    pb.set_message("Fetching valuations...");
    let mut snapshots = analytics::refresh_positions(
        provider,
        &config.funds,
        config.requests.max_concurrent,
        &|| pb.inc(1),
    )
    .await;
    pb.finish_and_clear();
    analytics::sort_by_change_desc(&mut snapshots);

    println!("{}", snapshot_table(&snapshots));
    if snapshots
        .iter()
        .any(|s| s.realtime.as_ref().is_some_and(|r| r.no_valuation))
    {
        println!(
            "{}",
            ui::style_text("* no live estimate, showing last published NAV", ui::StyleType::Subtle)
        );
    }
    println!("\n{}", totals_text(&PortfolioTotals::from_snapshots(&snapshots)));

    for snapshot in snapshots.iter().filter(|s| s.position.show_holdings) {
        ui::print_separator();
        let name = snapshot.name().unwrap_or(&snapshot.position.code);
        println!(
            "Top holdings: {}\n",
            ui::style_text(name, ui::StyleType::Title)
        );
        if snapshot.holdings.is_empty() {
            println!("{}", ui::style_text("No holdings disclosed", ui::StyleType::Subtle));
        } else {
            println!("{}", holdings::holdings_table(&snapshot.holdings));
        }
    }

    Ok(())
}
