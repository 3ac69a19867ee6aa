use super::ui;
use crate::core::classify::sector_label;
use crate::core::fund::FundSummary;
use crate::providers::FundService;
use anyhow::{Context, Result};
use comfy_table::Cell;

fn search_table(funds: &[FundSummary]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Type"),
        ui::header_cell("Sector"),
        ui::header_cell("NAV"),
        ui::header_cell("NAV Date"),
    ]);
    for fund in funds {
        table.add_row(vec![
            Cell::new(&fund.code),
            Cell::new(&fund.name),
            Cell::new(fund.fund_type.as_deref().unwrap_or("--")),
            Cell::new(sector_label(&fund.name, fund.fund_type.as_deref(), &[])),
            ui::format_optional_cell(fund.net_value, |v| format!("{v:.4}")),
            ui::format_optional_cell(fund.net_value_date, |d| d.to_string()),
        ]);
    }
    table.to_string()
}

pub async fn run(service: &FundService, keyword: &str) -> Result<()> {
    let pb = ui::new_spinner("Searching...");
    let funds = service.search_funds(keyword).await;
    pb.finish_and_clear();

    let funds = funds.with_context(|| format!("Fund search for {keyword:?} failed"))?;
    if funds.is_empty() {
        println!("No funds found for {keyword:?}");
        return Ok(());
    }
    println!("{}", search_table(&funds));
    Ok(())
}
