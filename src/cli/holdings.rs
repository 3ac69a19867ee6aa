use super::ui;
use crate::core::classify::sector_label;
use crate::core::fund::HoldingEntry;
use crate::providers::holdings_parser::ExtractionSource;
use crate::providers::{FundService, HoldingsOutcome};
use anyhow::Result;
use comfy_table::Cell;

pub fn holdings_table(holdings: &[HoldingEntry]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Weight"),
        ui::header_cell("Price"),
        ui::header_cell("Change"),
    ]);
    for holding in holdings {
        table.add_row(vec![
            Cell::new(holding.index),
            Cell::new(&holding.code),
            Cell::new(&holding.name),
            ui::format_optional_cell(holding.weight, |w| format!("{w:.2}%")),
            ui::format_optional_cell(holding.price, |p| format!("{p:.2}")),
            ui::change_cell(holding.change),
        ]);
    }
    table.to_string()
}

fn outcome_note(outcome: &HoldingsOutcome) -> String {
    match outcome {
        HoldingsOutcome::Cached(_) => "from cache".to_string(),
        HoldingsOutcome::Parsed {
            source: ExtractionSource::Dom,
            ..
        } => "parsed from report table".to_string(),
        HoldingsOutcome::Parsed {
            source: ExtractionSource::Pattern,
            ..
        } => "recovered by pattern match".to_string(),
        HoldingsOutcome::Ambiguous => "report could not be read".to_string(),
        HoldingsOutcome::Unavailable(e) => format!("unavailable: {e}"),
    }
}

fn note_style(outcome: &HoldingsOutcome) -> ui::StyleType {
    match outcome {
        HoldingsOutcome::Ambiguous | HoldingsOutcome::Unavailable(_) => ui::StyleType::Error,
        _ => ui::StyleType::Subtle,
    }
}

pub async fn run(service: &FundService, code: &str, refresh: bool) -> Result<()> {
    let pb = ui::new_spinner("Fetching holdings...");
    let outcome = service.fetch_fund_holdings_report(code, refresh).await;
    pb.finish_and_clear();

    println!(
        "Top holdings of {} {}\n",
        ui::style_text(code, ui::StyleType::Title),
        ui::style_text(&format!("({})", outcome_note(&outcome)), note_style(&outcome))
    );

    let holdings = outcome.holdings();
    if holdings.is_empty() {
        println!("No holdings disclosed for {code}");
        return Ok(());
    }
    println!("{}", holdings_table(holdings));
    println!("\nSector: {}", sector_label("", None, holdings));
    Ok(())
}
