use super::ui;
use crate::core::comparison::{self, ComparisonPoint, benchmark_label};
use crate::core::config::FundPosition;
use crate::core::fund::{FundDataProvider, HistoryPeriod};
use anyhow::{Context, Result};
use comfy_table::Cell;

fn comparison_table(points: &[ComparisonPoint], benchmark: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Portfolio"),
        ui::header_cell(benchmark),
        ui::header_cell("Excess"),
    ]);
    for point in points.iter().rev() {
        table.add_row(vec![
            Cell::new(point.date),
            ui::change_cell(point.portfolio_return),
            ui::change_cell(point.benchmark_return),
            ui::change_cell(point.excess_return()),
        ]);
    }
    table.to_string()
}

pub async fn run(
    provider: &dyn FundDataProvider,
    positions: &[FundPosition],
    benchmark: &str,
    period: HistoryPeriod,
) -> Result<()> {
    let pb = ui::new_spinner("Loading history...");
    let points = comparison::load_comparison(provider, positions, benchmark, period).await;
    pb.finish_and_clear();

    let points = points.context("Failed to load performance comparison")?;
    let label = benchmark_label(benchmark);
    if points.is_empty() {
        println!("No history available to compare against {label}");
        return Ok(());
    }

    println!(
        "Portfolio vs {} ({period})\n",
        ui::style_text(label, ui::StyleType::Title)
    );
    println!("{}", comparison_table(&points, label));

    if let Some(latest) = points.last()
        && let Some(excess) = latest.excess_return()
    {
        println!(
            "\n{} {}",
            ui::style_text("Excess return:", ui::StyleType::TotalLabel),
            ui::style_signed(&ui::signed_percent(excess), excess)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_comparison_table() {
        let points = vec![ComparisonPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            portfolio_return: Some(3.0),
            benchmark_return: None,
        }];
        let table = comparison_table(&points, "沪深300");
        assert!(table.contains("沪深300"));
        assert!(table.contains("+3.00%"));
        assert!(table.contains("--"));
    }
}
