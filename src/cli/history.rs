use super::ui;
use crate::core::comparison::benchmark_label;
use crate::core::fund::{HistoryPeriod, KlinePoint, NavPoint};
use crate::providers::FundService;
use anyhow::{Context, Result};
use comfy_table::Cell;

/// Change in percent between the first and last value of a series.
fn period_change(first: f64, last: f64) -> Option<f64> {
    (first > 0.0).then(|| (last / first - 1.0) * 100.0)
}

fn nav_table(points: &[NavPoint]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("NAV"),
        ui::header_cell("Acc. NAV"),
        ui::header_cell("Daily Growth"),
    ]);
    for point in points.iter().rev() {
        table.add_row(vec![
            Cell::new(point.date),
            ui::format_optional_cell(Some(point.net_value), |v| format!("{v:.4}")),
            ui::format_optional_cell(point.accumulated_value, |v| format!("{v:.4}")),
            ui::change_cell(point.daily_growth_percent),
        ]);
    }
    table.to_string()
}

fn kline_table(points: &[KlinePoint]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Open"),
        ui::header_cell("Close"),
        ui::header_cell("High"),
        ui::header_cell("Low"),
        ui::header_cell("Volume"),
    ]);
    for point in points.iter().rev() {
        table.add_row(vec![
            Cell::new(point.date),
            ui::format_optional_cell(point.open, |v| format!("{v:.2}")),
            ui::format_optional_cell(Some(point.close), |v| format!("{v:.2}")),
            ui::format_optional_cell(point.high, |v| format!("{v:.2}")),
            ui::format_optional_cell(point.low, |v| format!("{v:.2}")),
            ui::format_optional_cell(point.volume, |v| format!("{v:.0}")),
        ]);
    }
    table.to_string()
}

fn print_period_change(label: &str, change: Option<f64>) {
    if let Some(change) = change {
        println!(
            "\n{} {}",
            ui::style_text(label, ui::StyleType::TotalLabel),
            ui::style_signed(&ui::signed_percent(change), change)
        );
    }
}

pub async fn run_fund(service: &FundService, code: &str, period: HistoryPeriod) -> Result<()> {
    let pb = ui::new_spinner("Fetching NAV history...");
    let points = service.fetch_fund_history(code, period).await;
    pb.finish_and_clear();

    let points = points.with_context(|| format!("Failed to load NAV history of {code}"))?;
    if points.is_empty() {
        println!("No NAV history for {code}");
        return Ok(());
    }

    println!(
        "NAV history of {} ({period})\n",
        ui::style_text(code, ui::StyleType::Title)
    );
    println!("{}", nav_table(&points));
    let change = match (points.first(), points.last()) {
        (Some(first), Some(last)) => period_change(first.net_value, last.net_value),
        _ => None,
    };
    print_period_change("Period change:", change);
    Ok(())
}

pub async fn run_benchmark(service: &FundService, index: &str, period: HistoryPeriod) -> Result<()> {
    let pb = ui::new_spinner("Fetching index history...");
    let points = service.fetch_benchmark_history(index, period).await;
    pb.finish_and_clear();

    let points = points.with_context(|| format!("Failed to load history of index {index}"))?;
    println!(
        "{} ({period})\n",
        ui::style_text(benchmark_label(index), ui::StyleType::Title)
    );
    println!("{}", kline_table(&points));
    let change = match (points.first(), points.last()) {
        (Some(first), Some(last)) => period_change(first.close, last.close),
        _ => None,
    };
    print_period_change("Period change:", change);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_period_change() {
        assert_eq!(period_change(0.0, 1.0), None);
        assert!((period_change(2.0, 2.5).unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_nav_table_lists_newest_first() {
        let point = |day: u32, value: f64| NavPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            net_value: value,
            accumulated_value: None,
            daily_growth_percent: Some(1.0),
        };
        let table = nav_table(&[point(2, 1.0), point(3, 1.01)]);
        let newest = table.find("2024-01-03").unwrap();
        let oldest = table.find("2024-01-02").unwrap();
        assert!(newest < oldest);
        assert!(table.contains("1.0100"));
    }
}
