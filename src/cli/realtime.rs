use super::ui;
use crate::core::fund::{FundDataProvider, FundRealtimeRecord};
use crate::transport::batch_process;
use anyhow::Result;
use comfy_table::Cell;

fn realtime_table(records: &[FundRealtimeRecord]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Est. NAV"),
        ui::header_cell("Change"),
        ui::header_cell("Estimated At"),
        ui::header_cell("NAV"),
        ui::header_cell("NAV Date"),
    ]);

    for record in records {
        let estimate_time = if record.no_valuation {
            Cell::new("no live estimate")
        } else {
            record
                .estimate_time
                .map_or_else(ui::na_cell, |t| Cell::new(t.format("%Y-%m-%d %H:%M")))
        };
        table.add_row(vec![
            Cell::new(&record.code),
            Cell::new(&record.name),
            ui::format_optional_cell(record.estimated_net_value, |v| format!("{v:.4}")),
            ui::change_cell(record.change_percent),
            estimate_time,
            ui::format_optional_cell(record.unit_net_value, |v| format!("{v:.4}")),
            ui::format_optional_cell(record.net_value_date, |d| d.to_string()),
        ]);
    }
    table.to_string()
}

pub async fn run(
    provider: &dyn FundDataProvider,
    codes: &[String],
    max_concurrent: usize,
) -> Result<()> {
    let pb = ui::new_progress_bar(codes.len() as u64, false);
    let records = batch_process(
        codes,
        |code| {
            let pb = pb.clone();
            async move {
                let record = provider.fetch_fund_realtime(code).await;
                pb.inc(1);
                record
            }
        },
        max_concurrent,
    )
    .await;
    pb.finish_and_clear();

    println!("{}", realtime_table(&records?));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_fallback_record_is_marked() {
        let mut record = FundRealtimeRecord::unavailable("000001");
        record.name = "FundX".to_string();
        record.unit_net_value = Some(1.234);
        record.estimated_net_value = Some(1.234);
        record.change_percent = Some(0.05);
        record.net_value_date = NaiveDate::from_ymd_opt(2024, 1, 1);

        let table = realtime_table(&[record]);
        assert!(table.contains("FundX"));
        assert!(table.contains("no live estimate"));
        assert!(table.contains("+0.05%"));
        assert!(table.contains("2024-01-01"));
    }
}
