use super::ui;
use crate::core::fund::StockQuote;
use crate::providers::FundService;
use anyhow::Result;
use comfy_table::Cell;

fn quotes_table(codes: &[String], quotes: &std::collections::HashMap<String, StockQuote>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Price"),
        ui::header_cell("Change"),
        ui::header_cell("Change %"),
    ]);

    for code in codes {
        let Some(quote) = quotes.get(code.trim()) else {
            table.add_row(vec![
                Cell::new(code),
                Cell::new("no quote").fg(comfy_table::Color::DarkGrey),
                ui::na_cell(),
                ui::na_cell(),
                ui::na_cell(),
            ]);
            continue;
        };
        table.add_row(vec![
            Cell::new(&quote.code),
            Cell::new(quote.name.as_deref().unwrap_or_default()),
            ui::format_optional_cell(quote.current, |p| format!("{p:.2}")),
            ui::format_optional_cell(quote.change, ui::signed_money),
            ui::change_cell(quote.percent),
        ]);
    }
    table.to_string()
}

pub async fn run(service: &FundService, codes: &[String]) -> Result<()> {
    let pb = ui::new_spinner("Fetching quotes...");
    let quotes = service.fetch_batch_stock_quotes(codes).await;
    pb.finish_and_clear();

    println!("{}", quotes_table(codes, &quotes));
    Ok(())
}
