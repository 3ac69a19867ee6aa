//! Extraction of the top-holdings table from the archive HTML fragment.
//!
//! Extraction is a two-stage pipeline producing the same rows: a DOM pass
//! over `<tr>`/`<td>` elements, then a pattern pass over the raw markup when
//! the DOM pass finds nothing. When both come back empty the outcome is
//! [`HoldingsParse::Ambiguous`]: a fund without disclosed holdings and a feed
//! whose layout changed look exactly the same.

use crate::core::fund::HoldingEntry;
use crate::providers::util::is_stock_code;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

lazy_static! {
    static ref ROW_SELECTOR: Selector = Selector::parse("tr").expect("Invalid selector");
    static ref CELL_SELECTOR: Selector = Selector::parse("td").expect("Invalid selector");
    static ref ROW_REGEX: Regex = Regex::new(r"(?is)<tr[^>]*>.*?</tr>").expect("Invalid regex pattern");
    static ref CELL_REGEX: Regex =
        Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("Invalid regex pattern");
    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]*>").expect("Invalid regex pattern");
    static ref WEIGHT_REGEX: Regex =
        Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*%").expect("Invalid regex pattern");
    static ref PLAIN_NUMBER_REGEX: Regex =
        Regex::new(r"^[0-9]+(?:\.[0-9]+)?$").expect("Invalid regex pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionSource {
    Dom,
    Pattern,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoldingsParse {
    Parsed {
        source: ExtractionSource,
        holdings: Vec<HoldingEntry>,
    },
    /// Neither pass found a row.
    Ambiguous,
}

pub fn extract_holdings(html: &str) -> HoldingsParse {
    if html.trim().is_empty() {
        warn!("Holdings fragment is empty");
        return HoldingsParse::Ambiguous;
    }

    let holdings = extract_with_dom(html);
    if !holdings.is_empty() {
        debug!(rows = holdings.len(), "Holdings extracted from DOM");
        return HoldingsParse::Parsed {
            source: ExtractionSource::Dom,
            holdings,
        };
    }

    warn!("DOM extraction found no holdings rows, trying pattern extraction");
    let holdings = extract_with_patterns(html);
    if !holdings.is_empty() {
        debug!(rows = holdings.len(), "Holdings extracted by pattern");
        return HoldingsParse::Parsed {
            source: ExtractionSource::Pattern,
            holdings,
        };
    }

    warn!("Pattern extraction found no holdings rows; the source layout may have changed");
    HoldingsParse::Ambiguous
}

fn extract_with_dom(html: &str) -> Vec<HoldingEntry> {
    let document = Html::parse_document(html);
    let mut holdings = Vec::new();
    for row in document.select(&ROW_SELECTOR) {
        let cells: Vec<String> = row
            .select(&CELL_SELECTOR)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();
        if let Some(entry) = holding_from_cells(&cells, holdings.len() + 1) {
            holdings.push(entry);
        }
    }
    holdings
}

fn extract_with_patterns(html: &str) -> Vec<HoldingEntry> {
    let mut holdings = Vec::new();
    for row in ROW_REGEX.find_iter(html) {
        let cells: Vec<String> = CELL_REGEX
            .captures_iter(row.as_str())
            .map(|caps| {
                TAG_REGEX
                    .replace_all(&caps[1], "")
                    .replace("&nbsp;", "")
                    .trim()
                    .to_string()
            })
            .collect();
        if let Some(entry) = holding_from_cells(&cells, holdings.len() + 1) {
            holdings.push(entry);
        }
    }
    holdings
}

/// Maps the cells of one table row to a holding: the first six-digit cell is
/// the code, the first `N%` cell the weight, and the first remaining cell that
/// is not a plain number the name. Rows with none of the three are skipped.
fn holding_from_cells(cells: &[String], index: usize) -> Option<HoldingEntry> {
    let cells: Vec<&str> = cells
        .iter()
        .map(String::as_str)
        .filter(|cell| !cell.is_empty())
        .collect();

    let code = cells.iter().copied().find(|cell| is_stock_code(cell));
    let weight_cell = cells.iter().copied().find(|cell| WEIGHT_REGEX.is_match(cell));
    let name = cells.iter().copied().find(|cell| {
        Some(*cell) != code && Some(*cell) != weight_cell && !PLAIN_NUMBER_REGEX.is_match(cell)
    });

    if code.is_none() && name.is_none() && weight_cell.is_none() {
        return None;
    }

    let weight = weight_cell
        .and_then(|cell| WEIGHT_REGEX.captures(cell))
        .and_then(|caps| caps[1].parse::<f64>().ok());

    Some(HoldingEntry {
        index,
        code: code.unwrap_or_default().to_string(),
        name: name.unwrap_or_default().to_string(),
        weight,
        price: None,
        change: None,
    })
}
