use crate::providers::FundService;
use anyhow::Result;

pub fn clear(service: &FundService, code: Option<&str>) -> Result<()> {
    service.clear_holdings_cache(code);
    service.clear_history_caches();
    match code {
        Some(code) => println!("Cleared cached holdings of {code}"),
        None => println!("Cleared all cached holdings"),
    }
    Ok(())
}
