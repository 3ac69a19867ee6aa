pub mod eastmoney;
pub mod holdings_parser;
pub mod service;
pub mod tencent;
pub mod util;

pub use service::{FundService, HoldingsOutcome, ServiceOptions};
