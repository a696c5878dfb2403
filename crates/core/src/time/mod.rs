pub mod cn_market;

pub use cn_market::{market_now, resolve_report_date, today_market_date};
