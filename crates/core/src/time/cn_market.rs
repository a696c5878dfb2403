use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

// A-share sessions run on Beijing time regardless of where the process runs.
const CST_OFFSET_SECS: i32 = 8 * 3600;

pub fn market_offset() -> FixedOffset {
    FixedOffset::east_opt(CST_OFFSET_SECS).expect("CST offset is in range")
}

pub fn market_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&market_offset())
}

pub fn today_market_date(now_utc: DateTime<Utc>) -> NaiveDate {
    now_utc.with_timezone(&market_offset()).date_naive()
}

/// An explicit `YYYY-MM-DD` argument wins; otherwise today's market date.
pub fn resolve_report_date(
    date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = date_arg {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date {s:?}, expected YYYY-MM-DD"));
    }
    Ok(today_market_date(now_utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap();
        let d = resolve_report_date(Some("2026-01-05"), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }

    #[test]
    fn malformed_date_is_rejected() {
        let now = Utc.with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap();
        assert!(resolve_report_date(Some("01/08/2026"), now).is_err());
    }

    #[test]
    fn utc_evening_is_already_tomorrow_in_market_time() {
        // 2026-01-07 17:00 UTC = 2026-01-08 01:00 CST.
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 17, 0, 0).unwrap();
        let d = resolve_report_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 8).unwrap());
    }
}
