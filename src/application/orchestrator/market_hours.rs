use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Timelike, Utc, Weekday};

/// IST, the exchange's local time.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
const EOD_HOUR: u32 = 16;

fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

fn market_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN)
}

fn market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN)
}

fn is_weekday(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Weekday session, 09:15 to 15:30 IST inclusive.
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&ist());
    let time = local.time();
    is_weekday(local.weekday()) && time >= market_open() && time <= market_close()
}

/// The post-close hour (16:00-16:59 IST) reserved for end-of-day refreshes.
pub fn is_end_of_day(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&ist());
    is_weekday(local.weekday()) && local.hour() == EOD_HOUR
}

/// Gate for background KPI work.
pub fn is_trading_window(now: DateTime<Utc>) -> bool {
    is_market_open(now) || is_end_of_day(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2026-03-04 is a Wednesday, 2026-03-07 a Saturday
    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_session_bounds_in_ist() {
        // 03:45 UTC = 09:15 IST
        assert!(is_market_open(utc(4, 3, 45)));
        assert!(!is_market_open(utc(4, 3, 44)));
        // 10:00 UTC = 15:30 IST
        assert!(is_market_open(utc(4, 10, 0)));
        assert!(!is_market_open(utc(4, 10, 1)));
    }

    #[test]
    fn test_end_of_day_hour() {
        // 10:30 UTC = 16:00 IST
        assert!(is_end_of_day(utc(4, 10, 30)));
        assert!(is_trading_window(utc(4, 11, 29)));
        assert!(!is_trading_window(utc(4, 11, 30)));
    }

    #[test]
    fn test_weekend_is_closed() {
        assert!(!is_trading_window(utc(7, 6, 0)));
        assert!(!is_trading_window(utc(7, 10, 30)));
    }
}
