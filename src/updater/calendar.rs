//! Trading calendar and run end date

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use std::collections::BTreeSet;

/// How far back to look for a trading day before giving up
const MAX_LOOKBACK_DAYS: usize = 366;

pub trait TradingCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// Most recent trading day on or before `date`
    fn latest_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let mut current = date;
        for _ in 0..MAX_LOOKBACK_DAYS {
            if self.is_trading_day(current) {
                return Some(current);
            }
            current = current.pred_opt()?;
        }
        None
    }
}

/// Monday to Friday, minus an optional holiday list
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }
}

/// End date of an update run started at `now`
///
/// Before `cutover_hour` the current day's data is not considered complete,
/// so the search starts from the previous day.
pub fn resolve_end_date(
    now: NaiveDateTime,
    cutover_hour: u32,
    calendar: &dyn TradingCalendar,
) -> Option<NaiveDate> {
    let day = if now.hour() < cutover_hour {
        now.date().pred_opt()?
    } else {
        now.date()
    };
    calendar.latest_trading_day(day)
}
