//! Time chunking
//!
//! Splits an inclusive calendar-date range into contiguous windows no longer
//! than a strategy's maximum span. Each window carries the instants sent to
//! the API: midnight of its first day and midnight of the day after its last
//! day, both in the configured timezone.

use chrono::{DateTime, Days, NaiveDate, TimeZone};
use chrono_tz::Tz;

use super::{ExtractError, ExtractResult};

/// Format of `start_time` / `end_time` query parameters
pub const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// One contiguous slice of the requested date range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    /// First day (inclusive)
    pub start_date: NaiveDate,
    /// Last day (inclusive)
    pub end_date: NaiveDate,
    /// Midnight of `start_date`
    pub start_time: DateTime<Tz>,
    /// Midnight of the day after `end_date` (exclusive)
    pub end_time: DateTime<Tz>,
}

impl TimeWindow {
    /// Window covering `[start_date, end_date]` in `tz`
    ///
    /// # Errors
    /// Returns an error if `end_date` precedes `start_date` or a boundary is
    /// outside chrono's supported range.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, tz: Tz) -> ExtractResult<Self> {
        if end_date < start_date {
            return Err(ExtractError::InvalidArgument(format!(
                "end date {end_date} is before start date {start_date}"
            )));
        }
        let day_after = end_date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ExtractError::InvalidArgument(format!("date out of range: {end_date}")))?;

        Ok(Self {
            start_date,
            end_date,
            start_time: midnight(start_date, tz)?,
            end_time: midnight(day_after, tz)?,
        })
    }

    /// Number of calendar days covered
    pub fn days(&self) -> u64 {
        (self.end_date - self.start_date).num_days() as u64 + 1
    }

    /// `start_time` formatted for the API
    pub fn api_start_time(&self) -> String {
        self.start_time.format(API_TIME_FORMAT).to_string()
    }

    /// `end_time` formatted for the API
    pub fn api_end_time(&self) -> String {
        self.end_time.format(API_TIME_FORMAT).to_string()
    }
}

/// First instant of `date` in `tz`
///
/// Where a DST transition skips local midnight, the first existing hour of
/// the day is used instead.
pub fn midnight(date: NaiveDate, tz: Tz) -> ExtractResult<DateTime<Tz>> {
    (0..24)
        .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .ok_or_else(|| {
            ExtractError::InvalidArgument(format!("{date} has no representable start in {tz}"))
        })
}

/// Split `[start_date, end_date]` into greedy windows of at most `max_span_days`
///
/// # Errors
/// Returns an error if the range is inverted or `max_span_days` is zero.
pub fn split(
    start_date: NaiveDate,
    end_date: NaiveDate,
    max_span_days: u32,
    tz: Tz,
) -> ExtractResult<Vec<TimeWindow>> {
    if max_span_days == 0 {
        return Err(ExtractError::InvalidArgument(
            "window span must be at least one day".to_string(),
        ));
    }
    if end_date < start_date {
        return Err(ExtractError::InvalidArgument(format!(
            "end date {end_date} is before start date {start_date}"
        )));
    }

    let mut windows = Vec::new();
    let mut window_start = start_date;
    loop {
        let span_end = window_start
            .checked_add_days(Days::new(u64::from(max_span_days) - 1))
            .unwrap_or(end_date);
        let window_end = span_end.min(end_date);
        windows.push(TimeWindow::new(window_start, window_end, tz)?);

        if window_end >= end_date {
            break;
        }
        window_start = window_end
            .succ_opt()
            .ok_or_else(|| ExtractError::InvalidArgument(format!("date out of range: {window_end}")))?;
    }
    Ok(windows)
}

/// Parse an IANA timezone name such as `Asia/Tokyo` or `UTC`
pub fn parse_timezone(name: &str) -> Result<Tz, String> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| format!("invalid timezone: {name}"))
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(input: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{input}': {e}"))
}
