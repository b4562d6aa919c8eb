//! Minimal next-run evaluation for fixed daily cron expressions.
//!
//! Understands `minute hour * * *`: parse minute and hour, build today's
//! occurrence, roll forward one day if already past. Deliberately not a
//! general cron parser; richer expressions are approximated from their
//! minute/hour fields for display, and the injected trigger backend is
//! authoritative for real firing.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// A parsed fixed daily occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCron {
    /// Minute of the hour (0-59).
    pub minute: u32,
    /// Hour of the day (0-23), UTC.
    pub hour: u32,
}

impl DailyCron {
    /// The next occurrence strictly after `from`.
    #[must_use]
    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)
            .unwrap_or(NaiveTime::MIN);
        let today = from.date_naive().and_time(time).and_utc();
        if today > from {
            today
        } else {
            (from.date_naive() + Duration::days(1)).and_time(time).and_utc()
        }
    }
}

/// Parse the minute and hour fields of a five-field cron expression.
///
/// The day/month/weekday fields are ignored (approximated as daily);
/// non-numeric minute or hour fields are rejected.
pub fn parse(expression: &str) -> Result<DailyCron, String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "expected 5 cron fields, got {} in '{expression}'",
            fields.len()
        ));
    }

    let minute: u32 = fields[0]
        .parse()
        .map_err(|_| format!("unsupported minute field '{}'", fields[0]))?;
    let hour: u32 = fields[1]
        .parse()
        .map_err(|_| format!("unsupported hour field '{}'", fields[1]))?;

    if minute > 59 {
        return Err(format!("minute {minute} out of range"));
    }
    if hour > 23 {
        return Err(format!("hour {hour} out of range"));
    }

    Ok(DailyCron { minute, hour })
}

/// Next run time for an expression, if its minute/hour fields parse.
#[must_use]
pub fn next_run(expression: &str, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    parse(expression).ok().map(|cron| cron.next_after(from))
}
