use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

/// Renders seconds as `MM:SS`, or `HH:MM:SS` once an hour has passed.
pub fn format_clock(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// `Sunday, October 18, 2026`
pub fn format_long_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

pub fn format_scope(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            info!(source, timezone = %trimmed, "configured timezone");
            Some(tz)
        }
        Err(err) => {
            warn!(
                source,
                timezone = %trimmed,
                error = %err,
                "failed to parse timezone id; using system local time"
            );
            None
        }
    }
}

/// Calendar day of `now` in `tz`, or in the system zone when unset.
pub fn today_in(tz: Option<Tz>, now: DateTime<Utc>) -> NaiveDate {
    match tz {
        Some(tz) => now.with_timezone(&tz).date_naive(),
        None => now.with_timezone(&Local).date_naive(),
    }
}

/// Resolves a scope expression against `today`.
///
/// Accepts `today`, `yesterday`, `tomorrow`, `YYYY-MM-DD` and signed day
/// offsets such as `+2` or `-1`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_scope(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "" => return Err(anyhow!("date expression is empty")),
        "today" | "now" => return Ok(today),
        "yesterday" => return shift_days(today, -1),
        "tomorrow" => return shift_days(today, 1),
        _ => {}
    }

    if let Some(rest) = token.strip_prefix(['+', '-']) {
        let magnitude: i64 = rest
            .parse()
            .with_context(|| format!("invalid day offset: {token}"))?;
        let offset = if token.starts_with('-') {
            -magnitude
        } else {
            magnitude
        };
        return shift_days(today, offset);
    }

    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, today, yesterday, tomorrow or +N/-N: {token}"))
}

pub fn shift_days(date: NaiveDate, days: i64) -> anyhow::Result<NaiveDate> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| anyhow!("date out of range: {date} shifted by {days} days"))
}
