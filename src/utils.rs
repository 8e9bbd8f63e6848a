use crate::error::{Result, SnapshotError};
use crate::snapshot::Cell;
use chrono::{Datelike, NaiveDate};

/// Returns January 1st of the year a period label starts with.
///
/// # Examples
/// - `"2025"` -> 2025-01-01
/// - `"2025_download"` -> 2025-01-01
pub fn label_cutoff(label: &str) -> Result<NaiveDate> {
    let year = label_year(label).ok_or_else(|| SnapshotError::InvalidPeriodLabel(label.to_string()))?;
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| SnapshotError::InvalidPeriodLabel(label.to_string()))
}

pub fn label_year(label: &str) -> Option<i32> {
    let trimmed = label.trim();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

/// Parses a fiscal-period cell to a date.
///
/// Integer cells are read as `YYYYMM`. Everything else goes through
/// [`parse_period_str`].
pub fn parse_fiscal_period(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Null => None,
        Cell::Int(value) => parse_compact_month(&value.to_string()),
        Cell::Float(_) => None,
        Cell::Text(text) => parse_period_str(text),
    }
}

/// Accepts `YYYY-MM`, `YYYY/MM`, `YYYY.MM`, `YYYY-MM-DD`, `YYYY/MM/DD` and `YYYYMM`.
///
/// A day is kept when present; month-only spellings land on the first of the month.
pub fn parse_period_str(period: &str) -> Option<NaiveDate> {
    let period = period.trim();
    if period.is_empty() {
        return None;
    }

    let parts: Vec<&str> = period.split(['-', '/', '.']).collect();

    match parts.len() {
        1 => parse_compact_month(parts[0]),
        2 | 3 => {
            if parts[0].len() != 4 {
                return None;
            }
            let year: i32 = parts[0].parse().ok()?;
            let month: u32 = parts[1].parse().ok()?;
            let day: u32 = match parts.get(2) {
                Some(day) => day.parse().ok()?,
                None => 1,
            };
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}

/// First day of the month `date` falls in.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn parse_compact_month(text: &str) -> Option<NaiveDate> {
    if text.len() != 6 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = text[..4].parse().ok()?;
    let month: u32 = text[4..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}
