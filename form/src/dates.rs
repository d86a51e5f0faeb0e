use chrono::NaiveDate;

/// Parse a birth date as sent by the backend or typed by the reviewer.
///
/// Accepts `YYYY-MM-DD` and the card's printed `DD MM YYYY` (day and month
/// may be single digits).
pub fn parse_birth_date(raw: &str) -> Result<NaiveDate, DateError> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split_whitespace().collect();

    let iso = match parts.as_slice() {
        [day, month, year] => format!("{year}-{month:0>2}-{day:0>2}"),
        [single] => (*single).to_string(),
        _ => return Err(DateError::Unrecognized(raw.to_string())),
    };

    NaiveDate::parse_from_str(&iso, "%Y-%m-%d").map_err(|_| DateError::Unrecognized(raw.to_string()))
}

/// Completed years between `birth` and `today`; `None` for a date in the future.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    today.years_since(birth)
}

pub fn format_age(years: impl std::fmt::Display) -> String {
    format!("{years} AÑOS")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    #[error("unrecognized date '{0}', expected YYYY-MM-DD or DD MM YYYY")]
    Unrecognized(String),
}
