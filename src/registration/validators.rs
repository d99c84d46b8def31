use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{7,15}$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

// Range check only; the day is not validated against the month, so 31-02
// passes.
pub fn is_valid_birthday(day: u8, month: u8) -> bool {
    (1..=31).contains(&day) && (1..=12).contains(&month)
}

// Parses a `DD-MM` answer into a (day, month) pair.
pub fn parse_birthday(text: &str) -> Option<(u8, u8)> {
    let (day, month) = text.trim().split_once('-')?;
    let day: u8 = day.trim().parse().ok()?;
    let month: u8 = month.trim().parse().ok()?;

    is_valid_birthday(day, month).then_some((day, month))
}
