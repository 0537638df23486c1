//! Issued letter numbers: `<seq:03>/<CODE>/<roman month>/<year>`, e.g. `007/SKD/X/2026`.

use chrono::{DateTime, Datelike, Utc};

const ROMAN_MONTHS: [&str; 12] = [
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
];

/// Roman numeral for a 1-based month. Out-of-range input yields `None`.
pub fn roman_month(month: u32) -> Option<&'static str> {
    month
        .checked_sub(1)
        .and_then(|i| ROMAN_MONTHS.get(i as usize).copied())
}

/// Format the number for the `sequence`-th approval (1-based) of a letter type
/// whose code is `code`, approved at `approved_at`.
pub fn format_letter_number(sequence: u32, code: &str, approved_at: DateTime<Utc>) -> String {
    let month = roman_month(approved_at.month()).unwrap_or("I");
    format!(
        "{:03}/{}/{}/{}",
        sequence,
        code.trim().to_uppercase(),
        month,
        approved_at.year()
    )
}
