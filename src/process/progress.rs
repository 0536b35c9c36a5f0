//! Percentage parsing for external downloader output

use regex::Regex;
use std::sync::OnceLock;

/// Matches `12%`, `12.5%` and `-5%`; the sign is kept so negatives clamp to zero
const PERCENT_PATTERN: &str = r"(-)?(\d+(?:\.\d+)?)%";

fn percent_regex() -> Option<&'static Regex> {
    static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
    PERCENT.get_or_init(|| Regex::new(PERCENT_PATTERN).ok()).as_ref()
}

/// Extract the first percentage from a line of output
///
/// The value is rounded to the nearest integer and clamped to `0..=100`.
/// Returns `None` when the line carries no percentage.
///
/// # Examples
///
/// ```
/// use fetch_dl::process::parse_percent;
///
/// assert_eq!(parse_percent("[download]  12.5% of ~10MiB"), Some(13));
/// assert_eq!(parse_percent("downloading..."), None);
/// assert_eq!(parse_percent("150%"), Some(100));
/// assert_eq!(parse_percent("-5%"), Some(0));
/// ```
pub fn parse_percent(line: &str) -> Option<u8> {
    if !line.contains('%') {
        return None;
    }

    let captures = percent_regex()?.captures(line)?;
    let value: f64 = captures.get(2)?.as_str().parse().ok()?;
    if captures.get(1).is_some() {
        return Some(0);
    }

    Some(value.round().clamp(0.0, 100.0) as u8)
}
