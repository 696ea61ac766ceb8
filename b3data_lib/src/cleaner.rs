//! Normalization of scraped text, numbers and dates.
//!
//! Every cleaner maps malformed input to `None` instead of failing: scraped
//! pages are noisy and a single bad cell must not abort an ingest.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::{Regex, RegexBuilder};

use crate::record::{Record, Scalar};

/// Stored form of cleaned timestamps.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?[0-9.,]*[0-9][0-9.,]*$").expect("static regex"))
}

/// Stateless cleaner for scraped fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataCleaner;

impl DataCleaner {
    /// Trims, collapses whitespace runs and removes each of `words_to_remove`
    /// case-insensitively. Blank results are `None`.
    pub fn clean_text(&self, text: Option<&str>, words_to_remove: &[&str]) -> Option<String> {
        let mut out = collapse(text?);
        for word in words_to_remove.iter().filter(|w| !w.is_empty()) {
            let Ok(re) = RegexBuilder::new(&regex::escape(word))
                .case_insensitive(true)
                .build()
            else {
                continue;
            };
            out = re.replace_all(&out, "").into_owned();
        }
        let out = collapse(&out);
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Parses `1.234,56`, `1,234.56`, `1234,56` or `1234.56`.
    ///
    /// When both separators appear the right-most one is the decimal mark. A
    /// separator that appears more than once is a thousands separator; a single
    /// one is the decimal mark.
    pub fn clean_number(&self, text: Option<&str>) -> Option<f64> {
        let compact: String = text?.chars().filter(|c| !c.is_whitespace()).collect();
        if !number_re().is_match(&compact) {
            return None;
        }

        let last_dot = compact.rfind('.');
        let last_comma = compact.rfind(',');
        let normalized = match (last_dot, last_comma) {
            (Some(d), Some(c)) => {
                let (decimal, thousands) = if d > c { ('.', ',') } else { (',', '.') };
                let (whole, fraction) = compact.split_at(d.max(c));
                if whole.contains(decimal) || !thousands_grouped(whole, thousands) {
                    return None;
                }
                format!("{}.{}", whole.replace(thousands, ""), &fraction[1..])
            }
            (Some(_), None) => single_separator(&compact, '.')?,
            (None, Some(_)) => single_separator(&compact, ',')?,
            (None, None) => compact,
        };

        normalized.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Parses ISO-8601 timestamps and plain dates, dropping any UTC offset
    /// and keeping the wall-clock time. B3's `DD/MM/YYYY` is accepted too.
    pub fn clean_date(&self, text: Option<&str>) -> Option<NaiveDateTime> {
        let raw = text?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_local());
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(dt);
            }
        }
        for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
            if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
                return d.and_hms_opt(0, 0, 0);
            }
        }
        None
    }

    /// Returns a copy of `entry` with the named fields cleaned. Fields not
    /// named, and named fields absent from the entry, are left as they are.
    pub fn clean_dict_fields(
        &self,
        entry: &Record,
        text_keys: &[&str],
        date_keys: &[&str],
        number_keys: &[&str],
    ) -> Record {
        let mut out = entry.clone();
        for key in text_keys {
            if let Some(cell) = entry.get(*key) {
                let cleaned = self.clean_text(cell_text(cell).as_deref(), &[]);
                out.insert(key.to_string(), cleaned.into());
            }
        }
        for key in date_keys {
            if let Some(cell) = entry.get(*key) {
                let cleaned = self
                    .clean_date(cell_text(cell).as_deref())
                    .map(|dt| dt.format(DATE_FORMAT).to_string());
                out.insert(key.to_string(), cleaned.into());
            }
        }
        for key in number_keys {
            if let Some(cell) = entry.get(*key) {
                let cleaned = match cell {
                    Scalar::Text(s) => self.clean_number(Some(s)),
                    other => other.as_f64().filter(|v| v.is_finite()),
                };
                out.insert(key.to_string(), cleaned.into());
            }
        }
        out
    }
}

fn collapse(text: &str) -> String {
    whitespace_re().replace_all(text.trim(), " ").into_owned()
}

fn cell_text(cell: &Scalar) -> Option<String> {
    match cell {
        Scalar::Null => None,
        other => Some(other.to_display()),
    }
}

/// Resolves a number that uses only one kind of separator.
fn single_separator(text: &str, sep: char) -> Option<String> {
    let parts: Vec<&str> = text.split(sep).collect();
    if parts.len() == 2 {
        return Some(format!("{}.{}", parts[0], parts[1]));
    }
    if thousands_grouped(text, sep) {
        Some(parts.concat())
    } else {
        None
    }
}

/// Thousands grouping: a leading group of one to three digits, then groups of three.
fn thousands_grouped(whole: &str, sep: char) -> bool {
    let mut groups = whole.split(sep);
    let lead = groups
        .next()
        .unwrap_or_default()
        .trim_start_matches(['+', '-']);
    (1..=3).contains(&lead.len()) && groups.all(|g| g.len() == 3)
}
