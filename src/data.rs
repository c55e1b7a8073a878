use std::{borrow::Cow, fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Missing,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Cell::Missing
        } else {
            Cell::Text(raw.to_string())
        }
    }

    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Cell::Number(value)
        } else {
            Cell::Missing
        }
    }

    pub fn from_option(value: Option<f64>) -> Self {
        value.map(Cell::from_f64).unwrap_or(Cell::Missing)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn is_present(&self) -> bool {
        !self.is_missing()
    }

    pub fn to_numeric(&self) -> Option<f64> {
        match self {
            Cell::Missing => None,
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => parse_number(s),
        }
    }

    pub fn key_text(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Number(n) => Some(format_number(*n)),
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }

    pub fn cleaned(&self) -> Cell {
        match self {
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Cell::Missing
                } else if trimmed.len() == s.len() {
                    self.clone()
                } else {
                    Cell::Text(trimmed.to_string())
                }
            }
            other => other.clone(),
        }
    }

    pub fn as_display(&self) -> Cow<'_, str> {
        match self {
            Cell::Missing => Cow::Borrowed(""),
            Cell::Text(s) => Cow::Borrowed(s.as_str()),
            Cell::Number(n) => Cow::Owned(format_number(*n)),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_display())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::from_f64(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::from_raw(value)
    }
}

pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = match trimmed.parse::<f64>() {
        Ok(v) => v,
        Err(_) if is_thousands_grouped(trimmed) => trimmed.replace(',', "").parse::<f64>().ok()?,
        Err(_) => return None,
    };
    parsed.is_finite().then_some(parsed)
}

// Commas only count as thousands separators in well-formed groups; "0,5" stays unparseable.
fn is_thousands_grouped(value: &str) -> bool {
    static GROUPED: OnceLock<Option<Regex>> = OnceLock::new();
    GROUPED
        .get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

pub fn parse_percent(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let digits = trimmed.strip_suffix('%').unwrap_or(trimmed);
    parse_number(digits).map(|pct| pct / 100.0)
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

pub fn format_percent(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) if r.is_finite() => format!("{:.1}%", r * 100.0),
        _ => String::from("-"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_treats_blank_as_missing() {
        assert_eq!(Cell::from_raw("   "), Cell::Missing);
        assert_eq!(Cell::from_raw(""), Cell::Missing);
        assert_eq!(Cell::from_raw(" A1 "), Cell::Text(" A1 ".into()));
    }

    #[test]
    fn non_finite_numbers_become_missing() {
        assert_eq!(Cell::from_f64(f64::INFINITY), Cell::Missing);
        assert_eq!(Cell::from_f64(f64::NAN), Cell::Missing);
        assert_eq!(Cell::from_f64(1.5), Cell::Number(1.5));
    }

    #[test]
    fn numeric_coercion_ignores_garbage() {
        assert_eq!(Cell::text(" 12.5 ").to_numeric(), Some(12.5));
        assert_eq!(Cell::text("1,200").to_numeric(), Some(1200.0));
        assert_eq!(Cell::text("-12,345.5").to_numeric(), Some(-12345.5));
        assert_eq!(parse_number("0,5"), None);
        assert_eq!(parse_number("1,2"), None);
        assert_eq!(parse_number(",,3"), None);
        assert_eq!(parse_number("1,2345"), None);
        assert_eq!(Cell::text("n/a").to_numeric(), None);
        assert_eq!(Cell::text("inf").to_numeric(), None);
        assert_eq!(Cell::Missing.to_numeric(), None);
    }

    #[test]
    fn key_text_trims_and_renders_integral_numbers() {
        assert_eq!(Cell::text("  P-100 ").key_text().as_deref(), Some("P-100"));
        assert_eq!(Cell::text("   ").key_text(), None);
        assert_eq!(Cell::Number(10.0).key_text().as_deref(), Some("10"));
    }

    #[test]
    fn percent_helpers() {
        assert_eq!(parse_percent("85%"), Some(0.85));
        assert_eq!(parse_percent("110"), Some(1.1));
        assert_eq!(format_percent(Some(0.853)), "85.3%");
        assert_eq!(format_percent(None), "-");
    }
}
