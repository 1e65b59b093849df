use serde::{Deserialize, Serialize};

/// Values accepted as "yes" when the set is not configured.
pub const DEFAULT_TRUTHY: &[&str] = &["si", "sí", "true", "1"];

/// 1) Strip every double quote, then surrounding whitespace.
///
/// Exports quote cells inconsistently (`"N1"`, `N1"`, `" N1 "`), so quotes are
/// removed wherever they occur rather than only at the ends.
pub fn clean_str(raw: &str) -> String {
    if raw.contains('"') {
        raw.replace('"', "").trim().to_string()
    } else {
        raw.trim().to_string()
    }
}

/// 2) Header names get the same treatment as cells.
pub fn clean_header(raw: &str) -> String {
    clean_str(raw)
}

/// 3) Comma-decimal aware number parsing: `"1,50"` → `1.5`.
///
/// Empty, unparsable and non-finite values all yield `None`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = clean_str(raw).replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Cleaned, non-empty text or `None`.
pub fn non_blank(raw: &str) -> Option<String> {
    let cleaned = clean_str(raw);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// The accepted spellings of "yes" for a status column.
///
/// Matching is done on the cleaned, lowercased cell; the first configured
/// value is the canonical spelling used when records are written back out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TruthySet {
    values: Vec<String>,
}

impl TruthySet {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for v in values {
            let v = clean_str(v.as_ref()).to_lowercase();
            if !v.is_empty() && !out.contains(&v) {
                out.push(v);
            }
        }
        if out.is_empty() {
            return Self::default();
        }
        Self { values: out }
    }

    /// Two-valued classification of a raw status cell. Missing cells are false.
    pub fn classify(&self, raw: Option<&str>) -> bool {
        match raw {
            Some(cell) => {
                let v = clean_str(cell).to_lowercase();
                self.values.iter().any(|t| *t == v)
            }
            None => false,
        }
    }

    pub fn canonical(&self) -> &str {
        &self.values[0]
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl Default for TruthySet {
    fn default() -> Self {
        Self {
            values: DEFAULT_TRUTHY.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<Vec<String>> for TruthySet {
    fn from(values: Vec<String>) -> Self {
        TruthySet::new(values)
    }
}

impl From<TruthySet> for Vec<String> {
    fn from(set: TruthySet) -> Self {
        set.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_str_strips_embedded_quotes() {
        assert_eq!(clean_str("  \"N1\" "), "N1");
        assert_eq!(clean_str("Losa\" N2"), "Losa N2");
        assert_eq!(clean_str("\"\""), "");
        assert_eq!(clean_str(" Muro "), "Muro");
    }

    #[test]
    fn parse_decimal_handles_comma_and_garbage() {
        assert_eq!(parse_decimal("1,50"), Some(1.5));
        assert_eq!(parse_decimal("\"2,25\""), Some(2.25));
        assert_eq!(parse_decimal("3.75"), Some(3.75));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("   "), None);
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal("1.234,5"), None);
        assert_eq!(parse_decimal("inf"), None);
        assert_eq!(parse_decimal("NaN"), None);
    }

    #[test]
    fn truthy_set_accepts_accents_and_case() {
        let set = TruthySet::default();
        for yes in ["Sí", "SI", " si ", "\"Sí\"", "TRUE", "1"] {
            assert!(set.classify(Some(yes)), "{yes} should be truthy");
        }
        for no in ["No", "", "0", "false", "sii", "yes"] {
            assert!(!set.classify(Some(no)), "{no} should be falsy");
        }
        assert!(!set.classify(None));
    }

    #[test]
    fn truthy_set_normalizes_configured_values() {
        let set = TruthySet::new(["  YES ", "yes", "Ok"]);
        assert_eq!(set.values(), &["yes".to_string(), "ok".to_string()]);
        assert_eq!(set.canonical(), "yes");
        assert!(set.classify(Some("OK")));

        let empty = TruthySet::new(Vec::<String>::new());
        assert_eq!(empty, TruthySet::default());
    }
}
