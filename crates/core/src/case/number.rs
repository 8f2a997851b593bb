//! Judicial case numbers (`NNNNNNN-DD.YYYY.J.TR.OOOO`).

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static CASE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{7})-(\d{2})\.(\d{4})\.(\d)\.(\d{2})\.(\d{4})$")
        .expect("case number pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseNumberError {
    #[error("Case number is empty")]
    Empty,

    #[error("Invalid case number format: '{0}' (expected NNNNNNN-DD.YYYY.J.TR.OOOO)")]
    InvalidFormat(String),
}

/// A parsed judicial case number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseNumber {
    pub sequential: String,
    pub digit: String,
    pub year: String,
    pub segment: String,
    pub tribunal: String,
    pub court: String,
}

impl CaseNumber {
    /// Parse a case number, accepting surrounding whitespace and stray
    /// decoration. A bare run of 20 digits is also accepted.
    pub fn parse(input: &str) -> Result<Self, CaseNumberError> {
        let cleaned: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
            .collect();

        if cleaned.is_empty() {
            return Err(CaseNumberError::Empty);
        }

        if cleaned.len() == 20 && cleaned.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Self {
                sequential: cleaned[0..7].to_string(),
                digit: cleaned[7..9].to_string(),
                year: cleaned[9..13].to_string(),
                segment: cleaned[13..14].to_string(),
                tribunal: cleaned[14..16].to_string(),
                court: cleaned[16..20].to_string(),
            });
        }

        let caps = CASE_NUMBER_RE
            .captures(&cleaned)
            .ok_or_else(|| CaseNumberError::InvalidFormat(input.trim().to_string()))?;

        Ok(Self {
            sequential: caps[1].to_string(),
            digit: caps[2].to_string(),
            year: caps[3].to_string(),
            segment: caps[4].to_string(),
            tribunal: caps[5].to_string(),
            court: caps[6].to_string(),
        })
    }

    /// File-system safe stem for the artifact of this case.
    pub fn file_stem(&self) -> String {
        sanitize_file_stem(&self.to_string())
    }
}

impl fmt::Display for CaseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}.{}.{}.{}.{}",
            self.sequential, self.digit, self.year, self.segment, self.tribunal, self.court
        )
    }
}

impl FromStr for CaseNumber {
    type Err = CaseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Replace characters that are not allowed in file names with `_`.
pub fn sanitize_file_stem(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formatted() {
        let number = CaseNumber::parse("5001234-56.2023.8.13.0024").unwrap();
        assert_eq!(number.sequential, "5001234");
        assert_eq!(number.digit, "56");
        assert_eq!(number.year, "2023");
        assert_eq!(number.segment, "8");
        assert_eq!(number.tribunal, "13");
        assert_eq!(number.court, "0024");
        assert_eq!(number.to_string(), "5001234-56.2023.8.13.0024");
    }

    #[test]
    fn test_parse_strips_decoration() {
        let number = CaseNumber::parse("  nº 5001234-56.2023.8.13.0024 ").unwrap();
        assert_eq!(number.to_string(), "5001234-56.2023.8.13.0024");
    }

    #[test]
    fn test_parse_bare_digits() {
        let number: CaseNumber = "50012345620238130024".parse().unwrap();
        assert_eq!(number.to_string(), "5001234-56.2023.8.13.0024");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(CaseNumber::parse("   "), Err(CaseNumberError::Empty));
        assert!(matches!(
            CaseNumber::parse("123-45"),
            Err(CaseNumberError::InvalidFormat(_))
        ));
        assert!(CaseNumber::parse("5001234-56.2023.8.13.002").is_err());
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_file_stem(" 0001 "), "0001");
    }

    #[test]
    fn test_file_stem_keeps_canonical_form() {
        let number = CaseNumber::parse("5001234-56.2023.8.13.0024").unwrap();
        assert_eq!(number.file_stem(), "5001234-56.2023.8.13.0024");
    }
}
