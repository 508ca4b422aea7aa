use std::str::FromStr;

use rust_decimal::Decimal;

use super::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSeparator {
    Comma,
    Semicolon,
}

impl ColumnSeparator {
    pub fn as_byte(&self) -> u8 {
        match self {
            ColumnSeparator::Comma => b',',
            ColumnSeparator::Semicolon => b';',
        }
    }

    pub fn as_char(&self) -> char {
        self.as_byte() as char
    }
}

impl TryFrom<char> for ColumnSeparator {
    type Error = ImportError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            ',' => Ok(ColumnSeparator::Comma),
            ';' => Ok(ColumnSeparator::Semicolon),
            _ => Err(ImportError::InvalidOption {
                option: "column separator",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalSeparator {
    Dot,
    Comma,
}

impl DecimalSeparator {
    /// Digit grouping character: whichever of `.` and `,` is not the decimal mark.
    pub fn thousands(&self) -> char {
        match self {
            DecimalSeparator::Dot => ',',
            DecimalSeparator::Comma => '.',
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            DecimalSeparator::Dot => '.',
            DecimalSeparator::Comma => ',',
        }
    }

    fn normalize(&self, text: &str) -> String {
        text.trim()
            .replace(self.thousands(), "")
            .replace(self.as_char(), ".")
    }
}

impl TryFrom<char> for DecimalSeparator {
    type Error = ImportError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '.' => Ok(DecimalSeparator::Dot),
            ',' => Ok(DecimalSeparator::Comma),
            _ => Err(ImportError::InvalidOption {
                option: "decimal separator",
                value,
            }),
        }
    }
}

/// Parses a locale formatted number. Empty text is zero, `None` means unparsable.
pub fn parse_decimal(text: &str, separator: DecimalSeparator) -> Option<Decimal> {
    if text.is_empty() {
        return Some(Decimal::ZERO);
    }

    let normalized = separator.normalize(text);
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// Same separator handling as [`parse_decimal`], but only whole numbers are accepted.
pub fn parse_integer(text: &str, separator: DecimalSeparator) -> Option<i64> {
    if text.is_empty() {
        return Some(0);
    }

    separator.normalize(text).parse::<i64>().ok()
}
