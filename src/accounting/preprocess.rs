use csv::ReaderBuilder;
use log::debug;
use thiserror::Error;

use super::coerce::ColumnSeparator;
use super::ImportError;

pub const SNIFF_SAMPLE_LEN: usize = 128;
const SNIFF_DELIMITERS: &[u8] = b";,";
const SNIFF_QUOTES: &[u8] = b"\"'";
const MIN_CONSISTENCY: f64 = 0.9;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, PartialEq, Error)]
pub enum SniffError {
    #[error("empty sample")]
    EmptySample,
    #[error("could not determine delimiter")]
    NoDelimiter,
}

/// Input split around the first line that is neither blank nor a comment.
#[derive(Debug, PartialEq)]
pub struct SplitInput<'a> {
    pub header: &'a [u8],
    pub body: &'a [u8],
    /// 1-based line number of the header in the raw input.
    pub header_line: usize,
}

pub fn split_header(input: &[u8], separator: u8, comment: u8) -> Result<SplitInput<'_>, ImportError> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);

    let mut start = 0;
    let mut line_no = 0;
    while start < input.len() {
        line_no += 1;
        let end = input[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(input.len(), |offset| start + offset);
        let line = &input[start..end];
        let next = (end + 1).min(input.len());

        let is_blank = line.iter().all(u8::is_ascii_whitespace);
        let is_comment = matches!(line.first(), Some(&first) if first == separator || first == comment);
        if !is_blank && !is_comment {
            return Ok(SplitInput {
                header: line.strip_suffix(b"\r").unwrap_or(line),
                body: &input[next..],
                header_line: line_no,
            });
        }

        debug!("skipping leading line {}", line_no);
        start = next;
    }

    Err(ImportError::NoHeaderFound)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub double_quote: bool,
    pub escape: Option<u8>,
}

impl Default for Dialect {
    /// Semicolon separated, double quoted.
    fn default() -> Self {
        Dialect {
            delimiter: b';',
            quote: b'"',
            double_quote: true,
            escape: None,
        }
    }
}

impl Dialect {
    /// Guesses quoting and delimiter from a sample of the file.
    pub fn sniff(sample: &[u8], delimiters: &[u8]) -> Result<Dialect, SniffError> {
        let lines = sample_lines(sample);
        if lines.is_empty() {
            return Err(SniffError::EmptySample);
        }

        if let Some((quote, delimiter)) = guess_quote(&lines, delimiters) {
            let escaped = [b'\\', quote];
            let escape = sample.windows(2).any(|pair| pair == escaped).then_some(b'\\');
            return Ok(Dialect {
                delimiter,
                quote,
                double_quote: escape.is_none(),
                escape,
            });
        }

        let delimiter = guess_delimiter(&lines, delimiters).ok_or(SniffError::NoDelimiter)?;
        Ok(Dialect {
            delimiter,
            ..Dialect::default()
        })
    }

    pub fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(self.double_quote)
            .escape(self.escape);
        builder
    }
}

/// Sniffs the start of the body, falls back to the default dialect, and always
/// uses the configured separator as delimiter.
pub fn detect_dialect(body: &[u8], separator: ColumnSeparator) -> Dialect {
    let sample = &body[..body.len().min(SNIFF_SAMPLE_LEN)];
    let mut dialect = Dialect::sniff(sample, SNIFF_DELIMITERS).unwrap_or_else(|err| {
        debug!("dialect sniffing failed, using default, err={}", err);
        Dialect::default()
    });

    dialect.delimiter = separator.as_byte();
    dialect
}

/// Non-blank complete lines of the sample. A truncated last line is dropped
/// unless it is the only one.
fn sample_lines(sample: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = sample
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();

    if lines.len() > 1 && !sample.ends_with(b"\n") {
        lines.pop();
    }

    lines.retain(|line| !line.iter().all(u8::is_ascii_whitespace));
    lines
}

fn is_quoted(field: &[u8], quote: u8) -> bool {
    let field = field.trim_ascii();
    field.len() >= 2 && field[0] == quote && field[field.len() - 1] == quote
}

fn guess_quote(lines: &[&[u8]], delimiters: &[u8]) -> Option<(u8, u8)> {
    let mut best: Option<(usize, u8, u8)> = None;
    for &quote in SNIFF_QUOTES {
        for &delimiter in delimiters {
            let hits: usize = lines
                .iter()
                .filter(|line| line.contains(&delimiter))
                .map(|line| {
                    line.split(|&b| b == delimiter)
                        .filter(|field| is_quoted(field, quote))
                        .count()
                })
                .sum();

            if hits > 0 && best.map_or(true, |(top, _, _)| hits > top) {
                best = Some((hits, quote, delimiter));
            }
        }
    }

    best.map(|(_, quote, delimiter)| (quote, delimiter))
}

fn guess_delimiter(lines: &[&[u8]], delimiters: &[u8]) -> Option<u8> {
    let mut best: Option<(f64, usize, u8)> = None;
    for &delimiter in delimiters {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.iter().filter(|&&b| b == delimiter).count())
            .collect();

        let mode = counts
            .iter()
            .copied()
            .filter(|&count| count > 0)
            .max_by_key(|count| counts.iter().filter(|&&other| other == *count).count());
        let Some(mode) = mode else {
            continue;
        };

        let consistency = counts.iter().filter(|&&count| count == mode).count() as f64 / counts.len() as f64;
        if consistency < MIN_CONSISTENCY {
            continue;
        }

        if best.map_or(true, |(top, top_mode, _)| {
            consistency > top || (consistency == top && mode > top_mode)
        }) {
            best = Some((consistency, mode, delimiter));
        }
    }

    best.map(|(_, _, delimiter)| delimiter)
}
