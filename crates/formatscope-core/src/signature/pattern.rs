//! Textual byte-pattern syntax used by signature files.
//!
//! ```text
//! 50 4B 03 04          literal bytes (two hex digits each, spacing optional)
//! ??                   any single byte
//! 'PK'                 ASCII literal
//! {4}  {0-8}  {2-*}  * gaps: exact, bounded, unbounded
//! ```
//!
//! A gap closes the current fragment. Patterns may not begin or end with
//! a gap and may not contain two adjacent gaps.

use crate::diagnostics::ConfigError;

use super::model::{ByteFragment, Gap, SubSequence};

/// Parse a pattern into a sub-sequence with a zero leading offset.
pub fn parse_pattern(pattern: &str) -> Result<SubSequence, ConfigError> {
    Parser::new(pattern).parse()
}

/// Parse a standalone gap such as `{4}`, `{0-8}`, `{2-*}` or `*`.
pub fn parse_gap(text: &str) -> Result<Gap, ConfigError> {
    let trimmed = text.trim();
    let lead = text.len() - text.trim_start().len();
    let mut parser = Parser::new(trimmed);
    let gap = match parser.peek() {
        Some(b'*') => {
            parser.pos += 1;
            Gap::at_least(0)
        }
        Some(b'{') => parser.gap()?,
        _ => return Err(invalid(text, lead, "expected a gap like {n}, {n-m}, {n-*} or *")),
    };
    if parser.pos != trimmed.len() {
        return Err(invalid(text, lead + parser.pos, "unexpected text after gap"));
    }
    Ok(gap)
}

fn invalid(pattern: &str, position: usize, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        position,
        message: message.into(),
    }
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, position: usize, message: &str) -> ConfigError {
        invalid(self.text, position, message)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<SubSequence, ConfigError> {
        let mut fragments = Vec::new();
        let mut gaps = Vec::new();
        let mut current: Vec<Option<u8>> = Vec::new();
        // Position of the most recent gap, for error reporting.
        let mut pending_gap: Option<usize> = None;

        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(b) = self.peek() else { break };
            match b {
                b'{' | b'*' => {
                    if current.is_empty() {
                        let message = if fragments.is_empty() {
                            "pattern cannot start with a gap"
                        } else {
                            "adjacent gaps are not allowed"
                        };
                        return Err(self.error(start, message));
                    }
                    let gap = if b == b'*' {
                        self.pos += 1;
                        Gap::at_least(0)
                    } else {
                        self.gap()?
                    };
                    fragments.push(ByteFragment::new(std::mem::take(&mut current)));
                    gaps.push(gap);
                    pending_gap = Some(start);
                }
                b'?' => {
                    if self.bytes.get(self.pos + 1) != Some(&b'?') {
                        return Err(self.error(start, "wildcard must be written as ??"));
                    }
                    self.pos += 2;
                    current.push(None);
                }
                b'\'' => {
                    self.pos += 1;
                    let literal_start = self.pos;
                    while self.peek().is_some_and(|c| c != b'\'') {
                        self.pos += 1;
                    }
                    if self.peek().is_none() {
                        return Err(self.error(start, "unterminated quoted literal"));
                    }
                    if self.pos == literal_start {
                        return Err(self.error(start, "empty quoted literal"));
                    }
                    current.extend(self.bytes[literal_start..self.pos].iter().copied().map(Some));
                    self.pos += 1;
                }
                _ => {
                    let hi = hex_value(b).ok_or_else(|| self.error(start, "unexpected character"))?;
                    let lo = self
                        .bytes
                        .get(self.pos + 1)
                        .copied()
                        .and_then(hex_value)
                        .ok_or_else(|| self.error(start, "hex bytes need two digits"))?;
                    self.pos += 2;
                    current.push(Some((hi << 4) | lo));
                }
            }
        }

        if current.is_empty() {
            return Err(match pending_gap {
                Some(pos) => self.error(pos, "pattern cannot end with a gap"),
                None => self.error(0, "pattern has no fragments"),
            });
        }
        fragments.push(ByteFragment::new(current));
        Ok(SubSequence::new(fragments, gaps))
    }

    /// Parse `{n}`, `{n-m}` or `{n-*}` at the current position.
    fn gap(&mut self) -> Result<Gap, ConfigError> {
        let start = self.pos;
        debug_assert_eq!(self.peek(), Some(b'{'));
        let close = self.text[start..]
            .find('}')
            .map(|i| start + i)
            .ok_or_else(|| self.error(start, "unterminated gap"))?;
        let body = self.text[start + 1..close].trim();
        let gap = match body.split_once('-') {
            None => Gap::exact(self.number(body, start)?),
            Some((min, "*")) => Gap::at_least(self.number(min.trim(), start)?),
            Some((min, max)) => {
                let min = self.number(min.trim(), start)?;
                let max = self.number(max.trim(), start)?;
                if max < min {
                    return Err(self.error(start, "gap maximum is below its minimum"));
                }
                Gap::between(min, max)
            }
        };
        self.pos = close + 1;
        Ok(gap)
    }

    fn number(&self, text: &str, position: usize) -> Result<usize, ConfigError> {
        text.parse::<usize>()
            .map_err(|_| self.error(position, "gap bounds must be non-negative integers"))
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
