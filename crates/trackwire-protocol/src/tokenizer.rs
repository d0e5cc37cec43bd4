//! Whitespace-separated field reader for ASCII record bodies.
//!
//! Spaces and tabs between fields are skipped; `\r` and `\n` are record
//! terminators and are never skipped, so a reader can not run into the next
//! record. Any failure leaves the position where the failing field started.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("expected '{expected}' at column {column}")]
    ExpectedChar { expected: char, column: usize },
    #[error("expected a number at column {column}")]
    ExpectedNumber { column: usize },
    #[error("number out of range at column {column}")]
    Overflow { column: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Return to a position previously obtained from [`Tokenizer::position`].
    pub fn rewind(&mut self, position: usize) {
        self.pos = position.min(self.input.len());
    }

    fn skip_blanks(&mut self) {
        while matches!(self.input.get(self.pos), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    /// Next significant character, without consuming it.
    pub fn peek_char(&mut self) -> Option<char> {
        self.skip_blanks();
        match self.input.get(self.pos) {
            Some(b'\r' | b'\n') | None => None,
            Some(&b) => Some(char::from(b)),
        }
    }

    /// No significant characters left before the record terminator.
    pub fn at_end(&mut self) -> bool {
        self.peek_char().is_none()
    }

    pub fn expect_char(&mut self, expected: char) -> Result<(), TokenError> {
        if self.peek_char() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(TokenError::ExpectedChar {
                expected,
                column: self.pos,
            })
        }
    }

    /// Consume `expected` if it is next.
    pub fn eat_char(&mut self, expected: char) -> bool {
        self.expect_char(expected).is_ok()
    }

    fn token(&mut self, accept: impl Fn(u8) -> bool) -> Result<(&'a str, usize), TokenError> {
        self.skip_blanks();
        let start = self.pos;
        let len = self
            .input
            .get(start..)
            .map(|rest| rest.iter().take_while(|&&b| accept(b)).count())
            .unwrap_or(0);
        let text = self
            .input
            .get(start..start + len)
            .and_then(|s| std::str::from_utf8(s).ok())
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::ExpectedNumber { column: start })?;
        Ok((text, start))
    }

    pub fn read_int(&mut self) -> Result<i64, TokenError> {
        let (text, start) = self.token(|b| b.is_ascii_digit() || b == b'-' || b == b'+')?;
        let value = parse_number::<i64>(text, start)?;
        self.pos = start + text.len();
        Ok(value)
    }

    pub fn read_unsigned_int(&mut self) -> Result<u64, TokenError> {
        let (text, start) = self.token(|b| b.is_ascii_digit() || b == b'+')?;
        let value = parse_number::<u64>(text, start)?;
        self.pos = start + text.len();
        Ok(value)
    }

    pub fn read_float(&mut self) -> Result<f64, TokenError> {
        let (text, start) = self.token(|b| {
            b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E')
        })?;
        let value = text
            .parse::<f64>()
            .ok()
            .ok_or(TokenError::ExpectedNumber { column: start })?;
        self.pos = start + text.len();
        Ok(value)
    }

    /// Read floats into `out` up to a closing `]`, which is consumed.
    ///
    /// Returns how many values were read. More values than `out` holds is an
    /// error.
    pub fn read_float_group(&mut self, out: &mut [f64]) -> Result<usize, TokenError> {
        let start = self.pos;
        let result = self.read_float_group_inner(out);
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    fn read_float_group_inner(&mut self, out: &mut [f64]) -> Result<usize, TokenError> {
        self.expect_char('[')?;
        let mut count = 0;
        while !self.eat_char(']') {
            let value = self.read_float()?;
            let slot = out.get_mut(count).ok_or(TokenError::ExpectedChar {
                expected: ']',
                column: self.pos,
            })?;
            *slot = value;
            count += 1;
        }
        Ok(count)
    }
}

fn parse_number<T: std::str::FromStr<Err = std::num::ParseIntError>>(
    text: &str,
    column: usize,
) -> Result<T, TokenError> {
    text.parse::<T>().map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
            TokenError::Overflow { column }
        }
        _ => TokenError::ExpectedNumber { column },
    })
}
