//! Primary header parsing.
//!
//! A FITS header is a sequence of 2880-byte blocks, each holding 36 cards of
//! 80 ASCII characters. A card is `KEYWORD = value / comment`, with the
//! keyword in columns 1-8 and the value indicator `= ` in columns 9-10. The
//! header ends at the `END` card.

use std::io::Read;

use crate::error::{FitsError, Result};

pub const BLOCK_SIZE: usize = 2880;
pub const CARD_SIZE: usize = 80;

/// Upper bound on header size; a primary header larger than this is corrupt.
const MAX_HEADER_BLOCKS: usize = 256;

#[derive(Debug, Clone, PartialEq)]
struct Card {
    keyword: String,
    value: String,
    quoted: bool,
}

/// Keyword to raw value mapping in header order.
///
/// String values are unquoted and trimmed; numeric and logical values are
/// kept as written, minus any trailing comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<Card>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value of the first card with this keyword.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|card| card.keyword.eq_ignore_ascii_case(keyword))
            .map(|card| card.value.as_str())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Iterate over (keyword, raw value) pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cards
            .iter()
            .map(|card| (card.keyword.as_str(), card.value.as_str()))
    }

    /// Set a string-valued card, replacing an existing one.
    pub fn set_text(&mut self, keyword: &str, value: &str) {
        self.set(keyword, value.to_string(), true);
    }

    /// Set a numeric or logical card, replacing an existing one.
    pub fn set_raw(&mut self, keyword: &str, value: impl ToString) {
        self.set(keyword, value.to_string(), false);
    }

    pub fn remove(&mut self, keyword: &str) {
        self.cards
            .retain(|card| !card.keyword.eq_ignore_ascii_case(keyword));
    }

    fn set(&mut self, keyword: &str, value: String, quoted: bool) {
        let keyword = keyword.to_ascii_uppercase();
        match self.cards.iter_mut().find(|card| card.keyword == keyword) {
            Some(card) => {
                card.value = value;
                card.quoted = quoted;
            }
            None => self.cards.push(Card {
                keyword,
                value,
                quoted,
            }),
        }
    }

    /// Read the primary header from the start of a stream.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = FitsHeader::new();
        let mut block = [0u8; BLOCK_SIZE];
        let mut index = 0usize;

        for block_number in 0..MAX_HEADER_BLOCKS {
            if let Err(err) = reader.read_exact(&mut block) {
                if err.kind() == std::io::ErrorKind::UnexpectedEof {
                    return Err(FitsError::MissingEnd(block_number * BLOCK_SIZE));
                }
                return Err(err.into());
            }

            for raw in block.chunks_exact(CARD_SIZE) {
                if !raw.iter().all(|b| (0x20..=0x7e).contains(b)) {
                    return Err(FitsError::InvalidCard {
                        index,
                        reason: "non-printable characters".to_string(),
                    });
                }
                // Checked printable ASCII above.
                let text = std::str::from_utf8(raw).map_err(|e| FitsError::InvalidCard {
                    index,
                    reason: e.to_string(),
                })?;

                if index == 0 && !text.starts_with("SIMPLE  =") {
                    return Err(FitsError::InvalidFormat(
                        "first card is not SIMPLE".to_string(),
                    ));
                }

                let keyword = text[..8].trim_end();
                if keyword == "END" {
                    return Ok(header);
                }
                if let Some(card) = parse_card(keyword, &text[8..], index)? {
                    if !header.contains(&card.keyword) {
                        header.cards.push(card);
                    }
                }
                index += 1;
            }
        }

        Err(FitsError::MissingEnd(MAX_HEADER_BLOCKS * BLOCK_SIZE))
    }

    /// Serialise as a primary header, padded to a whole number of blocks.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_SIZE);
        if !self.contains("SIMPLE") {
            out.extend_from_slice(&format_card("SIMPLE", "T", false));
        }
        for card in &self.cards {
            out.extend_from_slice(&format_card(&card.keyword, &card.value, card.quoted));
        }
        out.extend_from_slice(&format!("{:<80}", "END").into_bytes());
        let padding = (BLOCK_SIZE - out.len() % BLOCK_SIZE) % BLOCK_SIZE;
        out.resize(out.len() + padding, b' ');
        out
    }
}

fn parse_card(keyword: &str, rest: &str, index: usize) -> Result<Option<Card>> {
    if keyword.is_empty() || keyword == "COMMENT" || keyword == "HISTORY" {
        return Ok(None);
    }
    let Some(value_field) = rest.strip_prefix("= ") else {
        return Ok(None);
    };
    let value_field = value_field.trim_start();

    let (value, quoted) = if let Some(quoted) = value_field.strip_prefix('\'') {
        (parse_string(quoted, index)?, true)
    } else {
        let value = match value_field.find('/') {
            Some(pos) => &value_field[..pos],
            None => value_field,
        };
        (value.trim().to_string(), false)
    };

    Ok(Some(Card {
        keyword: keyword.to_string(),
        value,
        quoted,
    }))
}

/// Parse a quoted string whose opening quote has been consumed.
fn parse_string(text: &str, index: usize) -> Result<String> {
    let mut value = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                value.push('\'');
                chars.next();
            } else {
                return Ok(value.trim().to_string());
            }
        } else {
            value.push(c);
        }
    }
    Err(FitsError::InvalidCard {
        index,
        reason: "unterminated string".to_string(),
    })
}

fn format_card(keyword: &str, value: &str, quoted: bool) -> Vec<u8> {
    let value = if quoted {
        // Strings are padded to at least eight characters inside the quotes.
        format!("'{:<8}'", value.replace('\'', "''"))
    } else {
        format!("{:>20}", value)
    };
    let mut card = format!("{:<8}= {}", keyword, value);
    card.truncate(CARD_SIZE);
    format!("{:<80}", card).into_bytes()
}
