//! Card identifier validation (length gate + Luhn checksum).
//!
//! Every identifier goes through both checks. There are no prefix exemptions.

use crate::error::CardError;

pub const MIN_CARD_DIGITS: usize = 13;
pub const MAX_CARD_DIGITS: usize = 19;

/// A card number that passed validation, stored as bare digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCard {
    digits: String,
}

impl ValidatedCard {
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// First `n` digits (or all of them when shorter).
    pub fn prefix(&self, n: usize) -> &str {
        &self.digits[..n.min(self.digits.len())]
    }

    /// Masked form safe for logs: first six and last four digits.
    pub fn masked(&self) -> String {
        let len = self.digits.len();
        format!(
            "{}{}{}",
            &self.digits[..6],
            "*".repeat(len - 10),
            &self.digits[len - 4..]
        )
    }
}

/// Structural and checksum validator for card identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardValidator;

impl CardValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a card identifier. Spaces and hyphens are stripped first.
    pub fn validate(&self, card: &str) -> Result<ValidatedCard, CardError> {
        let mut digits = String::with_capacity(card.len());
        for c in card.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' => {}
                _ => return Err(CardError::InvalidFormat),
            }
        }

        if !(MIN_CARD_DIGITS..=MAX_CARD_DIGITS).contains(&digits.len()) {
            return Err(CardError::InvalidLength {
                digits: digits.len(),
            });
        }

        if !luhn_valid(&digits) {
            return Err(CardError::InvalidChecksum);
        }

        Ok(ValidatedCard { digits })
    }
}

/// Luhn checksum over an all-digit string.
///
/// Walking right to left, every second digit (the one left of the check
/// digit, then every other one) is doubled, folding results above 9.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        let mut d = u32::from(b.wrapping_sub(b'0'));
        if d > 9 {
            return false;
        }
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}
