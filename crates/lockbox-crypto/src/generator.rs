//! Password generation and strength scoring.

use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
const SIMILAR: &str = "il1Lo0O";
const MAX_LENGTH: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorOptions {
    pub length: usize,
    pub include_uppercase: bool,
    pub include_lowercase: bool,
    pub include_numbers: bool,
    pub include_symbols: bool,
    pub exclude_similar: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            length: 12,
            include_uppercase: true,
            include_lowercase: true,
            include_numbers: true,
            include_symbols: false,
            exclude_similar: true,
        }
    }
}

impl GeneratorOptions {
    fn charset(&self) -> Vec<char> {
        let mut set = String::new();
        if self.include_lowercase {
            set.push_str(LOWER);
        }
        if self.include_uppercase {
            set.push_str(UPPER);
        }
        if self.include_numbers {
            set.push_str(DIGITS);
        }
        if self.include_symbols {
            set.push_str(SYMBOLS);
        }
        set.chars()
            .filter(|c| !(self.exclude_similar && SIMILAR.contains(*c)))
            .collect()
    }
}

/// Generate a password from the OS CSPRNG.
pub fn generate_password(options: &GeneratorOptions) -> Result<String, CryptoError> {
    if options.length > MAX_LENGTH {
        return Err(CryptoError::Generator(format!(
            "length {} exceeds {MAX_LENGTH}",
            options.length
        )));
    }
    let charset = options.charset();
    if charset.is_empty() {
        return Err(CryptoError::Generator("no character classes selected".into()));
    }
    let mut rng = OsRng;
    Ok((0..options.length)
        .map(|_| charset[rng.gen_range(0..charset.len())])
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrengthLabel {
    Weak,
    Medium,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strength {
    pub score: u8,
    pub label: StrengthLabel,
}

/// One point each for: length >= 8, length >= 12, lowercase, uppercase,
/// digit, other character.
pub fn password_strength(password: &str) -> Strength {
    let len = password.chars().count();
    let checks = [
        len >= 8,
        len >= 12,
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_ascii_alphanumeric()),
    ];
    let score = checks.iter().filter(|ok| **ok).count() as u8;
    let label = match score {
        0..=2 => StrengthLabel::Weak,
        3..=4 => StrengthLabel::Medium,
        _ => StrengthLabel::Strong,
    };
    Strength { score, label }
}
