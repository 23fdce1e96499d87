//! Permission bits and the persisted permission text codec.
//!
//! A rule part sets each of the five bits to allow, deny, or leaves it unset.
//! The persisted form is a compact string:
//!
//! | Text          | Meaning                                  |
//! |---------------|------------------------------------------|
//! | `+R-U+C-D`    | one signed letter per bit, any order     |
//! | `+CRUD`, `-RS`| a sign followed by a group of letters    |
//! | `all`         | allow every bit (also `Allow All`)       |
//! | `none`        | deny every bit (also `Deny All`)         |
//!
//! Rendering is canonical: allowed letters first, then denied letters, each
//! group in `R U C D S` order.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One independently resolved permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bit {
    Read,
    Update,
    Create,
    Delete,
    Schema,
}

impl Bit {
    /// All bits in canonical order.
    pub const ALL: [Bit; 5] = [Bit::Read, Bit::Update, Bit::Create, Bit::Delete, Bit::Schema];

    pub fn letter(self) -> char {
        match self {
            Bit::Read => 'R',
            Bit::Update => 'U',
            Bit::Create => 'C',
            Bit::Delete => 'D',
            Bit::Schema => 'S',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'R' => Some(Bit::Read),
            'U' => Some(Bit::Update),
            'C' => Some(Bit::Create),
            'D' => Some(Bit::Delete),
            'S' => Some(Bit::Schema),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bit::Read => "Read",
            Bit::Update => "Update",
            Bit::Create => "Create",
            Bit::Delete => "Delete",
            Bit::Schema => "Schema",
        };
        f.write_str(name)
    }
}

/// The effect of one rule part on one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BitState {
    Allow,
    Deny,
    #[default]
    Unset,
}

impl BitState {
    pub fn is_set(self) -> bool {
        self != BitState::Unset
    }
}

/// A set of bits, used to restrict which bits a rule set may decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitMask(u8);

impl BitMask {
    pub const ALL: BitMask = BitMask(0b1_1111);
    pub const NONE: BitMask = BitMask(0);

    pub fn only(bit: Bit) -> Self {
        Self(1 << bit.index())
    }

    pub fn of(bits: &[Bit]) -> Self {
        bits.iter().fold(Self::NONE, |mask, bit| mask.with(*bit))
    }

    pub fn with(self, bit: Bit) -> Self {
        Self(self.0 | (1 << bit.index()))
    }

    pub fn contains(self, bit: Bit) -> bool {
        self.0 & (1 << bit.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Errors from parsing permission text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionTextError {
    #[error("unknown permission letter '{letter}' in `{text}`")]
    UnknownLetter { letter: char, text: String },

    #[error("permission letter '{letter}' has no leading sign in `{text}`")]
    MissingSign { letter: char, text: String },

    #[error("sign without letters in `{text}`")]
    EmptyGroup { text: String },

    #[error("permission '{letter}' is set more than once in `{text}`")]
    Repeated { letter: char, text: String },
}

/// Per-bit allow/deny/unset states of one rule part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionDelta {
    states: [BitState; 5],
}

impl PermissionDelta {
    /// Leaves every bit unset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_all() -> Self {
        Self {
            states: [BitState::Allow; 5],
        }
    }

    pub fn deny_all() -> Self {
        Self {
            states: [BitState::Deny; 5],
        }
    }

    pub fn allow(mut self, bit: Bit) -> Self {
        self.states[bit.index()] = BitState::Allow;
        self
    }

    pub fn deny(mut self, bit: Bit) -> Self {
        self.states[bit.index()] = BitState::Deny;
        self
    }

    pub fn get(&self, bit: Bit) -> BitState {
        self.states[bit.index()]
    }

    pub fn set(&mut self, bit: Bit, state: BitState) {
        self.states[bit.index()] = state;
    }

    /// Returns whether no bit is set.
    pub fn is_empty(&self) -> bool {
        self.states.iter().all(|state| !state.is_set())
    }

    /// Bits this delta sets, as a mask.
    pub fn mask(&self) -> BitMask {
        Bit::ALL
            .into_iter()
            .filter(|bit| self.get(*bit).is_set())
            .fold(BitMask::NONE, BitMask::with)
    }

    /// Bits this delta sets, with their states, in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Bit, BitState)> + '_ {
        Bit::ALL
            .into_iter()
            .map(|bit| (bit, self.get(bit)))
            .filter(|(_, state)| state.is_set())
    }

    /// Parses persisted permission text.
    pub fn parse(text: &str) -> Result<Self, PermissionTextError> {
        let trimmed = text.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "all" | "allow all" => return Ok(Self::allow_all()),
            "none" | "deny all" => return Ok(Self::deny_all()),
            _ => {}
        }

        let mut delta = Self::new();
        let mut sign: Option<BitState> = None;
        let mut group_len = 0usize;

        for ch in trimmed.chars().filter(|ch| !ch.is_whitespace()) {
            match ch {
                '+' | '-' => {
                    if sign.is_some() && group_len == 0 {
                        return Err(PermissionTextError::EmptyGroup { text: text.into() });
                    }
                    sign = Some(if ch == '+' {
                        BitState::Allow
                    } else {
                        BitState::Deny
                    });
                    group_len = 0;
                }
                letter => {
                    let bit =
                        Bit::from_letter(letter).ok_or_else(|| PermissionTextError::UnknownLetter {
                            letter,
                            text: text.into(),
                        })?;
                    let state = sign.ok_or_else(|| PermissionTextError::MissingSign {
                        letter,
                        text: text.into(),
                    })?;
                    if delta.get(bit).is_set() {
                        return Err(PermissionTextError::Repeated {
                            letter,
                            text: text.into(),
                        });
                    }
                    delta.set(bit, state);
                    group_len += 1;
                }
            }
        }

        if sign.is_some() && group_len == 0 {
            return Err(PermissionTextError::EmptyGroup { text: text.into() });
        }
        Ok(delta)
    }
}

impl Display for PermissionDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::allow_all() {
            return f.write_str("all");
        }
        if *self == Self::deny_all() {
            return f.write_str("none");
        }
        for (sign, wanted) in [('+', BitState::Allow), ('-', BitState::Deny)] {
            let letters: String = self
                .iter()
                .filter(|(_, state)| *state == wanted)
                .map(|(bit, _)| bit.letter())
                .collect();
            if !letters.is_empty() {
                write!(f, "{sign}{letters}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for PermissionDelta {
    type Err = PermissionTextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PermissionDelta {
    type Error = PermissionTextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PermissionDelta> for String {
    fn from(delta: PermissionDelta) -> Self {
        delta.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("+R-U+C-D" => "+RC-UD"; "alternating signs")]
    #[test_case("+CRUD" => "+RUCD"; "grouped allow")]
    #[test_case("-RS" => "-RS"; "grouped deny")]
    #[test_case("+R-CUD" => "+R-UCD"; "mixed groups")]
    #[test_case("-S" => "-S"; "schema only")]
    #[test_case("Allow All" => "all"; "allow macro")]
    #[test_case("deny all" => "none"; "deny macro lowercase")]
    #[test_case("+RUCDS" => "all"; "full allow renders as macro")]
    #[test_case("" => ""; "empty is unset")]
    #[test_case(" + R - U " => "+R-U"; "whitespace ignored")]
    fn canonical_rendering(text: &str) -> String {
        PermissionDelta::parse(text).unwrap().to_string()
    }

    #[test_case("+X" ; "unknown letter")]
    #[test_case("R" ; "missing sign")]
    #[test_case("+-R" ; "empty group")]
    #[test_case("+R-" ; "trailing sign")]
    #[test_case("+R-R" ; "repeated bit")]
    #[test_case("+r" ; "lowercase letter")]
    fn rejects(text: &str) {
        assert!(PermissionDelta::parse(text).is_err());
    }

    #[test]
    fn order_does_not_matter() {
        assert_eq!(
            PermissionDelta::parse("+R-U").unwrap(),
            PermissionDelta::parse("-U+R").unwrap()
        );
    }

    #[test]
    fn mask_tracks_set_bits() {
        let delta = PermissionDelta::new().deny(Bit::Delete).allow(Bit::Read);
        let mask = delta.mask();
        assert!(mask.contains(Bit::Read));
        assert!(mask.contains(Bit::Delete));
        assert!(!mask.contains(Bit::Schema));
        assert_eq!(delta.get(Bit::Update), BitState::Unset);
    }

    #[test]
    fn serde_uses_text_form() {
        let delta = PermissionDelta::new().deny(Bit::Schema);
        let json = serde_json::to_string(&delta).unwrap();
        assert_eq!(json, "\"-S\"");
        let back: PermissionDelta = serde_json::from_str("\"-S\"").unwrap();
        assert_eq!(back, delta);
        assert!(serde_json::from_str::<PermissionDelta>("\"+Q\"").is_err());
    }
}
