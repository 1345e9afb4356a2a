//! Musical key on the Camelot wheel, parsed from Camelot or standard notation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Inner (minor, "A") or outer (major, "B") ring of the Camelot wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ring {
    Minor,
    Major,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MusicalKey {
    number: u8,
    ring: Ring,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized musical key {0:?}")]
pub struct InvalidKey(String);

impl MusicalKey {
    /// Build from a Camelot position; `number` must be 1..=12.
    pub fn camelot(number: u8, ring: Ring) -> Option<Self> {
        (1..=12).contains(&number).then_some(Self { number, ring })
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn ring(&self) -> Ring {
        self.ring
    }

    /// Neighbours for mixing: ±1 on the same ring, or the relative key on the other ring.
    pub fn is_harmonic_neighbor(&self, other: &MusicalKey) -> bool {
        if self == other {
            return false;
        }
        if self.ring == other.ring {
            let diff = (i16::from(self.number) - i16::from(other.number)).rem_euclid(12);
            diff == 1 || diff == 11
        } else {
            self.number == other.number
        }
    }

    fn from_pitch_class(pc: u8, ring: Ring) -> Self {
        // Major keys: position on the circle of fifths, with C at 8B.
        let major_pc = match ring {
            Ring::Major => pc,
            Ring::Minor => (pc + 3) % 12,
        };
        let fifths = (major_pc * 7) % 12;
        Self {
            number: (fifths + 7) % 12 + 1,
            ring,
        }
    }

    fn parse_camelot(s: &str) -> Option<Self> {
        let (split, _) = s.char_indices().last()?;
        let (digits, letter) = s.split_at(split);
        let number: u8 = digits.parse().ok()?;
        let ring = match letter {
            "A" | "a" => Ring::Minor,
            "B" | "b" => Ring::Major,
            _ => return None,
        };
        Self::camelot(number, ring)
    }

    fn parse_standard(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let root = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let rest: String = chars.collect();
        let (shift, rest) = if let Some(r) = rest.strip_prefix(['#', '♯']) {
            (1i8, r)
        } else if let Some(r) = rest.strip_prefix(['b', '♭']) {
            (-1i8, r)
        } else {
            (0i8, rest.as_str())
        };
        let ring = match rest.trim().to_ascii_lowercase().as_str() {
            "" | "maj" | "major" => Ring::Major,
            "m" | "min" | "minor" => Ring::Minor,
            _ => return None,
        };
        let pc = (root + shift).rem_euclid(12) as u8;
        Some(Self::from_pitch_class(pc, ring))
    }
}

impl FromStr for MusicalKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let starts_with_digit = trimmed.chars().next().is_some_and(|c| c.is_ascii_digit());
        let parsed = if starts_with_digit {
            Self::parse_camelot(trimmed)
        } else {
            Self::parse_standard(trimmed)
        };
        parsed.ok_or_else(|| InvalidKey(s.to_string()))
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self.ring {
            Ring::Minor => 'A',
            Ring::Major => 'B',
        };
        write!(f, "{}{}", self.number, letter)
    }
}

impl TryFrom<String> for MusicalKey {
    type Error = InvalidKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MusicalKey> for String {
    fn from(key: MusicalKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> MusicalKey {
        s.parse().unwrap()
    }

    #[test]
    fn parses_camelot() {
        assert_eq!(key("8A"), MusicalKey::camelot(8, Ring::Minor).unwrap());
        assert_eq!(key("12b"), MusicalKey::camelot(12, Ring::Major).unwrap());
        assert!("13A".parse::<MusicalKey>().is_err());
        assert!("0B".parse::<MusicalKey>().is_err());
    }

    #[test]
    fn standard_notation_maps_onto_wheel() {
        assert_eq!(key("C").to_string(), "8B");
        assert_eq!(key("Am").to_string(), "8A");
        assert_eq!(key("G major").to_string(), "9B");
        assert_eq!(key("F").to_string(), "7B");
        assert_eq!(key("B").to_string(), "1B");
        assert_eq!(key("F#m").to_string(), "11A");
        assert_eq!(key("Gbm").to_string(), "11A");
        assert_eq!(key("Bb").to_string(), "6B");
        assert_eq!(key("Ebm").to_string(), "2A");
        assert_eq!(key("C# minor").to_string(), "12A");
    }

    #[test]
    fn rejects_garbage() {
        assert!("H".parse::<MusicalKey>().is_err());
        assert!("Cdorian".parse::<MusicalKey>().is_err());
        assert!("".parse::<MusicalKey>().is_err());
    }

    #[test]
    fn harmonic_neighbors() {
        let am = key("8A");
        assert!(am.is_harmonic_neighbor(&key("7A")));
        assert!(am.is_harmonic_neighbor(&key("9A")));
        assert!(am.is_harmonic_neighbor(&key("8B")));
        assert!(!am.is_harmonic_neighbor(&key("10A")));
        assert!(!am.is_harmonic_neighbor(&key("9B")));
        assert!(!am.is_harmonic_neighbor(&am));
        // Wheel wraps around.
        assert!(key("12B").is_harmonic_neighbor(&key("1B")));
    }

    #[test]
    fn serde_uses_camelot_string() {
        let json = serde_json::to_string(&key("Dm")).unwrap();
        assert_eq!(json, "\"7A\"");
        let back: MusicalKey = serde_json::from_str("\"E\"").unwrap();
        assert_eq!(back, key("12B"));
    }
}
