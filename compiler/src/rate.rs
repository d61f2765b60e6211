// rate.rs — Update rates, admissible rate sets, and unit categories
//
// A rate says how often a value changes: once per instantiation
// (constant), once per block (block), or once per sample (audio).
// Rates are totally ordered Constant < Block < Audio; single-letter codes
// (`c`, `b`, `a`) appear in variant names and lookup keys.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: `RateSet::parse` rejects unknown rate codes.
// Side effects: none.

use std::fmt;

use serde::Serialize;

// ── Rate ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Rate {
    #[serde(rename = "c")]
    Constant,
    #[serde(rename = "b")]
    Block,
    #[serde(rename = "a")]
    Audio,
}

impl Rate {
    /// All rates in code order (`a`, `b`, `c`).
    pub const CODE_ORDER: [Rate; 3] = [Rate::Audio, Rate::Block, Rate::Constant];

    pub fn code(self) -> char {
        match self {
            Rate::Audio => 'a',
            Rate::Block => 'b',
            Rate::Constant => 'c',
        }
    }

    pub fn from_code(code: char) -> Option<Rate> {
        match code {
            'a' => Some(Rate::Audio),
            'b' => Some(Rate::Block),
            'c' => Some(Rate::Constant),
            _ => None,
        }
    }

    /// Parse a rate written as a code (`a`) or a word (`audio`).
    pub fn parse(text: &str) -> Option<Rate> {
        match text {
            "a" | "audio" => Some(Rate::Audio),
            "b" | "block" => Some(Rate::Block),
            "c" | "constant" => Some(Rate::Constant),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Rate::Audio => "audio",
            Rate::Block => "block",
            Rate::Constant => "constant",
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── RateSet ─────────────────────────────────────────────────────────────────

/// Admissible rates of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RateSet(u8);

impl RateSet {
    fn bit(rate: Rate) -> u8 {
        match rate {
            Rate::Constant => 1,
            Rate::Block => 2,
            Rate::Audio => 4,
        }
    }

    /// Parse a string of rate codes such as `"abc"` or `"c"`.
    ///
    /// Returns the first offending character on failure.
    pub fn parse(codes: &str) -> Result<RateSet, char> {
        let mut set = RateSet::default();
        for c in codes.chars() {
            set.insert(Rate::from_code(c).ok_or(c)?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, rate: Rate) {
        self.0 |= Self::bit(rate);
    }

    pub fn contains(self, rate: Rate) -> bool {
        self.0 & Self::bit(rate) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in code order.
    pub fn iter(self) -> impl Iterator<Item = Rate> {
        Rate::CODE_ORDER
            .into_iter()
            .filter(move |r| self.contains(*r))
    }
}

impl From<Rate> for RateSet {
    fn from(rate: Rate) -> Self {
        let mut set = RateSet::default();
        set.insert(rate);
        set
    }
}

impl FromIterator<Rate> for RateSet {
    fn from_iter<T: IntoIterator<Item = Rate>>(iter: T) -> Self {
        let mut set = RateSet::default();
        for rate in iter {
            set.insert(rate);
        }
        set
    }
}

impl fmt::Display for RateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rate in self.iter() {
            write!(f, "{}", rate.code())?;
        }
        Ok(())
    }
}

// ── Category ────────────────────────────────────────────────────────────────

/// How a unit's output rate relates to its input rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Fixed output rate; every input must be at or below it.
    Generator(Rate),
    /// Output rate equals the fastest input rate.
    Filter,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Generator(rate) => write!(f, "generator({})", rate.code()),
            Category::Filter => f.write_str("filter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Rate::Constant < Rate::Block);
        assert!(Rate::Block < Rate::Audio);
        assert_eq!(
            [Rate::Block, Rate::Audio, Rate::Constant].iter().max(),
            Some(&Rate::Audio)
        );
    }

    #[test]
    fn codes_roundtrip() {
        for rate in Rate::CODE_ORDER {
            assert_eq!(Rate::from_code(rate.code()), Some(rate));
        }
        assert_eq!(Rate::from_code('x'), None);
    }

    #[test]
    fn parse_words_and_codes() {
        assert_eq!(Rate::parse("audio"), Some(Rate::Audio));
        assert_eq!(Rate::parse("b"), Some(Rate::Block));
        assert_eq!(Rate::parse("fast"), None);
    }

    #[test]
    fn rate_set_parse_and_iterate() {
        let set = RateSet::parse("cab").unwrap();
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Rate::Audio, Rate::Block, Rate::Constant]
        );
        assert_eq!(set.to_string(), "abc");
    }

    #[test]
    fn rate_set_rejects_unknown_code() {
        assert_eq!(RateSet::parse("ax"), Err('x'));
    }

    #[test]
    fn empty_rate_set() {
        let set = RateSet::parse("").unwrap();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&Rate::Block).unwrap(), "\"b\"");
    }
}
