use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for asserted facts. Ids start at 1 and are never reused.
pub type FactId = u64;

/// Unique identifier for deftemplates within one environment.
pub type TemplateId = u32;

/// The seven kinds a value cell can hold.
///
/// The discriminants are the conventional type codes of the runtime, so host
/// marshalling layers can pass raw codes straight through
/// [`ValueKind::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum ValueKind {
    /// Double precision float
    Float = 0,
    /// Signed 64-bit integer
    Integer = 1,
    /// Interned symbol (unquoted lexeme)
    Symbol = 2,
    /// Interned string (quoted lexeme)
    String = 3,
    /// Ordered sequence of single-field values
    Multifield = 4,
    /// Opaque host object compared by identity
    ExternalAddress = 5,
    /// Counted reference to an asserted fact
    FactAddress = 6,
}

impl ValueKind {
    /// Every kind, in code order.
    pub const ALL: [Self; 7] = [
        Self::Float,
        Self::Integer,
        Self::Symbol,
        Self::String,
        Self::Multifield,
        Self::ExternalAddress,
        Self::FactAddress,
    ];

    /// Numeric type code of this kind
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Map a raw type code back to a kind.
    ///
    /// Returns `None` for codes outside the seven supported kinds, including
    /// the reserved instance and void codes (7, 8 and 9).
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Float),
            1 => Some(Self::Integer),
            2 => Some(Self::Symbol),
            3 => Some(Self::String),
            4 => Some(Self::Multifield),
            5 => Some(Self::ExternalAddress),
            6 => Some(Self::FactAddress),
            _ => None,
        }
    }

    /// Upper-case name, as reported by slot type introspection
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "FLOAT",
            Self::Integer => "INTEGER",
            Self::Symbol => "SYMBOL",
            Self::String => "STRING",
            Self::Multifield => "MULTIFIELD",
            Self::ExternalAddress => "EXTERNAL_ADDRESS",
            Self::FactAddress => "FACT_ADDRESS",
        }
    }

    /// True for the kinds stored in the interning table
    #[must_use]
    pub const fn is_interned(self) -> bool {
        matches!(self, Self::Float | Self::Integer | Self::Symbol | Self::String)
    }

    /// True for symbols and strings
    #[must_use]
    pub const fn is_lexeme(self) -> bool {
        matches!(self, Self::Symbol | Self::String)
    }

    /// True for integers and floats
    #[must_use]
    pub const fn is_number(self) -> bool {
        matches!(self, Self::Float | Self::Integer)
    }

    const fn bit(self) -> u16 {
        1 << self.code()
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<&str> for ValueKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(value))
            .ok_or_else(|| anyhow!("Unknown value kind: {}", value))
    }
}

impl FromStr for ValueKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl TryFrom<i32> for ValueKind {
    type Error = anyhow::Error;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| anyhow!("Unknown value kind code: {}", code))
    }
}

/// A set of value kinds, used as a slot type constraint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<ValueKind>", into = "Vec<ValueKind>")]
pub struct TypeSet(u16);

impl TypeSet {
    /// No kind allowed
    pub const EMPTY: Self = Self(0);
    /// Every kind allowed
    pub const ANY: Self = Self(0b111_1111);
    /// Integers and floats
    pub const NUMBER: Self = Self(ValueKind::Float.bit() | ValueKind::Integer.bit());
    /// Symbols and strings
    pub const LEXEME: Self = Self(ValueKind::Symbol.bit() | ValueKind::String.bit());

    /// Set holding exactly one kind
    #[must_use]
    pub const fn of(kind: ValueKind) -> Self {
        Self(kind.bit())
    }

    /// Copy of this set with `kind` added
    #[must_use]
    pub const fn with(self, kind: ValueKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Union of two sets
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `kind` is a member
    #[must_use]
    pub const fn contains(self, kind: ValueKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether every kind is a member
    #[must_use]
    pub const fn is_any(self) -> bool {
        self.0 & Self::ANY.0 == Self::ANY.0
    }

    /// Whether no kind is a member
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Member kinds, in code order
    pub fn iter(self) -> impl Iterator<Item = ValueKind> {
        ValueKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl Default for TypeSet {
    fn default() -> Self {
        Self::ANY
    }
}

impl FromIterator<ValueKind> for TypeSet {
    fn from_iter<I: IntoIterator<Item = ValueKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<Vec<ValueKind>> for TypeSet {
    fn from(kinds: Vec<ValueKind>) -> Self {
        kinds.into_iter().collect()
    }
}

impl From<TypeSet> for Vec<ValueKind> {
    fn from(set: TypeSet) -> Self {
        set.iter().collect()
    }
}

impl From<ValueKind> for TypeSet {
    fn from(kind: ValueKind) -> Self {
        Self::of(kind)
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return f.write_str("ANY");
        }
        let names: Vec<&str> = self.iter().map(ValueKind::name).collect();
        write!(f, "({})", names.join(" "))
    }
}

/// Parses `ANY`, `NUMBER`, `LEXEME`, or kind names separated by spaces,
/// optionally wrapped in parentheses as [`TypeSet`]'s `Display` writes them.
impl FromStr for TypeSet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        let mut set = Self::EMPTY;
        for name in inner.split_whitespace() {
            set = match name.to_ascii_uppercase().as_str() {
                "ANY" => set.union(Self::ANY),
                "NUMBER" => set.union(Self::NUMBER),
                "LEXEME" => set.union(Self::LEXEME),
                _ => set.with(ValueKind::try_from(name)?),
            };
        }
        if set.is_empty() {
            return Err(anyhow!("Empty type set: {:?}", s));
        }
        Ok(set)
    }
}

impl fmt::Debug for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeSet{self}")
    }
}
