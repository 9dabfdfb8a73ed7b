//! Custom key/value attributes attached to a report

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Name of the internal attribute holding the "what happened" text.
///
/// It never appears in the attributes block of a serialized report; its
/// value is promoted to the top-level `what_happened` field instead.
pub const SUMMARY_ATTRIBUTE: &str = "summary";

// ============================================
// Attribute Type
// ============================================

/// Value type of an attribute, encoded on the wire as an integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Int,
    Float,
    Bool,
}

impl AttributeType {
    /// Integer code used in the `attribute_type` field of the wire format
    pub fn code(&self) -> u8 {
        match self {
            AttributeType::String => 0,
            AttributeType::Int => 1,
            AttributeType::Float => 2,
            AttributeType::Bool => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::Float => "float",
            AttributeType::Bool => "bool",
        }
    }
}

// ============================================
// Attribute Flags
// ============================================

/// Bitset describing where an attribute came from and who may see it
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeFlags(u8);

impl AttributeFlags {
    pub const NONE: AttributeFlags = AttributeFlags(0);
    /// Set by the embedding application
    pub const CUSTOM: AttributeFlags = AttributeFlags(1 << 0);
    /// Set by the reporter itself
    pub const SYSTEM: AttributeFlags = AttributeFlags(1 << 1);
    pub const PUBLIC: AttributeFlags = AttributeFlags(1 << 2);
    pub const INTERNAL: AttributeFlags = AttributeFlags(1 << 3);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: AttributeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AttributeFlags {
    type Output = AttributeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        AttributeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for AttributeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AttributeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (AttributeFlags::CUSTOM, "CUSTOM"),
            (AttributeFlags::SYSTEM, "SYSTEM"),
            (AttributeFlags::PUBLIC, "PUBLIC"),
            (AttributeFlags::INTERNAL, "INTERNAL"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            write!(f, "AttributeFlags(NONE)")
        } else {
            write!(f, "AttributeFlags({})", names.join(" | "))
        }
    }
}

// ============================================
// Attribute
// ============================================

/// A typed attribute value. The value is always stored in its string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    value: String,
    value_type: AttributeType,
    flags: AttributeFlags,
}

impl Attribute {
    pub fn new(value: impl Into<String>, value_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            value: value.into(),
            value_type,
            flags,
        }
    }

    /// A custom string attribute
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(value, AttributeType::String, AttributeFlags::CUSTOM)
    }

    /// A custom integer attribute
    pub fn int(value: i64) -> Self {
        Self::new(value.to_string(), AttributeType::Int, AttributeFlags::CUSTOM)
    }

    /// A custom float attribute
    pub fn float(value: f64) -> Self {
        Self::new(value.to_string(), AttributeType::Float, AttributeFlags::CUSTOM)
    }

    /// A custom boolean attribute
    pub fn bool(value: bool) -> Self {
        Self::new(value.to_string(), AttributeType::Bool, AttributeFlags::CUSTOM)
    }

    /// Replace the flags, consuming self
    pub fn with_flags(mut self, flags: AttributeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn value_type(&self) -> AttributeType {
        self.value_type
    }

    pub fn flags(&self) -> AttributeFlags {
        self.flags
    }
}

// ============================================
// Attribute Map
// ============================================

/// Attributes keyed by name. Cloning produces independent storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    entries: HashMap<String, Attribute>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attribute. `None` removes the key.
    ///
    /// Returns the previous attribute stored under `key`, if any.
    pub fn put(&mut self, key: impl Into<String>, attribute: Option<Attribute>) -> Option<Attribute> {
        let key = key.into();
        match attribute {
            Some(attribute) => self.entries.insert(key, attribute),
            None => self.entries.remove(&key),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.entries.iter()
    }

    /// Entries ordered by key, for deterministic serialization
    pub fn sorted(&self) -> BTreeMap<&str, &Attribute> {
        self.entries
            .iter()
            .map(|(key, attribute)| (key.as_str(), attribute))
            .collect()
    }
}
