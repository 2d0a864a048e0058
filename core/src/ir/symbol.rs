use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fully qualified function or method name, rendered `module::local`.
///
/// `local_name` is either a bare function name or `Class.method`. Ordering
/// follows the rendered text so iteration matches a sort of the strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub module_id: String,
    pub local_name: String,
}

impl Symbol {
    pub fn new(module_id: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self { module_id: module_id.into(), local_name: local_name.into() }
    }

    /// Owning class for method symbols.
    pub fn owner_class(&self) -> Option<&str> {
        self.local_name.split_once('.').map(|(class, _)| class)
    }

    fn rendered_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.module_id
            .bytes()
            .chain(b"::".iter().copied())
            .chain(self.local_name.bytes())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module_id, self.local_name)
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rendered_bytes()
            .cmp(other.rendered_bytes())
            .then_with(|| self.module_id.cmp(&other.module_id))
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Symbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("::") {
            Some((module_id, local_name)) if !local_name.is_empty() => {
                Ok(Symbol::new(module_id, local_name))
            }
            _ => Err(format!("malformed symbol: {}", s)),
        }
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
