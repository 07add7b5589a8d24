//! Search space and configuration definitions.

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::marker::PhantomData;

use crate::errors::{TbError, TbResult};

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParameterValue {
    /// Numeric view of the value. Integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of the value. Floats with no fractional part are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A single hyperparameter and its ordered candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    pub name: String,
    pub candidates: Vec<ParameterValue>,
}

/// The full discrete search space, kept in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_choice<I, V>(mut self, name: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParameterValue>,
    {
        self.parameters.push(ParameterDef {
            name: name.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Number of distinct configurations (`None` on overflow).
    pub fn grid_size(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(1usize, |acc, p| acc.checked_mul(p.candidates.len()))
    }

    /// Reject spaces that cannot be sampled: no parameters, a parameter
    /// without candidates, or a name declared twice.
    pub fn validate(&self) -> TbResult<()> {
        if self.parameters.is_empty() {
            return Err(TbError::Config("search space has no parameters".into()));
        }
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if param.candidates.is_empty() {
                return Err(TbError::Config(format!(
                    "parameter '{}' has an empty candidate set",
                    param.name
                )));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(TbError::Config(format!(
                    "parameter '{}' is declared more than once",
                    param.name
                )));
            }
        }
        Ok(())
    }

    /// Parse a JSON object of `{"name": [candidates...]}` and validate it.
    /// Key order in the document becomes the declaration order.
    pub fn from_json_reader<R: Read>(reader: R) -> TbResult<Self> {
        let space: SearchSpace = serde_json::from_reader(reader)?;
        space.validate()?;
        Ok(space)
    }
}

impl Serialize for SearchSpace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parameters.len()))?;
        for param in &self.parameters {
            map.serialize_entry(&param.name, &param.candidates)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SearchSpace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = deserializer.deserialize_map(OrderedMapVisitor::<Vec<ParameterValue>>::new())?;
        Ok(Self {
            parameters: entries
                .into_iter()
                .map(|(name, candidates)| ParameterDef { name, candidates })
                .collect(),
        })
    }
}

/// One value per hyperparameter, in search-space declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Configuration {
    entries: Vec<(String, ParameterValue)>,
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builder-style insert. A repeated name overwrites the earlier value in place.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ParameterValue)> for Configuration {
    fn from_iter<T: IntoIterator<Item = (String, ParameterValue)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Configuration::new(), |cfg, (n, v)| cfg.with(n, v))
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Configuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = deserializer.deserialize_map(OrderedMapVisitor::<ParameterValue>::new())?;
        Ok(entries.into_iter().collect())
    }
}

/// Collects a map into a `Vec` so document order survives deserialization.
struct OrderedMapVisitor<V> {
    marker: PhantomData<V>,
}

impl<V> OrderedMapVisitor<V> {
    fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = Vec<(String, V)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map keyed by parameter name")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            entries.push((key, value));
        }
        Ok(entries)
    }
}
