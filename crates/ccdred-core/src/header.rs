use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CcdError, Result};

/// A scalar header value.
///
/// Equality, hashing and ordering are total so values can be used as
/// grouping keys. Numbers compare by value across kinds (`Int(60) ==
/// Float(60.0)`), all NaNs are equal and sort after every other number.
/// Bools, numbers and strings never equal each other.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer an integral float stands for, when it fits in an i64.
    pub fn as_integral(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && (I64_MIN_F..I64_END_F).contains(f) => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) | Self::Float(_) => 1,
            Self::Str(_) => 2,
        }
    }
}

/// -2^63 and 2^63 as floats; both exact.
const I64_MIN_F: f64 = -9_223_372_036_854_775_808.0;
const I64_END_F: f64 = 9_223_372_036_854_775_808.0;

fn cmp_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        // -0.0 == 0.0 here, unlike total_cmp.
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Exact comparison of an integer with a float.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() || f >= I64_END_F {
        return Ordering::Less;
    }
    if f < I64_MIN_F {
        return Ordering::Greater;
    }
    match i.cmp(&(f.trunc() as i64)) {
        Ordering::Equal if f.fract() > 0.0 => Ordering::Less,
        Ordering::Equal if f.fract() < 0.0 => Ordering::Greater,
        other => other,
    }
}

impl PartialEq for HeaderValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeaderValue {}

impl Hash for HeaderValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        if let Some(i) = self.as_integral() {
            return i.hash(state);
        }
        match self {
            Self::Bool(b) => b.hash(state),
            Self::Float(f) if f.is_nan() => f64::NAN.to_bits().hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::Int(_) => {}
        }
    }
}

impl PartialOrd for HeaderValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeaderValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => cmp_floats(*a, *b),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(*a, *b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => write!(f, "T"),
            Self::Bool(false) => write!(f, "F"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for HeaderValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for HeaderValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for HeaderValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Ordered keyword store of a frame header.
///
/// Keywords are case-insensitive and kept upper-case. Re-inserting a keyword
/// replaces its value without moving it. HISTORY records live in their own
/// list because FITS allows any number of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    cards: Vec<(String, HeaderValue)>,
    history: Vec<String>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<HeaderValue>) {
        let key = key.trim().to_uppercase();
        let value = value.into();
        match self.cards.iter_mut().find(|(k, _)| *k == key) {
            Some(card) => card.1 = value,
            None => self.cards.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        let key = key.trim().to_uppercase();
        let pos = self.cards.iter().position(|(k, _)| *k == key)?;
        Some(self.cards.remove(pos).1)
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        let key = key.trim().to_uppercase();
        self.cards.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Look up a keyword that must be present for `path` to be processed.
    pub fn require(&self, key: &str, path: &Path) -> Result<&HeaderValue> {
        self.get(key).ok_or_else(|| CcdError::MissingKey {
            keyword: key.trim().to_uppercase(),
            path: path.to_path_buf(),
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HeaderValue::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(HeaderValue::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn add_history(&mut self, line: impl Into<String>) {
        self.history.push(line.into());
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut h = Header::new();
        h.insert("ccdxbin", 2i64);
        assert_eq!(h.get_i64("CCDXBIN"), Some(2));
        h.insert("CcdXBin", 1i64);
        assert_eq!(h.len(), 1);
        assert_eq!(h.get_i64("ccdxbin"), Some(1));
    }

    fn hash_of(v: &HeaderValue) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(HeaderValue::Int(60), HeaderValue::Float(60.0));
        assert_eq!(hash_of(&HeaderValue::Int(60)), hash_of(&HeaderValue::Float(60.0)));
        assert_eq!(HeaderValue::Float(0.0), HeaderValue::Float(-0.0));
        assert_eq!(hash_of(&HeaderValue::Float(0.0)), hash_of(&HeaderValue::Float(-0.0)));
        assert_eq!(HeaderValue::Float(f64::NAN), HeaderValue::Float(-f64::NAN));

        assert!(HeaderValue::Int(60) < HeaderValue::Float(60.5));
        assert!(HeaderValue::Float(-0.5) < HeaderValue::Int(0));
        assert!(HeaderValue::Int(i64::MAX) < HeaderValue::Float(1e19));
        assert!(HeaderValue::Float(1e300) < HeaderValue::Float(f64::NAN));
    }

    #[test]
    fn test_other_kinds_never_equal() {
        assert_ne!(HeaderValue::Int(1), HeaderValue::Str("1".into()));
        assert_ne!(HeaderValue::Bool(true), HeaderValue::Int(1));
        assert_ne!(HeaderValue::Bool(true), HeaderValue::Str("T".into()));
    }

    #[test]
    fn test_require_names_keyword_and_path() {
        let h = Header::new();
        let err = h.require("filter", Path::new("a.fits")).unwrap_err();
        match err {
            CcdError::MissingKey { keyword, path } => {
                assert_eq!(keyword, "FILTER");
                assert_eq!(path, Path::new("a.fits"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
