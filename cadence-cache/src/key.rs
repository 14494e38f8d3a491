//! Call-argument normalization into stable, hashable cache keys.
//!
//! Two calls are cache-equivalent iff their normalized keys are equal:
//! positional values compare by position, named values by name regardless of
//! the order they were supplied in. A value with no stable equality (a NaN
//! float) fails key derivation instead of silently producing a false match.

use std::collections::BTreeMap;

use cadence_core::{CadenceError, Result};

/// A loosely typed call-argument value.
///
/// Built via `From` conversions for the common cases:
///
/// ```
/// use cadence_cache::ArgValue;
///
/// let v: ArgValue = 42i64.into();
/// assert_eq!(v, ArgValue::Int(42));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    /// No value.
    Unit,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point; NaN fails key derivation.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence of values.
    Seq(Vec<ArgValue>),
    /// String-keyed mapping; entry order never affects key equality.
    Map(Vec<(String, ArgValue)>),
}

impl ArgValue {
    /// Creates a bytes value.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        ArgValue::Bytes(bytes.into())
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        ArgValue::UInt(u64::from(v))
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        ArgValue::UInt(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<f32> for ArgValue {
    fn from(v: f32) -> Self {
        ArgValue::Float(f64::from(v))
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl From<Vec<ArgValue>> for ArgValue {
    fn from(v: Vec<ArgValue>) -> Self {
        ArgValue::Seq(v)
    }
}

impl From<()> for ArgValue {
    fn from(_: ()) -> Self {
        ArgValue::Unit
    }
}

/// The arguments of one call, as supplied by the caller.
///
/// ```
/// use cadence_cache::CallArgs;
///
/// let a = CallArgs::new().named("a", 1i64).named("b", 2i64);
/// let b = CallArgs::new().named("b", 2i64).named("a", 1i64);
/// assert_eq!(a.key().unwrap(), b.key().unwrap());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<ArgValue>,
    named: Vec<(String, ArgValue)>,
}

impl CallArgs {
    /// Creates an empty argument list (a zero-argument call).
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Appends a named argument.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    /// Builds the normalized, hashable key for these arguments.
    ///
    /// Named arguments are snapshotted into a sorted map so supply order is
    /// irrelevant. Fails with a key error for NaN floats and duplicate
    /// names; the cache routes that failure through its fail-open or
    /// fail-closed policy.
    pub fn key(&self) -> Result<CallKey> {
        let mut positional = Vec::with_capacity(self.positional.len());
        for (index, value) in self.positional.iter().enumerate() {
            positional.push(normalize(value, &format!("positional {}", index))?);
        }

        let mut named = BTreeMap::new();
        for (name, value) in &self.named {
            let atom = normalize(value, &format!("named '{}'", name))?;
            if named.insert(name.clone(), atom).is_some() {
                return Err(CadenceError::DuplicateArgument(name.clone()));
            }
        }

        Ok(CallKey { positional, named })
    }
}

/// A normalized, hashable cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallKey {
    positional: Vec<KeyAtom>,
    named: BTreeMap<String, KeyAtom>,
}

/// The hashable normal form of one argument value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum KeyAtom {
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// Bit pattern of a non-NaN float, with both zeros collapsed to +0.0.
    Float(u64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<KeyAtom>),
    Map(BTreeMap<String, KeyAtom>),
}

fn normalize(value: &ArgValue, arg: &str) -> Result<KeyAtom> {
    match value {
        ArgValue::Unit => Ok(KeyAtom::Unit),
        ArgValue::Bool(v) => Ok(KeyAtom::Bool(*v)),
        ArgValue::Int(v) => Ok(KeyAtom::Int(*v)),
        ArgValue::UInt(v) => Ok(KeyAtom::UInt(*v)),
        ArgValue::Float(v) => {
            if v.is_nan() {
                return Err(CadenceError::UnhashableArgument {
                    arg: arg.to_string(),
                    reason: "NaN has no stable equality".into(),
                });
            }
            let v = if *v == 0.0 { 0.0 } else { *v };
            Ok(KeyAtom::Float(v.to_bits()))
        }
        ArgValue::Str(v) => Ok(KeyAtom::Str(v.clone())),
        ArgValue::Bytes(v) => Ok(KeyAtom::Bytes(v.clone())),
        ArgValue::Seq(items) => {
            let mut atoms = Vec::with_capacity(items.len());
            for item in items {
                atoms.push(normalize(item, arg)?);
            }
            Ok(KeyAtom::Seq(atoms))
        }
        ArgValue::Map(entries) => {
            let mut map = BTreeMap::new();
            for (name, item) in entries {
                let atom = normalize(item, arg)?;
                if map.insert(name.clone(), atom).is_some() {
                    return Err(CadenceError::DuplicateArgument(name.clone()));
                }
            }
            Ok(KeyAtom::Map(map))
        }
    }
}
