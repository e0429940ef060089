//! Request parameters and the `vary` secondary key, in raw and normalized form.
//!
//! Parameters are never required: any subset of names may be absent from a
//! request. A producer declares which parameters its result depended on with a
//! `Vary` map, where a `None` value means "this result only applies when the
//! parameter is absent" and a missing name means "the result does not depend
//! on this parameter at all".

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar request parameter value.
///
/// Serializes as a bare JSON scalar, which is what variant keys are built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
  Bool(bool),
  Int(i64),
  Str(String),
}

impl fmt::Display for ParamValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamValue::Bool(b) => write!(f, "{}", b),
      ParamValue::Int(i) => write!(f, "{}", i),
      ParamValue::Str(s) => f.write_str(s),
    }
  }
}

impl From<bool> for ParamValue {
  fn from(value: bool) -> Self {
    ParamValue::Bool(value)
  }
}

impl From<i64> for ParamValue {
  fn from(value: i64) -> Self {
    ParamValue::Int(value)
  }
}

impl From<i32> for ParamValue {
  fn from(value: i32) -> Self {
    ParamValue::Int(value as i64)
  }
}

impl From<&str> for ParamValue {
  fn from(value: &str) -> Self {
    ParamValue::Str(value.to_owned())
  }
}

impl From<String> for ParamValue {
  fn from(value: String) -> Self {
    ParamValue::Str(value)
  }
}

/// Raw request parameters, before normalization.
///
/// A `None` value marks a parameter that was mentioned but not provided; it is
/// dropped during normalization, exactly like an absent one.
pub type Params = BTreeMap<String, Option<ParamValue>>;

/// A raw `vary` map, before normalization. A `None` value is the "must be
/// absent" sentinel.
pub type Vary = BTreeMap<String, Option<ParamValue>>;

/// Request parameters with every name and value run through a `Normalizer`.
///
/// Backed by an ordered map, so iteration is already sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedParams(pub(crate) BTreeMap<String, ParamValue>);

impl NormalizedParams {
  pub fn get(&self, name: &str) -> Option<&ParamValue> {
    self.0.get(name)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
    self.0.iter()
  }

  /// Converts back into the raw representation, e.g. to hand the params to a
  /// producer.
  pub fn to_params(&self) -> Params {
    self
      .0
      .iter()
      .map(|(k, v)| (k.clone(), Some(v.clone())))
      .collect()
  }
}

/// A `vary` map with every name and non-null value normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedVary(pub(crate) BTreeMap<String, Option<ParamValue>>);

impl NormalizedVary {
  pub fn get(&self, name: &str) -> Option<&Option<ParamValue>> {
    self.0.get(name)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<ParamValue>)> {
    self.0.iter()
  }

  /// The names this variant varies on, in sorted order.
  pub fn names(&self) -> impl Iterator<Item = &String> {
    self.0.keys()
  }

  /// Converts back into the raw representation.
  pub fn to_vary(&self) -> Vary {
    self.0.clone()
  }
}

/// Builds a raw `Params` map from `(name, value)` pairs.
///
/// ```
/// use fibre_resource_cache::params::params;
///
/// let p = params([("lang", "en"), ("region", "us")]);
/// assert_eq!(p.len(), 2);
/// ```
pub fn params<I, N, V>(pairs: I) -> Params
where
  I: IntoIterator<Item = (N, V)>,
  N: Into<String>,
  V: Into<ParamValue>,
{
  pairs
    .into_iter()
    .map(|(n, v)| (n.into(), Some(v.into())))
    .collect()
}

/// Builds a raw `Vary` map. Pass `None` for parameters the result requires to
/// be absent.
pub fn vary<I, N>(pairs: I) -> Vary
where
  I: IntoIterator<Item = (N, Option<ParamValue>)>,
  N: Into<String>,
{
  pairs.into_iter().map(|(n, v)| (n.into(), v)).collect()
}
