//! Variant keys: the canonical secondary cache key derived from a normalized
//! `vary` map.
//!
//! A request with `n` params could match `2^n` different variant keys, so a
//! store cannot enumerate them. Instead it remembers, per resource, which sets
//! of parameter names ("vary keys") its stored variants vary on, and computes
//! the single matching variant key for each of those sets with
//! [`request_variant_key_for_vary_keys`].

use crate::params::{NormalizedParams, NormalizedVary, ParamValue};

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Serialize;

/// A canonical list of the *names* of the params a stored variant varies on,
/// sorted ascending.
pub type VaryKeys = Arc<[String]>;

/// The canonical string form of a normalized vary map: a JSON array of
/// alternating names and values, `["a",1,"b",null]`, sorted by name. Stores may
/// rely on this format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey(String);

impl VariantKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn into_string(self) -> String {
    self.0
  }
}

impl fmt::Display for VariantKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for VariantKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

/// The variant key of a result that varies on nothing. Most resources only
/// ever have this one variant.
pub static EMPTY_VARIANT_KEY: Lazy<VariantKey> =
  Lazy::new(|| variant_key_from_entries(std::iter::empty()));

#[derive(Serialize)]
#[serde(untagged)]
enum KeyPart<'a> {
  Name(&'a str),
  Value(Option<&'a ParamValue>),
}

/// Serializes `(name, value)` pairs into a variant key. The pairs are sorted by
/// name first (ordinal comparison) so insertion order never matters.
fn variant_key_from_entries<'a, I>(entries: I) -> VariantKey
where
  I: IntoIterator<Item = (&'a str, Option<&'a ParamValue>)>,
{
  let mut sorted: Vec<_> = entries.into_iter().collect();
  sorted.sort_by(|a, b| a.0.cmp(b.0));

  let flat: Vec<KeyPart<'_>> = sorted
    .into_iter()
    .flat_map(|(name, value)| [KeyPart::Name(name), KeyPart::Value(value)])
    .collect();

  // Strings, integers, booleans and nulls always serialize.
  let json = serde_json::to_string(&flat).unwrap_or_default();
  VariantKey(json)
}

/// Returns the canonical variant key for a normalized vary map.
pub fn result_variant_key(vary: &NormalizedVary) -> VariantKey {
  variant_key_from_entries(vary.iter().map(|(k, v)| (k.as_str(), v.as_ref())))
}

/// Returns whether a stored variant is compatible with a request: every
/// `(name, value)` the variant varies on must be matched by the request, with
/// a `None` value requiring the param to be absent. Params the variant does
/// not mention are irrelevant.
pub fn variant_matches_request(vary: &NormalizedVary, params: &NormalizedParams) -> bool {
  vary
    .iter()
    .all(|(name, value)| params.get(name) == value.as_ref())
}

/// Computes the one variant key, among those varying on exactly `vary_keys`,
/// that a request with `params` would match. Missing params contribute a null.
pub fn request_variant_key_for_vary_keys(params: &NormalizedParams, vary_keys: &[String]) -> VariantKey {
  variant_key_from_entries(vary_keys.iter().map(|name| (name.as_str(), params.get(name))))
}

/// Builds the canonical `VaryKeys` for a vary map.
pub fn vary_keys_of(vary: &NormalizedVary) -> VaryKeys {
  // NormalizedVary is ordered, so the names are already sorted.
  vary.names().cloned().collect::<Vec<_>>().into()
}
