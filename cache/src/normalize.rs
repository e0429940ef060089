//! Normalization turns equivalent inputs into equal ones before they reach the
//! store or the variant keying logic.
//!
//! The rules for names and values (case sensitivity, trimming, ...) are
//! deployment specific, so they are injected through a [`Normalizer`]. Every
//! normalizer must be idempotent: normalizing an already-normalized name or
//! value must return it unchanged.

use crate::directives::EntryDirectives;
use crate::entry::{Entry, NormalizedProducerResult, ProducerResult, ProducerResultResource};
use crate::params::{NormalizedParams, NormalizedVary, ParamValue, Params, Vary};

use chrono::{DateTime, Utc};

pub use crate::directives::normalize_max_stale;

/// Canonicalizes parameter names and values.
pub trait Normalizer: Send + Sync {
  fn normalize_name(&self, raw: &str) -> String;

  /// Called with the already-normalized name.
  fn normalize_value(&self, name: &str, raw: ParamValue) -> ParamValue;
}

/// Leaves names and values untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl Normalizer for IdentityNormalizer {
  fn normalize_name(&self, raw: &str) -> String {
    raw.to_owned()
  }

  fn normalize_value(&self, _name: &str, raw: ParamValue) -> ParamValue {
    raw
  }
}

/// A normalizer built from a name function and a value function.
///
/// ```
/// use fibre_resource_cache::normalize::{FnNormalizer, Normalizer};
/// use fibre_resource_cache::ParamValue;
///
/// let n = FnNormalizer::new(
///   |name: &str| name.to_ascii_lowercase(),
///   |_name: &str, value: ParamValue| value,
/// );
/// assert_eq!(n.normalize_name("Lang"), "lang");
/// ```
pub struct FnNormalizer<N, V> {
  name_fn: N,
  value_fn: V,
}

impl<N, V> FnNormalizer<N, V>
where
  N: Fn(&str) -> String + Send + Sync,
  V: Fn(&str, ParamValue) -> ParamValue + Send + Sync,
{
  pub fn new(name_fn: N, value_fn: V) -> Self {
    Self { name_fn, value_fn }
  }
}

impl<N, V> Normalizer for FnNormalizer<N, V>
where
  N: Fn(&str) -> String + Send + Sync,
  V: Fn(&str, ParamValue) -> ParamValue + Send + Sync,
{
  fn normalize_name(&self, raw: &str) -> String {
    (self.name_fn)(raw)
  }

  fn normalize_value(&self, name: &str, raw: ParamValue) -> ParamValue {
    (self.value_fn)(name, raw)
  }
}

/// Drops params without a value, then renames each key and transforms each
/// value (the value function sees the final name).
pub fn normalize_params<N>(normalizer: &N, params: &Params) -> NormalizedParams
where
  N: Normalizer + ?Sized,
{
  NormalizedParams(
    params
      .iter()
      .filter_map(|(name, value)| {
        let value = value.as_ref()?;
        let final_name = normalizer.normalize_name(name);
        let final_value = normalizer.normalize_value(&final_name, value.clone());
        Some((final_name, final_value))
      })
      .collect(),
  )
}

/// Like [`normalize_params`], except that a `None` value is kept: in a vary
/// map it means "the param must be absent".
pub fn normalize_vary<N>(normalizer: &N, vary: &Vary) -> NormalizedVary
where
  N: Normalizer + ?Sized,
{
  NormalizedVary(
    vary
      .iter()
      .map(|(name, value)| {
        let final_name = normalizer.normalize_name(name);
        let final_value = value
          .as_ref()
          .map(|v| normalizer.normalize_value(&final_name, v.clone()));
        (final_name, final_value)
      })
      .collect(),
  )
}

/// Fills in defaults and canonicalizes a resource so it can be stored:
/// `initial_age` is clamped to `>= 0`, `vary` is normalized (defaulting to
/// empty), `max_stale` is normalized, validators default to empty and `date`
/// defaults to `fallback_date` or now.
pub fn normalize_producer_result_resource<N, C>(
  normalizer: &N,
  resource: ProducerResultResource<C>,
  fallback_date: Option<DateTime<Utc>>,
) -> Entry<C>
where
  N: Normalizer + ?Sized,
{
  let ProducerResultResource {
    id,
    vary,
    content,
    initial_age,
    date,
    directives,
    validators,
  } = resource;

  Entry {
    id,
    vary: vary
      .map(|v| normalize_vary(normalizer, &v))
      .unwrap_or_default(),
    content,
    initial_age: initial_age.unwrap_or(0.0).max(0.0),
    date: date.or(fallback_date).unwrap_or_else(Utc::now),
    directives: EntryDirectives::from(directives),
    validators: validators.unwrap_or_default(),
  }
}

/// Normalizes the primary resource and, independently, every supplemental one.
pub fn normalize_producer_result<N, C>(
  normalizer: &N,
  result: ProducerResult<C>,
  fallback_date: Option<DateTime<Utc>>,
) -> NormalizedProducerResult<C>
where
  N: Normalizer + ?Sized,
{
  let ProducerResult {
    resource,
    supplemental_resources,
  } = result;

  NormalizedProducerResult {
    entry: normalize_producer_result_resource(normalizer, resource, fallback_date),
    supplemental_resources: supplemental_resources
      .into_iter()
      .map(|it| normalize_producer_result_resource(normalizer, it, fallback_date))
      .collect(),
  }
}
