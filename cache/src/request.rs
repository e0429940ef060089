use crate::directives::ConsumerDirectives;
use crate::params::{ParamValue, Params};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A consumer's request for a resource.
///
/// Params are always partial: a request may omit any of them, and the cache
/// never treats a missing param as an error.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConsumerRequest {
  pub id: String,
  #[cfg_attr(feature = "serde", serde(default))]
  pub params: Params,
  #[cfg_attr(feature = "serde", serde(default))]
  pub directives: ConsumerDirectives,
}

impl ConsumerRequest {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      params: Params::new(),
      directives: ConsumerDirectives::default(),
    }
  }

  pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
    self.params.insert(name.into(), Some(value.into()));
    self
  }

  pub fn params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  pub fn directives(mut self, directives: ConsumerDirectives) -> Self {
    self.directives = directives;
    self
  }
}
