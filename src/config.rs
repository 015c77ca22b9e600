//! Connection settings read from the environment.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const ENV_STORE_URI: &str = "SQUIRREL_URI";
pub const ENV_CACHE_SERVERS: &str = "SQUIRREL_CACHE_SERVERS";
pub const ENV_CACHE_DB: &str = "SQUIRREL_CACHE_DB";
pub const ENV_CACHE_PASSWORD: &str = "SQUIRREL_CACHE_PASSWORD";

/// Settings for the store and the cache ring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
  pub store_uri: String,
  /// Comma-separated `host:port` list
  pub cache_servers: String,
  #[serde(default)]
  pub cache_db: u32,
  #[serde(default)]
  pub cache_password: Option<String>,
}

impl Settings {
  /// Read settings from `SQUIRREL_*` variables. Unset variables fall back to
  /// their defaults; a cache db index that is not a number is an error.
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let cache_db = match lookup(ENV_CACHE_DB).filter(|v| !v.trim().is_empty()) {
      Some(raw) => raw
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{ENV_CACHE_DB} must be a number, got {raw:?}")))?,
      None => 0,
    };

    Ok(Self {
      store_uri: lookup(ENV_STORE_URI).unwrap_or_default(),
      cache_servers: lookup(ENV_CACHE_SERVERS).unwrap_or_default(),
      cache_db,
      cache_password: lookup(ENV_CACHE_PASSWORD).filter(|p| !p.is_empty()),
    })
  }

  pub fn with_store_uri(mut self, uri: impl Into<String>) -> Self {
    self.store_uri = uri.into();
    self
  }

  pub fn with_cache_servers(mut self, servers: impl Into<String>) -> Self {
    self.cache_servers = servers.into();
    self
  }

  pub fn with_cache_db(mut self, db: u32) -> Self {
    self.cache_db = db;
    self
  }

  pub fn with_cache_password(mut self, password: impl Into<String>) -> Self {
    self.cache_password = Some(password.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| vars.get(key).cloned()
  }

  #[test]
  fn test_from_lookup() {
    let settings = Settings::from_lookup(lookup(&[
      (ENV_STORE_URI, "squirrel://localhost:8082"),
      (ENV_CACHE_SERVERS, "10.0.0.1:6379, 10.0.0.2:6379"),
      (ENV_CACHE_DB, "3"),
      (ENV_CACHE_PASSWORD, "secret"),
    ]))
    .unwrap();

    assert_eq!(settings.store_uri, "squirrel://localhost:8082");
    assert_eq!(settings.cache_servers, "10.0.0.1:6379, 10.0.0.2:6379");
    assert_eq!(settings.cache_db, 3);
    assert_eq!(settings.cache_password.as_deref(), Some("secret"));
  }

  #[test]
  fn test_defaults() {
    let settings = Settings::from_lookup(lookup(&[(ENV_CACHE_PASSWORD, "")])).unwrap();
    assert_eq!(settings, Settings::default());
  }

  #[test]
  fn test_bad_db_index() {
    let err = Settings::from_lookup(lookup(&[(ENV_CACHE_DB, "two")])).unwrap_err();
    assert!(matches!(err, Error::Config(msg) if msg.contains(ENV_CACHE_DB)));
  }

  #[test]
  fn test_builder_chain() {
    let settings = Settings::default()
      .with_cache_servers("cache:6379")
      .with_cache_db(1)
      .with_cache_password("pw");
    assert_eq!(settings.cache_servers, "cache:6379");
    assert_eq!(settings.cache_db, 1);
    assert_eq!(settings.cache_password.as_deref(), Some("pw"));
  }
}
