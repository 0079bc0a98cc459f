//! Configuration surface for the medrec core.
//!
//! Settings deserialize from a `medrec.toml` file and `MEDREC_`-prefixed
//! environment variables (`MEDREC_HTTP__MAX_RETRIES=5` style). Every value
//! has a default, so an empty configuration is a valid one.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// TTL and capacity of one cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSettings {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl NamespaceSettings {
    pub const fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            ttl_secs,
            max_entries,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Per-namespace cache tuning.
///
/// Defaults reflect the access patterns of each entity kind: identity
/// records and documents change rarely (long TTL, large capacity), patient
/// listing pages go stale quickly (short TTL, small capacity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub users: NamespaceSettings,
    pub patients: NamespaceSettings,
    pub roles: NamespaceSettings,
    pub diagnostics: NamespaceSettings,
    pub relations: NamespaceSettings,
    pub documents: NamespaceSettings,
    pub medical_histories: NamespaceSettings,
    pub timelines: NamespaceSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            users: NamespaceSettings::new(300, 1000),
            patients: NamespaceSettings::new(120, 100),
            roles: NamespaceSettings::new(600, 500),
            diagnostics: NamespaceSettings::new(180, 200),
            relations: NamespaceSettings::new(240, 300),
            documents: NamespaceSettings::new(600, 1000),
            medical_histories: NamespaceSettings::new(300, 500),
            timelines: NamespaceSettings::new(180, 500),
        }
    }
}

/// Outbound HTTP client tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout. A timed-out call counts as a retryable failure.
    pub timeout_secs: u64,

    /// Total attempts for a retryable failure, the initial call included.
    pub max_retries: u32,

    /// Linear backoff base: attempt `n` waits `n * retry_base_delay_ms`.
    pub retry_base_delay_ms: u64,

    /// Default TTL for `cached_get` responses.
    pub cached_get_ttl_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            cached_get_ttl_secs: 60,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn cached_get_ttl(&self) -> Duration {
        Duration::from_secs(self.cached_get_ttl_secs)
    }
}

/// Remote security-service connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Base URL of the ms-security service.
    pub base_url: String,

    /// HS256 secret for verifying inbound bearer tokens.
    pub jwt_secret: String,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            jwt_secret: String::new(),
        }
    }
}

/// Aggregate settings for the medrec core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedrecSettings {
    pub cache: CacheSettings,
    pub http: HttpSettings,
    pub security: SecuritySettings,
}

impl MedrecSettings {
    /// Load settings from `medrec.toml` (optional) and `MEDREC_` env vars.
    pub fn load() -> Result<Self> {
        Self::load_from("medrec")
    }

    /// Load settings from a named config file (without extension) and
    /// `MEDREC_` env vars. Environment values win over the file.
    pub fn load_from(file: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix("MEDREC").separator("__"))
            .build()
            .map_err(|e| CoreError::configuration(e.to_string()))?;

        let settings: Self = cfg
            .try_deserialize()
            .map_err(|e| CoreError::configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.http.max_retries == 0 {
            return Err(CoreError::invalid_setting(
                "http.max_retries",
                "must be at least 1 (the initial attempt)",
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(CoreError::invalid_setting(
                "http.timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.security.base_url.is_empty() {
            return Err(CoreError::invalid_setting(
                "security.base_url",
                "must not be empty",
            ));
        }
        Ok(())
    }
}
