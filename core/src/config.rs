//! Per-service configuration and the stores that resolve it by name.
//!
//! # Design
//! Records are plain serde structs with camelCase keys, so a configuration
//! document looks like:
//!
//! ```json
//! {
//!   "billing": { "host": "billing.internal", "port": 8080, "retryLimit": 2 },
//!   "search":  { "url": "https://search.example.com/v1", "timeout": 3 }
//! }
//! ```
//!
//! Every loader validates each record before handing it out, so a store
//! never resolves a record without a host or url.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ConfigError};
use crate::http::{HttpMethod, HttpRequest};
use crate::transport::{Transport, TransportOptions};
use crate::url_builder;

fn default_timeout() -> u64 {
    10
}

fn default_keep_alive() -> bool {
    true
}

fn default_agent() -> String {
    format!("rest-core/{}", env!("CARGO_PKG_VERSION"))
}

/// Settings for one named service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub retry_limit: u32,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    /// Overrides the registry-wide failure policy when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raise_on_failure: Option<bool>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            url: None,
            port: None,
            timeout: default_timeout(),
            retry_limit: 0,
            verbose: false,
            keep_alive: default_keep_alive(),
            agent: default_agent(),
            auth: None,
            raise_on_failure: None,
        }
    }
}

impl ClientConfig {
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if !set(&self.host) && !set(&self.url) {
            return Err(ClientError::InvalidArgument(
                "host or url is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<String, ClientError> {
        url_builder::base_url(self.host.as_deref(), self.url.as_deref(), self.port)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Transport settings: timeout, agent, keep-alive, a JSON `Accept`
    /// header, and basic credentials when configured.
    pub fn transport_options(&self) -> TransportOptions {
        let mut default_headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(header) = self.auth.as_ref().and_then(AuthConfig::header) {
            default_headers.push(header);
        }
        TransportOptions {
            timeout: self.timeout_duration(),
            user_agent: self.agent.clone(),
            keep_alive: self.keep_alive,
            default_headers,
        }
    }
}

/// Credentials. Only `basic` is applied to requests; other types are kept
/// for callers that handle them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl AuthConfig {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            kind: "basic".to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn header(&self) -> Option<(String, String)> {
        if !self.kind.eq_ignore_ascii_case("basic") {
            return None;
        }
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        Some(("Authorization".to_string(), format!("Basic {token}")))
    }
}

/// Resolves a service name to its configuration.
pub trait ConfigStore: Send + Sync {
    fn resolve(&self, name: &str) -> Option<ClientConfig>;
}

/// Validated configuration records keyed by service name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceConfigs {
    services: BTreeMap<String, ClientConfig>,
}

impl ServiceConfigs {
    pub fn from_map(services: HashMap<String, ClientConfig>) -> Result<Self, ClientError> {
        Self::validated(services.into_iter().collect())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ClientError> {
        let services = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        Self::validated(services)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    fn validated(services: BTreeMap<String, ClientConfig>) -> Result<Self, ClientError> {
        for (name, config) in &services {
            config.validate().map_err(|err| ConfigError::Invalid {
                service: name.clone(),
                reason: match err {
                    ClientError::InvalidArgument(reason) => reason,
                    other => other.to_string(),
                },
            })?;
        }
        Ok(Self { services })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ConfigStore for ServiceConfigs {
    fn resolve(&self, name: &str) -> Option<ClientConfig> {
        self.services.get(name).cloned()
    }
}

/// Configuration fetched from a URL and cached on disk.
///
/// A cache file younger than `max_age` is used without fetching. When a
/// fetch fails, an existing cache file is used however old it is.
#[derive(Debug, Clone)]
pub struct RemoteConfigSource {
    url: String,
    cache_path: PathBuf,
    max_age: Duration,
}

impl RemoteConfigSource {
    pub fn new(url: impl Into<String>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            cache_path: cache_path.into(),
            max_age: Duration::from_secs(3600),
        }
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn load(&self, transport: &dyn Transport) -> Result<ServiceConfigs, ClientError> {
        if self.cache_is_fresh() {
            tracing::debug!(path = %self.cache_path.display(), "config cache hit");
            return ServiceConfigs::from_file(&self.cache_path);
        }
        tracing::debug!(url = %self.url, "config cache miss, fetching");

        match self.fetch(transport) {
            Ok(json) => {
                let configs = ServiceConfigs::from_json_str(&json)?;
                self.write_cache(&json)?;
                Ok(configs)
            }
            Err(err) if self.cache_path.exists() => {
                tracing::warn!(
                    url = %self.url,
                    error = %err,
                    "config fetch failed, using stale cache"
                );
                ServiceConfigs::from_file(&self.cache_path)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn cache_is_fresh(&self) -> bool {
        let Ok(modified) = fs::metadata(&self.cache_path).and_then(|m| m.modified()) else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age < self.max_age)
            .unwrap_or(true)
    }

    fn fetch(&self, transport: &dyn Transport) -> Result<String, ConfigError> {
        let mut request = HttpRequest::new(HttpMethod::Get, self.url.clone());
        request
            .headers
            .push(("Accept".to_string(), "application/json".to_string()));
        let response = transport
            .send(&request)
            .map_err(|e| ConfigError::Fetch(e.to_string()))?;
        if !response.is_success() {
            return Err(ConfigError::Fetch(format!(
                "{} returned {}",
                self.url,
                response.status_line()
            )));
        }
        Ok(response.body)
    }

    fn write_cache(&self, json: &str) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.cache_path.clone(),
            source,
        };
        if let Some(parent) = self.cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&self.cache_path, json).map_err(io_err)
    }
}
