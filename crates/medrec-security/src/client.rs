//! Outbound HTTP to the security service: deduplication and retry.
//!
//! ## Deduplication
//!
//! A process-wide registry maps `{method}:{url}:{serialized params}` to
//! the in-flight call for that key. Concurrent identical calls join the
//! existing operation instead of reaching the network; the entry is
//! removed when the call settles, success or failure, so a later call
//! with the same key starts fresh. This registry is the only
//! single-flight boundary in medrec; the cache itself does not
//! deduplicate misses.
//!
//! ## Retry
//!
//! A failed call is re-issued only when the failure carries no response
//! (network error, timeout) or a 5xx status, up to `max_retries` total
//! attempts, waiting `attempt * retry_base_delay` between attempts. 4xx
//! responses fail immediately. The final failure propagates unchanged.
//!
//! The caller's bearer token is read from the request context when the
//! call starts, so credentials propagate without parameter threading.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use http::HeaderMap;
use reqwest::Method;
use serde_json::Value;

use medrec_cache::{CacheService, Namespace, keys};
use medrec_core::config::HttpSettings;

use crate::context;
use crate::error::HttpError;

type FlightResult = Result<Arc<Value>, HttpError>;
type Flight = Shared<BoxFuture<'static, FlightResult>>;

/// Query parameters and body of an outbound call.
///
/// Parameters are kept sorted so identical calls serialize to identical
/// deduplication and cache keys regardless of insertion order.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A `cached_get` result, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub data: Arc<Value>,
    pub from_cache: bool,
}

/// HTTP client for the security service.
pub struct SecurityHttpClient {
    http: reqwest::Client,
    settings: HttpSettings,
    cache: Arc<CacheService>,
    pending: Arc<DashMap<String, Flight>>,
}

impl SecurityHttpClient {
    pub fn new(settings: &HttpSettings, cache: Arc<CacheService>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            settings: settings.clone(),
            cache,
            pending: Arc::new(DashMap::new()),
        }
    }

    pub async fn get(&self, url: &str) -> FlightResult {
        self.request(Method::GET, url, RequestOptions::default()).await
    }

    pub async fn get_with(&self, url: &str, options: RequestOptions) -> FlightResult {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: &str, body: Value) -> FlightResult {
        self.request(Method::POST, url, RequestOptions::default().json(body)).await
    }

    pub async fn put(&self, url: &str, body: Value) -> FlightResult {
        self.request(Method::PUT, url, RequestOptions::default().json(body)).await
    }

    pub async fn patch(&self, url: &str, body: Value) -> FlightResult {
        self.request(Method::PATCH, url, RequestOptions::default().json(body)).await
    }

    /// Issue a call, joining an identical in-flight call when one exists.
    pub async fn request(&self, method: Method, url: &str, options: RequestOptions) -> FlightResult {
        let key = Self::pending_key(&method, url, &options.params);

        let flight = match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!(key = %key, "joining in-flight security-service call");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let flight = self.start_flight(method, url.to_string(), options, key);
                entry.insert(flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Cache-first GET against the users namespace.
    ///
    /// The key is method-independent: the URL plus serialized parameters
    /// identify the payload. A miss performs the wrapped call and stores
    /// the body under `ttl` (the configured `cached_get` default when
    /// `None`). Empty bodies are returned but never cached.
    pub async fn cached_get(
        &self,
        url: &str,
        params: BTreeMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<CachedResponse, HttpError> {
        let key = keys::http_response(url, &Self::serialize_params(&params));

        if let Some(data) = self.cache.get(Namespace::Users, &key) {
            tracing::debug!(key = %key, "cached_get hit");
            return Ok(CachedResponse {
                data,
                from_cache: true,
            });
        }

        let options = RequestOptions {
            params,
            body: None,
        };
        let data = self.request(Method::GET, url, options).await?;

        if !data.is_null() {
            let ttl = ttl.unwrap_or_else(|| self.settings.cached_get_ttl());
            self.cache
                .set(Namespace::Users, &key, Arc::clone(&data), Some(ttl));
        }

        Ok(CachedResponse {
            data,
            from_cache: false,
        })
    }

    fn pending_key(method: &Method, url: &str, params: &BTreeMap<String, String>) -> String {
        format!("{}:{}:{}", method, url, Self::serialize_params(params))
    }

    fn serialize_params(params: &BTreeMap<String, String>) -> String {
        serde_json::to_string(params).unwrap_or_default()
    }

    /// Build the shared future for a new flight. The bearer token is
    /// captured here, at call start, not when joiners poll. The registry
    /// entry is removed by the flight itself as it settles.
    fn start_flight(&self, method: Method, url: String, options: RequestOptions, key: String) -> Flight {
        let client = self.http.clone();
        let settings = self.settings.clone();
        let headers = context::auth_header();
        let pending = Arc::clone(&self.pending);

        async move {
            let result =
                Self::execute_with_retry(client, settings, method, url, headers, options).await;
            pending.remove(&key);
            result
        }
        .boxed()
        .shared()
    }

    async fn execute_with_retry(
        client: reqwest::Client,
        settings: HttpSettings,
        method: Method,
        url: String,
        headers: HeaderMap,
        options: RequestOptions,
    ) -> FlightResult {
        let max_attempts = settings.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match Self::execute_once(&client, &method, &url, &headers, &options).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= max_attempts || !err.is_retryable() {
                return Err(err);
            }

            let delay = settings.retry_base_delay() * attempt;
            tracing::warn!(
                method = %method,
                url = %url,
                attempt,
                error = %err,
                "retrying security-service call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn execute_once(
        client: &reqwest::Client,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        options: &RequestOptions,
    ) -> FlightResult {
        let mut request = client.request(method.clone(), url).headers(headers.clone());
        if !options.params.is_empty() {
            request = request.query(&options.params);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(url.to_string())
            } else {
                HttpError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HttpError::Network(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(Arc::new(Value::Null));
        }

        serde_json::from_slice(&bytes)
            .map(Arc::new)
            .map_err(|e| HttpError::Decode(e.to_string()))
    }
}
