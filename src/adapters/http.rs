//! Pooled HTTP clients sharing one connection-reusing transport

use crate::config::PoolConfig;
use crate::errors::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::pool::ResourcePool;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Transport and recycling options for HTTP client pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpClientOptions {
    /// Prefix for relative request paths
    pub base_url: Option<String>,

    #[serde(with = "crate::config::duration_ms")]
    pub timeout: Duration,

    #[serde(with = "crate::config::duration_ms")]
    pub connect_timeout: Duration,

    /// How long the shared transport keeps idle connections open
    #[serde(with = "crate::config::duration_ms")]
    pub pool_idle_timeout: Duration,

    pub max_idle_per_host: usize,

    pub user_agent: Option<String>,

    pub default_headers: HashMap<String, String>,

    /// Clients older than this are recycled
    #[serde(with = "crate::config::duration_ms")]
    pub max_age: Duration,

    /// Clients whose error ratio exceeds this (0.0 to 1.0) are recycled
    pub max_error_rate: f64,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            max_idle_per_host: 32,
            user_agent: Some(format!("poolkeeper/{}", env!("CARGO_PKG_VERSION"))),
            default_headers: HashMap::new(),
            max_age: Duration::from_secs(300),
            max_error_rate: 0.5,
        }
    }
}

impl HttpClientOptions {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    fn build_transport(&self) -> PoolResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PoolError::InvalidConfiguration(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| PoolError::InvalidConfiguration(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .default_headers(headers);
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.as_str());
        }
        builder
            .build()
            .map_err(|e| PoolError::InvalidConfiguration(e.to_string()))
    }
}

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> PoolResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A pooled client handle with its own health counters
pub struct HttpClient {
    transport: reqwest::Client,
    base_url: Option<String>,
    created_at: Instant,
    requests: AtomicU64,
    errors: AtomicU64,
}

impl HttpClient {
    fn new(transport: reqwest::Client, base_url: Option<String>) -> Self {
        Self {
            transport,
            base_url,
            created_at: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Failed share of requests, 0.0 to 1.0
    pub fn error_rate(&self) -> f64 {
        let requests = self.request_count();
        if requests == 0 {
            0.0
        } else {
            self.error_count() as f64 / requests as f64
        }
    }

    pub fn record(&self, success: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn url(&self, path: &str) -> String {
        match &self.base_url {
            Some(base) if !path.starts_with("http://") && !path.starts_with("https://") => {
                format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    path.trim_start_matches('/')
                )
            }
            _ => path.to_string(),
        }
    }

    /// Send a request and read the whole body. Transport errors and 5xx
    /// responses count against this client.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> PoolResult<HttpResponse> {
        let mut request = self.transport.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let result = async move {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.bytes().await?.to_vec();
            Ok::<_, reqwest::Error>(HttpResponse {
                status,
                headers,
                body,
            })
        }
        .await;

        match result {
            Ok(response) => {
                self.record(response.status < 500);
                Ok(response)
            }
            Err(err) => {
                self.record(false);
                Err(PoolError::RequestFailed(err.to_string()))
            }
        }
    }
}

/// Builds [`HttpClient`]s over one shared transport
pub struct HttpClientFactory {
    transport: reqwest::Client,
    options: HttpClientOptions,
}

impl HttpClientFactory {
    pub fn new(options: HttpClientOptions) -> PoolResult<Self> {
        if !(0.0..=1.0).contains(&options.max_error_rate) {
            return Err(PoolError::InvalidConfiguration(
                "max_error_rate must be between 0 and 1".to_string(),
            ));
        }
        Ok(Self {
            transport: options.build_transport()?,
            options,
        })
    }

    pub fn options(&self) -> &HttpClientOptions {
        &self.options
    }
}

#[async_trait]
impl ResourceFactory for HttpClientFactory {
    type Resource = HttpClient;

    async fn create(&self) -> PoolResult<HttpClient> {
        Ok(HttpClient::new(
            self.transport.clone(),
            self.options.base_url.clone(),
        ))
    }

    async fn validate(&self, client: &HttpClient) -> bool {
        if client.age() > self.options.max_age {
            debug!(age = ?client.age(), "Recycling HTTP client past max age");
            return false;
        }
        if client.error_rate() > self.options.max_error_rate {
            debug!(error_rate = client.error_rate(), "Recycling HTTP client with high error rate");
            return false;
        }
        true
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

/// A pool of HTTP clients that routes every request through `with_resource`
///
/// # Examples
///
/// ```no_run
/// use poolkeeper::{HttpClientOptions, HttpClientPool, PoolConfig};
///
/// # #[tokio::main]
/// # async fn main() -> poolkeeper::PoolResult<()> {
/// let options = HttpClientOptions::default().with_base_url("https://api.example.com");
/// let pool = HttpClientPool::new("api", options, PoolConfig::new().with_max(4))?;
///
/// let response = pool.get("/status").await?;
/// println!("{}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpClientPool {
    pool: ResourcePool<HttpClientFactory>,
}

impl HttpClientPool {
    pub fn new(
        name: impl Into<String>,
        options: HttpClientOptions,
        config: PoolConfig,
    ) -> PoolResult<Self> {
        let factory = HttpClientFactory::new(options)?;
        Ok(Self {
            pool: ResourcePool::named(name, factory, config)?,
        })
    }

    pub fn from_pool(pool: ResourcePool<HttpClientFactory>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ResourcePool<HttpClientFactory> {
        &self.pool
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> PoolResult<HttpResponse> {
        let path = path.to_string();
        self.pool
            .with_resource(move |client| {
                Box::pin(async move { client.execute(method, &path, body).await })
            })
            .await
    }

    pub async fn get(&self, path: &str) -> PoolResult<HttpResponse> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> PoolResult<HttpResponse> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> PoolResult<HttpResponse> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> PoolResult<HttpResponse> {
        self.request(Method::DELETE, path, None).await
    }
}
