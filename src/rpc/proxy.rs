//! Authenticated request/response proxy to a node API.

use crate::error::{Error, Result};
use crate::rpc::wire::{self, JsonRpcRequest};
use crate::rpc::{Dialect, NodeEndpoint};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// User agent sent with every request.
pub const HARNESS_USER_AGENT: &str = concat!("twinchain-harness/", env!("CARGO_PKG_VERSION"));

/// Default transport timeout for one round trip.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(6000);

/// Options applied to the transport connection of a proxy.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Transport timeout for one round trip.
    pub timeout: Duration,
    /// Log every request and response.
    pub trace: bool,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RPC_TIMEOUT,
            trace: false,
        }
    }
}

/// The persistent transport shared by a proxy and everything derived from it.
struct Connection {
    endpoint: NodeEndpoint,
    dialect: Dialect,
    options: ProxyOptions,
    client: RwLock<reqwest::Client>,
    next_id: AtomicU64,
    reconnects: AtomicU64,
}

impl Connection {
    fn open(endpoint: &NodeEndpoint, options: &ProxyOptions) -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(HARNESS_USER_AGENT));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .pool_max_idle_per_host(1)
            .http1_only()
            .build()
            .map_err(|e| {
                Error::Config(format!("failed to build HTTP client for {endpoint}: {e}"))
            })
    }

    fn client(&self) -> reqwest::Client {
        self.client.read().clone()
    }

    /// Drop the pooled connection and open a fresh one.
    fn reconnect(&self) -> Result<()> {
        let fresh = Self::open(&self.endpoint, &self.options)?;
        *self.client.write() = fresh;
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn round_trip(
        &self,
        url: &reqwest::Url,
        body: Option<&str>,
    ) -> std::result::Result<(u16, String), reqwest::Error> {
        let mut request = self.client().post(url.clone());
        if let Some(creds) = self.endpoint.credentials() {
            request = request.basic_auth(&creds.user, Some(&creds.password));
        }
        if let Some(body) = body {
            request = request.body(body.to_owned());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }
}

/// Client-side proxy for one node API.
///
/// Cloning or deriving a namespaced proxy with [`RpcProxy::namespace`] shares
/// the underlying connection; no network I/O happens until [`RpcProxy::invoke`].
#[derive(Clone)]
pub struct RpcProxy {
    conn: Arc<Connection>,
    namespace: Vec<String>,
}

impl RpcProxy {
    /// Create a proxy bound to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the HTTP client cannot be built.
    pub fn new(endpoint: NodeEndpoint, dialect: Dialect, options: ProxyOptions) -> Result<Self> {
        let client = Connection::open(&endpoint, &options)?;
        Ok(Self {
            conn: Arc::new(Connection {
                endpoint,
                dialect,
                options,
                client: RwLock::new(client),
                next_id: AtomicU64::new(0),
                reconnects: AtomicU64::new(0),
            }),
            namespace: Vec::new(),
        })
    }

    /// Derive a proxy whose calls are prefixed with `segment`.
    #[must_use]
    pub fn namespace(&self, segment: &str) -> Self {
        let mut namespace = self.namespace.clone();
        namespace.push(segment.to_string());
        Self {
            conn: Arc::clone(&self.conn),
            namespace,
        }
    }

    /// Endpoint this proxy talks to.
    #[must_use]
    pub fn endpoint(&self) -> &NodeEndpoint {
        &self.conn.endpoint
    }

    /// Wire dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.conn.dialect
    }

    /// Whether two proxies share one connection.
    #[must_use]
    pub fn shares_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }

    /// Number of times the connection was reopened after a disconnect.
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.conn.reconnects.load(Ordering::Relaxed)
    }

    /// Method name as it appears on the wire.
    #[must_use]
    pub fn wire_method(&self, method: &str) -> String {
        wire::wire_method(self.conn.dialect, &self.namespace, method)
    }

    /// Invoke `method` with positional `params`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` on connection failures (after one reconnect
    /// for disconnects) and `Error::Api` for error replies.
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let wire_method = self.wire_method(method);
        let (path, body) = match self.conn.dialect {
            Dialect::JsonRpc => {
                let id = self.conn.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                let body = serde_json::to_string(&JsonRpcRequest::new(&wire_method, &params, id))?;
                ("/".to_string(), Some(body))
            }
            Dialect::Rest => (wire_method.clone(), wire::rest_body(&wire_method, &params)?),
        };
        let url = self.conn.endpoint.url(&path)?;

        if self.conn.options.trace {
            debug!(
                "-> {} {} {}",
                self.conn.endpoint,
                wire_method,
                body.as_deref().unwrap_or("")
            );
        }

        let (status, text) = self.send_with_retry(&wire_method, &url, body.as_deref()).await?;

        if self.conn.options.trace {
            debug!("<- {} {} [{}] {}", self.conn.endpoint, wire_method, status, text);
        }

        match self.conn.dialect {
            Dialect::JsonRpc => wire::decode_json_rpc(&wire_method, status, &text),
            Dialect::Rest => wire::decode_rest(&wire_method, status, &text),
        }
    }

    /// Invoke `method` and deserialize the result.
    ///
    /// # Errors
    ///
    /// As [`RpcProxy::invoke`], plus `Error::Serialization` if the result has
    /// an unexpected shape.
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<R> {
        let value = self.invoke(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            Error::Serialization(format!("unexpected result from {method}: {e}"))
        })
    }

    async fn send_with_retry(
        &self,
        method: &str,
        url: &reqwest::Url,
        body: Option<&str>,
    ) -> Result<(u16, String)> {
        let transport = |e: reqwest::Error| Error::Transport {
            method: method.to_string(),
            message: e.to_string(),
        };

        match self.conn.round_trip(url, body).await {
            Ok(reply) => Ok(reply),
            Err(e) if wire::is_disconnect(&e) => {
                warn!(
                    "Connection to {} dropped during {}: {}; reconnecting",
                    self.conn.endpoint, method, e
                );
                self.conn.reconnect()?;
                self.conn.round_trip(url, body).await.map_err(transport)
            }
            Err(e) => Err(transport(e)),
        }
    }
}

impl fmt::Debug for RpcProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcProxy")
            .field("endpoint", &self.conn.endpoint)
            .field("dialect", &self.conn.dialect)
            .field("namespace", &self.namespace)
            .finish()
    }
}
