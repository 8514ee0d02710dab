//! The `Firebase` handle: one location in the database tree.

use crate::client::config::ClientConfig;
use crate::client::query::QueryParams;
use crate::client::timeout::TimeoutCoordinator;
use crate::client::transport::{HeaderTimeout, LockingTransport};
use crate::client::watch::{WatchController, WatchOptions, WatchPhase, WatchSender};
use crate::error::{FireError, Result};
use crate::protocol::constants::{media_types, params, DEFAULT_SCHEME, JSON_SUFFIX};
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Prefix `https://` when no scheme is given and drop trailing slashes.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, url)
    };
    url.trim_end_matches('/').to_string()
}

/// A reference to one location in the database.
///
/// Handles derived with [`Firebase::child`] or a query method share the
/// parent's transport and timeout budget but own a copy of its query options
/// and their own watch state.
#[derive(Debug)]
pub struct Firebase {
    url: String,
    params: QueryParams,
    coordinator: Arc<TimeoutCoordinator>,
    watch: WatchController,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

impl Firebase {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, ClientConfig::default())
    }

    pub fn with_config(url: &str, config: ClientConfig) -> Result<Self> {
        let url = normalize_url(url);
        url::Url::parse(&url)?;
        Ok(Firebase {
            url,
            params: QueryParams::new(),
            coordinator: Arc::new(TimeoutCoordinator::new(&config)?),
            watch: WatchController::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Handle for `path` below this location, with a copy of the query options.
    pub fn child(&self, path: &str) -> Firebase {
        let segment = path.trim_matches('/');
        let url = if segment.is_empty() {
            self.url.clone()
        } else {
            format!("{}/{}", self.url, segment)
        };
        self.derive(url, self.params.clone())
    }

    fn derive(&self, url: String, params: QueryParams) -> Firebase {
        Firebase {
            url,
            params,
            coordinator: Arc::clone(&self.coordinator),
            watch: WatchController::new(),
        }
    }

    fn derive_with(&self, apply: impl FnOnce(&mut QueryParams)) -> Firebase {
        let mut params = self.params.clone();
        apply(&mut params);
        self.derive(self.url.clone(), params)
    }

    // ---------------------------------------------------------------------
    // Query options
    // ---------------------------------------------------------------------

    /// Truncate object children to `true` in returned values.
    pub fn shallow(&mut self, shallow: bool) {
        self.params.set_shallow(shallow);
    }

    /// Ask for `.priority` alongside returned values.
    pub fn include_priority(&mut self, include: bool) {
        self.params.set_include_priority(include);
    }

    /// Send `token` as the `auth` query parameter.
    pub fn auth(&mut self, token: impl Into<String>) {
        self.params.set(params::AUTH, token);
    }

    pub fn unauth(&mut self) {
        self.params.remove(params::AUTH);
    }

    pub fn order_by(&self, key: &str) -> Firebase {
        let key = serde_json::Value::String(key.to_string()).to_string();
        self.derive_with(|query| query.set(params::ORDER_BY, key))
    }

    pub fn equal_to<T: Serialize + ?Sized>(&self, value: &T) -> Result<Firebase> {
        self.derive_json(params::EQUAL_TO, value)
    }

    pub fn start_at<T: Serialize + ?Sized>(&self, value: &T) -> Result<Firebase> {
        self.derive_json(params::START_AT, value)
    }

    pub fn end_at<T: Serialize + ?Sized>(&self, value: &T) -> Result<Firebase> {
        self.derive_json(params::END_AT, value)
    }

    pub fn limit_to_first(&self, limit: u32) -> Firebase {
        self.derive_with(|query| query.set(params::LIMIT_TO_FIRST, limit.to_string()))
    }

    pub fn limit_to_last(&self, limit: u32) -> Firebase {
        self.derive_with(|query| query.set(params::LIMIT_TO_LAST, limit.to_string()))
    }

    fn derive_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<Firebase> {
        let mut params = self.params.clone();
        params.set_json(key, value)?;
        Ok(self.derive(self.url.clone(), params))
    }

    // ---------------------------------------------------------------------
    // Timeouts
    // ---------------------------------------------------------------------

    /// Budget for dial plus header wait, shared with every derived handle.
    pub fn timeout(&self) -> Duration {
        self.coordinator.budget().get()
    }

    /// Takes effect for requests issued after the call.
    pub fn set_timeout(&self, timeout: Duration) {
        self.coordinator.budget().set(timeout);
    }

    /// Header-wait allowance left by the most recent connection setup.
    pub fn header_timeout(&self) -> HeaderTimeout {
        self.coordinator.transport().get()
    }

    pub fn transport(&self) -> &LockingTransport {
        self.coordinator.transport()
    }

    // ---------------------------------------------------------------------
    // Data operations
    // ---------------------------------------------------------------------

    /// Read the value at this location. An empty body reads as `null`.
    pub async fn value<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self.execute(Method::GET, None).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Replace the value at this location.
    pub async fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.execute(Method::PUT, Some(serde_json::to_vec(value)?))
            .await
            .map(drop)
    }

    /// Merge the children of `value` into this location.
    pub async fn update<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.execute(Method::PATCH, Some(serde_json::to_vec(value)?))
            .await
            .map(drop)
    }

    /// Append `value` under a server-generated key and return its handle.
    pub async fn push<T: Serialize + ?Sized>(&self, value: &T) -> Result<Firebase> {
        let body = self
            .execute(Method::POST, Some(serde_json::to_vec(value)?))
            .await?;
        let pushed: PushResponse = serde_json::from_slice(&body)?;
        Ok(self.child(&pushed.name))
    }

    pub async fn remove(&self) -> Result<()> {
        self.execute(Method::DELETE, None).await.map(drop)
    }

    fn request(&self, method: Method, body: Option<Vec<u8>>) -> Result<reqwest::Request> {
        let mut url = url::Url::parse(&format!("{}{}", self.url, JSON_SUFFIX))?;
        if !self.params.is_empty() {
            url.set_query(Some(&self.params.encode()));
        }

        let mut builder = self.coordinator.transport().client().request(method, url);
        if let Some(body) = body {
            builder = builder.header(CONTENT_TYPE, media_types::JSON).body(body);
        }
        builder.build().map_err(FireError::from)
    }

    async fn execute(&self, method: Method, body: Option<Vec<u8>>) -> Result<Bytes> {
        let request = self.request(method, body)?;
        let response = self.coordinator.send(request).await?;
        response.bytes().await.map_err(FireError::from)
    }

    // ---------------------------------------------------------------------
    // Watching
    // ---------------------------------------------------------------------

    /// Stream changes at this location into `sender`.
    ///
    /// Returns once the stream is established. Data changes arrive as
    /// `Ok(Event)`; a terminal failure arrives once as `Err(..)`, after which
    /// the watch is idle again. Fails with [`FireError::AlreadyWatching`]
    /// while another watch on this handle is not idle.
    pub async fn watch(&self, sender: WatchSender) -> Result<()> {
        self.watch_with(sender, WatchOptions::default()).await
    }

    pub async fn watch_with(&self, sender: WatchSender, options: WatchOptions) -> Result<()> {
        let mut request = self.request(Method::GET, None)?;
        request.headers_mut().insert(
            ACCEPT,
            reqwest::header::HeaderValue::from_static(media_types::EVENT_STREAM),
        );
        self.watch
            .start(&self.coordinator, request, sender, options)
            .await
    }

    /// Stop the active watch, if any. No events are delivered once this
    /// returns.
    pub async fn stop_watching(&self) {
        self.watch.stop().await;
    }

    pub fn is_watching(&self) -> bool {
        matches!(
            self.watch.phase(),
            WatchPhase::Starting | WatchPhase::Streaming
        )
    }

    pub fn watch_phase(&self) -> WatchPhase {
        self.watch.phase()
    }
}

impl fmt::Display for Firebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
