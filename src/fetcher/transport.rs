//! HTTP transport seam
//!
//! The retrying client only needs a status code, a handful of headers and the
//! body bytes, so the transport hands back an [`ApiResponse`] instead of a
//! `reqwest::Response`. Request signing is a separate [`RequestAuthorizer`]
//! capability applied to each built request.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::shared_resources::global_http_client;
use super::{FetcherError, FetcherResult};

/// Supported HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

/// Raw response as seen by the retrying client
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Bytes,
}

impl ApiResponse {
    /// Build a response; header names are lowercased
    pub fn new(status: u16, headers: HashMap<String, String>, body: impl Into<Bytes>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can perform one HTTP exchange
#[async_trait]
pub trait AdsTransport: Send + Sync {
    /// Send a request with query parameters and return the raw response
    ///
    /// Only transport failures are errors; every HTTP status is a response.
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> FetcherResult<ApiResponse>;
}

/// Signs or otherwise authorizes an outgoing request
pub trait RequestAuthorizer: Send + Sync {
    /// Mutate the request in place (headers, query)
    fn authorize(&self, request: &mut Request) -> FetcherResult<()>;
}

/// OAuth 2.0 bearer token authorization
#[derive(Clone)]
pub struct BearerAuthorizer {
    token: String,
}

impl BearerAuthorizer {
    /// Authorizer sending `Authorization: Bearer <token>`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthorizer")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl RequestAuthorizer for BearerAuthorizer {
    fn authorize(&self, request: &mut Request) -> FetcherResult<()> {
        let value = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| FetcherError::InvalidArgument(format!("invalid bearer token: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Leaves requests untouched (pre-signed URLs, local mocks)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthorizer;

impl RequestAuthorizer for NoAuthorizer {
    fn authorize(&self, _request: &mut Request) -> FetcherResult<()> {
        Ok(())
    }
}

/// `reqwest`-backed transport
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Arc<Client>,
    authorizer: Arc<dyn RequestAuthorizer>,
}

impl ReqwestTransport {
    /// Transport over an explicit client
    pub fn new(client: Arc<Client>, authorizer: Arc<dyn RequestAuthorizer>) -> Self {
        Self { client, authorizer }
    }

    /// Transport over the process-wide client
    pub fn shared(authorizer: Arc<dyn RequestAuthorizer>) -> Self {
        Self::new(global_http_client(), authorizer)
    }
}

#[async_trait]
impl AdsTransport for ReqwestTransport {
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> FetcherResult<ApiResponse> {
        let mut request = self
            .client
            .request(method.into(), url)
            .query(params)
            .build()
            .map_err(|e| FetcherError::InvalidArgument(format!("invalid request to {url}: {e}")))?;
        self.authorizer.authorize(&mut request)?;

        debug!(method = %method, url = %request.url(), "Sending Ads API request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| FetcherError::Network(e.to_string()))?;

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
        let body = response
            .bytes()
            .await
            .map_err(|e| FetcherError::Network(e.to_string()))?;

        Ok(ApiResponse::new(status, headers, body))
    }
}
