//! Reverse proxy in front of the transfer backend.
//!
//! Uploads are forwarded verbatim and the URL the backend answers with is
//! moved from the internal host onto the public one. Retrievals are forwarded
//! with the public `Host` so anything the backend renders links back to the
//! public address. Bodies are streamed in both directions and never held
//! whole in memory.

use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use url::Url;
use warp::http::{
    HeaderMap, HeaderValue, Method, StatusCode,
    header::{self, HeaderName},
};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("backend returned {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("backend unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),
    #[error("backend returned an unusable location: {0:?}")]
    InvalidLocation(String),
    #[error("public url has no host: {0}")]
    InvalidPublicUrl(String),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// An inbound request as the router hands it to the gateway.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: reqwest::Body,
}

impl ProxyRequest {
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }
}

/// Chunks of a backend response body, yielded as they arrive.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send + Sync>>;

/// What the backend answered to a retrieval. The body has not been read yet.
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl std::fmt::Debug for BackendResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl warp::Reply for BackendResponse {
    fn into_response(self) -> warp::reply::Response {
        let mut response = warp::Reply::into_response(warp::reply::stream(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// The proxy capability the request router depends on.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Forwards an upload and returns the public URL of the stored file.
    async fn forward_upload(&self, request: ProxyRequest) -> Result<String, GatewayError>;

    async fn forward_retrieval(&self, request: &ProxyRequest) -> Result<BackendResponse, GatewayError>;
}

// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// Headers copied onto the outbound request: everything but `Host` and the
/// hop-by-hop set. `Content-Length` survives so a streamed upload keeps its
/// declared size.
fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers
}

/// `host[:port]` of a URL, as sent in a `Host` header.
fn authority(url: &Url) -> Option<String> {
    url.host_str().map(|host| match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Moves a backend-issued URL onto the public scheme, host and port, keeping
/// path and query.
pub fn rewrite_to_public(location: &str, public_url: &Url) -> Result<String, GatewayError> {
    let location = location.trim();
    let invalid = || GatewayError::InvalidLocation(location.to_string());

    let mut rewritten = Url::parse(location).map_err(|_| invalid())?;
    if rewritten.host_str().is_none() {
        return Err(invalid());
    }
    rewritten.set_scheme(public_url.scheme()).map_err(|_| invalid())?;
    rewritten.set_host(public_url.host_str()).map_err(|_| invalid())?;
    rewritten.set_port(public_url.port()).map_err(|_| invalid())?;
    Ok(rewritten.to_string())
}

pub struct TransferProxy {
    backend_url: Url,
    public_url: Url,
    public_host: HeaderValue,
    client: reqwest::Client,
}

impl TransferProxy {
    pub fn new(backend_url: Url, public_url: Url, timeout: Duration) -> Result<Self, GatewayError> {
        let public_host = authority(&public_url)
            .and_then(|host| HeaderValue::from_str(&host).ok())
            .ok_or_else(|| GatewayError::InvalidPublicUrl(public_url.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(GatewayError::Client)?;

        Ok(Self {
            backend_url,
            public_url,
            public_host,
            client,
        })
    }

    fn target(&self, request: &ProxyRequest) -> String {
        format!(
            "{}{}",
            self.backend_url.as_str().trim_end_matches('/'),
            request.path_and_query()
        )
    }
}

#[async_trait]
impl Gateway for TransferProxy {
    async fn forward_upload(&self, request: ProxyRequest) -> Result<String, GatewayError> {
        let target = self.target(&request);
        tracing::debug!("forwarding {} upload to {}", &request.method, &target);

        let response = self
            .client
            .request(request.method.clone(), &target)
            .headers(outbound_headers(&request.headers))
            .body(request.body)
            .send()
            .await
            .map_err(GatewayError::Unavailable)?;

        let status = response.status();
        let body = response.text().await.map_err(GatewayError::Unavailable)?;
        if status != StatusCode::OK {
            return Err(GatewayError::Rejected { status, body });
        }

        let public = rewrite_to_public(&body, &self.public_url)?;
        tracing::debug!("backend stored upload at {}, public {}", body.trim(), &public);
        Ok(public)
    }

    async fn forward_retrieval(&self, request: &ProxyRequest) -> Result<BackendResponse, GatewayError> {
        let target = self.target(request);
        tracing::debug!("forwarding retrieval to {}", &target);

        let mut headers = outbound_headers(&request.headers);
        headers.remove(header::CONTENT_LENGTH);
        headers.insert(header::HOST, self.public_host.clone());

        let response = self
            .client
            .get(&target)
            .headers(headers)
            .send()
            .await
            .map_err(GatewayError::Unavailable)?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        Ok(BackendResponse {
            status,
            headers,
            body: Box::pin(response.bytes_stream()),
        })
    }
}
