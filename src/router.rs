use std::{convert::Infallible, sync::Arc};

use warp::http::{HeaderValue, Method, StatusCode, header};

use crate::{
    gateway::{Gateway, ProxyRequest},
    shortener::ShortLinks,
};

/// Where a request goes, decided from method, path and `Accept` alone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Route {
    Health,
    Upload,
    Index { browser: bool },
    Token(String),
    Passthrough,
    MethodNotAllowed,
}

/// Classifies a request. Rules are checked in order and the first match wins.
pub fn classify(method: &Method, path: &str, accept: Option<&str>) -> Route {
    if path == "/health" {
        return Route::Health;
    }
    if method == Method::PUT || method == Method::POST {
        return Route::Upload;
    }
    if method != Method::GET {
        return Route::MethodNotAllowed;
    }
    if path == "/" {
        let browser = accept.is_some_and(|accept| accept.contains("text/html"));
        return Route::Index { browser };
    }

    // "abc12/file.txt" is a backend path, never a token
    let segment = path.strip_prefix('/').unwrap_or(path);
    if segment.contains('/') {
        Route::Passthrough
    } else {
        Route::Token(segment.to_string())
    }
}

#[derive(Clone)]
pub struct RequestRouter {
    links: Arc<dyn ShortLinks>,
    gateway: Arc<dyn Gateway>,
    public_url: String,
}

fn text(body: impl Into<String>, status: StatusCode) -> Result<Box<dyn warp::Reply>, Infallible> {
    Ok(Box::new(warp::reply::with_status(body.into(), status)))
}

fn bad_gateway() -> Result<Box<dyn warp::Reply>, Infallible> {
    text("Backend error", StatusCode::BAD_GATEWAY)
}

impl RequestRouter {
    pub fn new(links: Arc<dyn ShortLinks>, gateway: Arc<dyn Gateway>, public_url: &str) -> Self {
        Self {
            links,
            gateway,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn dispatch(&self, request: ProxyRequest) -> Result<Box<dyn warp::Reply>, Infallible> {
        tracing::info!("{} {}", &request.method, request.path_and_query());

        let accept = request.headers.get(header::ACCEPT).and_then(|value| value.to_str().ok());
        match classify(&request.method, &request.path, accept) {
            Route::Health => text("ok", StatusCode::OK),
            Route::Upload => self.upload(request).await,
            Route::Index { browser: true } => self.index_page(&request).await,
            Route::Index { browser: false } => self.usage(),
            Route::Token(token) => self.redirect_or_passthrough(&token, &request).await,
            Route::Passthrough => self.passthrough(&request).await,
            Route::MethodNotAllowed => text("Method not allowed", StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    async fn upload(&self, request: ProxyRequest) -> Result<Box<dyn warp::Reply>, Infallible> {
        let full_url = match self.gateway.forward_upload(request).await {
            Ok(full_url) => full_url,
            Err(e) => {
                tracing::error!("upload proxy error: {e}");
                return bad_gateway();
            }
        };

        match self.links.create_short_link(&full_url).await {
            Ok(link) => {
                tracing::info!("new short link: {}", &link);
                text(format!("{}/{}\n", self.public_url, link.token), StatusCode::OK)
            }
            Err(e) => {
                // the backend already holds the file; only the short link is missing
                tracing::error!("failed to create short link for {full_url}: {e}");
                text("Failed to create short URL", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    async fn redirect_or_passthrough(
        &self,
        token: &str,
        request: &ProxyRequest,
    ) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.links.resolve_token(token).await {
            Ok(location) => Ok(Box::new(warp::reply::with_header(
                warp::reply::with_status(warp::reply(), StatusCode::TEMPORARY_REDIRECT),
                "Location",
                location,
            ))),
            Err(e) => {
                tracing::debug!("{token} is not a short link ({e}), passing through");
                self.passthrough(request).await
            }
        }
    }

    async fn passthrough(&self, request: &ProxyRequest) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.gateway.forward_retrieval(request).await {
            Ok(response) => Ok(Box::new(response)),
            Err(e) => {
                tracing::error!("retrieval proxy error: {e}");
                bad_gateway()
            }
        }
    }

    async fn index_page(&self, request: &ProxyRequest) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.gateway.forward_retrieval(request).await {
            Ok(mut response) => {
                response.headers.append(header::VARY, HeaderValue::from_static("Accept"));
                Ok(Box::new(response))
            }
            Err(e) => {
                tracing::error!("index proxy error: {e}");
                Ok(Box::new(warp::reply::with_header(
                    warp::reply::with_status("Backend error", StatusCode::BAD_GATEWAY),
                    "Vary",
                    "Accept",
                )))
            }
        }
    }

    fn usage(&self) -> Result<Box<dyn warp::Reply>, Infallible> {
        let body = format!(
            "Transfer Shortener\n\n\
             Upload: curl --upload-file ./file.txt {public}/file.txt\n\
             Or:     curl -F filedata=@./file.txt {public}/\n",
            public = self.public_url
        );
        Ok(Box::new(warp::reply::with_header(body, "Vary", "Accept")))
    }
}
