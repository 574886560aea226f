#![allow(dead_code)]

use std::{net::SocketAddr, sync::Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use transfer_shortener::{
    db::DbError,
    gateway::{BackendResponse, Gateway, GatewayError, ProxyRequest},
    model::ShortLink,
    shortener::{ShortLinkError, ShortLinks},
};
use warp::http::{HeaderMap, HeaderValue, Method, StatusCode};

pub const PUBLIC_URL: &str = "https://t.example.com";

#[derive(Default)]
pub struct FakeLinks {
    pub known: Vec<(&'static str, &'static str)>,
    pub fail_create: bool,
    pub resolved: Mutex<Vec<String>>,
    pub created: Mutex<Vec<String>>,
}

#[async_trait]
impl ShortLinks for FakeLinks {
    async fn create_short_link(&self, full_url: &str) -> Result<ShortLink, ShortLinkError> {
        self.created.lock().unwrap().push(full_url.to_string());
        if self.fail_create {
            return Err(ShortLinkError::Persistence(DbError::NotFound));
        }
        Ok(ShortLink::new("xyz1".to_string(), full_url.to_string()))
    }

    async fn resolve_token(&self, token: &str) -> Result<String, ShortLinkError> {
        self.resolved.lock().unwrap().push(token.to_string());
        self.known
            .iter()
            .find(|(known, _)| *known == token)
            .map(|(_, url)| url.to_string())
            .ok_or(ShortLinkError::NotFound)
    }
}

/// An upload as the fake gateway saw it, body read to the end.
#[derive(Debug)]
pub struct RecordedUpload {
    pub method: Method,
    pub path: String,
    pub body: Bytes,
}

#[derive(Default)]
pub struct FakeGateway {
    pub upload_status: Option<StatusCode>,
    // Retrievals fail with InvalidLocation. Unavailable would be the realistic
    // error but it wraps a reqwest::Error, which only reqwest can build.
    pub failing: bool,
    pub uploads: Mutex<Vec<RecordedUpload>>,
    pub retrievals: Mutex<Vec<String>>,
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn forward_upload(&self, request: ProxyRequest) -> Result<String, GatewayError> {
        let path = request.path_and_query();
        let body = request.body.collect().await.map_err(GatewayError::Unavailable)?.to_bytes();
        self.uploads.lock().unwrap().push(RecordedUpload {
            method: request.method,
            path: path.clone(),
            body,
        });
        match self.upload_status {
            Some(status) if status != StatusCode::OK => Err(GatewayError::Rejected {
                status,
                body: "Could not save file".to_string(),
            }),
            _ => Ok(format!("{PUBLIC_URL}/abc12{path}")),
        }
    }

    async fn forward_retrieval(&self, request: &ProxyRequest) -> Result<BackendResponse, GatewayError> {
        self.retrievals.lock().unwrap().push(request.path_and_query());
        if self.failing {
            return Err(GatewayError::InvalidLocation("down".to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        let chunks: Vec<Result<Bytes, reqwest::Error>> =
            vec![Ok(Bytes::from_static(b"from ")), Ok(Bytes::from_static(b"backend"))];
        Ok(BackendResponse {
            status: StatusCode::OK,
            headers,
            body: Box::pin(futures_util::stream::iter(chunks)),
        })
    }
}

pub async fn body_string(response: warp::reply::Response) -> Result<String, Box<dyn std::error::Error + 'static>> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// Reads one request off the socket, up to the end of its body.
pub async fn read_request(socket: &mut TcpStream) -> String {
    let mut received = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&chunk[..n]);
        if request_complete(&received) {
            break;
        }
    }
    String::from_utf8_lossy(&received).to_lowercase()
}

fn request_complete(received: &[u8]) -> bool {
    let text = String::from_utf8_lossy(received);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let header = |wanted: &str| {
        text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.trim().to_ascii_lowercase())
    };
    if header("transfer-encoding").is_some_and(|value| value.contains("chunked")) {
        return text[head_end + 4..].ends_with("0\r\n\r\n");
    }
    let content_length = header("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    received.len() >= head_end + 4 + content_length
}

/// Serves exactly one connection with a canned response and hands back the
/// raw request it received, lowercased.
pub async fn one_shot_backend(
    response: String,
) -> Result<(SocketAddr, JoinHandle<String>), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let received = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        received
    });

    Ok((addr, handle))
}

pub fn canned(status_line: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
        body.len()
    )
}
