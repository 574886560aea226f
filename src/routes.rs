use std::convert::Infallible;

use futures_util::{Stream, TryStreamExt};
use warp::{
    Buf, Filter,
    filters::path::FullPath,
    http::{HeaderMap, Method},
};

use crate::{gateway::ProxyRequest, router::RequestRouter};

fn with_router(router: RequestRouter) -> impl Filter<Extract = (RequestRouter,), Error = Infallible> + Clone {
    warp::any().map(move || router.clone())
}

/// Hands the inbound body to the outbound client chunk by chunk.
fn streamed<S, B>(stream: S) -> reqwest::Body
where
    S: Stream<Item = Result<B, warp::Error>> + Send + 'static,
    B: Buf + Send + 'static,
{
    reqwest::Body::wrap_stream(stream.map_ok(|mut chunk| chunk.copy_to_bytes(chunk.remaining())))
}

/// A single catch-all filter: every request, whatever its method or path, is
/// handed to the [`RequestRouter`] whole.
pub fn get_routes(router: RequestRouter) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let query = warp::query::raw().map(Some).or(warp::any().map(|| None::<String>)).unify();

    warp::method()
        .and(warp::path::full())
        .and(query)
        .and(warp::header::headers_cloned())
        .and(warp::body::stream().map(streamed))
        .and(with_router(router))
        .and_then(
            |method: Method,
             path: FullPath,
             query: Option<String>,
             headers: HeaderMap,
             body: reqwest::Body,
             router: RequestRouter| async move {
                let request = ProxyRequest {
                    method,
                    path: path.as_str().to_string(),
                    query,
                    headers,
                    body,
                };
                router.dispatch(request).await
            },
        )
}
