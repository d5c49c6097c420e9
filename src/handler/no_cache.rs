//! No-cache response decorator
//!
//! `NoCache` wraps any hyper service and inserts the cache-defeating headers
//! into every response it produces, whatever its status. The file server is
//! always served through it, so no handler path can skip the headers.

use crate::http::apply_no_cache_headers;
use hyper::service::Service;
use hyper::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// Service wrapper that marks every response as non-cacheable
#[derive(Debug, Clone)]
pub struct NoCache<S> {
    inner: S,
}

impl<S> NoCache<S> {
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for NoCache<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<ReqBody>) -> Self::Future {
        let response = self.inner.call(req);
        Box::pin(async move {
            let mut response = response.await?;
            apply_no_cache_headers(response.headers_mut());
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{Empty, Full};
    use hyper::body::Bytes;
    use hyper::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
    use hyper::service::service_fn;
    use hyper::StatusCode;
    use std::convert::Infallible;

    async fn respond_with(status: StatusCode) -> Response<Full<Bytes>> {
        let service = NoCache::new(service_fn(move |_req: Request<Empty<Bytes>>| async move {
            let mut response = Response::new(Full::new(Bytes::from_static(b"body")));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CACHE_CONTROL, "public, max-age=60".parse().unwrap());
            Ok::<_, Infallible>(response)
        }));
        service.call(Request::new(Empty::new())).await.unwrap()
    }

    #[tokio::test]
    async fn test_headers_on_every_status() {
        for status in [
            StatusCode::OK,
            StatusCode::PARTIAL_CONTENT,
            StatusCode::NOT_MODIFIED,
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::METHOD_NOT_ALLOWED,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            let response = respond_with(status).await;
            let headers = response.headers();
            assert_eq!(response.status(), status);
            assert_eq!(headers.get_all(CACHE_CONTROL).iter().count(), 1);
            assert_eq!(headers[CACHE_CONTROL], "no-cache, no-store, must-revalidate");
            assert_eq!(headers[PRAGMA], "no-cache");
            assert_eq!(headers[EXPIRES], "0");
        }
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let service = NoCache::new(service_fn(|_req: Request<Empty<Bytes>>| async {
            Err::<Response<Full<Bytes>>, _>("inner failure")
        }));
        assert_eq!(service.call(Request::new(Empty::new())).await.unwrap_err(), "inner failure");
    }
}
