use crate::http::{make_error_response, make_json_response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
}

/// Serves `/health` (liveness) and `/ready` (readiness) for orchestrators.
pub struct AdminService<F, E> {
    is_ready: F,
    _error: PhantomData<fn() -> E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self {
            is_ready,
            _error: PhantomData,
        }
    }
}

impl<F, E> Service<Request<Incoming>> for AdminService<F, E>
where
    F: Fn() -> bool + Send + Sync + 'static,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = route(req.method(), req.uri().path(), (self.is_ready)());
        Box::pin(async move { Ok(res) })
    }
}

fn route<E>(method: &Method, path: &str, is_ready: bool) -> Response<BoxBody<Bytes, E>> {
    if method != Method::GET {
        return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    match path {
        "/health" => make_json_response(StatusCode::OK, &StatusBody { status: "ok" }),
        "/ready" if is_ready => make_json_response(StatusCode::OK, &StatusBody { status: "ok" }),
        "/ready" => make_json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &StatusBody {
                status: "not ready",
            },
        ),
        _ => make_error_response(StatusCode::NOT_FOUND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn status(method: Method, path: &str, is_ready: bool) -> StatusCode {
        route::<Infallible>(&method, path, is_ready).status()
    }

    #[test]
    fn test_admin_routes() {
        assert_eq!(status(Method::GET, "/health", false), StatusCode::OK);
        assert_eq!(status(Method::GET, "/ready", true), StatusCode::OK);
        assert_eq!(
            status(Method::GET, "/ready", false),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(Method::GET, "/other", true), StatusCode::NOT_FOUND);
        assert_eq!(
            status(Method::POST, "/health", true),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
