use crate::config::{Config, ValidationError};
use crate::errors::WebhookError;
use crate::event::WebhookPayload;
use crate::handler::WebhookHandler;
use crate::metrics_defs::{WEBHOOK_DURATION, WEBHOOK_FAILED, WEBHOOK_RECEIVED, WEBHOOK_REJECTED};
use http::HeaderName;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::HeaderMap;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::http::{make_error_response, make_json_response};
use shared::{counter, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

pub type WebhookBody = BoxBody<Bytes, WebhookError>;

const ACKNOWLEDGEMENT: &str = "Webhook received successfully";

#[derive(Serialize)]
struct AckResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

struct Inner {
    handler: WebhookHandler,
    path: String,
    secret_header: HeaderName,
    shared_secret: String,
}

/// The inbound webhook endpoint.
#[derive(Clone)]
pub struct WebhookService {
    inner: Arc<Inner>,
}

impl WebhookService {
    pub fn new(handler: WebhookHandler, config: &Config) -> Result<Self, ValidationError> {
        Ok(WebhookService {
            inner: Arc::new(Inner {
                handler,
                path: config.path.clone(),
                secret_header: config.secret_header_name()?,
                shared_secret: config.shared_secret.clone(),
            }),
        })
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(&self.inner.secret_header)
            .is_some_and(|value| {
                constant_time_eq(value.as_bytes(), self.inner.shared_secret.as_bytes())
            })
    }

    pub async fn respond<B>(&self, req: Request<B>) -> Response<WebhookBody>
    where
        B: Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        if req.uri().path() != self.inner.path {
            return make_error_response(StatusCode::NOT_FOUND);
        }
        if req.method() != Method::POST {
            return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        counter!(WEBHOOK_RECEIVED).increment(1);
        let start = Instant::now();

        let response = match self.accept(req).await {
            Ok(()) => make_json_response(
                StatusCode::OK,
                &AckResponse {
                    message: ACKNOWLEDGEMENT,
                },
            ),
            Err(e) => {
                match &e {
                    WebhookError::Unauthorized => {
                        counter!(WEBHOOK_REJECTED).increment(1);
                        tracing::warn!("Rejected webhook delivery with missing or invalid secret");
                    }
                    e if e.status_code().is_client_error() => {
                        counter!(WEBHOOK_FAILED, "kind" => e.kind()).increment(1);
                        tracing::warn!(error = %e, "Rejected webhook delivery");
                    }
                    e => {
                        counter!(WEBHOOK_FAILED, "kind" => e.kind()).increment(1);
                        tracing::error!(error = %e, "Failed to handle webhook delivery");
                    }
                }
                make_json_response(
                    e.status_code(),
                    &ErrorResponse {
                        error: e.to_string(),
                    },
                )
            }
        };

        histogram!(WEBHOOK_DURATION, "status" => response.status().as_str().to_string())
            .record(start.elapsed().as_secs_f64());
        response
    }

    async fn accept<B>(&self, req: Request<B>) -> Result<(), WebhookError>
    where
        B: Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        if !self.is_authorized(req.headers()) {
            return Err(WebhookError::Unauthorized);
        }

        let bytes = req
            .into_body()
            .collect()
            .await
            .map_err(|e| WebhookError::RequestBodyError(e.to_string()))?
            .to_bytes();
        let raw: Value = serde_json::from_slice(&bytes)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        let payload = WebhookPayload::deserialize(&raw)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        tracing::debug!(
            record_id = %payload.record,
            catalog = %payload.catalog,
            app = %payload.app,
            "Received webhook delivery"
        );

        self.inner.handler.handle(payload, raw).await?;
        Ok(())
    }
}

impl Service<Request<Incoming>> for WebhookService {
    type Response = Response<WebhookBody>;
    type Error = WebhookError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.respond(req).await) })
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
