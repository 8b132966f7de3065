use crate::config::UpstreamConfig;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::AUTHORIZATION;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use url::Url;

const TOKEN: &str = "test-token";
const PREFIX: &str = "/acme/api/v1";

#[derive(Default)]
struct State {
    registered: Mutex<Vec<Value>>,
    deleted: Mutex<Vec<String>>,
}

/// In-process stand-in for the upstream API, bound to an ephemeral port.
pub struct MockUpstream {
    port: u16,
    state: Arc<State>,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(State::default());

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let state = server_state.clone();

                tokio::spawn(async move {
                    let svc = service_fn(move |req| handle(req, state.clone()));
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await;
                });
            }
        });

        MockUpstream { port, state }
    }

    pub fn config(&self) -> UpstreamConfig {
        UpstreamConfig {
            api_url: Url::parse(&format!("http://127.0.0.1:{}", self.port)).unwrap(),
            tenancy: "acme".into(),
            api_token: TOKEN.into(),
            timeout_secs: 5,
        }
    }

    pub fn registered(&self) -> Vec<Value> {
        self.state.registered.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().unwrap().clone()
    }
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<State>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let authorized = req
        .headers()
        .get(AUTHORIZATION)
        .is_some_and(|v| v == format!("Bearer {TOKEN}").as_str());
    if !authorized {
        return Ok(json_response(
            StatusCode::UNAUTHORIZED,
            json!({"error": "unauthorized"}),
        ));
    }

    let method = req.method().clone();
    let path = req
        .uri()
        .path()
        .strip_prefix(PREFIX)
        .unwrap_or_default()
        .to_string();

    let response = match (method, path.as_str()) {
        (Method::GET, "/catalogs/Main/items/R1") => json_response(
            StatusCode::OK,
            json!({
                "id": "R1",
                "catalog": "Main",
                "apps": [
                    {"name": "Intake", "completed": true},
                    {"name": "Review", "userType": "api"}
                ]
            }),
        ),
        (Method::GET, "/catalogs/Main/items/dup") => json_response(
            StatusCode::OK,
            json!({"id": "dup", "apps": [{"name": "A"}, {"name": "A"}]}),
        ),
        (Method::GET, "/webhooks") => json_response(
            StatusCode::OK,
            json!([
                {"id": "wh1", "url": "https://a.example.com/", "events": ["catalog.app.completed"], "catalogs": ["all"]},
                {"id": "wh2", "url": "https://b.example.com/"}
            ]),
        ),
        (Method::POST, "/webhooks") => {
            let bytes = req.into_body().collect().await.unwrap().to_bytes();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            let secure = body["url"].as_str().is_some_and(|u| u.starts_with("https://"));
            if secure {
                state.registered.lock().unwrap().push(body.clone());
                json_response(StatusCode::OK, json!({"id": "wh3", "url": body["url"]}))
            } else {
                json_response(
                    StatusCode::BAD_REQUEST,
                    json!({"error": "webhook url must use https"}),
                )
            }
        }
        (Method::DELETE, p) if p.starts_with("/webhooks/") => {
            let id = p.trim_start_matches("/webhooks/").to_string();
            state.deleted.lock().unwrap().push(id);
            json_response(StatusCode::OK, json!({}))
        }
        _ => json_response(StatusCode::NOT_FOUND, json!({"error": "no such item"})),
    };

    Ok(response)
}
