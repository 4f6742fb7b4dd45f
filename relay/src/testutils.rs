use crate::action::OutboundCall;
use crate::errors::UpstreamError;
use crate::upstream::Upstream;
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::{Value as JsonValue, json};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpListener;

/// Stand-in for the upstream routing API. Behaviour depends on the key sent,
/// either as `Authorization` header or as `api_key` query parameter:
///
/// - `rate-limited-key`: 429 `{"error":"rate limit"}`
/// - `oops-key`: 500 with the plain body `oops`
/// - `plain-key`: 200 with a non-JSON body
/// - `slow-key`: answers after two seconds
/// - anything else: 200 echoing method, path, query, headers and body as JSON
async fn fake_routing_api(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_else(|_| Bytes::new());

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let query = parts.uri.query().unwrap_or("").to_string();
    let key = header("authorization").or_else(|| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("api_key="))
            .map(str::to_string)
    });

    let respond = |status: StatusCode, body: Bytes| -> Result<Response<Full<Bytes>>, Infallible> {
        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        Ok(response)
    };

    match key.as_deref() {
        Some("rate-limited-key") => respond(
            StatusCode::TOO_MANY_REQUESTS,
            Bytes::from_static(br#"{"error":"rate limit"}"#),
        ),
        Some("oops-key") => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"oops"),
        ),
        Some("plain-key") => respond(StatusCode::OK, Bytes::from_static(b"plain text")),
        Some("slow-key") => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            respond(StatusCode::OK, Bytes::from_static(b"{}"))
        }
        _ => {
            let echo = json!({
                "method": parts.method.as_str(),
                "path": parts.uri.path(),
                "query": query,
                "authorization": header("authorization"),
                "content_type": header("content-type"),
                "body": serde_json::from_slice::<JsonValue>(&body).unwrap_or(JsonValue::Null),
            });
            respond(StatusCode::OK, Bytes::from(echo.to_string()))
        }
    }
}

/// Starts [`fake_routing_api`] on a random local port and returns the port.
pub async fn start_test_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");

    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service_fn(fake_routing_api))
                    .await
                {
                    eprintln!("Error serving connection: {:?}", err);
                }
            });
        }
    });

    port
}

/// Scripted [`Upstream`] that records every call it receives.
pub struct FakeUpstream {
    responses: Mutex<VecDeque<Result<JsonValue, UpstreamError>>>,
    calls: Mutex<Vec<OutboundCall>>,
}

impl FakeUpstream {
    /// Responses are handed out in order; once they run out every call fails.
    pub fn new(responses: Vec<Result<JsonValue, UpstreamError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<OutboundCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn call(&self, call: &OutboundCall) -> Result<JsonValue, UpstreamError> {
        self.calls.lock().unwrap().push(call.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::transport("no scripted response left")))
    }
}

/// [`Upstream`] that panics, for exercising the fault boundary.
pub struct PanickingUpstream;

#[async_trait]
impl Upstream for PanickingUpstream {
    async fn call(&self, _call: &OutboundCall) -> Result<JsonValue, UpstreamError> {
        panic!("upstream exploded");
    }
}
