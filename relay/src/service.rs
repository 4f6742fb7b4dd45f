use crate::dispatcher::Dispatcher;
use crate::errors::{DispatchError, InternalFault, RelayError};
use crate::metrics_defs::REQUEST_DURATION;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, HeaderMap, HeaderValue,
};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value as JsonValue;
use shared::histogram;
use shared::http::full_body;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

const INTERNAL_ERROR_MESSAGE: &str =
    "Internal Server Error. Please check server logs for more details.";

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_message: Option<&'a str>,
}

/// Browser-facing endpoint of the relay.
///
/// Every response is JSON and carries permissive CORS headers. `OPTIONS`
/// preflights are answered directly; any other request body is handed to the
/// [`Dispatcher`].
#[derive(Clone)]
pub struct RelayService {
    dispatcher: Arc<Dispatcher>,
    expose_debug_message: bool,
}

impl RelayService {
    pub fn new(dispatcher: Dispatcher, expose_debug_message: bool) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            expose_debug_message,
        }
    }

    pub async fn respond(&self, method: &Method, body: Bytes) -> Response<Bytes> {
        if method == Method::OPTIONS {
            return cors_response(StatusCode::OK, Bytes::new());
        }

        let start = Instant::now();
        let response = match self.dispatch_guarded(body).await {
            Ok(payload) => match serde_json::to_vec(&payload) {
                Ok(bytes) => cors_response(StatusCode::OK, bytes.into()),
                Err(e) => self.fault_response(&InternalFault::new(e.to_string())),
            },
            Err(DispatchError::Internal(fault)) => self.fault_response(&fault),
            Err(e) => error_response(e.status(), &e.to_string(), None),
        };

        histogram!(REQUEST_DURATION, "status" => response.status().as_str().to_string())
            .record(start.elapsed().as_secs_f64());
        response
    }

    /// Runs the dispatch on its own task so a panic anywhere below surfaces
    /// as an internal fault instead of a dropped connection.
    async fn dispatch_guarded(&self, body: Bytes) -> Result<JsonValue, DispatchError> {
        let dispatcher = self.dispatcher.clone();
        let task = tokio::spawn(async move { dispatcher.dispatch(&body).await });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(DispatchError::Internal(InternalFault::from_panic(
                panic_message(e.into_panic()),
            ))),
            Err(e) => Err(DispatchError::Internal(InternalFault::from_panic(
                e.to_string(),
            ))),
        }
    }

    fn fault_response(&self, fault: &InternalFault) -> Response<Bytes> {
        match fault.location {
            Some(location) => tracing::error!(
                error = %fault,
                location = %location,
                "Internal fault while relaying request"
            ),
            None => tracing::error!(error = %fault, "Internal fault while relaying request"),
        }

        let debug_message = self.expose_debug_message.then_some(fault.message.as_str());
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_ERROR_MESSAGE,
            debug_message,
        )
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "dispatch task panicked".to_string()
    }
}

fn error_response(status: StatusCode, error: &str, debug_message: Option<&str>) -> Response<Bytes> {
    let body = ErrorBody {
        error,
        debug_message,
    };
    // serializing two strings cannot fail
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    cors_response(status, bytes.into())
}

fn cors_response(status: StatusCode, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    add_cors_headers(response.headers_mut());
    response
}

pub fn add_cors_headers(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
}

impl Service<Request<Incoming>> for RelayService {
    type Response = Response<BoxBody<Bytes, RelayError>>;
    type Error = RelayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            // An unreadable body is treated like an invalid one
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to read request body");
                    Bytes::new()
                }
            };

            let response = service.respond(&parts.method, body).await;
            Ok(response.map(full_body))
        })
    }
}
