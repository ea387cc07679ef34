//! Request dispatch.
//!
//! Routes the management API under `/endpoints` to the registry and replays
//! registered responses for every other request.

use crate::config::ServerSettings;
use crate::endpoint::{self, decode_input, Endpoint, Many, One};
use crate::error::MockError;
use crate::registry::Registry;
use axum::body::{Body, Bytes};
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::Router;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Content type of every management and error response.
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Dispatches requests against a shared endpoint registry.
///
/// Cloning is cheap; clones share the registry and the counters.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<dyn Registry>,
    log_matches: bool,
    log_unmatched: bool,
    stats: Arc<DispatchStats>,
}

#[derive(Debug, Default)]
struct DispatchStats {
    /// Mock lookups performed.
    requests_total: AtomicU64,
    /// Lookups answered by a registered endpoint.
    requests_matched: AtomicU64,
    /// Lookups no endpoint matched.
    requests_unmatched: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry.
    pub fn new(registry: Arc<dyn Registry>, settings: &ServerSettings) -> Self {
        Self {
            registry,
            log_matches: settings.log_matches,
            log_unmatched: settings.log_unmatched,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Build the HTTP router.
    ///
    /// Verbs other than the management ones on `/endpoints` and
    /// `/endpoints/{id}` fall through to the mock lookup, like any other path.
    pub fn router(self) -> Router {
        Router::new()
            .route(
                "/endpoints",
                get(list_endpoints)
                    .head(replay)
                    .post(create_endpoint)
                    .fallback(replay),
            )
            .route(
                "/endpoints/:id",
                patch(update_endpoint)
                    .delete(delete_endpoint)
                    .fallback(replay),
            )
            .fallback(replay)
            .layer(DefaultBodyLimit::disable())
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    /// Find the response registered for `verb` and `path`.
    pub async fn lookup(
        &self,
        verb: &str,
        path: &str,
    ) -> Result<Option<endpoint::Response>, MockError> {
        self.stats.requests_total.fetch_add(1, Ordering::Relaxed);

        let found = self.registry.find_by_verb_and_path(verb, path).await?;
        match &found {
            Some(response) => {
                self.stats.requests_matched.fetch_add(1, Ordering::Relaxed);
                if self.log_matches {
                    info!(
                        method = %verb,
                        path = %path,
                        code = response.code,
                        "Request matched endpoint"
                    );
                }
            }
            None => {
                self.stats.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if self.log_unmatched {
                    warn!(method = %verb, path = %path, "No matching endpoint found");
                }
            }
        }
        Ok(found)
    }

    /// Get total mock lookups.
    pub fn total_requests(&self) -> u64 {
        self.stats.requests_total.load(Ordering::Relaxed)
    }

    /// Get total lookups answered by a registered endpoint.
    pub fn total_matched(&self) -> u64 {
        self.stats.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total lookups no endpoint matched.
    pub fn total_unmatched(&self) -> u64 {
        self.stats.requests_unmatched.load(Ordering::Relaxed)
    }
}

/// A JSON:API document with its status code.
struct JsonApi<T>(StatusCode, T);

impl<T: Serialize> IntoResponse for JsonApi<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.1) {
            Ok(body) => (self.0, json_api_header(), body).into_response(),
            Err(e) => MockError::from(e).into_response(),
        }
    }
}

fn json_api_header() -> [(HeaderName, HeaderValue); 1] {
    [(CONTENT_TYPE, HeaderValue::from_static(JSON_API_CONTENT_TYPE))]
}

#[derive(Serialize)]
struct ErrorDocument {
    errors: Vec<ErrorObject>,
}

#[derive(Serialize)]
struct ErrorObject {
    code: String,
    detail: String,
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_internal() {
            error!(error = %self, "Internal error");
        } else {
            debug!(status = status.as_u16(), error = %self, "Request failed");
        }

        let document = ErrorDocument {
            errors: vec![ErrorObject {
                code: status.canonical_reason().unwrap_or("Unknown").to_string(),
                detail: self.external_message(),
            }],
        };
        // An ErrorDocument is plain strings and always serializes.
        let body = serde_json::to_vec(&document).unwrap_or_default();
        (status, json_api_header(), body).into_response()
    }
}

/// Ids are positive integers; anything else names no endpoint.
fn parse_id(id: &str) -> Option<i64> {
    id.parse::<i64>().ok().filter(|id| *id > 0)
}

/// The `{id}` segment as sent, for requests whose id did not extract.
fn raw_id(uri: &Uri) -> &str {
    uri.path().rsplit('/').next().unwrap_or_default()
}

fn request_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, MockError> {
    body.map_err(|e| MockError::Validation(format!("Unable to decode request body: {}", e)))
}

fn endpoint_not_found(id: &str) -> MockError {
    MockError::NotFound(format!("Requested Endpoint with ID `{}` does not exist", id))
}

async fn list_endpoints(
    State(dispatcher): State<Dispatcher>,
) -> Result<JsonApi<Many<Endpoint>>, MockError> {
    let data = dispatcher.registry.fetch_all().await?;
    Ok(JsonApi(StatusCode::OK, Many { data }))
}

async fn create_endpoint(
    State(dispatcher): State<Dispatcher>,
    body: Result<Bytes, BytesRejection>,
) -> Result<JsonApi<One<Endpoint>>, MockError> {
    let input = decode_input(&request_body(body)?)?;
    let endpoint = dispatcher.registry.create_unique(&input).await?;

    info!(
        id = endpoint.id,
        verb = %endpoint.attributes.verb,
        path = %endpoint.attributes.path,
        "Endpoint created"
    );
    Ok(JsonApi(StatusCode::CREATED, One { data: endpoint }))
}

async fn update_endpoint(
    State(dispatcher): State<Dispatcher>,
    id: Result<Path<String>, PathRejection>,
    uri: Uri,
    body: Result<Bytes, BytesRejection>,
) -> Result<JsonApi<One<Endpoint>>, MockError> {
    let input = decode_input(&request_body(body)?)?;
    let id = match id {
        Ok(Path(id)) => id,
        Err(_) => return Err(endpoint_not_found(raw_id(&uri))),
    };
    let updated = match parse_id(&id) {
        Some(numeric_id) => dispatcher.registry.update(numeric_id, &input).await?,
        None => None,
    };
    let endpoint = updated.ok_or_else(|| endpoint_not_found(&id))?;

    info!(
        id = endpoint.id,
        verb = %endpoint.attributes.verb,
        path = %endpoint.attributes.path,
        "Endpoint updated"
    );
    Ok(JsonApi(StatusCode::CREATED, One { data: endpoint }))
}

async fn delete_endpoint(
    State(dispatcher): State<Dispatcher>,
    id: Result<Path<String>, PathRejection>,
    uri: Uri,
) -> Result<Response, MockError> {
    let id = match id {
        Ok(Path(id)) => id,
        Err(_) => return Err(endpoint_not_found(raw_id(&uri))),
    };
    let deleted = match parse_id(&id) {
        Some(numeric_id) => dispatcher.registry.delete(numeric_id).await?,
        None => false,
    };
    if !deleted {
        return Err(endpoint_not_found(&id));
    }

    info!(id = %id, "Endpoint deleted");
    Ok((StatusCode::NO_CONTENT, json_api_header()).into_response())
}

async fn replay(
    State(dispatcher): State<Dispatcher>,
    method: Method,
    uri: Uri,
) -> Result<Response, MockError> {
    let path = uri.path();
    match dispatcher.lookup(method.as_str(), path).await? {
        Some(response) => Ok(replay_response(&response)),
        None => Err(MockError::NotFound(format!(
            "Requested page `{}` does not exist",
            path
        ))),
    }
}

/// Build the wire response for a registered endpoint.
///
/// Only the stored headers are set, so the endpoint's own content type (or
/// its absence) is what the client sees.
fn replay_response(response: &endpoint::Response) -> Response {
    let mut reply = Response::new(Body::from(response.wire_body().to_string()));
    *reply.status_mut() =
        StatusCode::from_u16(response.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let headers = reply.headers_mut();
    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "Skipping stored header that is not valid HTTP"),
        }
    }
    reply
}
