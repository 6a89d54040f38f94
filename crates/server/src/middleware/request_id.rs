//! Request correlation.
//!
//! Every request carries an `x-request-id`: the upstream proxy's value when
//! present, a fresh UUID v4 otherwise. The id lands in the tracing span,
//! the Sentry scope, and the response headers, so a client-reported id
//! finds the matching logs and error events.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the request id in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Attach a request id to the request's span, Sentry scope, and response.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = incoming_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());

    sentry::configure_scope(|scope| scope.set_tag("request_id", &request_id));

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn incoming_id(request: &Request) -> Option<String> {
    let value = request.headers().get(REQUEST_ID_HEADER)?;
    value.to_str().ok().map(str::to_owned)
}
