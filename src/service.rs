//! HTTP transport streaming AG-UI runs as server-sent events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_REQUEST_HEADERS, ALLOW, CACHE_CONTROL, CONNECTION, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures::stream::{self, Stream};
use futures::StreamExt;
use tokio_util::sync::DropGuard;
use tracing::{error, warn};

use crate::input::InputAdapter;
use crate::runner::{ProtocolRunner, RunContext, WireEventStream};

const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// Builds the router serving the AG-UI endpoint at `path`.
pub type ServiceFactory =
    Arc<dyn Fn(Option<Arc<dyn ProtocolRunner>>, &str) -> Router + Send + Sync>;

pub fn sse_service_factory() -> ServiceFactory {
    Arc::new(|runner: Option<Arc<dyn ProtocolRunner>>, path: &str| {
        SseService::new(runner, path).router()
    })
}

#[derive(Clone)]
pub struct SseService {
    runner: Option<Arc<dyn ProtocolRunner>>,
    path: String,
}

impl SseService {
    pub fn new(runner: Option<Arc<dyn ProtocolRunner>>, path: impl Into<String>) -> Self {
        Self {
            runner,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn router(self) -> Router {
        let path = self.path.clone();
        Router::new()
            .route(&path, any(Self::handle))
            .with_state(Arc::new(self))
    }

    async fn handle(
        State(service): State<Arc<Self>>,
        method: Method,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        match method {
            Method::POST => service.start_run(&body).await,
            Method::OPTIONS => preflight(&headers),
            _ => (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, ALLOWED_METHODS)]).into_response(),
        }
    }

    async fn start_run(&self, body: &[u8]) -> Response {
        let input = match InputAdapter::parse(body) {
            Ok(input) => input,
            Err(err) => {
                warn!(error = %err, "rejecting malformed run request");
                return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
            }
        };
        let Some(runner) = self.runner.clone() else {
            error!(path = %self.path, "no runner configured for AG-UI endpoint");
            return (StatusCode::INTERNAL_SERVER_ERROR, "runner not configured").into_response();
        };

        let ctx = RunContext::for_input(&input);
        let guard = ctx.cancellation.clone().drop_guard();
        let events = match runner.run(ctx, input).await {
            Ok(events) => events,
            Err(err) => {
                error!(error = %err, "failed to start run");
                return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
            }
        };

        let mut response = Sse::new(sse_frames(events, guard))
            .keep_alive(KeepAlive::default())
            .into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        response
    }
}

/// One SSE frame per wire event. The guard lives as long as the response
/// body, so a client disconnect cancels the run's context. A run that
/// streams to its end leaves the context untouched.
fn sse_frames(
    events: WireEventStream,
    guard: DropGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold((events, guard), |(mut events, guard)| async move {
        let Some(event) = events.next().await else {
            let _ = guard.disarm();
            return None;
        };
        Some((event, (events, guard)))
    })
    .filter_map(|event| async move {
        match event.encode() {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(err) => {
                warn!(error = %err, kind = event.event_type(), "dropping unencodable wire event");
                None
            }
        }
    })
}

fn preflight(headers: &HeaderMap) -> Response {
    let requested = headers
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("Content-Type"));
    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            ),
            (ACCESS_CONTROL_ALLOW_HEADERS, requested),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::WireEvent;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn frames_every_event_as_sse_data() {
        let token = CancellationToken::new();
        let events = stream::iter(vec![
            WireEvent::run_started("t", "r", None),
            WireEvent::run_finished("t", "r"),
        ])
        .boxed();
        let frames: Vec<_> = sse_frames(events, token.clone().drop_guard()).collect().await;

        assert_eq!(frames.len(), 2);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_the_body_cancels_the_run() {
        let token = CancellationToken::new();
        let events = stream::pending::<WireEvent>().boxed();
        let frames = sse_frames(events, token.clone().drop_guard());
        drop(frames);
        assert!(token.is_cancelled());
    }

    #[test]
    fn preflight_mirrors_requested_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("x-tenant, content-type"),
        );
        let response = preflight(&headers);

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_HEADERS],
            "x-tenant, content-type"
        );
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
