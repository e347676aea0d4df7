//! In-process stand-in for the completion API.

use axum::{
    body::Body,
    http::{header, StatusCode},
    routing::post,
    Json, Router,
};
use futures_util::stream;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::config::Config;

#[derive(Clone, Default)]
pub(crate) struct Recorded(Arc<Mutex<Vec<Value>>>);

impl Recorded {
    pub(crate) fn requests(&self) -> Vec<Value> {
        self.0.lock().unwrap().clone()
    }
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

/// Serves `body` with the given status for every completion request and
/// records the JSON payloads it receives.
pub(crate) async fn fake_completions(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> (String, Recorded) {
    let recorded = Recorded::default();
    let log = recorded.clone();
    let router = Router::new().route(
        "/v1/chat/completions",
        post(move |Json(request): Json<Value>| async move {
            log.0.lock().unwrap().push(request);
            (status, [(header::CONTENT_TYPE, content_type)], body)
        }),
    );
    (serve(router).await, recorded)
}

/// A completion endpoint that does not answer before `delay`.
pub(crate) async fn stalled_completions(delay: Duration) -> String {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(move || async move {
            tokio::time::sleep(delay).await;
            StatusCode::OK
        }),
    );
    serve(router).await
}

/// Fires once the response body is dropped, i.e. the client hung up.
struct CloseSignal(Option<oneshot::Sender<()>>);

impl Drop for CloseSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// A completion endpoint that streams a `tick` delta every 10ms and never
/// sends the end marker. The receiver resolves when the client disconnects.
pub(crate) async fn endless_completions() -> (String, oneshot::Receiver<()>) {
    let (closed_tx, closed_rx) = oneshot::channel();
    let closed_tx = Arc::new(Mutex::new(Some(closed_tx)));
    let router = Router::new().route(
        "/v1/chat/completions",
        post(move || async move {
            let signal = CloseSignal(closed_tx.lock().unwrap().take());
            let ticks = stream::unfold(signal, |signal| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let record = "data: {\"choices\":[{\"delta\":{\"content\":\"tick\"}}]}\n\n";
                Some((Ok::<_, Infallible>(record), signal))
            });
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(ticks),
            )
        }),
    );
    (serve(router).await, closed_rx)
}

pub(crate) fn test_config(base_url: &str) -> Config {
    Config {
        api_key: Some("sk-test".to_string()),
        base_url: base_url.to_string(),
        ..Config::default()
    }
}
