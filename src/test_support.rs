// Test helpers:
// - an axum server on an ephemeral port that records every request
// - a client with short timeouts and no_proxy so localhost is never hijacked
// - a transport that replays scripted connection results
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::gateway::{GatewayError, GatewayResult};
use crate::realtime::{FrameStream, Topic, Transport};

pub fn test_client() -> reqwest::Client {
  reqwest::Client::builder()
    .timeout(Duration::from_secs(2))
    .no_proxy()
    .build()
    .expect("build test http client")
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
  pub method: String,
  pub path: String,
  pub query: Option<String>,
  pub authorization: Option<String>,
  pub body: String,
}

struct MockRoute {
  method: String,
  path: String,
  status: StatusCode,
  body: String,
}

#[derive(Default)]
struct MockState {
  routes: Mutex<Vec<MockRoute>>,
  requests: Mutex<Vec<RecordedRequest>>,
}

/// Canned-response HTTP server. Unrouted requests get an empty 404.
pub struct MockServer {
  pub url: String,
  state: Arc<MockState>,
  shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
  pub async fn start() -> Self {
    let state = Arc::new(MockState::default());
    let app = Router::new().fallback(respond).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
      .await
      .expect("bind");
    let addr = listener.local_addr().expect("addr");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
      let _ = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
          let _ = shutdown_rx.await;
        })
        .await;
    });

    Self {
      url: format!("http://{}", addr),
      state,
      shutdown: Some(shutdown_tx),
    }
  }

  /// Answer `method path` (query ignored) with `status` and `body`. First match wins.
  pub fn route(
    self,
    method: &str,
    path: &str,
    status: StatusCode,
    body: impl Into<String>,
  ) -> Self {
    self.state.routes.lock().unwrap().push(MockRoute {
      method: method.to_string(),
      path: path.to_string(),
      status,
      body: body.into(),
    });
    self
  }

  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.state.requests.lock().unwrap().clone()
  }
}

impl Drop for MockServer {
  fn drop(&mut self) {
    if let Some(tx) = self.shutdown.take() {
      let _ = tx.send(());
    }
  }
}

async fn respond(
  State(state): State<Arc<MockState>>,
  method: Method,
  uri: Uri,
  headers: HeaderMap,
  body: String,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
  state.requests.lock().unwrap().push(RecordedRequest {
    method: method.to_string(),
    path: uri.path().to_string(),
    query: uri.query().map(str::to_string),
    authorization: headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string),
    body,
  });

  let routes = state.routes.lock().unwrap();
  let (status, body) = routes
    .iter()
    .find(|r| r.method == method.as_str() && r.path == uri.path())
    .map(|r| (r.status, r.body.clone()))
    .unwrap_or((StatusCode::NOT_FOUND, String::new()));

  (status, [(header::CONTENT_TYPE, "application/json")], body)
}

/// Hands out pre-scripted connection results, then fails with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
  script: Mutex<VecDeque<GatewayResult<FrameStream>>>,
  connects: AtomicUsize,
  subscriptions: Mutex<Vec<(Vec<Topic>, String)>>,
}

impl ScriptedTransport {
  pub fn push(&self, result: GatewayResult<FrameStream>) {
    self.script.lock().unwrap().push_back(result);
  }

  pub fn connects(&self) -> usize {
    self.connects.load(Ordering::SeqCst)
  }

  /// Topics and token of every connect call.
  pub fn subscriptions(&self) -> Vec<(Vec<Topic>, String)> {
    self.subscriptions.lock().unwrap().clone()
  }
}

impl Transport for ScriptedTransport {
  async fn connect(&self, topics: &[Topic], token: &str) -> GatewayResult<FrameStream> {
    self.connects.fetch_add(1, Ordering::SeqCst);
    self
      .subscriptions
      .lock()
      .unwrap()
      .push((topics.to_vec(), token.to_string()));

    let next = self.script.lock().unwrap().pop_front();
    next.unwrap_or_else(|| Err(GatewayError::Network("unreachable".to_string())))
  }
}
