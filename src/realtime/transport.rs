//! Topic subscriptions over a long-lived HTTP response of newline-delimited
//! JSON frames.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::gateway::{GatewayError, GatewayResult};

const INCIDENTS_TOPIC: &str = "/topic/incidents";

/// Longest frame line accepted before the stream is abandoned.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Named real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
  /// Per-user notification queue
  UserNotifications(String),
  /// Broadcast incident updates
  IncidentUpdates,
}

impl Topic {
  pub fn path(&self) -> String {
    match self {
      Topic::UserNotifications(user_id) => format!("/user/{}/queue/notifications", user_id),
      Topic::IncidentUpdates => INCIDENTS_TOPIC.to_string(),
    }
  }

  pub fn parse(path: &str) -> Option<Topic> {
    if path == INCIDENTS_TOPIC || path.starts_with("/topic/incidents/") {
      return Some(Topic::IncidentUpdates);
    }

    let user_id = path
      .strip_prefix("/user/")?
      .strip_suffix("/queue/notifications")?;
    if user_id.is_empty() || user_id.contains('/') {
      return None;
    }
    Some(Topic::UserNotifications(user_id.to_string()))
  }
}

/// One inbound message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Frame {
  pub topic: String,
  #[serde(default)]
  pub payload: Value,
}

pub type FrameStream = BoxStream<'static, GatewayResult<Frame>>;

/// Opens a frame stream for a set of topics.
pub trait Transport: Send + Sync + 'static {
  fn connect(
    &self,
    topics: &[Topic],
    token: &str,
  ) -> impl Future<Output = GatewayResult<FrameStream>> + Send;
}

/// Transport reading frames from `GET <url>?topic=...`.
pub struct HttpStreamTransport {
  http: reqwest::Client,
  url: Url,
}

impl HttpStreamTransport {
  /// Only connecting is bounded by a timeout; the stream itself stays open.
  pub fn new(url: Url, connect_timeout: Duration) -> GatewayResult<Self> {
    let http = reqwest::Client::builder()
      .connect_timeout(connect_timeout)
      .build()
      .map_err(|e| GatewayError::Network(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self::with_client(http, url))
  }

  pub fn with_client(http: reqwest::Client, url: Url) -> Self {
    Self { http, url }
  }
}

impl Transport for HttpStreamTransport {
  async fn connect(&self, topics: &[Topic], token: &str) -> GatewayResult<FrameStream> {
    let query: Vec<(&str, String)> = topics.iter().map(|t| ("topic", t.path())).collect();

    let response = self
      .http
      .get(self.url.clone())
      .query(&query)
      .bearer_auth(token)
      .header(reqwest::header::ACCEPT, "application/x-ndjson")
      .send()
      .await?;

    match response.status() {
      status if status.is_success() => Ok(ndjson_frames(response.bytes_stream())),
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Authentication(
        "real-time subscription rejected".to_string(),
      )),
      status => Err(GatewayError::Network(format!(
        "real-time endpoint returned HTTP {}",
        status
      ))),
    }
  }
}

/// Split a byte stream into frames, one JSON document per line.
///
/// Blank lines are keep-alives. Lines that do not decode are skipped. A line
/// longer than [`MAX_FRAME_BYTES`] ends the stream with a network error.
pub fn ndjson_frames<S, B, E>(bytes: S) -> FrameStream
where
  S: Stream<Item = Result<B, E>> + Send + 'static,
  B: AsRef<[u8]> + Send + 'static,
  E: Into<GatewayError> + Send + 'static,
{
  frames_with_limit(bytes, MAX_FRAME_BYTES)
}

fn frames_with_limit<S, B, E>(bytes: S, max_line: usize) -> FrameStream
where
  S: Stream<Item = Result<B, E>> + Send + 'static,
  B: AsRef<[u8]> + Send + 'static,
  E: Into<GatewayError> + Send + 'static,
{
  struct State<St> {
    bytes: St,
    buf: Vec<u8>,
    done: bool,
  }

  let state = State {
    bytes: Box::pin(bytes),
    buf: Vec::new(),
    done: false,
  };

  stream::unfold(state, move |mut state| async move {
    loop {
      let line = match state.buf.iter().position(|b| *b == b'\n') {
        Some(pos) => Some(state.buf.drain(..=pos).collect::<Vec<u8>>()),
        None if state.done && !state.buf.is_empty() => Some(std::mem::take(&mut state.buf)),
        None if state.done => return None,
        None => None,
      };

      if let Some(line) = line {
        match decode_line(&line) {
          Some(frame) => return Some((Ok(frame), state)),
          None => continue,
        }
      }

      if state.buf.len() > max_line {
        warn!(buffered = state.buf.len(), "real-time frame exceeds size limit");
        state.done = true;
        state.buf.clear();
        let reason = format!("real-time frame longer than {} bytes", max_line);
        return Some((Err(GatewayError::Network(reason)), state));
      }

      match state.bytes.next().await {
        Some(Ok(chunk)) => state.buf.extend_from_slice(chunk.as_ref()),
        Some(Err(e)) => {
          state.done = true;
          state.buf.clear();
          return Some((Err(e.into()), state));
        }
        None => state.done = true,
      }
    }
  })
  .boxed()
}

fn decode_line(line: &[u8]) -> Option<Frame> {
  let text = String::from_utf8_lossy(line);
  let text = text.trim();
  if text.is_empty() {
    return None;
  }

  match serde_json::from_str::<Frame>(text) {
    Ok(frame) => Some(frame),
    Err(e) => {
      warn!(error = %e, "skipping malformed real-time frame");
      debug!(line = %text, "malformed frame");
      None
    }
  }
}
