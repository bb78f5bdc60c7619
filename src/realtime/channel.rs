use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::{Backoff, BackoffConfig};
use super::transport::{Frame, Topic, Transport};
use crate::gateway::{GatewayError, IncidentRecord, NotificationRecord};

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Per-topic callbacks for inbound real-time messages.
#[derive(Default)]
pub struct Handlers {
  on_notification: Option<Callback<NotificationRecord>>,
  on_incident: Option<Callback<IncidentRecord>>,
}

impl Handlers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn on_notification(mut self, f: impl Fn(NotificationRecord) + Send + Sync + 'static) -> Self {
    self.on_notification = Some(Box::new(f));
    self
  }

  pub fn on_incident(mut self, f: impl Fn(IncidentRecord) + Send + Sync + 'static) -> Self {
    self.on_incident = Some(Box::new(f));
    self
  }

  fn dispatch(&self, frame: Frame) {
    match Topic::parse(&frame.topic) {
      Some(Topic::UserNotifications(_)) => {
        if let Some(handler) = &self.on_notification {
          match serde_json::from_value(frame.payload) {
            Ok(notification) => handler(notification),
            Err(e) => warn!(topic = %frame.topic, error = %e, "undecodable notification"),
          }
        }
      }
      Some(Topic::IncidentUpdates) => {
        if let Some(handler) = &self.on_incident {
          match serde_json::from_value(frame.payload) {
            Ok(incident) => handler(incident),
            Err(e) => warn!(topic = %frame.topic, error = %e, "undecodable incident update"),
          }
        }
      }
      None => debug!(topic = %frame.topic, "ignoring frame for unknown topic"),
    }
  }
}

impl fmt::Debug for Handlers {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Handlers")
      .field("on_notification", &self.on_notification.is_some())
      .field("on_incident", &self.on_incident.is_some())
      .finish()
  }
}

/// Handle to the background subscription task.
///
/// Dropping the handle also stops the task at its next suspension point.
pub struct RealtimeChannel {
  cancel: watch::Sender<bool>,
  task: JoinHandle<()>,
}

impl RealtimeChannel {
  /// Spawn the connect/dispatch/reconnect loop.
  pub fn open<T: Transport>(
    transport: Arc<T>,
    topics: Vec<Topic>,
    token: String,
    handlers: Handlers,
    backoff: BackoffConfig,
  ) -> Self {
    let (cancel, cancelled) = watch::channel(false);
    let task = tokio::spawn(run(
      transport,
      topics,
      token,
      handlers,
      Backoff::new(backoff),
      cancelled,
    ));

    Self { cancel, task }
  }

  pub fn is_running(&self) -> bool {
    !self.task.is_finished()
  }

  /// Cancel the loop and wait for it to exit. No callback runs after this returns.
  pub async fn close(self) {
    let _ = self.cancel.send(true);
    if let Err(e) = self.task.await {
      warn!(error = %e, "real-time task ended abnormally");
    }
  }
}

async fn run<T: Transport>(
  transport: Arc<T>,
  topics: Vec<Topic>,
  token: String,
  handlers: Handlers,
  mut backoff: Backoff,
  mut cancelled: watch::Receiver<bool>,
) {
  loop {
    if *cancelled.borrow() {
      break;
    }

    let connected = tokio::select! {
      biased;
      _ = cancelled.changed() => break,
      result = transport.connect(&topics, &token) => result,
    };

    match connected {
      Ok(mut frames) => {
        info!(topics = topics.len(), "real-time channel connected");
        backoff.reset();

        loop {
          let next = tokio::select! {
            biased;
            _ = cancelled.changed() => return,
            next = frames.next() => next,
          };

          match next {
            Some(Ok(frame)) => {
              if *cancelled.borrow() {
                return;
              }
              handlers.dispatch(frame);
            }
            Some(Err(e)) => {
              warn!(error = %e, "real-time stream failed");
              break;
            }
            None => {
              debug!("real-time stream closed by server");
              break;
            }
          }
        }
      }
      Err(GatewayError::Authentication(reason)) => {
        warn!(%reason, "real-time channel rejected, not reconnecting");
        break;
      }
      Err(e) => warn!(error = %e, attempt = backoff.attempts() + 1, "real-time connection failed"),
    }

    let Some(delay) = backoff.next_delay() else {
      warn!(attempts = backoff.attempts(), "giving up on real-time channel");
      break;
    };

    info!(delay_ms = delay.as_millis() as u64, "reconnecting real-time channel");
    tokio::select! {
      biased;
      _ = cancelled.changed() => break,
      _ = tokio::time::sleep(delay) => {}
    }
  }

  debug!("real-time loop stopped");
}
