//! Offline-first data gateway.
//!
//! One interface over two backends: [`LocalGateway`] keeps everything in the
//! local persisted store, [`RemoteGateway`] talks to the PowerBack API and
//! the real-time channel. [`Gateway`] picks one at runtime.

mod client;
mod error;
mod local;
mod persist;
mod remote;
mod stats;
mod transitions;
mod types;

use std::future::Future;

pub use client::ApiClient;
pub use error::{GatewayError, GatewayResult};
pub use local::LocalGateway;
pub use remote::RemoteGateway;
pub use stats::{high_priority_queue, incident_stats, IncidentStats};
pub use transitions::TransitionPolicy;
pub use types::{
  parse_timestamp, AnalyticsEvent, Credentials, IncidentDraft, IncidentFilter, IncidentRecord,
  IncidentStatus, IncidentType, NotificationRecord, Officer, Priority, RegistrationProfile, Role,
  SessionRecord,
};

use crate::realtime::Handlers;

/// Operations shared by the local and remote backends.
pub trait DataGateway: Send + Sync {
  /// Sign in and persist the session, replacing any previous one.
  fn login(
    &self,
    credentials: &Credentials,
  ) -> impl Future<Output = GatewayResult<SessionRecord>> + Send;

  /// Create an account and sign in. Every profile field is required.
  fn register(
    &self,
    profile: &RegistrationProfile,
  ) -> impl Future<Output = GatewayResult<SessionRecord>> + Send;

  /// Persisted session, if any. Absence is not an error.
  fn current_session(&self) -> impl Future<Output = GatewayResult<Option<SessionRecord>>> + Send;

  fn list_incidents(
    &self,
    filter: IncidentFilter,
  ) -> impl Future<Output = GatewayResult<Vec<IncidentRecord>>> + Send;

  fn get_incident(
    &self,
    id: u64,
  ) -> impl Future<Output = GatewayResult<Option<IncidentRecord>>> + Send;

  /// Report a new incident. It starts PENDING with MEDIUM priority.
  fn submit_incident(
    &self,
    draft: &IncidentDraft,
  ) -> impl Future<Output = GatewayResult<IncidentRecord>> + Send;

  fn assign_incident(
    &self,
    id: u64,
    officer: &Officer,
  ) -> impl Future<Output = GatewayResult<()>> + Send;

  /// Set status and replace the officer notes, clearing them when `notes` is
  /// `None`. RESOLVED and CLOSED stamp `resolved_at`.
  fn update_incident_status(
    &self,
    id: u64,
    status: IncidentStatus,
    notes: Option<&str>,
  ) -> impl Future<Output = GatewayResult<()>> + Send;

  fn list_notifications(
    &self,
  ) -> impl Future<Output = GatewayResult<Vec<NotificationRecord>>> + Send;

  fn mark_notification_read(&self, id: u64) -> impl Future<Output = GatewayResult<()>> + Send;

  fn track_event(
    &self,
    event_type: &str,
    event_data: Option<&str>,
  ) -> impl Future<Output = GatewayResult<()>> + Send;

  /// Start delivering real-time messages to `handlers`, replacing any
  /// previous subscription. A no-op in local mode.
  fn subscribe(&mut self, handlers: Handlers) -> impl Future<Output = GatewayResult<()>> + Send;

  /// Stop the real-time subscription. No handler runs once this returns.
  fn disconnect(&mut self) -> impl Future<Output = ()> + Send;

  /// Clear the session and close any real-time subscription.
  fn logout(&mut self) -> impl Future<Output = GatewayResult<()>> + Send;
}

/// Returns the role to register with.
pub(crate) fn validate_registration(profile: &RegistrationProfile) -> GatewayResult<Role> {
  let required = [
    ("email", &profile.email),
    ("password", &profile.password),
    ("full name", &profile.full_name),
    ("phone", &profile.phone),
  ];

  if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
    return Err(GatewayError::Validation(format!("{} is required", field)));
  }

  profile
    .role
    .ok_or_else(|| GatewayError::Validation("role is required".to_string()))
}

pub(crate) fn validate_draft(draft: &IncidentDraft) -> GatewayResult<()> {
  if draft.title.trim().is_empty() {
    return Err(GatewayError::Validation("title is required".to_string()));
  }
  Ok(())
}

/// Backend selected by configuration.
pub enum Gateway {
  Local(LocalGateway),
  Remote(RemoteGateway),
}

macro_rules! delegate {
  ($self:ident, $gw:ident => $call:expr) => {
    match $self {
      Gateway::Local($gw) => $call,
      Gateway::Remote($gw) => $call,
    }
  };
}

impl Gateway {
  pub fn is_remote(&self) -> bool {
    matches!(self, Gateway::Remote(_))
  }
}

impl DataGateway for Gateway {
  async fn login(&self, credentials: &Credentials) -> GatewayResult<SessionRecord> {
    delegate!(self, gw => gw.login(credentials).await)
  }

  async fn register(&self, profile: &RegistrationProfile) -> GatewayResult<SessionRecord> {
    delegate!(self, gw => gw.register(profile).await)
  }

  async fn current_session(&self) -> GatewayResult<Option<SessionRecord>> {
    delegate!(self, gw => gw.current_session().await)
  }

  async fn list_incidents(&self, filter: IncidentFilter) -> GatewayResult<Vec<IncidentRecord>> {
    delegate!(self, gw => gw.list_incidents(filter).await)
  }

  async fn get_incident(&self, id: u64) -> GatewayResult<Option<IncidentRecord>> {
    delegate!(self, gw => gw.get_incident(id).await)
  }

  async fn submit_incident(&self, draft: &IncidentDraft) -> GatewayResult<IncidentRecord> {
    delegate!(self, gw => gw.submit_incident(draft).await)
  }

  async fn assign_incident(&self, id: u64, officer: &Officer) -> GatewayResult<()> {
    delegate!(self, gw => gw.assign_incident(id, officer).await)
  }

  async fn update_incident_status(
    &self,
    id: u64,
    status: IncidentStatus,
    notes: Option<&str>,
  ) -> GatewayResult<()> {
    delegate!(self, gw => gw.update_incident_status(id, status, notes).await)
  }

  async fn list_notifications(&self) -> GatewayResult<Vec<NotificationRecord>> {
    delegate!(self, gw => gw.list_notifications().await)
  }

  async fn mark_notification_read(&self, id: u64) -> GatewayResult<()> {
    delegate!(self, gw => gw.mark_notification_read(id).await)
  }

  async fn track_event(&self, event_type: &str, event_data: Option<&str>) -> GatewayResult<()> {
    delegate!(self, gw => gw.track_event(event_type, event_data).await)
  }

  async fn subscribe(&mut self, handlers: Handlers) -> GatewayResult<()> {
    delegate!(self, gw => gw.subscribe(handlers).await)
  }

  async fn disconnect(&mut self) {
    delegate!(self, gw => gw.disconnect().await)
  }

  async fn logout(&mut self) -> GatewayResult<()> {
    delegate!(self, gw => gw.logout().await)
  }
}
