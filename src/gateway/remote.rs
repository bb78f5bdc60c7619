//! Gateway backed by the PowerBack REST API and the real-time channel.

use std::sync::Arc;
use tracing::info;

use super::client::ApiClient;
use super::error::{GatewayError, GatewayResult};
use super::persist;
use super::transitions::TransitionPolicy;
use super::types::{
  Credentials, IncidentDraft, IncidentFilter, IncidentRecord, IncidentStatus, NotificationRecord,
  Officer, RegistrationProfile, SessionRecord,
};
use super::{validate_draft, validate_registration, DataGateway};
use crate::realtime::{
  BackoffConfig, Handlers, HttpStreamTransport, RealtimeChannel, Topic, Transport,
};
use crate::store::KeyValueStore;

pub struct RemoteGateway<T: Transport = HttpStreamTransport> {
  api: ApiClient,
  store: Arc<dyn KeyValueStore>,
  transport: Arc<T>,
  backoff: BackoffConfig,
  policy: TransitionPolicy,
  channel: Option<RealtimeChannel>,
}

impl<T: Transport> RemoteGateway<T> {
  pub fn new(
    api: ApiClient,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<T>,
    backoff: BackoffConfig,
    policy: TransitionPolicy,
  ) -> Self {
    Self {
      api,
      store,
      transport,
      backoff,
      policy,
      channel: None,
    }
  }

  pub fn api(&self) -> &ApiClient {
    &self.api
  }

  /// Whether a real-time subscription loop is currently alive.
  pub fn is_subscribed(&self) -> bool {
    self.channel.as_ref().is_some_and(RealtimeChannel::is_running)
  }

  /// Reject disallowed transitions before asking the server.
  ///
  /// The permissive policy leaves validation to the backend.
  async fn check_transition(&self, id: u64, to: IncidentStatus) -> GatewayResult<()> {
    if self.policy == TransitionPolicy::Permissive {
      return Ok(());
    }
    let current = self.api.incident(id).await?;
    self.policy.check(current.status, to)
  }
}

impl<T: Transport> DataGateway for RemoteGateway<T> {
  async fn login(&self, credentials: &Credentials) -> GatewayResult<SessionRecord> {
    if credentials.email.trim().is_empty() {
      return Err(GatewayError::Validation("email is required".to_string()));
    }

    let session = self.api.login(credentials).await?;
    persist::save_session(self.store.as_ref(), &session)?;

    info!(user = %session.user_id, role = %session.role, "signed in");
    Ok(session)
  }

  async fn register(&self, profile: &RegistrationProfile) -> GatewayResult<SessionRecord> {
    let role = validate_registration(profile)?;

    let session = self.api.register(profile, role).await?;
    persist::save_session(self.store.as_ref(), &session)?;

    info!(user = %session.user_id, role = %session.role, "registered");
    Ok(session)
  }

  async fn current_session(&self) -> GatewayResult<Option<SessionRecord>> {
    persist::load_session(self.store.as_ref())
  }

  async fn list_incidents(&self, filter: IncidentFilter) -> GatewayResult<Vec<IncidentRecord>> {
    self.api.incidents(filter).await
  }

  async fn get_incident(&self, id: u64) -> GatewayResult<Option<IncidentRecord>> {
    match self.api.incident(id).await {
      Ok(incident) => Ok(Some(incident)),
      Err(GatewayError::NotFound(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }

  async fn submit_incident(&self, draft: &IncidentDraft) -> GatewayResult<IncidentRecord> {
    validate_draft(draft)?;

    let incident = self.api.create_incident(draft).await?;
    info!(id = incident.id, kind = %incident.incident_type, "incident reported");
    Ok(incident)
  }

  async fn assign_incident(&self, id: u64, officer: &Officer) -> GatewayResult<()> {
    self.check_transition(id, IncidentStatus::Assigned).await?;
    self.api.assign(id, officer).await?;
    info!(id, officer = %officer.display_name, "incident assigned");
    Ok(())
  }

  async fn update_incident_status(
    &self,
    id: u64,
    status: IncidentStatus,
    notes: Option<&str>,
  ) -> GatewayResult<()> {
    self.check_transition(id, status).await?;
    self.api.update_status(id, status, notes).await?;
    info!(id, status = %status, "incident status updated");
    Ok(())
  }

  async fn list_notifications(&self) -> GatewayResult<Vec<NotificationRecord>> {
    self.api.notifications().await
  }

  async fn mark_notification_read(&self, id: u64) -> GatewayResult<()> {
    self.api.mark_read(id).await
  }

  async fn track_event(&self, event_type: &str, event_data: Option<&str>) -> GatewayResult<()> {
    self.api.track(event_type, event_data).await
  }

  async fn subscribe(&mut self, handlers: Handlers) -> GatewayResult<()> {
    let session = persist::load_session(self.store.as_ref())?
      .ok_or_else(|| GatewayError::Authentication("not signed in".to_string()))?;

    self.disconnect().await;

    let topics = vec![
      Topic::UserNotifications(session.user_id.clone()),
      Topic::IncidentUpdates,
    ];
    info!(user = %session.user_id, "subscribing to real-time updates");

    self.channel = Some(RealtimeChannel::open(
      self.transport.clone(),
      topics,
      session.token,
      handlers,
      self.backoff.clone(),
    ));
    Ok(())
  }

  async fn disconnect(&mut self) {
    if let Some(channel) = self.channel.take() {
      channel.close().await;
      info!("real-time channel closed");
    }
  }

  async fn logout(&mut self) -> GatewayResult<()> {
    self.disconnect().await;
    persist::clear_session(self.store.as_ref())?;
    info!("signed out");
    Ok(())
  }
}
