//! Gateway backed entirely by the local persisted store.
//!
//! Stands in for the backend: sessions are synthesized, incidents and
//! notifications live in the key-value store, and status changes synthesize
//! the notifications the server would have pushed.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{GatewayError, GatewayResult};
use super::persist;
use super::transitions::TransitionPolicy;
use super::types::{
  AnalyticsEvent, Credentials, IncidentDraft, IncidentFilter, IncidentRecord, IncidentStatus,
  NotificationRecord, Officer, Priority, RegistrationProfile, Role, SessionRecord,
};
use super::{validate_draft, validate_registration, DataGateway};
use crate::realtime::Handlers;
use crate::store::KeyValueStore;

pub struct LocalGateway {
  store: Arc<dyn KeyValueStore>,
  policy: TransitionPolicy,
}

impl LocalGateway {
  pub fn new(store: Arc<dyn KeyValueStore>, policy: TransitionPolicy) -> Self {
    Self { store, policy }
  }

  fn session(&self) -> GatewayResult<Option<SessionRecord>> {
    persist::load_session(self.store.as_ref())
  }

  /// Apply `change` to the incident with `id` and persist.
  ///
  /// Returns the updated record, or `None` if no such incident exists.
  fn modify_incident(
    &self,
    id: u64,
    change: impl FnOnce(&mut IncidentRecord) -> GatewayResult<()>,
  ) -> GatewayResult<Option<IncidentRecord>> {
    let mut incidents = persist::load_incidents(self.store.as_ref())?;

    let Some(incident) = incidents.iter_mut().find(|i| i.id == id) else {
      return Ok(None);
    };

    change(incident)?;
    incident.updated_at = Some(Utc::now());
    let updated = incident.clone();

    persist::save_incidents(self.store.as_ref(), &incidents)?;
    Ok(Some(updated))
  }

  /// Record a notification the way the server would push one.
  fn push_notification(
    &self,
    title: &str,
    message: String,
    related_incident_id: u64,
  ) -> GatewayResult<()> {
    let mut notifications = persist::load_notifications(self.store.as_ref())?;
    let notification = NotificationRecord {
      id: persist::next_id(notifications.iter().map(|n| n.id)),
      title: title.to_string(),
      message,
      created_at: Utc::now(),
      read: false,
      related_incident_id: Some(related_incident_id),
    };
    notifications.insert(0, notification);
    persist::save_notifications(self.store.as_ref(), &notifications)
  }
}

/// Deterministic session for an email; no credentials are checked.
fn synthesize_session(email: &str, display_name: Option<&str>, role: Role) -> SessionRecord {
  let normalized = email.trim().to_lowercase();
  let digest = hex::encode(Sha256::digest(normalized.as_bytes()));

  SessionRecord {
    token: format!("local-{}", &digest[..32]),
    user_id: digest[..12].to_string(),
    display_name: display_name
      .map(str::to_string)
      .unwrap_or_else(|| display_name_from_email(&normalized)),
    role,
    email: Some(normalized),
  }
}

/// "jane.doe@example.com" becomes "Jane Doe".
fn display_name_from_email(email: &str) -> String {
  let local = email.split('@').next().unwrap_or(email);

  local
    .split(['.', '_', '-', '+'])
    .filter(|part| !part.is_empty())
    .map(|part| {
      let mut chars = part.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

impl DataGateway for LocalGateway {
  async fn login(&self, credentials: &Credentials) -> GatewayResult<SessionRecord> {
    if credentials.email.trim().is_empty() {
      return Err(GatewayError::Validation("email is required".to_string()));
    }

    let session = synthesize_session(
      &credentials.email,
      None,
      credentials.role.unwrap_or(Role::Citizen),
    );
    persist::save_session(self.store.as_ref(), &session)?;

    info!(user = %session.user_id, role = %session.role, "signed in locally");
    Ok(session)
  }

  async fn register(&self, profile: &RegistrationProfile) -> GatewayResult<SessionRecord> {
    let role = validate_registration(profile)?;

    let session = synthesize_session(&profile.email, Some(profile.full_name.trim()), role);
    persist::save_session(self.store.as_ref(), &session)?;

    info!(user = %session.user_id, role = %session.role, "registered locally");
    Ok(session)
  }

  async fn current_session(&self) -> GatewayResult<Option<SessionRecord>> {
    self.session()
  }

  async fn list_incidents(&self, filter: IncidentFilter) -> GatewayResult<Vec<IncidentRecord>> {
    let session = self.session()?;
    let incidents = persist::load_incidents(self.store.as_ref())?;

    Ok(
      incidents
        .into_iter()
        .filter(|i| filter.matches(i, session.as_ref()))
        .collect(),
    )
  }

  async fn get_incident(&self, id: u64) -> GatewayResult<Option<IncidentRecord>> {
    let incidents = persist::load_incidents(self.store.as_ref())?;
    Ok(incidents.into_iter().find(|i| i.id == id))
  }

  async fn submit_incident(&self, draft: &IncidentDraft) -> GatewayResult<IncidentRecord> {
    validate_draft(draft)?;

    let session = self.session()?;
    let mut incidents = persist::load_incidents(self.store.as_ref())?;

    let incident = IncidentRecord {
      id: persist::next_id(incidents.iter().map(|i| i.id)),
      incident_type: draft.incident_type,
      title: draft.title.trim().to_string(),
      description: draft.description.clone(),
      address: draft.address.clone(),
      latitude: draft.latitude.unwrap_or(0.0),
      longitude: draft.longitude.unwrap_or(0.0),
      status: IncidentStatus::Pending,
      priority: Priority::Medium,
      created_at: Utc::now(),
      updated_at: None,
      resolved_at: None,
      reporter_id: session.as_ref().map(|s| s.user_id.clone()),
      reporter_name: session.as_ref().map(|s| s.display_name.clone()),
      assigned_officer_id: None,
      assigned_officer_name: None,
      officer_notes: None,
      media_urls: draft.media_urls.clone(),
    };

    incidents.insert(0, incident.clone());
    persist::save_incidents(self.store.as_ref(), &incidents)?;

    info!(id = incident.id, kind = %incident.incident_type, "incident reported");
    Ok(incident)
  }

  async fn assign_incident(&self, id: u64, officer: &Officer) -> GatewayResult<()> {
    let policy = self.policy;
    let updated = self.modify_incident(id, |incident| {
      policy.check(incident.status, IncidentStatus::Assigned)?;
      incident.status = IncidentStatus::Assigned;
      incident.assigned_officer_id = Some(officer.id.clone());
      incident.assigned_officer_name = Some(officer.display_name.clone());
      Ok(())
    })?;

    match updated {
      Some(incident) => {
        info!(id, officer = %officer.display_name, "incident assigned");
        self.push_notification(
          "New Incident Assigned",
          format!("You have been assigned to: {}", incident.title),
          id,
        )
      }
      None => {
        debug!(id, "assign ignored, no such incident");
        Ok(())
      }
    }
  }

  async fn update_incident_status(
    &self,
    id: u64,
    status: IncidentStatus,
    notes: Option<&str>,
  ) -> GatewayResult<()> {
    let policy = self.policy;
    let updated = self.modify_incident(id, |incident| {
      policy.check(incident.status, status)?;
      incident.status = status;
      incident.officer_notes = notes.map(str::to_string);
      if status.is_resolution() {
        incident.resolved_at = Some(Utc::now().max(incident.created_at));
      }
      Ok(())
    })?;

    match updated {
      Some(incident) => {
        info!(id, status = %status, "incident status updated");
        self.push_notification(
          "Incident Updated",
          format!("Your incident '{}' has been updated", incident.title),
          id,
        )
      }
      None => {
        debug!(id, "status update ignored, no such incident");
        Ok(())
      }
    }
  }

  async fn list_notifications(&self) -> GatewayResult<Vec<NotificationRecord>> {
    persist::load_notifications(self.store.as_ref())
  }

  async fn mark_notification_read(&self, id: u64) -> GatewayResult<()> {
    let mut notifications = persist::load_notifications(self.store.as_ref())?;

    match notifications.iter_mut().find(|n| n.id == id) {
      Some(notification) if !notification.read => {
        notification.read = true;
        persist::save_notifications(self.store.as_ref(), &notifications)
      }
      Some(_) => Ok(()),
      None => {
        debug!(id, "mark-read ignored, no such notification");
        Ok(())
      }
    }
  }

  async fn track_event(&self, event_type: &str, event_data: Option<&str>) -> GatewayResult<()> {
    let session = self.session()?;
    persist::append_event(
      self.store.as_ref(),
      AnalyticsEvent {
        event_type: event_type.to_string(),
        event_data: event_data.map(str::to_string),
        user_id: session.map(|s| s.user_id),
        created_at: Utc::now(),
      },
    )
  }

  async fn subscribe(&mut self, _handlers: Handlers) -> GatewayResult<()> {
    debug!("real-time updates are not available in local mode");
    Ok(())
  }

  async fn disconnect(&mut self) {}

  async fn logout(&mut self) -> GatewayResult<()> {
    persist::clear_session(self.store.as_ref())?;
    info!("signed out");
    Ok(())
  }
}
