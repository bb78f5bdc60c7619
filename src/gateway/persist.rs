//! Keys and helpers for records kept in the local persisted store.

use chrono::Utc;

use super::error::GatewayResult;
use super::types::{AnalyticsEvent, IncidentRecord, NotificationRecord, SessionRecord};
use crate::store::{read_json, write_json, KeyValueStore};

pub const TOKEN_KEY: &str = "authToken";
pub const USER_KEY: &str = "userData";
pub const INCIDENTS_KEY: &str = "incidents";
pub const NOTIFICATIONS_KEY: &str = "notifications";
pub const ANALYTICS_KEY: &str = "analyticsEvents";

/// Oldest events are dropped past this many.
const MAX_LOCAL_EVENTS: usize = 1000;

/// Read the persisted session. Both the token and the user data must be present.
pub fn load_session(store: &dyn KeyValueStore) -> GatewayResult<Option<SessionRecord>> {
  let Some(token) = store.get(TOKEN_KEY)? else {
    return Ok(None);
  };
  let Some(mut session) = read_json::<SessionRecord>(store, USER_KEY)? else {
    return Ok(None);
  };

  session.token = token;
  Ok(Some(session))
}

pub fn save_session(store: &dyn KeyValueStore, session: &SessionRecord) -> GatewayResult<()> {
  store.set(TOKEN_KEY, &session.token)?;
  write_json(store, USER_KEY, session)?;
  Ok(())
}

pub fn clear_session(store: &dyn KeyValueStore) -> GatewayResult<()> {
  store.remove(TOKEN_KEY)?;
  store.remove(USER_KEY)?;
  Ok(())
}

pub fn load_incidents(store: &dyn KeyValueStore) -> GatewayResult<Vec<IncidentRecord>> {
  Ok(read_json(store, INCIDENTS_KEY)?.unwrap_or_default())
}

pub fn save_incidents(
  store: &dyn KeyValueStore,
  incidents: &[IncidentRecord],
) -> GatewayResult<()> {
  Ok(write_json(store, INCIDENTS_KEY, incidents)?)
}

pub fn load_notifications(store: &dyn KeyValueStore) -> GatewayResult<Vec<NotificationRecord>> {
  Ok(read_json(store, NOTIFICATIONS_KEY)?.unwrap_or_default())
}

pub fn save_notifications(
  store: &dyn KeyValueStore,
  notifications: &[NotificationRecord],
) -> GatewayResult<()> {
  Ok(write_json(store, NOTIFICATIONS_KEY, notifications)?)
}

pub fn append_event(store: &dyn KeyValueStore, event: AnalyticsEvent) -> GatewayResult<()> {
  let mut events: Vec<AnalyticsEvent> = read_json(store, ANALYTICS_KEY)?.unwrap_or_default();
  events.push(event);
  if events.len() > MAX_LOCAL_EVENTS {
    let excess = events.len() - MAX_LOCAL_EVENTS;
    events.drain(..excess);
  }
  Ok(write_json(store, ANALYTICS_KEY, &events)?)
}

pub fn load_events(store: &dyn KeyValueStore) -> GatewayResult<Vec<AnalyticsEvent>> {
  Ok(read_json(store, ANALYTICS_KEY)?.unwrap_or_default())
}

/// Timestamp-derived id, strictly greater than every existing one.
pub fn next_id(existing: impl IntoIterator<Item = u64>) -> u64 {
  let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
  let max = existing.into_iter().max().unwrap_or(0);
  now.max(max + 1)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gateway::types::Role;
  use crate::store::MemoryStore;

  fn session() -> SessionRecord {
    SessionRecord {
      token: "tok".to_string(),
      user_id: "u1".to_string(),
      display_name: "Jane".to_string(),
      role: Role::Citizen,
      email: Some("jane@example.com".to_string()),
    }
  }

  #[test]
  fn test_session_requires_token_and_user_data() {
    let store = MemoryStore::new();
    save_session(&store, &session()).unwrap();
    assert_eq!(load_session(&store).unwrap(), Some(session()));

    // Host cleared the token but not the user data
    store.remove(TOKEN_KEY).unwrap();
    assert_eq!(load_session(&store).unwrap(), None);
  }

  #[test]
  fn test_clear_session_removes_both_keys() {
    let store = MemoryStore::new();
    save_session(&store, &session()).unwrap();
    clear_session(&store).unwrap();

    assert_eq!(store.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(store.get(USER_KEY).unwrap(), None);
  }

  #[test]
  fn test_next_id_is_strictly_increasing() {
    let far_future = u64::MAX / 2;
    assert_eq!(next_id([far_future, 3]), far_future + 1);

    let a = next_id([]);
    let b = next_id([a]);
    assert!(b > a);
  }

  #[test]
  fn test_event_log_is_capped() {
    let store = MemoryStore::new();
    for i in 0..(MAX_LOCAL_EVENTS + 5) {
      append_event(
        &store,
        AnalyticsEvent {
          event_type: format!("e{}", i),
          event_data: None,
          user_id: None,
          created_at: Utc::now(),
        },
      )
      .unwrap();
    }

    let events = load_events(&store).unwrap();
    assert_eq!(events.len(), MAX_LOCAL_EVENTS);
    assert_eq!(events[0].event_type, "e5");
  }
}
