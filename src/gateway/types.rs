//! Domain records shared by the local and remote gateways.
//!
//! The serialized form is the wire/storage form: camelCase fields and
//! SCREAMING_SNAKE_CASE enum values, so records written by either backend
//! read back through the other.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
  Citizen,
  Police,
  Ngo,
  Watch,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Citizen => "CITIZEN",
      Role::Police => "POLICE",
      Role::Ngo => "NGO",
      Role::Watch => "WATCH",
    }
  }
}

/// Lifecycle state of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
  Pending,
  Assigned,
  InProgress,
  Resolved,
  Closed,
}

impl IncidentStatus {
  pub const ALL: [IncidentStatus; 5] = [
    IncidentStatus::Pending,
    IncidentStatus::Assigned,
    IncidentStatus::InProgress,
    IncidentStatus::Resolved,
    IncidentStatus::Closed,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      IncidentStatus::Pending => "PENDING",
      IncidentStatus::Assigned => "ASSIGNED",
      IncidentStatus::InProgress => "IN_PROGRESS",
      IncidentStatus::Resolved => "RESOLVED",
      IncidentStatus::Closed => "CLOSED",
    }
  }

  /// Statuses that stamp `resolved_at`.
  pub fn is_resolution(&self) -> bool {
    matches!(self, IncidentStatus::Resolved | IncidentStatus::Closed)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
  Critical,
}

impl Priority {
  pub fn as_str(&self) -> &'static str {
    match self {
      Priority::Low => "LOW",
      Priority::Medium => "MEDIUM",
      Priority::High => "HIGH",
      Priority::Critical => "CRITICAL",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
  Theft,
  Assault,
  Vandalism,
  SuspiciousActivity,
  DomesticViolence,
  Traffic,
  Fire,
  Medical,
  Other,
}

impl IncidentType {
  pub fn as_str(&self) -> &'static str {
    match self {
      IncidentType::Theft => "THEFT",
      IncidentType::Assault => "ASSAULT",
      IncidentType::Vandalism => "VANDALISM",
      IncidentType::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
      IncidentType::DomesticViolence => "DOMESTIC_VIOLENCE",
      IncidentType::Traffic => "TRAFFIC",
      IncidentType::Fire => "FIRE",
      IncidentType::Medical => "MEDICAL",
      IncidentType::Other => "OTHER",
    }
  }
}

/// Implements Display and case-insensitive FromStr over `as_str`.
macro_rules! wire_enum_text {
  ($ty:ty, [$($variant:expr),+ $(,)?]) => {
    impl fmt::Display for $ty {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $ty {
      type Err = String;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['-', ' '], "_").to_uppercase();
        [$($variant),+]
          .into_iter()
          .find(|v| v.as_str() == wanted)
          .ok_or_else(|| format!("unknown {} '{}'", stringify!($ty), s))
      }
    }
  };
}

wire_enum_text!(Role, [Role::Citizen, Role::Police, Role::Ngo, Role::Watch]);
wire_enum_text!(
  IncidentStatus,
  [
    IncidentStatus::Pending,
    IncidentStatus::Assigned,
    IncidentStatus::InProgress,
    IncidentStatus::Resolved,
    IncidentStatus::Closed,
  ]
);
wire_enum_text!(
  Priority,
  [Priority::Low, Priority::Medium, Priority::High, Priority::Critical]
);
wire_enum_text!(
  IncidentType,
  [
    IncidentType::Theft,
    IncidentType::Assault,
    IncidentType::Vandalism,
    IncidentType::SuspiciousActivity,
    IncidentType::DomesticViolence,
    IncidentType::Traffic,
    IncidentType::Fire,
    IncidentType::Medical,
    IncidentType::Other,
  ]
);

/// Authenticated identity held for a logged-in visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
  pub token: String,
  #[serde(deserialize_with = "id_string")]
  pub user_id: String,
  #[serde(alias = "fullName")]
  pub display_name: String,
  pub role: Role,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
  pub id: u64,
  #[serde(rename = "type")]
  pub incident_type: IncidentType,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub latitude: f64,
  #[serde(default)]
  pub longitude: f64,
  pub status: IncidentStatus,
  #[serde(default)]
  pub priority: Priority,
  #[serde(deserialize_with = "timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(
    default,
    deserialize_with = "optional_timestamp",
    skip_serializing_if = "Option::is_none"
  )]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(
    default,
    deserialize_with = "optional_timestamp",
    skip_serializing_if = "Option::is_none"
  )]
  pub resolved_at: Option<DateTime<Utc>>,
  #[serde(
    default,
    deserialize_with = "optional_id_string",
    skip_serializing_if = "Option::is_none"
  )]
  pub reporter_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reporter_name: Option<String>,
  #[serde(
    default,
    deserialize_with = "optional_id_string",
    skip_serializing_if = "Option::is_none"
  )]
  pub assigned_officer_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_officer_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub officer_notes: Option<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
  pub id: u64,
  pub title: String,
  pub message: String,
  #[serde(deserialize_with = "timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub read: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub related_incident_id: Option<u64>,
}

/// Usage event recorded by `track_event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
  pub event_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_data: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
  pub email: String,
  pub password: String,
  /// Role to sign in as when no server decides it (local mode)
  pub role: Option<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationProfile {
  pub email: String,
  pub password: String,
  pub full_name: String,
  pub phone: String,
  pub role: Option<Role>,
}

/// Citizen-submitted report, before an id and status are assigned.
#[derive(Debug, Clone)]
pub struct IncidentDraft {
  pub incident_type: IncidentType,
  pub title: String,
  pub description: String,
  pub address: String,
  pub latitude: Option<f64>,
  pub longitude: Option<f64>,
  pub media_urls: Vec<String>,
}

impl IncidentDraft {
  pub fn new(incident_type: IncidentType, title: impl Into<String>) -> Self {
    Self {
      incident_type,
      title: title.into(),
      description: String::new(),
      address: String::new(),
      latitude: None,
      longitude: None,
      media_urls: Vec::new(),
    }
  }
}

/// Officer an incident is assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Officer {
  pub id: String,
  pub display_name: String,
}

impl Officer {
  pub fn from_session(session: &SessionRecord) -> Self {
    Self {
      id: session.user_id.clone(),
      display_name: session.display_name.clone(),
    }
  }
}

/// Which incidents to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncidentFilter {
  #[default]
  All,
  Pending,
  /// Reported by the signed-in user
  Mine,
  /// Assigned to the signed-in user
  Assigned,
  Status(IncidentStatus),
}

impl IncidentFilter {
  /// Client-side predicate; `session` is the signed-in user, if any.
  pub fn matches(&self, incident: &IncidentRecord, session: Option<&SessionRecord>) -> bool {
    match self {
      IncidentFilter::All => true,
      IncidentFilter::Pending => incident.status == IncidentStatus::Pending,
      IncidentFilter::Status(status) => incident.status == *status,
      IncidentFilter::Mine => session
        .is_some_and(|s| incident.reporter_id.as_deref() == Some(s.user_id.as_str())),
      IncidentFilter::Assigned => session.is_some_and(|s| {
        incident.assigned_officer_id.as_deref() == Some(s.user_id.as_str())
          || incident.assigned_officer_name.as_deref() == Some(s.display_name.as_str())
      }),
    }
  }
}

// ============================================================================
// Lenient deserializers for backend payloads
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
  Text(String),
  Number(u64),
}

impl From<IdValue> for String {
  fn from(value: IdValue) -> Self {
    match value {
      IdValue::Text(s) => s,
      IdValue::Number(n) => n.to_string(),
    }
  }
}

/// Ids arrive as numbers from the backend and as strings from local storage.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  IdValue::deserialize(deserializer).map(String::from)
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<IdValue>::deserialize(deserializer)?.map(String::from))
}

/// Parse RFC 3339, or a zone-less timestamp taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
    .or_else(|| {
      NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
    })
}

fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = String::deserialize(deserializer)?;
  parse_timestamp(&raw)
    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<String>::deserialize(deserializer)? {
    Some(raw) => parse_timestamp(&raw)
      .map(Some)
      .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
    None => Ok(None),
  }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_enum_text_parsing() {
    assert_eq!("in_progress".parse::<IncidentStatus>(), Ok(IncidentStatus::InProgress));
    assert_eq!("In Progress".parse::<IncidentStatus>(), Ok(IncidentStatus::InProgress));
    assert_eq!("police".parse::<Role>(), Ok(Role::Police));
    assert_eq!(
      "suspicious-activity".parse::<IncidentType>(),
      Ok(IncidentType::SuspiciousActivity)
    );
    assert!("LOST".parse::<IncidentType>().is_err());
    assert_eq!(IncidentStatus::InProgress.to_string(), "IN_PROGRESS");
  }

  #[test]
  fn test_backend_incident_payload() {
    let json = r#"{
      "id": 17,
      "title": "Bike stolen",
      "description": "Red bike",
      "type": "THEFT",
      "status": "ASSIGNED",
      "priority": "HIGH",
      "latitude": 40.7,
      "longitude": -73.9,
      "address": "5th Ave",
      "mediaUrls": null,
      "reporterId": 3,
      "reporterName": "Jane Citizen",
      "assignedOfficerId": 9,
      "assignedOfficerName": "Officer Dan",
      "officerNotes": null,
      "createdAt": "2024-05-01T10:15:30.123",
      "updatedAt": "2024-05-01T11:00:00",
      "resolvedAt": null
    }"#;

    let incident: IncidentRecord = serde_json::from_str(json).unwrap();
    assert_eq!(incident.id, 17);
    assert_eq!(incident.incident_type, IncidentType::Theft);
    assert_eq!(incident.priority, Priority::High);
    assert_eq!(incident.reporter_id.as_deref(), Some("3"));
    assert_eq!(incident.assigned_officer_id.as_deref(), Some("9"));
    assert!(incident.media_urls.is_empty());
    assert!(incident.resolved_at.is_none());
    assert_eq!(
      incident.created_at.to_rfc3339(),
      "2024-05-01T10:15:30.123+00:00"
    );
  }

  #[test]
  fn test_session_accepts_backend_field_names() {
    let json = r#"{"token":"t","userId":42,"fullName":"Dana Officer","role":"POLICE"}"#;
    let session: SessionRecord = serde_json::from_str(json).unwrap();

    assert_eq!(session.user_id, "42");
    assert_eq!(session.display_name, "Dana Officer");
    assert_eq!(session.role, Role::Police);
  }

  #[test]
  fn test_filter_predicates() {
    let session = SessionRecord {
      token: "t".to_string(),
      user_id: "u1".to_string(),
      display_name: "Dana".to_string(),
      role: Role::Police,
      email: None,
    };
    let mut incident: IncidentRecord = serde_json::from_str(
      r#"{"id":1,"type":"FIRE","title":"Smoke","status":"PENDING",
          "createdAt":"2024-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    assert!(IncidentFilter::Pending.matches(&incident, None));
    assert!(!IncidentFilter::Mine.matches(&incident, Some(&session)));
    assert!(!IncidentFilter::Assigned.matches(&incident, None));

    incident.reporter_id = Some("u1".to_string());
    incident.assigned_officer_name = Some("Dana".to_string());
    assert!(IncidentFilter::Mine.matches(&incident, Some(&session)));
    assert!(IncidentFilter::Assigned.matches(&incident, Some(&session)));
    assert!(!IncidentFilter::Status(IncidentStatus::Closed).matches(&incident, None));
  }
}
