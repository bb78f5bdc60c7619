use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::error::{GatewayError, GatewayResult};
use super::persist;
use super::types::{
  Credentials, IncidentDraft, IncidentFilter, IncidentRecord, IncidentStatus, NotificationRecord,
  Officer, RegistrationProfile, Role, SessionRecord,
};
use crate::store::KeyValueStore;

/// PowerBack REST API client
///
/// The bearer token is read from the persisted store on every request so a
/// login or logout through any handle is picked up immediately.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  store: Arc<dyn KeyValueStore>,
}

impl ApiClient {
  pub fn new(
    base_url: &str,
    timeout: Duration,
    store: Arc<dyn KeyValueStore>,
  ) -> GatewayResult<Self> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| GatewayError::Network(format!("Failed to create HTTP client: {}", e)))?;

    Self::with_client(http, base_url, store)
  }

  pub fn with_client(
    http: reqwest::Client,
    base_url: &str,
    store: Arc<dyn KeyValueStore>,
  ) -> GatewayResult<Self> {
    // A trailing slash keeps any path prefix when joining endpoints
    let normalized = format!("{}/", base_url.trim_end_matches('/'));
    let base_url = Url::parse(&normalized)
      .map_err(|e| GatewayError::Validation(format!("invalid API URL '{}': {}", base_url, e)))?;

    Ok(Self {
      http,
      base_url,
      store,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn http(&self) -> &reqwest::Client {
    &self.http
  }

  pub fn endpoint(&self, path: &str) -> GatewayResult<Url> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| GatewayError::Validation(format!("invalid endpoint '{}': {}", path, e)))
  }

  fn request(&self, method: Method, path: &str) -> GatewayResult<RequestBuilder> {
    let mut builder = self.http.request(method, self.endpoint(path)?);
    if let Some(token) = self.store.get(persist::TOKEN_KEY)? {
      builder = builder.bearer_auth(token);
    }
    Ok(builder)
  }

  /// Send and map any non-2xx response to an error.
  async fn execute(&self, builder: RequestBuilder) -> GatewayResult<Response> {
    let response = builder.send().await?;
    let status = response.status();

    if status.is_success() {
      return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
      warn!("server rejected the session token, clearing it");
      persist::clear_session(self.store.as_ref())?;
      return Err(GatewayError::Authentication(
        "session expired or invalid".to_string(),
      ));
    }

    let url = response.url().path().to_string();
    let message = server_message(&response.text().await.unwrap_or_default());

    Err(match (status, message) {
      (StatusCode::NOT_FOUND, message) => GatewayError::NotFound(message.unwrap_or(url)),
      (status, Some(message)) => GatewayError::Api {
        status: status.as_u16(),
        message,
      },
      (status, None) => GatewayError::Network(format!("{} returned HTTP {}", url, status)),
    })
  }

  async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> GatewayResult<T> {
    let response = self.execute(builder).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
    debug!(path, "GET");
    self.send_json(self.request(Method::GET, path)?).await
  }

  async fn post<B, T>(&self, path: &str, body: &B) -> GatewayResult<T>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    debug!(path, "POST");
    self
      .send_json(self.request(Method::POST, path)?.json(body))
      .await
  }

  async fn put(&self, path: &str, body: Option<&Value>) -> GatewayResult<()> {
    debug!(path, "PUT");
    let mut builder = self.request(Method::PUT, path)?;
    if let Some(body) = body {
      builder = builder.json(body);
    }
    self.execute(builder).await?;
    Ok(())
  }

  /// Authenticate against an auth endpoint. Any rejection is an Authentication error.
  async fn authenticate(
    &self,
    path: &str,
    body: Value,
    email: &str,
  ) -> GatewayResult<SessionRecord> {
    debug!(path, "POST");
    let response = self
      .http
      .post(self.endpoint(path)?)
      .json(&body)
      .send()
      .await?;

    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
      let reason = server_message(&String::from_utf8_lossy(&bytes))
        .unwrap_or_else(|| format!("server returned HTTP {}", status));
      return Err(GatewayError::Authentication(reason));
    }

    let mut session: SessionRecord = serde_json::from_slice(&bytes)?;
    if session.email.is_none() {
      session.email = Some(email.to_string());
    }
    Ok(session)
  }

  pub async fn login(&self, credentials: &Credentials) -> GatewayResult<SessionRecord> {
    let body = json!({
      "email": credentials.email,
      "password": credentials.password,
    });
    self
      .authenticate("api/auth/login", body, &credentials.email)
      .await
  }

  pub async fn register(
    &self,
    profile: &RegistrationProfile,
    role: Role,
  ) -> GatewayResult<SessionRecord> {
    let body = json!({
      "email": profile.email,
      "password": profile.password,
      "fullName": profile.full_name,
      "phone": profile.phone,
      "role": role,
    });
    self
      .authenticate("api/auth/register", body, &profile.email)
      .await
  }

  pub async fn incidents(&self, filter: IncidentFilter) -> GatewayResult<Vec<IncidentRecord>> {
    let path = match filter {
      IncidentFilter::All => "api/incidents".to_string(),
      IncidentFilter::Pending => "api/incidents/pending".to_string(),
      IncidentFilter::Mine => "api/incidents/my".to_string(),
      IncidentFilter::Assigned => "api/incidents/assigned".to_string(),
      IncidentFilter::Status(status) => format!("api/incidents?status={}", status),
    };
    self.get(&path).await
  }

  pub async fn incident(&self, id: u64) -> GatewayResult<IncidentRecord> {
    self.get(&format!("api/incidents/{}", id)).await
  }

  pub async fn create_incident(&self, draft: &IncidentDraft) -> GatewayResult<IncidentRecord> {
    let body = json!({
      "type": draft.incident_type,
      "title": draft.title.trim(),
      "description": draft.description,
      "address": draft.address,
      "latitude": draft.latitude,
      "longitude": draft.longitude,
      "mediaUrls": draft.media_urls,
    });
    self.post("api/incidents", &body).await
  }

  pub async fn assign(&self, id: u64, officer: &Officer) -> GatewayResult<()> {
    // The backend keys officers by numeric user id
    let officer_id = match officer.id.parse::<u64>() {
      Ok(n) => json!(n),
      Err(_) => json!(officer.id),
    };
    let body = json!({ "officerId": officer_id });
    self
      .put(&format!("api/incidents/{}/assign", id), Some(&body))
      .await
  }

  pub async fn update_status(
    &self,
    id: u64,
    status: IncidentStatus,
    notes: Option<&str>,
  ) -> GatewayResult<()> {
    let body = json!({ "status": status, "notes": notes });
    self
      .put(&format!("api/incidents/{}/status", id), Some(&body))
      .await
  }

  pub async fn notifications(&self) -> GatewayResult<Vec<NotificationRecord>> {
    self.get("api/notifications").await
  }

  pub async fn mark_read(&self, id: u64) -> GatewayResult<()> {
    self
      .put(&format!("api/notifications/{}/read", id), None)
      .await
  }

  pub async fn track(&self, event_type: &str, event_data: Option<&str>) -> GatewayResult<()> {
    let body = json!({ "eventType": event_type, "eventData": event_data });
    debug!(path = "api/analytics/track", "POST");
    // Response body is ignored
    self
      .execute(self.request(Method::POST, "api/analytics/track")?.json(&body))
      .await?;
    Ok(())
  }
}

/// Extract `message` or `error` from a JSON error body.
fn server_message(body: &str) -> Option<String> {
  let value: Value = serde_json::from_str(body).ok()?;
  ["message", "error"]
    .iter()
    .filter_map(|key| value.get(key).and_then(Value::as_str))
    .map(str::trim)
    .find(|m| !m.is_empty())
    .map(str::to_string)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use crate::test_support::{test_client, MockServer};
  use axum::http::StatusCode as AxumStatus;

  fn session() -> SessionRecord {
    SessionRecord {
      token: "tok-1".to_string(),
      user_id: "7".to_string(),
      display_name: "Jane".to_string(),
      role: Role::Citizen,
      email: None,
    }
  }

  fn client(server: &MockServer, store: Arc<dyn KeyValueStore>) -> ApiClient {
    ApiClient::with_client(test_client(), &server.url, store).unwrap()
  }

  #[test]
  fn test_server_message_extraction() {
    assert_eq!(
      server_message(r#"{"message":"Incident not found"}"#).as_deref(),
      Some("Incident not found")
    );
    assert_eq!(
      server_message(r#"{"error":"Bad Request","message":""}"#).as_deref(),
      Some("Bad Request")
    );
    assert_eq!(server_message("<html>oops</html>"), None);
  }

  #[test]
  fn test_endpoint_keeps_base_path() {
    let client = ApiClient::with_client(
      reqwest::Client::new(),
      "https://example.com/backend",
      Arc::new(MemoryStore::new()),
    )
    .unwrap();
    assert_eq!(
      client.endpoint("/api/incidents").unwrap().as_str(),
      "https://example.com/backend/api/incidents"
    );
  }

  #[tokio::test]
  async fn test_bearer_token_and_filter_paths() {
    let server = MockServer::start()
      .await
      .route("GET", "/api/incidents/assigned", AxumStatus::OK, "[]")
      .route("GET", "/api/incidents", AxumStatus::OK, "[]");
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    persist::save_session(store.as_ref(), &session()).unwrap();
    let api = client(&server, store);

    api.incidents(IncidentFilter::Assigned).await.unwrap();
    api
      .incidents(IncidentFilter::Status(IncidentStatus::InProgress))
      .await
      .unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].path, "/api/incidents/assigned");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok-1"));
    assert_eq!(requests[1].query.as_deref(), Some("status=IN_PROGRESS"));
  }

  #[tokio::test]
  async fn test_unauthorized_clears_session() {
    let server = MockServer::start()
      .await
      .route("GET", "/api/notifications", AxumStatus::UNAUTHORIZED, "");
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    persist::save_session(store.as_ref(), &session()).unwrap();
    let api = client(&server, store.clone());

    let err = api.notifications().await.unwrap_err();
    assert!(matches!(err, GatewayError::Authentication(_)));
    assert_eq!(persist::load_session(store.as_ref()).unwrap(), None);
  }

  #[tokio::test]
  async fn test_error_mapping() {
    let server = MockServer::start()
      .await
      .route(
        "PUT",
        "/api/incidents/99/assign",
        AxumStatus::BAD_REQUEST,
        r#"{"message":"Incident not found"}"#,
      )
      .route("GET", "/api/incidents/5", AxumStatus::NOT_FOUND, "")
      .route("GET", "/api/notifications", AxumStatus::BAD_GATEWAY, "upstream down");
    let api = client(&server, Arc::new(MemoryStore::new()));

    let officer = Officer {
      id: "12".to_string(),
      display_name: "Officer Dan".to_string(),
    };
    let err = api.assign(99, &officer).await.unwrap_err();
    assert!(matches!(
      err,
      GatewayError::Api { status: 400, ref message } if message == "Incident not found"
    ));
    assert_eq!(server.requests()[0].body, r#"{"officerId":12}"#);

    assert!(matches!(api.incident(5).await.unwrap_err(), GatewayError::NotFound(_)));
    assert!(matches!(api.notifications().await.unwrap_err(), GatewayError::Network(_)));
  }

  fn sent(request: &crate::test_support::RecordedRequest) -> Value {
    serde_json::from_str(&request.body).unwrap()
  }

  #[tokio::test]
  async fn test_status_read_track_and_notification_requests() {
    let notifications = r#"[{
      "id": 3,
      "title": "Incident Updated",
      "message": "Your report is in progress",
      "createdAt": "2024-05-29T16:26:40",
      "read": false,
      "relatedIncidentId": 41
    }]"#;
    let server = MockServer::start()
      .await
      .route("PUT", "/api/incidents/41/status", AxumStatus::OK, "")
      .route("PUT", "/api/notifications/3/read", AxumStatus::OK, "")
      .route("POST", "/api/analytics/track", AxumStatus::OK, "{}")
      .route("GET", "/api/notifications", AxumStatus::OK, notifications);
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    persist::save_session(store.as_ref(), &session()).unwrap();
    let api = client(&server, store);

    api
      .update_status(41, IncidentStatus::InProgress, Some("On scene"))
      .await
      .unwrap();
    api
      .update_status(41, IncidentStatus::Closed, None)
      .await
      .unwrap();
    api.mark_read(3).await.unwrap();
    api.track("incident_viewed", Some("41")).await.unwrap();
    let listed = api.notifications().await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].related_incident_id, Some(41));
    assert!(!listed[0].read);

    let requests = server.requests();
    assert_eq!(requests.len(), 5);
    assert!(requests
      .iter()
      .all(|r| r.authorization.as_deref() == Some("Bearer tok-1")));

    assert_eq!(
      (requests[0].method.as_str(), requests[0].path.as_str()),
      ("PUT", "/api/incidents/41/status")
    );
    assert_eq!(
      sent(&requests[0]),
      json!({"status": "IN_PROGRESS", "notes": "On scene"})
    );
    assert_eq!(sent(&requests[1]), json!({"status": "CLOSED", "notes": null}));

    assert_eq!(
      (requests[2].method.as_str(), requests[2].path.as_str()),
      ("PUT", "/api/notifications/3/read")
    );
    assert_eq!(requests[2].body, "");

    assert_eq!(
      (requests[3].method.as_str(), requests[3].path.as_str()),
      ("POST", "/api/analytics/track")
    );
    assert_eq!(
      sent(&requests[3]),
      json!({"eventType": "incident_viewed", "eventData": "41"})
    );

    assert_eq!(
      (requests[4].method.as_str(), requests[4].path.as_str()),
      ("GET", "/api/notifications")
    );
  }

  #[tokio::test]
  async fn test_register_sends_profile_and_returns_session() {
    let server = MockServer::start().await.route(
      "POST",
      "/api/auth/register",
      AxumStatus::OK,
      r#"{"token":"jwt-new","userId":21,"fullName":"Nadia Okafor","role":"NGO"}"#,
    );
    let api = client(&server, Arc::new(MemoryStore::new()));
    let profile = RegistrationProfile {
      email: "nadia@example.org".to_string(),
      password: "pw".to_string(),
      full_name: "Nadia Okafor".to_string(),
      phone: "555-0100".to_string(),
      role: Some(Role::Ngo),
    };

    let session = api.register(&profile, Role::Ngo).await.unwrap();
    assert_eq!(session.token, "jwt-new");
    assert_eq!(session.user_id, "21");
    assert_eq!(session.role, Role::Ngo);
    assert_eq!(session.email.as_deref(), Some("nadia@example.org"));

    let request = &server.requests()[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.authorization, None);
    assert_eq!(
      sent(request),
      json!({
        "email": "nadia@example.org",
        "password": "pw",
        "fullName": "Nadia Okafor",
        "phone": "555-0100",
        "role": "NGO",
      })
    );
  }

  #[tokio::test]
  async fn test_login_rejection_is_authentication_error() {
    let server = MockServer::start().await.route(
      "POST",
      "/api/auth/login",
      AxumStatus::BAD_REQUEST,
      r#"{"message":"Invalid email or password"}"#,
    );
    let api = client(&server, Arc::new(MemoryStore::new()));

    let err = api
      .login(&Credentials {
        email: "jane@example.com".to_string(),
        password: "wrong".to_string(),
        role: None,
      })
      .await
      .unwrap_err();
    assert!(matches!(err, GatewayError::Authentication(ref m) if m == "Invalid email or password"));
  }
}
