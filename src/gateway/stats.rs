//! Dashboard summaries computed from an incident snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::types::{IncidentRecord, IncidentStatus, IncidentType, Priority};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentStats {
  pub total: usize,
  pub last_30_days: usize,
  pub last_7_days: usize,
  /// Pending or assigned, not yet being worked
  pub pending: usize,
  pub in_progress: usize,
  /// Resolved or closed
  pub resolved: usize,
  pub high_priority: usize,
  pub by_type: BTreeMap<IncidentType, usize>,
}

pub fn incident_stats(incidents: &[IncidentRecord], now: DateTime<Utc>) -> IncidentStats {
  let month_ago = now - Duration::days(30);
  let week_ago = now - Duration::days(7);

  let mut by_type = BTreeMap::new();
  for incident in incidents {
    *by_type.entry(incident.incident_type).or_insert(0) += 1;
  }

  let count = |pred: &dyn Fn(&IncidentRecord) -> bool| incidents.iter().filter(|i| pred(i)).count();

  IncidentStats {
    total: incidents.len(),
    last_30_days: count(&|i| i.created_at >= month_ago),
    last_7_days: count(&|i| i.created_at >= week_ago),
    pending: count(&|i| {
      matches!(
        i.status,
        IncidentStatus::Pending | IncidentStatus::Assigned
      )
    }),
    in_progress: count(&|i| i.status == IncidentStatus::InProgress),
    resolved: count(&|i| i.status.is_resolution()),
    high_priority: count(&|i| i.priority >= Priority::High),
    by_type,
  }
}

/// High and critical incidents, critical first, newest first within a priority.
pub fn high_priority_queue(incidents: &[IncidentRecord]) -> Vec<&IncidentRecord> {
  let mut queue: Vec<&IncidentRecord> = incidents
    .iter()
    .filter(|i| i.priority >= Priority::High && !i.status.is_resolution())
    .collect();
  queue.sort_by(|a, b| {
    b.priority
      .cmp(&a.priority)
      .then_with(|| b.created_at.cmp(&a.created_at))
  });
  queue
}
