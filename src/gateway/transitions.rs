//! Incident status state machine.

use serde::Deserialize;

use super::error::{GatewayError, GatewayResult};
use super::types::IncidentStatus;

/// How status changes are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
  /// Any status may follow any other
  #[default]
  Permissive,
  /// Only transitions in the table below are accepted
  Strict,
}

/// Legal successors under the strict policy. Same-status updates are always allowed.
fn successors(from: IncidentStatus) -> &'static [IncidentStatus] {
  use IncidentStatus::*;

  match from {
    Pending => &[Assigned, Closed],
    Assigned => &[InProgress, Resolved, Closed],
    InProgress => &[Resolved, Closed],
    Resolved => &[Closed],
    Closed => &[],
  }
}

impl TransitionPolicy {
  pub fn allows(&self, from: IncidentStatus, to: IncidentStatus) -> bool {
    match self {
      TransitionPolicy::Permissive => true,
      TransitionPolicy::Strict => from == to || successors(from).contains(&to),
    }
  }

  pub fn check(&self, from: IncidentStatus, to: IncidentStatus) -> GatewayResult<()> {
    if self.allows(from, to) {
      Ok(())
    } else {
      Err(GatewayError::IllegalTransition { from, to })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use IncidentStatus::*;

  #[test]
  fn test_permissive_accepts_everything() {
    for from in IncidentStatus::ALL {
      for to in IncidentStatus::ALL {
        assert!(TransitionPolicy::Permissive.allows(from, to));
      }
    }
  }

  #[test]
  fn test_strict_follows_the_happy_path() {
    let strict = TransitionPolicy::Strict;
    assert!(strict.allows(Pending, Assigned));
    assert!(strict.allows(Assigned, InProgress));
    assert!(strict.allows(InProgress, Resolved));
    assert!(strict.allows(Resolved, Closed));
    assert!(strict.allows(InProgress, InProgress));
  }

  #[test]
  fn test_strict_rejects_backwards_and_terminal_moves() {
    let strict = TransitionPolicy::Strict;
    assert!(!strict.allows(Assigned, Pending));
    assert!(!strict.allows(Pending, Resolved));
    for to in [Pending, Assigned, InProgress, Resolved] {
      assert!(matches!(
        strict.check(Closed, to),
        Err(GatewayError::IllegalTransition { from: Closed, .. })
      ));
    }
  }
}
