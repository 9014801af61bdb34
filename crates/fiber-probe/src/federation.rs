//! Two-consecutive-failure regional→central fallback with a stickiness
//! recovery window (spec §4.1 step 5). Same small-state-enum shape as
//! `fiber_relay::forwarder::ForwarderState` — both model "prefer the normal
//! path, fail over after sustained trouble, retry the normal path after it
//! cools down".

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Regional,
    Central,
}

pub struct FederationState {
    role: Role,
    consecutive_regional_failures: u32,
    central_since: Option<Instant>,
    stickiness: Duration,
}

impl FederationState {
    pub fn new(stickiness: Duration) -> Self {
        Self { role: Role::Regional, consecutive_regional_failures: 0, central_since: None, stickiness }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Records the outcome of a regional send attempt and applies the
    /// fallback/recovery transition (spec §4.1 step 5).
    pub fn record_regional_result(&mut self, success: bool) {
        if success {
            self.consecutive_regional_failures = 0;
            return;
        }

        self.consecutive_regional_failures += 1;
        if self.consecutive_regional_failures >= 2 && self.role == Role::Regional {
            tracing::info!("regional endpoint failed twice consecutively, falling back to central");
            self.role = Role::Central;
            self.central_since = Some(Instant::now());
        }
    }

    /// Call once per emission while on the central path; flips back to
    /// regional once `stickiness` has elapsed of uninterrupted central use.
    pub fn maybe_recover(&mut self) {
        if self.role == Role::Central {
            if let Some(since) = self.central_since {
                if since.elapsed() >= self.stickiness {
                    tracing::info!("stickiness window elapsed, attempting regional endpoint again");
                    self.role = Role::Regional;
                    self.consecutive_regional_failures = 0;
                    self.central_since = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_consecutive_failures_switch_to_central() {
        let mut fed = FederationState::new(Duration::from_secs(120));
        assert_eq!(fed.role(), Role::Regional);
        fed.record_regional_result(false);
        assert_eq!(fed.role(), Role::Regional);
        fed.record_regional_result(false);
        assert_eq!(fed.role(), Role::Central);
    }

    #[test]
    fn single_failure_then_success_does_not_switch() {
        let mut fed = FederationState::new(Duration::from_secs(120));
        fed.record_regional_result(false);
        fed.record_regional_result(true);
        assert_eq!(fed.role(), Role::Regional);
    }
}
