//! Admission routing engine.
//!
//! Decides per request whether the local inference host may take it, from
//! the host's 1-minute load average and the current local backlog.

use super::queue::QueueState;
use crate::config::AdmissionConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Routing decision ─────────────────────────────────────────────

/// Routing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingTarget {
    /// Generate on the local inference host.
    Local,
    /// Delegate to the remote hosted backend.
    External,
}

/// Why a target was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteReason {
    Ok,
    /// Host load average is above the configured threshold.
    HighLoad,
    /// Local backlog reached the configured maximum.
    QueueFull,
}

/// Result of the admission analysis. Computed fresh per request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteDecision {
    pub target: RoutingTarget,
    pub reason: RouteReason,
    /// Inputs the decision was made from, for logging.
    pub load_one: f64,
    pub queue_depth: usize,
}

impl RouteDecision {
    pub fn is_local(&self) -> bool {
        self.target == RoutingTarget::Local
    }
}

/// Rule table, evaluated in order: load, then backlog.
pub fn decide_route(
    load_one: f64,
    queue_depth: usize,
    load_threshold: f64,
    max_local_queue: usize,
) -> (RoutingTarget, RouteReason) {
    if load_one > load_threshold {
        return (RoutingTarget::External, RouteReason::HighLoad);
    }
    if queue_depth >= max_local_queue {
        return (RoutingTarget::External, RouteReason::QueueFull);
    }
    (RoutingTarget::Local, RouteReason::Ok)
}

// ── Load probing ─────────────────────────────────────────────────

/// Source of the host's 1-minute load average.
pub trait LoadProbe: Send + Sync {
    /// Never fails; an unreadable load reads as 0.0.
    fn load_one(&self) -> f64;
}

/// Reads the real host load average.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoad;

impl LoadProbe for SystemLoad {
    fn load_one(&self) -> f64 {
        let one = sysinfo::System::load_average().one;
        if one.is_finite() && one >= 0.0 {
            one
        } else {
            0.0
        }
    }
}

/// Constant load, for tests and for pinning the route in development.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedLoad(pub f64);

impl LoadProbe for FixedLoad {
    fn load_one(&self) -> f64 {
        self.0
    }
}

// ── Admission controller ─────────────────────────────────────────

pub struct AdmissionController {
    load_threshold: f64,
    max_local_queue: usize,
    probe: Arc<dyn LoadProbe>,
    queue: Arc<QueueState>,
}

impl AdmissionController {
    pub fn new(
        load_threshold: f64,
        max_local_queue: usize,
        probe: Arc<dyn LoadProbe>,
        queue: Arc<QueueState>,
    ) -> Self {
        Self {
            load_threshold,
            max_local_queue,
            probe,
            queue,
        }
    }

    pub fn from_config(
        config: &AdmissionConfig,
        probe: Arc<dyn LoadProbe>,
        queue: Arc<QueueState>,
    ) -> Self {
        Self::new(config.load_threshold, config.max_local_queue, probe, queue)
    }

    /// Decide the route for a request. Read-only; safe to call concurrently.
    pub fn decide(&self) -> RouteDecision {
        let load_one = self.probe.load_one();
        let queue_depth = self.queue.depth();
        let (target, reason) =
            decide_route(load_one, queue_depth, self.load_threshold, self.max_local_queue);
        RouteDecision {
            target,
            reason,
            load_one,
            queue_depth,
        }
    }

    pub fn queue(&self) -> &Arc<QueueState> {
        &self.queue
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(load: f64, max_queue: usize) -> AdmissionController {
        AdmissionController::new(5.0, max_queue, Arc::new(FixedLoad(load)), Arc::new(QueueState::new()))
    }

    #[test]
    fn high_load_wins_regardless_of_queue() {
        for depth in [0, 1, 2, 50] {
            assert_eq!(
                decide_route(5.01, depth, 5.0, 2),
                (RoutingTarget::External, RouteReason::HighLoad)
            );
        }
    }

    #[test]
    fn full_queue_routes_external_under_threshold() {
        assert_eq!(
            decide_route(5.0, 2, 5.0, 2),
            (RoutingTarget::External, RouteReason::QueueFull)
        );
        assert_eq!(
            decide_route(0.0, 3, 5.0, 2),
            (RoutingTarget::External, RouteReason::QueueFull)
        );
    }

    #[test]
    fn otherwise_local() {
        assert_eq!(decide_route(5.0, 1, 5.0, 2), (RoutingTarget::Local, RouteReason::Ok));
        assert_eq!(decide_route(0.0, 0, 5.0, 2), (RoutingTarget::Local, RouteReason::Ok));
    }

    #[test]
    fn zero_max_queue_always_external() {
        assert_eq!(
            decide_route(0.0, 0, 5.0, 0),
            (RoutingTarget::External, RouteReason::QueueFull)
        );
    }

    #[test]
    fn controller_reads_live_queue_depth() {
        let ctl = controller(1.0, 2);
        assert!(ctl.decide().is_local());

        let queue = ctl.queue().clone();
        let _a = queue.enter();
        let _b = queue.enter();
        let decision = ctl.decide();
        assert_eq!(decision.target, RoutingTarget::External);
        assert_eq!(decision.reason, RouteReason::QueueFull);
        assert_eq!(decision.queue_depth, 2);
    }

    #[test]
    fn decide_does_not_mutate_queue() {
        let ctl = controller(9.0, 2);
        for _ in 0..10 {
            assert_eq!(ctl.decide().reason, RouteReason::HighLoad);
        }
        assert_eq!(ctl.queue().depth(), 0);
    }

    #[test]
    fn system_load_is_never_negative_or_nan() {
        let load = SystemLoad.load_one();
        assert!(load.is_finite());
        assert!(load >= 0.0);
    }

    #[test]
    fn serializes_as_screaming_case() {
        assert_eq!(serde_json::to_string(&RoutingTarget::External).unwrap(), "\"EXTERNAL\"");
        assert_eq!(serde_json::to_string(&RouteReason::QueueFull).unwrap(), "\"QUEUE_FULL\"");
    }
}
