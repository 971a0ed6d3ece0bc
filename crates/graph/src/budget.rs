use context_protocol::{StopReason, Truncation, TruncationDetail};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const DEFAULT_CHECK_EVERY: u64 = 256;

/// Limits for a [`WorkBudget`]. `None` disables the corresponding ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkBudgetConfig {
    pub max_units: Option<u64>,
    pub max_wall_clock_ms: Option<u64>,
    /// Minimum number of consumed units between two wall-clock samples.
    pub check_every: u64,
}

impl Default for WorkBudgetConfig {
    fn default() -> Self {
        Self {
            max_units: None,
            max_wall_clock_ms: None,
            check_every: DEFAULT_CHECK_EVERY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStop {
    pub reason: StopReason,
    pub limit: u64,
}

/// Snapshot returned by every [`WorkBudget::consume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetState {
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    pub used: u64,
}

/// Unit- and time-bounded consumption tracker for a single traversal or scan.
///
/// The wall clock is only sampled once at least `check_every` units were
/// consumed since the previous sample. Once stopped, the budget stays stopped.
#[derive(Debug, Clone)]
pub struct WorkBudget {
    max_units: Option<u64>,
    max_wall_clock: Option<Duration>,
    check_every: u64,
    started_at: Instant,
    used: u64,
    last_check_at: u64,
    stop: Option<BudgetStop>,
}

impl WorkBudget {
    #[must_use]
    pub fn new(config: WorkBudgetConfig) -> Self {
        Self::started_at(config, Instant::now())
    }

    #[must_use]
    pub fn started_at(config: WorkBudgetConfig, started_at: Instant) -> Self {
        Self {
            max_units: config.max_units,
            max_wall_clock: config.max_wall_clock_ms.map(Duration::from_millis),
            check_every: config.check_every.max(1),
            started_at,
            used: 0,
            last_check_at: 0,
            stop: None,
        }
    }

    /// A budget with no ceilings at all.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(WorkBudgetConfig::default())
    }

    pub fn consume(&mut self, units: u64) -> BudgetState {
        self.consume_at(units, Instant::now())
    }

    pub fn consume_at(&mut self, units: u64, now: Instant) -> BudgetState {
        self.used = self.used.saturating_add(units.max(1));
        if self.stop.is_some() {
            return self.state();
        }

        if let Some(max_units) = self.max_units {
            if self.used >= max_units {
                self.halt(StopReason::MaxWorkUnits, max_units);
                return self.state();
            }
        }

        if self.used - self.last_check_at >= self.check_every {
            self.last_check_at = self.used;
            if let Some(max_wall_clock) = self.max_wall_clock {
                if now.saturating_duration_since(self.started_at) > max_wall_clock {
                    let limit = u64::try_from(max_wall_clock.as_millis()).unwrap_or(u64::MAX);
                    self.halt(StopReason::MaxWallClockMs, limit);
                }
            }
        }

        self.state()
    }

    #[must_use]
    pub const fn should_stop(&self) -> bool {
        self.stop.is_some()
    }

    #[must_use]
    pub const fn used(&self) -> u64 {
        self.used
    }

    #[must_use]
    pub const fn stop(&self) -> Option<BudgetStop> {
        self.stop
    }

    #[must_use]
    pub fn state(&self) -> BudgetState {
        BudgetState {
            stopped: self.stop.is_some(),
            reason: self.stop.map(|s| s.reason),
            limit: self.stop.map(|s| s.limit),
            used: self.used,
        }
    }

    /// Builds a truncation record for `scope`, or `None` while the budget is
    /// still running.
    #[must_use]
    pub fn build_truncation(&self, scope: &str, detail: TruncationDetail) -> Option<Truncation> {
        let stop = self.stop?;
        Some(Truncation {
            scope: scope.to_string(),
            reason: stop.reason,
            limit: stop.limit,
            used: self.used,
            observed: detail.observed,
            omitted: detail.omitted,
            at: detail.at,
        })
    }

    fn halt(&mut self, reason: StopReason, limit: u64) {
        log::debug!(
            "work budget stopped: reason={reason} limit={limit} used={}",
            self.used
        );
        self.stop = Some(BudgetStop { reason, limit });
    }
}
