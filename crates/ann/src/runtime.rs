use crate::config::ProviderRuntimeConfig;
use crate::error::{AnnError, Result};
use crate::provider::{AnnHit, AnnProvider, AnnQuery, PreflightRequest, ProviderRegistry};
use crate::signal::AbortSignal;
use context_protocol::SearchMode;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

type ProviderKey = (String, SearchMode);

/// Health record for one (provider, mode) pair.
#[derive(Debug, Clone, Default)]
pub struct ProviderModeState {
    pub failures: u32,
    pub disabled_until: Option<Instant>,
    pub preflight: Option<bool>,
    pub preflight_failure_until: Option<Instant>,
    pub preflight_checked_at: Option<Instant>,
    pub last_error: Option<String>,
    pub latency_ewma_ms: Option<f64>,
    pub latency_samples: u64,
}

impl ProviderModeState {
    fn is_cooling_down(&self, now: Instant) -> bool {
        self.disabled_until.is_some_and(|until| until > now)
    }

    fn has_signal(&self) -> bool {
        self.failures > 0 || self.latency_samples > 0 || self.preflight == Some(false)
    }

    fn penalty(&self, config: &ProviderRuntimeConfig) -> f64 {
        let mut penalty = f64::from(self.failures) * config.failure_penalty_weight;
        if self.preflight == Some(false) {
            penalty += config.preflight_penalty_weight;
        }
        penalty
    }
}

/// Serializable view of a provider's health, relative to the moment it was taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider: String,
    pub mode: SearchMode,
    pub failures: u32,
    pub cooling_down: bool,
    pub cooldown_remaining_ms: u64,
    pub preflight: Option<bool>,
    pub last_error: Option<String>,
    pub latency_ewma_ms: Option<f64>,
    pub latency_samples: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AttemptOutcome {
    #[serde(rename_all = "camelCase")]
    Succeeded { latency_ms: f64 },
    Failed { error: String },
    CoolingDown,
    PreflightRejected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchAttempt {
    pub backend: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Result of routing one query through the backend order.
#[derive(Debug, Clone, Serialize)]
pub struct AnnDispatch {
    pub backend: String,
    pub hits: Vec<AnnHit>,
    pub attempts: Vec<DispatchAttempt>,
}

/// Tracks backend health per (provider, mode) and routes queries to the
/// healthiest usable backend.
///
/// The runtime is owned by whoever creates it and is safe to share across
/// concurrent queries. Preflight probes are single-flight per key so that
/// concurrent callers never probe the same backend twice.
#[derive(Debug, Default)]
pub struct ProviderRuntime {
    config: ProviderRuntimeConfig,
    states: Mutex<HashMap<ProviderKey, ProviderModeState>>,
    preflight_gates: Mutex<HashMap<ProviderKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProviderRuntime {
    #[must_use]
    pub fn new(config: ProviderRuntimeConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
            preflight_gates: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ProviderRuntimeConfig {
        &self.config
    }

    fn key(provider: &str, mode: SearchMode) -> ProviderKey {
        (provider.to_string(), mode)
    }

    fn with_state<R>(
        &self,
        provider: &str,
        mode: SearchMode,
        f: impl FnOnce(&mut ProviderModeState) -> R,
    ) -> R {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        f(states.entry(Self::key(provider, mode)).or_default())
    }

    /// Snapshot of the raw state, if the pair was ever referenced.
    #[must_use]
    pub fn state(&self, provider: &str, mode: SearchMode) -> Option<ProviderModeState> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(&Self::key(provider, mode)).cloned()
    }

    pub fn record_provider_failure(
        &self,
        provider: &str,
        mode: SearchMode,
        reason: &str,
        from_preflight: bool,
    ) {
        let now = Instant::now();
        let (failures, backoff) = self.with_state(provider, mode, |state| {
            state.failures = state.failures.saturating_add(1);
            let backoff = self.config.backoff_for(state.failures);
            let until = now + backoff;
            state.disabled_until = Some(until);
            state.last_error = Some(reason.to_string());
            if from_preflight {
                state.preflight = Some(false);
                state.preflight_failure_until = Some(until);
                state.preflight_checked_at = Some(now);
            }
            (state.failures, backoff)
        });
        log::warn!(
            "ANN backend {provider} ({mode}) failed{}: {reason}; cooling down for {}ms after {failures} consecutive failure(s)",
            if from_preflight { " preflight" } else { "" },
            backoff.as_millis()
        );
    }

    pub fn record_provider_success(
        &self,
        provider: &str,
        mode: SearchMode,
        latency: Option<Duration>,
    ) {
        let now = Instant::now();
        let alpha = self.config.latency_alpha;
        self.with_state(provider, mode, |state| {
            state.failures = 0;
            state.disabled_until = None;
            state.last_error = None;
            state.preflight = Some(true);
            state.preflight_failure_until = None;
            state.preflight_checked_at = Some(now);
            if let Some(latency) = latency {
                let sample = latency.as_secs_f64() * 1_000.0;
                state.latency_ewma_ms = Some(match state.latency_ewma_ms {
                    Some(prev) => alpha * sample + (1.0 - alpha) * prev,
                    None => sample,
                });
                state.latency_samples += 1;
            }
        });
    }

    #[must_use]
    pub fn is_provider_cooling_down(&self, provider: &str, mode: SearchMode) -> bool {
        let now = Instant::now();
        self.state(provider, mode)
            .is_some_and(|state| state.is_cooling_down(now))
    }

    fn cached_preflight(&self, provider: &str, mode: SearchMode, now: Instant) -> Option<bool> {
        let state = self.state(provider, mode)?;
        match state.preflight {
            Some(true) => state
                .preflight_checked_at
                .filter(|checked| *checked + self.config.preflight_ttl() > now)
                .map(|_| true),
            Some(false) => state
                .preflight_failure_until
                .filter(|until| *until > now)
                .map(|_| false),
            None => None,
        }
    }

    fn preflight_gate(&self, provider: &str, mode: SearchMode) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self
            .preflight_gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(Self::key(provider, mode)).or_default())
    }

    /// Decides whether `provider` is usable for `mode`, probing it when no
    /// fresh verdict is cached.
    ///
    /// Never fails: probe errors are recorded as preflight failures. A probe
    /// cancelled through `signal` yields `false` and records nothing.
    pub async fn ensure_provider_preflight(
        &self,
        provider: &dyn AnnProvider,
        mode: SearchMode,
        embedding: Option<&[f32]>,
        signal: Option<&AbortSignal>,
    ) -> bool {
        let id = provider.id();
        if let Some(cached) = self.cached_preflight(id, mode, Instant::now()) {
            return cached;
        }

        let gate = self.preflight_gate(id, mode);
        let _guard = gate.lock().await;
        // Another caller may have finished the probe while we waited.
        if let Some(cached) = self.cached_preflight(id, mode, Instant::now()) {
            return cached;
        }
        if signal.is_some_and(AbortSignal::is_aborted) {
            return false;
        }

        let request = PreflightRequest {
            mode,
            embedding,
            signal,
        };
        let outcome = match signal {
            Some(signal) => tokio::select! {
                biased;
                () = signal.aborted() => None,
                result = provider.preflight(request) => Some(result),
            },
            None => Some(provider.preflight(request).await),
        };

        match outcome {
            None => {
                log::debug!("Preflight of {id} ({mode}) cancelled");
                false
            }
            Some(Ok(true)) => {
                self.record_provider_success(id, mode, None);
                true
            }
            Some(Ok(false)) => {
                self.record_provider_failure(id, mode, "preflight reported backend unavailable", true);
                false
            }
            Some(Err(err)) => {
                self.record_provider_failure(id, mode, &err.to_string(), true);
                false
            }
        }
    }

    /// Final backend order for one query.
    ///
    /// Unknown and repeated ids are dropped. Without adaptivity, or with no
    /// health signal for any candidate, the base order is kept as-is.
    /// Otherwise candidates are sorted by cooldown (cooling last), penalty,
    /// latency moving average (unknown last) and finally base position.
    #[must_use]
    pub fn resolve_ann_backends(
        &self,
        registry: &ProviderRegistry,
        mode: SearchMode,
        base_order: &[String],
        adaptive: bool,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let filtered: Vec<String> = base_order
            .iter()
            .filter(|id| registry.contains(id) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        if !adaptive || filtered.len() <= 1 {
            return filtered;
        }

        let now = Instant::now();
        let snapshot: Vec<(usize, String, ProviderModeState)> = {
            let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            filtered
                .into_iter()
                .enumerate()
                .map(|(pos, id)| {
                    let state = states
                        .get(&Self::key(&id, mode))
                        .cloned()
                        .unwrap_or_default();
                    (pos, id, state)
                })
                .collect()
        };

        if !snapshot.iter().any(|(_, _, state)| state.has_signal()) {
            return snapshot.into_iter().map(|(_, id, _)| id).collect();
        }

        let mut ranked: Vec<(bool, f64, f64, usize, String)> = snapshot
            .into_iter()
            .map(|(pos, id, state)| {
                (
                    state.is_cooling_down(now),
                    state.penalty(&self.config),
                    state.latency_ewma_ms.unwrap_or(f64::INFINITY),
                    pos,
                    id,
                )
            })
            .collect();
        ranked.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.2.total_cmp(&b.2))
                .then_with(|| a.3.cmp(&b.3))
        });

        let order: Vec<String> = ranked.into_iter().map(|entry| entry.4).collect();
        log::debug!("Adaptive ANN order for {mode}: {order:?}");
        order
    }

    /// Routes `query` through the resolved backend order, skipping backends
    /// that are cooling down or fail preflight, and returns the first
    /// successful answer.
    pub async fn dispatch(
        &self,
        registry: &ProviderRegistry,
        mode: SearchMode,
        base_order: &[String],
        adaptive: bool,
        query: &AnnQuery,
        signal: Option<&AbortSignal>,
    ) -> Result<AnnDispatch> {
        let order = self.resolve_ann_backends(registry, mode, base_order, adaptive);
        let mut attempts = Vec::with_capacity(order.len());

        for id in order {
            if signal.is_some_and(AbortSignal::is_aborted) {
                return Err(AnnError::Cancelled);
            }
            let Some(provider) = registry.get(&id) else {
                continue;
            };
            if self.is_provider_cooling_down(&id, mode) {
                attempts.push(DispatchAttempt {
                    backend: id,
                    outcome: AttemptOutcome::CoolingDown,
                });
                continue;
            }
            if !self
                .ensure_provider_preflight(
                    provider.as_ref(),
                    mode,
                    query.embedding.as_deref(),
                    signal,
                )
                .await
            {
                if signal.is_some_and(AbortSignal::is_aborted) {
                    return Err(AnnError::Cancelled);
                }
                attempts.push(DispatchAttempt {
                    backend: id,
                    outcome: AttemptOutcome::PreflightRejected,
                });
                continue;
            }

            let started = Instant::now();
            let result = match signal {
                Some(signal) => tokio::select! {
                    biased;
                    () = signal.aborted() => return Err(AnnError::Cancelled),
                    result = provider.query(query) => result,
                },
                None => provider.query(query).await,
            };
            match result {
                Ok(hits) => {
                    let latency = started.elapsed();
                    self.record_provider_success(&id, mode, Some(latency));
                    attempts.push(DispatchAttempt {
                        backend: id.clone(),
                        outcome: AttemptOutcome::Succeeded {
                            latency_ms: latency.as_secs_f64() * 1_000.0,
                        },
                    });
                    return Ok(AnnDispatch {
                        backend: id,
                        hits,
                        attempts,
                    });
                }
                Err(err) => {
                    let error = err.to_string();
                    self.record_provider_failure(&id, mode, &error, false);
                    attempts.push(DispatchAttempt {
                        backend: id,
                        outcome: AttemptOutcome::Failed { error },
                    });
                }
            }
        }

        let tried = if attempts.is_empty() {
            "none".to_string()
        } else {
            attempts
                .iter()
                .map(|a| a.backend.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Err(AnnError::NoUsableBackend { mode, tried })
    }

    /// Health of one (provider, mode) pair, if it was ever referenced.
    #[must_use]
    pub fn health(&self, provider: &str, mode: SearchMode) -> Option<ProviderHealth> {
        let now = Instant::now();
        self.state(provider, mode)
            .map(|state| ProviderHealth::snapshot(provider, mode, &state, now))
    }

    /// Health of every tracked pair, sorted by provider then mode.
    #[must_use]
    pub fn health_report(&self) -> Vec<ProviderHealth> {
        let now = Instant::now();
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<ProviderHealth> = states
            .iter()
            .map(|((provider, mode), state)| ProviderHealth::snapshot(provider, *mode, state, now))
            .collect();
        out.sort_by(|a, b| {
            a.provider
                .cmp(&b.provider)
                .then_with(|| a.mode.as_str().cmp(b.mode.as_str()))
        });
        out
    }
}

impl ProviderHealth {
    fn snapshot(provider: &str, mode: SearchMode, state: &ProviderModeState, now: Instant) -> Self {
        Self {
            provider: provider.to_string(),
            mode,
            failures: state.failures,
            cooling_down: state.is_cooling_down(now),
            cooldown_remaining_ms: state
                .disabled_until
                .map(|until| {
                    u64::try_from(until.saturating_duration_since(now).as_millis())
                        .unwrap_or(u64::MAX)
                })
                .unwrap_or(0),
            preflight: state.preflight,
            last_error: state.last_error.clone(),
            latency_ewma_ms: state.latency_ewma_ms,
            latency_samples: state.latency_samples,
        }
    }
}
