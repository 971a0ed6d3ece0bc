use async_trait::async_trait;
use context_ann::{
    AbortSignal, AnnError, AnnHit, AnnProvider, AnnQuery, AttemptOutcome, PreflightRequest,
    ProviderRegistry, ProviderRuntime, ProviderRuntimeConfig,
};
use context_protocol::SearchMode;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy)]
enum Probe {
    Ready,
    Unavailable,
    Error,
    Hang,
}

struct FakeBackend {
    id: String,
    probe: Mutex<Probe>,
    fail_queries: AtomicBool,
    query_delay: Duration,
    preflights: AtomicUsize,
    queries: AtomicUsize,
}

impl FakeBackend {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            probe: Mutex::new(Probe::Ready),
            fail_queries: AtomicBool::new(false),
            query_delay: Duration::ZERO,
            preflights: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    fn probe(self, probe: Probe) -> Self {
        *self.probe.lock().unwrap() = probe;
        self
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    fn preflights(&self) -> usize {
        self.preflights.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnnProvider for FakeBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn preflight(&self, _request: PreflightRequest<'_>) -> context_ann::Result<bool> {
        self.preflights.fetch_add(1, Ordering::SeqCst);
        let probe = *self.probe.lock().unwrap();
        match probe {
            Probe::Ready => Ok(true),
            Probe::Unavailable => Ok(false),
            Probe::Error => Err(AnnError::preflight("index missing")),
            Probe::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(true)
            }
        }
    }

    async fn query(&self, query: &AnnQuery) -> context_ann::Result<Vec<AnnHit>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(AnnError::query("backend crashed"));
        }
        Ok((0..query.top_n.min(2))
            .map(|idx| AnnHit {
                idx,
                score: 1.0 / (idx as f64 + 1.0),
            })
            .collect())
    }
}

fn order(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn query() -> AnnQuery {
    AnnQuery {
        mode: Some(SearchMode::Code),
        top_n: 5,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn healthy_backend_moves_ahead_of_failing_one() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(FakeBackend::new("primary")))
        .with(Arc::new(FakeBackend::new("secondary")));
    let runtime = ProviderRuntime::new(ProviderRuntimeConfig::default());
    let mode = SearchMode::Code;
    let base = order(&["primary", "secondary"]);

    runtime.record_provider_failure("primary", mode, "timeout", false);
    runtime.record_provider_success("secondary", mode, Some(Duration::from_millis(12)));

    assert_eq!(
        runtime.resolve_ann_backends(&registry, mode, &base, true),
        order(&["secondary", "primary"])
    );
    // Base order is kept verbatim without adaptivity.
    assert_eq!(
        runtime.resolve_ann_backends(&registry, mode, &base, false),
        base
    );
}

#[tokio::test(start_paused = true)]
async fn cooled_down_backend_recovers_its_rank_once_penalty_is_cleared() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(FakeBackend::new("primary")))
        .with(Arc::new(FakeBackend::new("secondary")));
    let runtime = ProviderRuntime::new(ProviderRuntimeConfig::default());
    let mode = SearchMode::Code;
    let base = order(&["primary", "secondary"]);

    runtime.record_provider_failure("primary", mode, "timeout", false);
    tokio::time::advance(Duration::from_secs(2)).await;
    // Out of cooldown but still penalised.
    assert_eq!(
        runtime.resolve_ann_backends(&registry, mode, &base, true),
        order(&["secondary", "primary"])
    );

    runtime.record_provider_success("primary", mode, Some(Duration::from_millis(5)));
    runtime.record_provider_success("secondary", mode, Some(Duration::from_millis(50)));
    assert_eq!(
        runtime.resolve_ann_backends(&registry, mode, &base, true),
        order(&["primary", "secondary"])
    );
}

#[tokio::test(start_paused = true)]
async fn no_health_signal_keeps_base_order_and_drops_unknown_ids() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(FakeBackend::new("b")))
        .with(Arc::new(FakeBackend::new("a")));
    let runtime = ProviderRuntime::default();
    let resolved = runtime.resolve_ann_backends(
        &registry,
        SearchMode::Prose,
        &order(&["b", "ghost", "a", "b"]),
        true,
    );
    assert_eq!(resolved, order(&["b", "a"]));
}

#[tokio::test(start_paused = true)]
async fn unknown_latency_sorts_after_measured_latency() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(FakeBackend::new("a")))
        .with(Arc::new(FakeBackend::new("b")))
        .with(Arc::new(FakeBackend::new("c")));
    let runtime = ProviderRuntime::default();
    let mode = SearchMode::Records;
    runtime.record_provider_success("c", mode, Some(Duration::from_millis(30)));
    runtime.record_provider_success("b", mode, Some(Duration::from_millis(10)));
    assert_eq!(
        runtime.resolve_ann_backends(&registry, mode, &order(&["a", "b", "c"]), true),
        order(&["b", "c", "a"])
    );
}

#[tokio::test(start_paused = true)]
async fn preflight_success_is_cached_for_ttl() {
    let backend = FakeBackend::new("vec");
    let runtime = ProviderRuntime::new(ProviderRuntimeConfig {
        preflight_ttl_ms: 1_000,
        ..Default::default()
    });
    let mode = SearchMode::Code;

    assert!(runtime.ensure_provider_preflight(&backend, mode, None, None).await);
    assert!(runtime.ensure_provider_preflight(&backend, mode, None, None).await);
    assert_eq!(backend.preflights(), 1);

    tokio::time::advance(Duration::from_millis(1_001)).await;
    assert!(runtime.ensure_provider_preflight(&backend, mode, None, None).await);
    assert_eq!(backend.preflights(), 2);
}

#[tokio::test(start_paused = true)]
async fn preflight_failure_blocks_until_window_expires() {
    let backend = FakeBackend::new("vec").probe(Probe::Unavailable);
    let runtime = ProviderRuntime::new(ProviderRuntimeConfig {
        base_backoff_ms: 500,
        ..Default::default()
    });
    let mode = SearchMode::Code;

    assert!(!runtime.ensure_provider_preflight(&backend, mode, None, None).await);
    assert!(!runtime.ensure_provider_preflight(&backend, mode, None, None).await);
    assert_eq!(backend.preflights(), 1);
    let state = runtime.state("vec", mode).expect("state");
    assert_eq!(state.preflight, Some(false));
    assert_eq!(state.failures, 1);
    assert_eq!(state.preflight_failure_until, state.disabled_until);

    *backend.probe.lock().unwrap() = Probe::Ready;
    tokio::time::advance(Duration::from_millis(501)).await;
    assert!(runtime.ensure_provider_preflight(&backend, mode, None, None).await);
    assert_eq!(backend.preflights(), 2);
    assert_eq!(runtime.state("vec", mode).expect("state").failures, 0);
}

#[tokio::test(start_paused = true)]
async fn preflight_error_is_recorded_not_raised() {
    let backend = FakeBackend::new("vec").probe(Probe::Error);
    let runtime = ProviderRuntime::default();
    assert!(
        !runtime
            .ensure_provider_preflight(&backend, SearchMode::Prose, None, None)
            .await
    );
    let state = runtime.state("vec", SearchMode::Prose).expect("state");
    assert_eq!(state.preflight, Some(false));
    assert!(state
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("index missing")));
}

#[tokio::test(start_paused = true)]
async fn cancelled_preflight_returns_false_without_recording() {
    let backend = Arc::new(FakeBackend::new("vec").probe(Probe::Hang));
    let runtime = Arc::new(ProviderRuntime::default());
    let signal = AbortSignal::new();

    let task = {
        let backend = Arc::clone(&backend);
        let runtime = Arc::clone(&runtime);
        let signal = signal.clone();
        tokio::spawn(async move {
            runtime
                .ensure_provider_preflight(backend.as_ref(), SearchMode::Code, None, Some(&signal))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    signal.abort();

    assert!(!task.await.expect("join"));
    assert_eq!(backend.preflights(), 1);
    assert!(runtime.state("vec", SearchMode::Code).is_none());
    assert!(!runtime.is_provider_cooling_down("vec", SearchMode::Code));
}

#[tokio::test(start_paused = true)]
async fn concurrent_preflights_probe_once() {
    let backend = Arc::new(FakeBackend::new("vec"));
    let runtime = Arc::new(ProviderRuntime::default());
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let backend = Arc::clone(&backend);
        let runtime = Arc::clone(&runtime);
        tasks.push(tokio::spawn(async move {
            runtime
                .ensure_provider_preflight(backend.as_ref(), SearchMode::Code, None, None)
                .await
        }));
    }
    for task in tasks {
        assert!(task.await.expect("join"));
    }
    assert_eq!(backend.preflights(), 1);
}

#[tokio::test(start_paused = true)]
async fn dispatch_falls_back_and_reorders_next_query() {
    let broken = Arc::new(FakeBackend::new("primary"));
    broken.fail_queries.store(true, Ordering::SeqCst);
    let healthy = Arc::new(FakeBackend::new("secondary").delay(Duration::from_millis(4)));
    let registry = ProviderRegistry::new()
        .with(broken.clone())
        .with(healthy.clone());
    let runtime = ProviderRuntime::default();
    let base = order(&["primary", "secondary"]);

    let first = runtime
        .dispatch(&registry, SearchMode::Code, &base, true, &query(), None)
        .await
        .expect("dispatch");
    assert_eq!(first.backend, "secondary");
    assert_eq!(first.hits.len(), 2);
    assert_eq!(first.attempts.len(), 2);
    assert!(matches!(
        first.attempts[0].outcome,
        AttemptOutcome::Failed { .. }
    ));

    let second = runtime
        .dispatch(&registry, SearchMode::Code, &base, true, &query(), None)
        .await
        .expect("dispatch");
    assert_eq!(second.backend, "secondary");
    assert_eq!(second.attempts.len(), 1);
    assert_eq!(broken.queries.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dispatch_reports_when_nothing_is_usable() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(FakeBackend::new("a").probe(Probe::Unavailable)))
        .with(Arc::new(FakeBackend::new("b").probe(Probe::Error)));
    let runtime = ProviderRuntime::default();
    let err = runtime
        .dispatch(
            &registry,
            SearchMode::Code,
            &order(&["a", "b"]),
            true,
            &query(),
            None,
        )
        .await
        .expect_err("no backend");
    match err {
        AnnError::NoUsableBackend { mode, tried } => {
            assert_eq!(mode, SearchMode::Code);
            assert_eq!(tried, "a, b");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn dispatch_honours_abort_before_routing() {
    let registry = ProviderRegistry::new().with(Arc::new(FakeBackend::new("a")));
    let runtime = ProviderRuntime::default();
    let signal = AbortSignal::new();
    signal.abort();
    let err = runtime
        .dispatch(
            &registry,
            SearchMode::Code,
            &order(&["a"]),
            true,
            &query(),
            Some(&signal),
        )
        .await
        .expect_err("aborted");
    assert!(matches!(err, AnnError::Cancelled));
}
