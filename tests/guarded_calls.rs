//! End-to-end guarded calls against a mock HTTP dependency.

use std::sync::atomic::Ordering;
use std::time::Duration;

use circuit_guard::config::load_config;
use circuit_guard::remote::{BlockingQuestionClient, QuestionClient, RemoteError};
use circuit_guard::resilience::{
    CircuitState, FallbackDispatcher, Guarded, Registry, Scheduler,
};

mod common;

fn guarded(registry: &Registry, name: &str) -> Guarded<String, RemoteError> {
    let breaker = registry.get(name, common::fast_config()).unwrap();
    Guarded::new(breaker, FallbackDispatcher::value("default".to_string()))
}

async fn ask(guarded: &Guarded<String, RemoteError>, client: &QuestionClient) -> String {
    let client = client.clone();
    guarded
        .call_async(move || async move { client.ask().await })
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_failures_open_breaker() {
    let (addr, hits) = common::start_mock_backend(500, "boom").await;
    let registry = Registry::new(Scheduler::current().unwrap());
    let guarded = guarded(&registry, "hji");
    let breaker = guarded.breaker().clone();

    let url = format!("http://{addr}/question");
    let results = tokio::task::spawn_blocking(move || {
        let client = BlockingQuestionClient::new(url, Duration::from_secs(2)).unwrap();
        (0..5)
            .map(|_| guarded.call(|| client.ask()).unwrap())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap();

    assert!(results.iter().all(|r| r == "default"));
    // Only the first two calls reached the dependency
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.not_permitted_calls, 3);
    assert_eq!(snapshot.state, CircuitState::Open);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_blocking_recovery_cycle() {
    let (addr, hits) = common::start_programmable_backend(|hit| async move {
        if hit < 2 {
            (400, "bad request".to_string())
        } else {
            (200, "answer".to_string())
        }
    })
    .await;

    let registry = Registry::new(Scheduler::current().unwrap());
    let guarded = guarded(&registry, "hji");
    let client = QuestionClient::new(format!("http://{addr}/question"), Duration::from_secs(2)).unwrap();

    assert_eq!(ask(&guarded, &client).await, "default");
    assert_eq!(ask(&guarded, &client).await, "default");
    assert_eq!(guarded.breaker().state(), CircuitState::Open);

    // Denied without touching the dependency
    assert_eq!(ask(&guarded, &client).await, "default");
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(guarded.breaker().state(), CircuitState::HalfOpen);

    assert_eq!(ask(&guarded, &client).await, "answer");
    assert_eq!(ask(&guarded, &client).await, "answer");
    assert_eq!(guarded.breaker().state(), CircuitState::Closed);
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_both_styles_share_one_breaker() {
    let registry = Registry::new(Scheduler::current().unwrap());
    let async_side = guarded(&registry, "shared");

    let blocking_registry = registry.clone();
    let blocking_side = tokio::task::spawn_blocking(move || {
        let guarded = guarded(&blocking_registry, "shared");
        for _ in 0..2 {
            let value = guarded
                .call(|| Err(RemoteError::Simulated("Connection refused".into())))
                .unwrap();
            assert_eq!(value, "default");
        }
        guarded
    })
    .await
    .unwrap();

    assert!(blocking_side.breaker().ptr_eq(async_side.breaker()));

    let invoked = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = invoked.clone();
    let value = async_side
        .call_async(move || {
            flag.store(true, Ordering::SeqCst);
            async { Ok("answer".to_string()) }
        })
        .await
        .unwrap();

    assert_eq!(value, "default");
    assert!(!invoked.load(Ordering::SeqCst));

    let snapshots = registry.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].state, CircuitState::Open);
    // The window restarts with each episode
    assert_eq!(snapshots[0].buffered_calls, 0);
    assert_eq!(snapshots[0].not_permitted_calls, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_counts_as_failure() {
    let (addr, _) = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        (200, "late".to_string())
    })
    .await;

    let registry = Registry::new(Scheduler::current().unwrap());
    let guarded = guarded(&registry, "slow").with_timeout(Duration::from_millis(50));
    let client = QuestionClient::new(format!("http://{addr}/question"), Duration::from_secs(5)).unwrap();

    assert_eq!(ask(&guarded, &client).await, "default");
    let snapshot = guarded.breaker().snapshot();
    assert_eq!(snapshot.failed_calls, 1);
    assert_eq!(snapshot.buffered_calls, 1);
}

#[tokio::test]
async fn test_config_file_drives_registry() {
    let path = std::env::temp_dir().join(format!("circuit-guard-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
[observability]
log_level = "debug"

[breakers.hji]
failure_rate_threshold = 25.0
minimum_number_of_calls = 4
sliding_window_size = 8
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let registry = Registry::from_config(&config, Scheduler::current().unwrap());
    let breaker = registry.breaker("hji").unwrap();
    assert_eq!(breaker.config().failure_rate_threshold, 25.0);
    assert_eq!(breaker.config().wait_duration_in_open_state_ms, 60_000);

    // One failure in four is exactly the threshold
    let _ = breaker.call(|| Err::<(), _>("refused"));
    for _ in 0..3 {
        let _ = breaker.call(|| Ok::<_, &str>(()));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let json = serde_json::to_value(registry.snapshots()).unwrap();
    assert_eq!(json[0]["name"], "hji");
    assert_eq!(json[0]["state"], "OPEN");
}
