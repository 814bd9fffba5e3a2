//! Failure handling: retries, exhaustion, in-flight accounting, probing.

use std::sync::atomic::Ordering;
use std::time::Duration;
use axum::http::StatusCode;
use futures_util::future::join_all;
use serde_json::Value;
use http_balancer::config::Strategy;

mod common;

#[tokio::test]
async fn retries_against_next_backend() {
    let (dropping, accepted) = common::start_dropping_backend().await;
    let healthy = common::start_echo_backend("B").await;
    let lb = common::spawn_balancer(common::config_for(&[dropping, healthy], Strategy::RoundRobin)).await;

    let res = common::client().get(lb.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["server_name"], "B");

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert!(!lb.pool.backends()[0].is_alive());
    assert!(lb.pool.backends()[1].is_alive());
    assert_eq!(lb.pool.backends()[0].snapshot().completed, 0);
}

#[tokio::test]
async fn all_failing_pool_is_unavailable_after_pool_size_attempts() {
    let mut addrs = Vec::new();
    let mut counters = Vec::new();
    for _ in 0..3 {
        let (addr, accepted) = common::start_dropping_backend().await;
        addrs.push(addr);
        counters.push(accepted);
    }
    let lb = common::spawn_balancer(common::config_for(&addrs, Strategy::RoundRobin)).await;
    let client = common::client();

    let res = client.get(lb.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let attempts: usize = counters.iter().map(|c| c.load(Ordering::SeqCst)).sum();
    assert!(attempts >= 1 && attempts <= 3, "made {} attempts", attempts);
    assert_eq!(lb.pool.alive_count(), 0);

    // Everything is known dead now: fail fast without touching the network
    let res = client.get(lb.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let after: usize = counters.iter().map(|c| c.load(Ordering::SeqCst)).sum();
    assert_eq!(after, attempts);

    assert!(lb.pool.backends().iter().all(|b| b.in_flight() == 0));
}

#[tokio::test]
async fn refused_connections_are_unavailable() {
    let a = common::closed_port().await;
    let b = common::closed_port().await;
    let lb = common::spawn_balancer(common::config_for(&[a, b], Strategy::LeastConnections)).await;

    let res = common::client().get(lb.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "Service unavailable");
}

#[tokio::test]
async fn in_flight_drains_after_concurrent_requests() {
    let (dropping, _) = common::start_dropping_backend().await;
    let b = common::start_slow_backend(Duration::from_millis(20), "B").await;
    let c = common::start_slow_backend(Duration::from_millis(20), "C").await;

    for strategy in [Strategy::RoundRobin, Strategy::LeastConnections] {
        let lb = common::spawn_balancer(common::config_for(&[dropping, b, c], strategy)).await;
        let client = common::client();

        let requests = (0..30).map(|i| {
            let client = client.clone();
            let url = lb.url(&format!("/item/{}", i));
            async move {
                let res = client.get(url).send().await?;
                let status = res.status();
                res.bytes().await?;
                Ok::<_, reqwest::Error>(status)
            }
        });
        let statuses = join_all(requests).await;

        for status in statuses {
            assert_eq!(status.unwrap(), StatusCode::OK);
        }

        common::wait_for_drain(&lb.pool).await;
        let stats = lb.pool.snapshot();
        assert!(stats.iter().all(|s| s.in_flight == 0), "{:?}", stats);
        assert_eq!(stats.iter().map(|s| s.completed).sum::<u64>(), 30);
        assert_eq!(stats[0].completed, 0);
        assert!(!stats[0].alive);
    }
}

#[tokio::test]
async fn caller_deadline_releases_in_flight() {
    let slow = common::start_slow_backend(Duration::from_secs(3), "slow").await;
    let mut config = common::config_for(&[slow], Strategy::RoundRobin);
    config.timeouts.request_secs = 1;
    let lb = common::spawn_balancer(config).await;

    let res = common::client().get(lb.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);

    common::wait_for_drain(&lb.pool).await;
    let backend = &lb.pool.backends()[0];
    assert_eq!(backend.in_flight(), 0);
    // Cancellation is neither a failure nor a success
    assert!(backend.is_alive());
    assert_eq!(backend.snapshot().completed, 0);
}

#[tokio::test]
async fn probe_cycle_removes_and_restores_backends() {
    let a = common::start_echo_backend("A").await;
    let dead = common::closed_port().await;
    let mut config = common::config_for(&[a, dead], Strategy::RoundRobin);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 2;
    config.health_check.timeout_secs = 1;
    let lb = common::spawn_balancer(config).await;

    // the first cycle runs right away
    for _ in 0..50 {
        if !lb.pool.backends()[1].is_alive() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!lb.pool.backends()[1].is_alive());

    let client = common::client();
    for _ in 0..4 {
        let res = client.get(lb.url("/")).send().await.unwrap();
        let json: Value = res.json().await.unwrap();
        assert_eq!(json["server_name"], "A");
    }

    // A backend marked dead by the dispatcher comes back on the next cycle
    lb.pool.backends()[0].set_alive(false);
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(lb.pool.backends()[0].is_alive());
}
