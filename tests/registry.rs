mod common;

use common::ScriptedAdapter;
use dms_gateway::adapters::{Capability, MemoryAdapter};
use dms_gateway::registry::{Registry, RegistryConfig, RegistryError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_registry(interval_ms: u64, timeout_ms: u64) -> Registry {
    Registry::new(RegistryConfig {
        health_check_interval: Duration::from_millis(interval_ms),
        health_check_timeout: Duration::from_millis(timeout_ms),
    })
}

#[tokio::test]
async fn health_loop_reports_recovery_once() {
    let registry = fast_registry(20, 100);
    let adapter = Arc::new(MemoryAdapter::new("argo"));
    adapter.set_available(false);
    registry
        .register("argo", "memory", adapter.clone(), HashMap::new(), true)
        .await
        .unwrap();
    assert!(!registry.get_metadata("argo").await.unwrap().healthy);

    let mut events = registry.subscribe_health();
    registry.start_health_checks().await;
    adapter.set_available(true);

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("recovery observed")
        .unwrap();
    assert_eq!(event.name, "argo");
    assert!(event.healthy);
    assert!(event.error.is_none());

    // Several more ticks with no change.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(events.try_recv().is_err());
    assert!(registry.get_metadata("argo").await.unwrap().healthy);
    assert_eq!(registry.list_healthy().await.len(), 1);

    registry.close().await.unwrap();
}

#[tokio::test]
async fn hung_health_check_times_out_without_blocking_lookups() {
    let registry = fast_registry(20, 150);
    let stuck = Arc::new(ScriptedAdapter::new("stuck"));
    registry
        .register("stuck", "scripted", stuck.clone(), HashMap::new(), false)
        .await
        .unwrap();
    stuck.set_hang(true);
    registry.start_health_checks().await;

    // Let a tick start and hang on the probe.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    registry
        .register(
            "other",
            "memory",
            Arc::new(MemoryAdapter::new("other")),
            HashMap::new(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(registry.list().await.len(), 2);
    assert!(started.elapsed() < Duration::from_millis(140));

    let mut events = registry.subscribe_health();
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timeout recorded")
        .unwrap();
    assert_eq!(event.name, "stuck");
    assert!(!event.healthy);
    assert!(event.error.unwrap().contains("timed out"));
    assert!(registry.get_metadata("other").await.unwrap().healthy);

    registry.close().await.unwrap();
    assert_eq!(stuck.close_calls(), 1);
}

#[tokio::test]
async fn stop_waits_for_loop_and_is_idempotent() {
    let registry = fast_registry(10, 50);
    let adapter = Arc::new(ScriptedAdapter::new("a"));
    registry
        .register("a", "scripted", adapter.clone(), HashMap::new(), false)
        .await
        .unwrap();

    registry.start_health_checks().await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    registry.stop_health_checks().await;
    registry.stop_health_checks().await;

    let calls = adapter.health_calls();
    assert!(calls >= 2, "expected periodic probes, saw {}", calls);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(adapter.health_calls(), calls);

    // The loop can be started again after a stop.
    registry.start_health_checks().await;
    assert!(registry.is_health_loop_running().await);
    registry.close().await.unwrap();
}

#[tokio::test]
async fn close_attempts_every_adapter_and_returns_last_error() {
    let registry = Registry::default();
    let first = Arc::new(ScriptedAdapter::failing_close("a-first"));
    let healthy = Arc::new(ScriptedAdapter::new("b-healthy"));
    let last = Arc::new(ScriptedAdapter::failing_close("c-last"));
    for adapter in [first.clone(), healthy.clone(), last.clone()] {
        let name = dms_gateway::adapters::AdapterMetadata::name(adapter.as_ref()).to_string();
        registry
            .register(&name, "scripted", adapter, HashMap::new(), false)
            .await
            .unwrap();
    }

    let err = registry.close().await.unwrap_err();
    match err {
        RegistryError::Close { name, .. } => assert_eq!(name, "c-last"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(first.close_calls(), 1);
    assert_eq!(healthy.close_calls(), 1);
    assert_eq!(last.close_calls(), 1);
    assert!(registry.list().await.is_empty());
    assert!(registry.list_metadata().await.is_empty());
}

#[tokio::test]
async fn unregister_survives_close_failure() {
    let registry = Registry::default();
    let adapter = Arc::new(ScriptedAdapter::failing_close("broken"));
    registry
        .register("broken", "scripted", adapter.clone(), HashMap::new(), true)
        .await
        .unwrap();

    registry.unregister("broken").await.unwrap();
    assert_eq!(adapter.close_calls(), 1);
    assert!(registry.get_default_name().await.is_none());
}

#[tokio::test]
async fn concurrent_registrations_of_one_name_admit_exactly_one() {
    let registry = Arc::new(Registry::default());
    let mut tasks = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry
                .register(
                    "shared",
                    &format!("kind-{}", i),
                    Arc::new(MemoryAdapter::new("shared")),
                    HashMap::new(),
                    false,
                )
                .await
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(RegistryError::AlreadyRegistered(name)) => assert_eq!(name, "shared"),
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(registry.list().await.len(), 1);
}

#[tokio::test]
async fn capability_lookup_tracks_health() {
    let registry = Registry::default();
    let rollback = Arc::new(MemoryAdapter::new("helm"));
    let gitops = Arc::new(MemoryAdapter::with_capabilities(
        "flux",
        vec![Capability::GitOps, Capability::HealthChecks],
    ));
    registry
        .register("helm", "memory", rollback.clone(), HashMap::new(), false)
        .await
        .unwrap();
    registry
        .register("flux", "memory", gitops, HashMap::new(), false)
        .await
        .unwrap();

    assert_eq!(registry.find_by_capability(Capability::GitOps).await.len(), 1);
    assert_eq!(registry.find_by_capability(Capability::Rollback).await.len(), 1);

    rollback.set_available(false);
    let transitions = registry.run_health_checks().await;
    assert_eq!(transitions.len(), 1);
    assert!(registry.find_by_capability(Capability::Rollback).await.is_empty());
    // Type lookup ignores health.
    assert_eq!(registry.find_by_type("memory").await.len(), 2);
}
