//! Contract Test: Quota Guard
//!
//! This test verifies that an oversized candidate set is rejected before
//! the engine talks to the gateway at all.
//!
//! Constraints verified:
//! - Above the limit: an error and zero gateway calls, reads included
//! - At the limit: the run proceeds
//!
//! If this test fails, an oversized blocklist can half-deploy.

mod common;

use common::*;
use gwsync_core::Error;
use gwsync_core::config::{DEFAULT_MAX_TOTAL_DOMAINS, EngineConfig};

fn limited(gateway: &RecordingGateway, max_total_domains: usize) -> gwsync_core::SyncEngine {
    engine_with(
        gateway,
        EngineConfig {
            max_list_size: 4,
            max_total_domains,
            ..EngineConfig::default()
        },
    )
}

#[tokio::test]
async fn one_over_the_limit_makes_no_calls() {
    let gateway = RecordingGateway::new();

    let result = limited(&gateway, 10).reconcile(&domains(0..11)).await;

    assert!(matches!(
        result,
        Err(Error::QuotaExceeded { count: 11, limit: 10 })
    ));
    assert!(gateway.calls().is_empty(), "calls made: {:?}", gateway.calls());
}

#[tokio::test]
async fn exactly_the_limit_is_deployed() {
    let gateway = RecordingGateway::new();

    let report = limited(&gateway, 10).reconcile(&domains(0..10)).await.unwrap();

    assert_eq!(report.lists_created(), 3);
    assert_eq!(gateway.memory.domain_count().await, 10);
}

#[tokio::test]
async fn quota_failure_leaves_existing_deployment_untouched() {
    let gateway = RecordingGateway::new();
    limited(&gateway, 10).reconcile(&domains(0..8)).await.unwrap();
    gateway.reset_calls();

    let result = limited(&gateway, 10).reconcile(&domains(0..50)).await;

    assert!(result.is_err());
    assert!(gateway.calls().is_empty());
    assert_eq!(gateway.memory.domain_count().await, 8);
}

#[tokio::test]
async fn production_limit_is_enforced() {
    let gateway = RecordingGateway::new();

    let result = engine(&gateway)
        .reconcile(&domains(0..DEFAULT_MAX_TOTAL_DOMAINS + 1))
        .await;

    match result {
        Err(Error::QuotaExceeded { count, limit }) => {
            assert_eq!(count, 300_001);
            assert_eq!(limit, 300_000);
        }
        other => panic!("expected quota error, got {:?}", other.map(|r| r.mode)),
    }
    assert!(gateway.calls().is_empty());
}
