//! Minimal embedding example for gwsync-core
//!
//! Runs the engine against the in-memory gateway: a first deployment, a
//! no-op rerun, a shrink, and a teardown. Engine events are drained on a
//! separate task.

use gwsync_core::{
    DomainSet, EngineConfig, EngineEvent, MemoryGateway, Result, Scope, StaticDomainSource,
    SyncEngine,
};
use tracing::info;

fn blocklist(count: usize) -> StaticDomainSource {
    StaticDomainSource::new((0..count).map(|i| format!("ads{:04}.example.com", i)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let gateway = MemoryGateway::new();
    let scope = Scope::from_name("Embedded")?;
    let config = EngineConfig {
        max_list_size: 100,
        ..EngineConfig::default()
    };

    let (engine, mut events) = SyncEngine::new(Box::new(gateway.clone()), scope, config)?;

    let monitor = tokio::spawn(async move {
        let mut changes = 0usize;
        while let Some(event) = events.recv().await {
            if let EngineEvent::Finished { mode, mutations } = event {
                info!("[monitor] {} applied {} change(s)", mode, mutations);
                changes += mutations;
            }
        }
        changes
    });

    let report = engine.run(&blocklist(250)).await?;
    info!(
        "Deployed {} domains into {} lists",
        report.domain_count,
        gateway.list_count().await
    );

    let report = engine.run(&blocklist(250)).await?;
    info!("Rerun was a no-op: {}", report.is_noop());

    let shrunk: DomainSet = (0..120).map(|i| format!("ads{:04}.example.com", i)).collect();
    let report = engine.reconcile(&shrunk).await?;
    info!(
        "Shrink: {} updated, {} deleted, rule {}",
        report.lists_updated(),
        report.lists_deleted(),
        report.rule_action()
    );

    engine.teardown().await?;
    info!("Gateway empty after teardown: {}", gateway.is_empty().await);

    drop(engine);
    let total = monitor.await.map_err(|e| gwsync_core::Error::Other(e.to_string()))?;
    info!("Monitor saw {} change(s) in total", total);

    Ok(())
}
