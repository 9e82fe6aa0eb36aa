// # gwsync-core
//
// Core library for reconciling a domain blocklist into DNS gateway lists.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping a gateway in
// line with a blocklist:
// - **DomainSource**: Trait for producing the candidate domain set
// - **GatewayClient**: Trait for reading and writing remote lists and rules
// - **SyncEngine**: Core engine that runs quota check → chunk → diff → apply
// - **Registry**: Plugin-based registry for gateways and sources
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Planning is pure, I/O lives behind traits
// 2. **Convergent**: Every run re-reads remote state, so a failed run is
//    repaired by the next one
// 3. **Plugin-Based**: Gateways and sources are registered dynamically
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: A second run over unchanged input issues no writes

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod chunk;
pub mod diff;
pub mod plan;
pub mod gateway;

// Re-export core types for convenience
pub use traits::{
    DomainSet, DomainSource, GatewayClient, RemoteList, RemoteRule, StaticDomainSource,
};
pub use engine::{EngineEvent, RunMode, RunReport, SyncEngine};
pub use registry::Registry;
pub use config::{EngineConfig, GatewayConfig, Scope, ScopeConfig, SourceConfig, SyncConfig};
pub use error::{Error, Result};
pub use gateway::MemoryGateway;
pub use plan::Operation;
