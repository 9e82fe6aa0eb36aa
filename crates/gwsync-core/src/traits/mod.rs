//! Core traits for gwsync
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DomainSource`]: Produce the candidate set of domains
//! - [`GatewayClient`]: Read and write remote lists and rules

pub mod domain_source;
pub mod gateway;

pub use domain_source::{
    normalize_domain, DomainSet, DomainSource, DomainSourceFactory, StaticDomainSource,
};
pub use gateway::{GatewayClient, GatewayFactory, RemoteList, RemoteRule};
