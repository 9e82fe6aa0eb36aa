//! Partitioning of the candidate set into list-sized chunks
//!
//! Chunks are cut from the sorted candidate set, so the same input always
//! maps the same domains to the same 1-based indices. Diffing against
//! remote lists absorbs whatever shifts a changed input causes.

use crate::error::{Error, Result};
use crate::traits::DomainSet;

/// One list-sized slice of the candidate set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position, used to name the backing list
    pub index: usize,
    /// Domains in this chunk
    pub domains: DomainSet,
}

impl Chunk {
    /// Number of domains in the chunk
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Whether the chunk is empty (never true for chunks from [`chunk_domains`])
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Split `domains` into chunks of at most `max_size`
///
/// Every chunk but the last holds exactly `max_size` domains. An empty set
/// yields no chunks.
pub fn chunk_domains(domains: &DomainSet, max_size: usize) -> Result<Vec<Chunk>> {
    if max_size == 0 {
        return Err(Error::config("Chunk size must be > 0"));
    }

    let ordered: Vec<&String> = domains.iter().collect();

    Ok(ordered
        .chunks(max_size)
        .enumerate()
        .map(|(i, slice)| Chunk {
            index: i + 1,
            domains: slice.iter().map(|d| (*d).clone()).collect(),
        })
        .collect())
}
