//! Cairn Store - in-memory repository back end
//!
//! This crate provides the versioned instance store and the lifecycle
//! coordinator implementing the `MetadataRepository` protocol in memory.

pub mod memory;
pub mod store;

pub use memory::InMemoryRepository;
pub use store::{InstanceStore, Retention, StoreSnapshot};
