//! Optimistic task-feed synchronization engine.

pub mod config;
pub mod feed;
pub mod mutation;
pub mod observer;
pub mod policy;
pub mod registry;
pub mod transport;
