//! Core primitives shared by every pipeline operation.
//!
//! Pure domain rules (the state machine and score aggregation) sit next to
//! the storage plumbing (store, broker, schemas) and the injected
//! collaborators (clock, audit sink, configuration).

pub mod audit;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod schemas;
pub mod scoring;
pub mod state_machine;
pub mod store;
pub mod time;
