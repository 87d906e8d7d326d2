//! relaybox - event outbox and delivery-tracking core.
//!
//! Turns a state change in a service of record into a durable,
//! reliably-delivered, tenant-routed message: events are recorded in a
//! relational outbox, published at-least-once to a topic exchange under
//! `{event_type}.{tenant}` routing keys, re-driven on administrative
//! trigger when stuck, and settled by idempotent consumer acknowledgments.
//! All cross-instance coordination happens through conditional updates in
//! the store; there is no shared in-process state.

pub mod bootstrap;
pub mod broker;
pub mod config;
pub mod facade;
pub mod model;
pub mod services;
pub mod storage;

pub use facade::Relaybox;
