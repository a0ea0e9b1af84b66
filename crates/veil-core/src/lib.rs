//! Veil Core - Session protocol, closed-group polling and push registration.
//!
//! This crate implements:
//! - Identity persistence and migration
//! - The session protocol engine bound to the local key stores
//! - The closed-group swarm poller
//! - The push-notification relay registration client
//! - Client configuration

#![forbid(unsafe_code)]

// Services
pub mod session;
pub mod poller;
pub mod push;
pub mod retry;

// Infrastructure
pub mod store;
pub mod keys;
pub mod network;
pub mod config;

// Supporting modules
pub mod errors;
pub mod types;
pub mod harness;

// Optional transport implementations
#[cfg(feature = "http-relay")]
pub mod http_relay;

#[cfg(test)]
mod proptests;
