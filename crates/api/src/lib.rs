//! HTTP client for the channel availability endpoint.
//!
//! `ping` defines the client trait, outcome types and a mock; `http` is the
//! reqwest-backed implementation.

pub mod http;
pub mod ping;
