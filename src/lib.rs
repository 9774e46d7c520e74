//! Solar panel energy monitor.
//!
//! Polls a panel gateway that sleeps overnight, integrates per-panel power into
//! cumulative energy with day and month deltas that survive restarts, and serves
//! the result over HTTP.

pub mod api;
pub mod clock;
pub mod config;
pub mod controller;
pub mod domain;
pub mod energy;
pub mod hardware;
pub mod repo;
pub mod telemetry;
