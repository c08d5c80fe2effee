//! Playback synchronization relay.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod clock;
pub mod config;
pub mod gateway;
pub mod proto;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod ws;
