//! Kanto signaling server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod config;
pub mod lobby;
pub mod routes;
pub mod signaling;
pub mod state;
pub mod turn;
pub mod ws;
