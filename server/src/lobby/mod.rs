//! Lobby coordination: the player/room directory and the policy layer
//! (join/leave lifecycle plus broadcast fan-out) built on top of it.

pub mod directory;
pub mod service;
