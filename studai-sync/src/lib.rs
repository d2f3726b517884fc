//! StudAI sync library
//!
//! Offline-capable note layer: a local cache, a replay queue of unconfirmed
//! mutations, and a coordinator that reconciles both with the note backend
//! when connectivity allows.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod remote;
pub mod services;
pub mod storage;
