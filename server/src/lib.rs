//! Zero-knowledge encrypted blob vault server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod routes;
pub mod state;
pub mod storage;
pub mod vault;
