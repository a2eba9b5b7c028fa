//! Shared types and utilities for the compliance platform
//!
//! This crate contains the database pool helpers and error types shared
//! across the `compliance`, `api`, and `worker` crates.

pub mod db;

pub use db::*;
