//! Common library for the Campstead application
//!
//! This crate provides the infrastructure shared by Campstead services:
//! PostgreSQL connection pooling, the Redis cache used for session and
//! flash storage, and the error types for both.

pub mod cache;
pub mod database;
pub mod error;
