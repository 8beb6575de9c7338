//! Floodgate - Tiered Rate Limiting Engine
//!
//! This crate implements a single-process, in-memory rate limiting engine:
//! per authenticated caller and API endpoint, it decides whether a request
//! may proceed under tiered fixed-window quotas. Counters are sharded per
//! key, idle entries are swept in the background so memory stays bounded,
//! and a degraded store fails open rather than taking the API down.

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
