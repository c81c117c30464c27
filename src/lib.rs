//! Feature flag distribution service.
//!
//! Operators manage applications, flags and tags through `/api/v1`; client
//! SDKs read the enabled flags of one application through
//! `/sdk/{access_key}/flags`, served from an in-memory distribution cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
