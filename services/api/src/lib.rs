//! services/api/src/lib.rs
//!
//! The StudyFlow HTTP service: adapters for the core ports, configuration,
//! error mapping, and the axum router.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
