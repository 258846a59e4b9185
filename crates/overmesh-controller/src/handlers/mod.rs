//! HTTP handlers

pub mod health;
pub mod leases;
pub mod metrics;
