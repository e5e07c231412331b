//! staleguard: a stale-while-revalidate cache in front of a slow SQL endpoint.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
