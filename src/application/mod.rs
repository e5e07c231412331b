//! Application services: report planning and error mapping.

pub mod error;
pub mod reports;
