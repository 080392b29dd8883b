//! Environment-driven configuration for a probe run

pub mod endpoints;

pub use endpoints::{Credentials, Service, ServiceEndpoints, Topology};
