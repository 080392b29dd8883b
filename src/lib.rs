//! Test orchestration and authentication helpers for probing a running
//! multi-service stack.
//!
//! A run builds a [`ServiceEndpoints`] registry once, wraps it in a
//! [`ProbeContext`] owning the session, OIDC and token helpers, and executes
//! suites through a [`TestRunner`] that turns every test and statistical
//! trial into a recorded result.

pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod http;
pub mod identity;
pub mod oidc;
pub mod runner;
pub mod session;
pub mod suites;
pub mod tokens;

pub use config::{Service, ServiceEndpoints, Topology};
pub use context::ProbeContext;
pub use error::{ProbeError, Result, WithWarnings};
pub use identity::{EphemeralIdentity, IdentityHelper};
pub use oidc::{OidcClient, OidcHelper, OidcTokens};
pub use runner::{TestResult, TestRunner, TestSummary};
pub use session::{Session, SessionHelper};
pub use tokens::{AuthScheme, StoredCredential, TokenManager};
