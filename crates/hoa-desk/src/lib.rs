//! Building and homeowners-association management backend.
//!
//! The crate is organised the way requests flow through it: [`http`] routers
//! authorize and shape JSON, [`services`] validate and run every mutation in a
//! [`store::Store`] transaction, and [`domain`] holds the persisted records.

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod http;
pub mod money;
pub mod services;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod templating;
pub mod validation;

pub use money::Money;
pub use validation::ValidationErrors;
