pub mod config;
pub mod constants;
pub mod error;
pub mod identifiers;
pub mod normalize;
pub mod vocabulary;

// Domain data shapes shared across layers
pub mod domain;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub mod observability;

pub use error::{FeedbackError, Result};
