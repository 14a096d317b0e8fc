//! Shared types and models for the Cosmetic Formulary
//!
//! This crate contains the formula data model and the pure balancing logic
//! shared between the backend, the browser editor (via WASM), and other
//! components of the system.

pub mod balancer;
pub mod compare;
pub mod models;
pub mod report;
pub mod types;
pub mod validation;

pub use balancer::*;
pub use compare::*;
pub use models::*;
pub use report::*;
pub use types::*;
pub use validation::*;
