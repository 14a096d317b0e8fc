//! HTTP handlers for the Cosmetic Formulary API

pub mod formula;
pub mod health;
pub mod report;

pub use formula::*;
pub use health::*;
pub use report::*;
