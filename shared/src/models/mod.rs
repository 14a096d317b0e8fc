//! Domain models for the Cosmetic Formulary

mod formula;
mod ingredient;
mod notes;
mod phase;

pub use formula::*;
pub use ingredient::*;
pub use notes::*;
pub use phase::*;
