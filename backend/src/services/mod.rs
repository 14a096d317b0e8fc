//! Business logic services for the Cosmetic Formulary

pub mod formula;
pub mod report;

pub use formula::FormulaService;
pub use report::ReportService;
