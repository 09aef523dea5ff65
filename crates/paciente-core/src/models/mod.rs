//! Domain models for patient intake.

mod draft;
mod patient;

pub use draft::*;
pub use patient::*;
