//! Image classifier adapter for patient photos.
//!
//! This crate is the model boundary: it defines the pixel buffer handed to a
//! pretrained classifier, the traits a model implementation provides, and the
//! policy that turns raw model output into a single label or a sentinel.
//! With the `onnx` feature a model can be loaded from an ONNX file.

pub mod buffer;
pub mod extraction;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use buffer::*;
pub use extraction::*;
pub use model::*;
#[cfg(feature = "onnx")]
pub use onnx::*;
