//! # batchmat-core
//!
//! Data model for the batchmat batched matrix-multiplication engine.
//!
//! Provides:
//! - `DType` and the `Element` trait (f16, f32, f64, i32, complex64, complex128)
//!   with compile-time real/complex kind tags
//! - `Shape` with batch/matrix splitting helpers
//! - Arc-shared, copy-on-write `Storage` on CPU or CUDA
//! - Contiguous row-major `Tensor`
//! - `BatchMatError`, classified into invalid-argument / internal / unimplemented

pub mod dtype;
pub mod device;
pub mod element;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

pub use device::{Device, DeviceKind};
pub use dtype::DType;
pub use element::{Complex32, Complex64, ComplexKind, Element, HostBuffer, RealKind, ScalarKind};
pub use error::{BatchMatError, ErrorKind};
pub use shape::Shape;
pub use storage::Storage;
pub use tensor::Tensor;

pub use half::f16;

pub type Result<T> = std::result::Result<T, BatchMatError>;
