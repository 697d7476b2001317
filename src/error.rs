#[cfg(feature = "cuda")]
use cust;
use std::io;
use thiserror::Error;

use crate::buffer::{DType, StorageDomain};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape error: {0}")]
    ShapeError(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Incompatible shapes for operation {op}: {shape_a:?} and {shape_b:?}")]
    IncompatibleShapes {
        op: String,
        shape_a: Vec<usize>,
        shape_b: Vec<usize>,
    },

    #[error("{function} expects {expected} input(s), got {actual}")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("Element type mismatch for {op}: expected {expected}, got {actual}")]
    DTypeMismatch {
        op: String,
        expected: DType,
        actual: DType,
    },

    #[error("Buffer in {domain} memory cannot be used here: {reason}")]
    UnsupportedDomain {
        domain: StorageDomain,
        reason: String,
    },

    #[error("Operation cannot be performed on empty tensor")]
    EmptyTensor,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid function state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    CudaError(String),

    #[cfg(feature = "cuda")]
    #[error("CUDA cuBLAS error: {0}")]
    CublasError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[cfg(feature = "serialization")]
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal logic error: {0}")]
    InternalLogicError(String),

    #[error("Gradient check error: analytical={analytical:?}, numerical={numerical:?}, max_rel_error={max_rel_error}, max_abs_error={max_abs_error}, at_index={at_index}")]
    GradientCheckError {
        analytical: Vec<f32>,
        numerical: Vec<f32>,
        max_rel_error: f32,
        max_abs_error: f32,
        at_index: usize,
    },
}

#[cfg(feature = "cuda")]
impl From<cust::error::CudaError> for Error {
    fn from(err: cust::error::CudaError) -> Self {
        Error::CudaError(err.to_string())
    }
}

#[cfg(feature = "serialization")]
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
