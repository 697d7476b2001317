//! Differentiable functions with backend dispatch.
//!
//! Each function runs forward and backward on one of several backends:
//! - the host (`ndarray`) backend
//! - an accelerated backend built on a primitive/stream engine (feature `accel`)
//! - a CUDA device backend (feature `cuda`)
//!
//! Forward picks the backend per call from the input storage domains and the
//! [`Config`]; backward reuses the same backend.
//!
//! # Features
//! - `accel` (default) - Enables the accelerated backend
//! - `cuda` - Enables CUDA GPU support (requires CUDA toolkit)
//! - `serialization` - JSON config files and serde on [`Array`]
//! - `debug_logs` - Verbose dispatch logging
//!
//! # Example
//! ```rust
//! use rust_tensor_functions::{sigmoid_cross_entropy, Array, Buffer, Config};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let x = Array::from_vec(vec![0.5, -1.0, 2.0, 0.0], &[2, 2])?;
//!     let t = Array::from_labels(vec![1, 0, 1, 0], &[2, 2])?;
//!
//!     let node = sigmoid_cross_entropy(Buffer::from(x), Buffer::from(t), &Config::default())?;
//!     println!("loss = {:?}", node.output().to_vec_f32()?);
//!
//!     let grads = node.backward(&[Buffer::from(Array::scalar(1.0))])?;
//!     assert!(grads[1].is_none());
//!     Ok(())
//! }
//! ```

// --- Central debug_println macro definition ---
/// Conditional logging macro. Prints if 'debug_logs' feature is enabled.
#[cfg(feature = "debug_logs")]
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        ::std::println!("[DEBUG {}] {}", module_path!(), ::std::format_args!($($arg)*))
    };
}

/// Conditional logging macro (disabled version). Does nothing.
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {};
}

pub mod array;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod functions;
pub mod init;

pub mod test_utils;

pub use array::Array;
pub use backend::accel::AccelBackend;
pub use backend::cpu::CpuBackend;
#[cfg(feature = "cuda")]
pub use backend::cuda::CudaBackend;
pub use backend::{can_use_accelerated, select_backend, Backend, BackendKind};
pub use buffer::{Buffer, DType, StorageDomain};
pub use config::{AccelPreference, Config};
pub use error::Error;
pub use functions::{
    add_n, apply, sigmoid, sigmoid_cross_entropy, sum, weighted_sum, Function, GradientTuple,
    Node,
};
