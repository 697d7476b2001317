//! Accelerated engine backend.
//!
//! Modelled on vendor primitive libraries: memories carry a [`MemoryDesc`],
//! work is planned through primitive descriptors and executed by submitting
//! primitives to a [`Stream`] on an [`Engine`]. Primitives run on a rayon
//! thread pool owned by the engine.

pub mod engine;
pub mod logistic;
pub mod logistic_loss;
pub mod memory;
pub mod ops;
pub mod reduction;
pub mod sum;

pub use engine::{is_available, Engine, Primitive, Stream};
pub use memory::{MdArray, MemoryDesc};
pub use ops::AccelBackend;
