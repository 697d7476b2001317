mod context;
pub(crate) mod kernels;
mod ops;
mod storage;

pub use context::{get_global_context, init_context, CudaContextGuard};
pub use ops::CudaBackend;
pub use storage::{CudaStorage, DeviceArray};
