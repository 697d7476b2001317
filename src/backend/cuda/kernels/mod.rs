//! PTX for the function kernels, compiled from `functions.cu` by `build.rs`.

pub const FUNCTIONS_PTX: &str = include_str!(concat!(env!("OUT_DIR"), "/functions.ptx"));

/// Every kernel `functions.cu` must export.
pub const FUNCTION_KERNELS: &[&str] = &[
    "sigmoid_kernel",
    "sigmoid_backward_kernel",
    "sigmoid_cross_entropy_fwd_kernel",
    "sigmoid_cross_entropy_bwd_kernel",
    "sum_reduction_f32_kernel",
    "sum_reduction_i32_kernel",
    "fill_scalar_kernel",
];
