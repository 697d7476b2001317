//! Backend trait definition, backend selection and module structure.

use std::borrow::Cow;
use std::fmt::{self, Debug};

use crate::buffer::{Buffer, DType, StorageDomain};
use crate::config::{AccelPreference, Config};
use crate::error::Error;

pub mod accel;
pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;
pub(crate) mod numeric;

/// The execution path a function runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Host reference kernels.
    Host,
    /// Vendor-style engine with descriptor/stream execution.
    Accelerated,
    /// CUDA kernels.
    #[cfg(feature = "cuda")]
    Device,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Host => write!(f, "host"),
            BackendKind::Accelerated => write!(f, "accelerated"),
            #[cfg(feature = "cuda")]
            BackendKind::Device => write!(f, "device"),
        }
    }
}

/// Kernel set shared by every execution path.
///
/// Kernels only ever see storage of their own backend; moving buffers between
/// domains happens in [`Backend::import`] and [`Backend::export`].
pub trait Backend: Sized + Debug {
    const KIND: BackendKind;

    type Storage: Clone + Debug;

    /// Brings a buffer into this backend's storage, borrowing when it already lives here.
    fn import(buffer: &Buffer) -> Result<Cow<'_, Self::Storage>, Error>;

    /// Wraps backend storage back into a [`Buffer`].
    fn export(storage: Self::Storage) -> Buffer;

    /// Elementwise logistic function.
    fn sigmoid(x: &Self::Storage) -> Result<Self::Storage, Error>;

    /// `grad_output * y * (1 - y)` where `y` is the sigmoid output.
    fn sigmoid_backward(
        y: &Self::Storage,
        grad_output: &Self::Storage,
    ) -> Result<Self::Storage, Error>;

    /// Mean over the leading axis of the stable binary cross-entropy.
    ///
    /// Returns the 0-d loss and `sigmoid(x)` for the backward pass.
    fn sigmoid_cross_entropy(
        x: &Self::Storage,
        t: &Self::Storage,
    ) -> Result<(Self::Storage, Self::Storage), Error>;

    /// `(grad_loss / batch) * (y - t)`.
    fn sigmoid_cross_entropy_backward(
        y: &Self::Storage,
        t: &Self::Storage,
        grad_loss: &Self::Storage,
    ) -> Result<Self::Storage, Error>;

    /// Sum of every element, as a 0-d storage of the input's element type.
    fn sum_all(x: &Self::Storage) -> Result<Self::Storage, Error>;

    /// Broadcasts a scalar gradient to `input_shape`.
    fn sum_backward(
        grad_output: &Self::Storage,
        input_shape: &[usize],
    ) -> Result<Self::Storage, Error>;

    /// `sum_i scales[i] * xs[i]`, accumulated left to right.
    fn weighted_sum(xs: &[&Self::Storage], scales: &[f32]) -> Result<Self::Storage, Error>;
}

/// Runs `$body` with `$B` bound to the backend type selected by `$kind`.
#[macro_export]
macro_rules! with_backend {
    ($kind:expr, $B:ident => $body:expr) => {
        match $kind {
            $crate::backend::BackendKind::Host => {
                type $B = $crate::backend::cpu::CpuBackend;
                $body
            }
            $crate::backend::BackendKind::Accelerated => {
                type $B = $crate::backend::accel::AccelBackend;
                $body
            }
            #[cfg(feature = "cuda")]
            $crate::backend::BackendKind::Device => {
                type $B = $crate::backend::cuda::CudaBackend;
                $body
            }
        }
    };
}

/// True when every domain can be wrapped as accelerated memory.
pub fn supports_accelerated_domains(domains: &[StorageDomain]) -> bool {
    domains
        .iter()
        .all(|d| matches!(d, StorageDomain::Host | StorageDomain::Accelerated))
}

/// Whether the preference allows the engine for inputs with these domains and
/// this many elements in total.
pub fn accel_enabled(config: &Config, domains: &[StorageDomain], total_elements: usize) -> bool {
    match config.accel {
        AccelPreference::Always => true,
        AccelPreference::Never => false,
        AccelPreference::Auto => {
            accel::is_available()
                && (domains.contains(&StorageDomain::Accelerated)
                    || total_elements >= config.accel_min_elements)
        }
    }
}

/// Decides engine use from domain tags and element count.
pub fn probe_domains(config: &Config, domains: &[StorageDomain], total_elements: usize) -> bool {
    accel_enabled(config, domains, total_elements) && supports_accelerated_domains(domains)
}

/// True iff the accelerated engine may run a function on `inputs`.
pub fn can_use_accelerated(inputs: &[Buffer], config: &Config) -> bool {
    let domains: Vec<StorageDomain> = inputs.iter().map(Buffer::domain).collect();
    let total = inputs.iter().map(Buffer::size).sum();
    probe_domains(config, &domains, total)
}

/// Picks the execution path for a forward call.
///
/// All-device inputs stay on the device. Otherwise `probe_domains` decides between the
/// engine and the host; a forced engine that cannot take the inputs is an error.
pub fn select_backend(inputs: &[Buffer], config: &Config) -> Result<BackendKind, Error> {
    #[cfg(feature = "cuda")]
    if !inputs.is_empty() && inputs.iter().all(|b| b.domain() == StorageDomain::Device) {
        crate::debug_println!("select_backend: all inputs on device");
        return Ok(BackendKind::Device);
    }

    if can_use_accelerated(inputs, config) {
        crate::debug_println!("select_backend: accelerated ({} inputs)", inputs.len());
        return Ok(BackendKind::Accelerated);
    }

    if config.accel == AccelPreference::Always {
        let domains: Vec<StorageDomain> = inputs.iter().map(Buffer::domain).collect();
        return Err(Error::BackendUnavailable(format!(
            "accelerated engine forced on but cannot take inputs in domains {:?}",
            domains
        )));
    }

    crate::debug_println!("select_backend: host");
    Ok(BackendKind::Host)
}

/// Argument checks shared by every weighted-sum kernel.
pub(crate) fn check_weighted_sum_args(
    shapes: &[&[usize]],
    dtypes: &[DType],
    num_scales: usize,
) -> Result<(), Error> {
    let first = shapes.first().ok_or_else(|| {
        Error::InvalidOperation("weighted_sum requires at least one input".to_string())
    })?;
    if num_scales != shapes.len() {
        return Err(Error::InvalidOperation(format!(
            "weighted_sum got {} scales for {} inputs",
            num_scales,
            shapes.len()
        )));
    }
    for shape in &shapes[1..] {
        if shape != first {
            return Err(Error::IncompatibleShapes {
                op: "weighted_sum".to_string(),
                shape_a: first.to_vec(),
                shape_b: shape.to_vec(),
            });
        }
    }
    if let Some(&dtype) = dtypes.iter().find(|&&d| d != DType::F32) {
        return Err(crate::array::dtype_err("weighted_sum", DType::F32, dtype));
    }
    Ok(())
}

/// Batch size (length of the leading axis) for a loss input.
pub(crate) fn batch_size(op: &str, shape: &[usize]) -> Result<usize, Error> {
    match shape.first() {
        None => Err(Error::ShapeError(format!(
            "{} requires at least one dimension, got a 0-d input",
            op
        ))),
        Some(0) => Err(Error::EmptyTensor),
        Some(&n) => Ok(n),
    }
}

pub(crate) fn check_same_shape(op: &str, a: &[usize], b: &[usize]) -> Result<(), Error> {
    if a != b {
        return Err(Error::IncompatibleShapes {
            op: op.to_string(),
            shape_a: a.to_vec(),
            shape_b: b.to_vec(),
        });
    }
    Ok(())
}
