use std::fmt;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use crate::array::Array;
use crate::backend::accel::MdArray;
#[cfg(feature = "cuda")]
use crate::backend::cuda::DeviceArray;
use crate::error::Error;

/// Element type of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum DType {
    F32,
    I32,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "float32"),
            DType::I32 => write!(f, "int32"),
        }
    }
}

/// Which subsystem owns a buffer's memory.
///
/// `Device` is always representable, even when the crate is built without
/// CUDA, so backend selection can reason about foreign buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum StorageDomain {
    Host,
    Device,
    Accelerated,
}

impl fmt::Display for StorageDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageDomain::Host => write!(f, "host"),
            StorageDomain::Device => write!(f, "device"),
            StorageDomain::Accelerated => write!(f, "accelerated"),
        }
    }
}

/// A tensor buffer in one of the supported storage domains.
#[derive(Clone, Debug)]
pub enum Buffer {
    Host(Array),
    #[cfg(feature = "cuda")]
    Device(DeviceArray),
    Accelerated(MdArray),
}

impl Buffer {
    pub fn domain(&self) -> StorageDomain {
        match self {
            Buffer::Host(_) => StorageDomain::Host,
            #[cfg(feature = "cuda")]
            Buffer::Device(_) => StorageDomain::Device,
            Buffer::Accelerated(_) => StorageDomain::Accelerated,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Buffer::Host(a) => a.dtype(),
            #[cfg(feature = "cuda")]
            Buffer::Device(d) => d.dtype(),
            Buffer::Accelerated(m) => m.dtype(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Buffer::Host(a) => a.shape(),
            #[cfg(feature = "cuda")]
            Buffer::Device(d) => d.shape(),
            Buffer::Accelerated(m) => m.shape(),
        }
    }

    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn as_host(&self) -> Option<&Array> {
        match self {
            Buffer::Host(a) => Some(a),
            _ => None,
        }
    }

    #[cfg(feature = "cuda")]
    pub fn as_device(&self) -> Option<&DeviceArray> {
        match self {
            Buffer::Device(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_accelerated(&self) -> Option<&MdArray> {
        match self {
            Buffer::Accelerated(m) => Some(m),
            _ => None,
        }
    }

    /// Copies the buffer into host memory, whatever its domain.
    pub fn to_host(&self) -> Result<Array, Error> {
        match self {
            Buffer::Host(a) => Ok(a.clone()),
            #[cfg(feature = "cuda")]
            Buffer::Device(d) => d.to_host(),
            Buffer::Accelerated(m) => m.to_host(),
        }
    }

    pub fn to_vec_f32(&self) -> Result<Vec<f32>, Error> {
        Ok(self.to_host()?.to_vec_f32())
    }
}

impl From<Array> for Buffer {
    fn from(array: Array) -> Self {
        Buffer::Host(array)
    }
}

impl From<MdArray> for Buffer {
    fn from(memory: MdArray) -> Self {
        Buffer::Accelerated(memory)
    }
}

#[cfg(feature = "cuda")]
impl From<DeviceArray> for Buffer {
    fn from(device: DeviceArray) -> Self {
        Buffer::Device(device)
    }
}
