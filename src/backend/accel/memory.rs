//! Managed memory for the accelerated engine.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ndarray::{ArrayD, IxDyn};

use crate::array::{dtype_err, Array};
use crate::buffer::DType;
use crate::error::Error;

/// Logical layout of an accelerated memory: dense row-major `dims` of `dtype`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDesc {
    dims: Vec<usize>,
    dtype: DType,
}

impl MemoryDesc {
    pub fn new(dims: &[usize], dtype: DType) -> Self {
        MemoryDesc {
            dims: dims.to_vec(),
            dtype,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn size_bytes(&self) -> usize {
        let element = match self.dtype {
            DType::F32 => std::mem::size_of::<f32>(),
            DType::I32 => std::mem::size_of::<i32>(),
        };
        self.num_elements() * element
    }
}

pub(crate) enum MemoryData {
    F32(Vec<f32>),
    S32(Vec<i32>),
}

impl MemoryData {
    fn dtype(&self) -> DType {
        match self {
            MemoryData::F32(_) => DType::F32,
            MemoryData::S32(_) => DType::I32,
        }
    }

    pub(crate) fn as_f32(&self) -> Result<&[f32], Error> {
        match self {
            MemoryData::F32(v) => Ok(v),
            other => Err(dtype_err("accelerated memory", DType::F32, other.dtype())),
        }
    }

    pub(crate) fn as_f32_mut(&mut self) -> Result<&mut [f32], Error> {
        match self {
            MemoryData::F32(v) => Ok(v),
            other => Err(dtype_err("accelerated memory", DType::F32, other.dtype())),
        }
    }

    pub(crate) fn as_s32(&self) -> Result<&[i32], Error> {
        match self {
            MemoryData::S32(v) => Ok(v),
            other => Err(dtype_err("accelerated memory", DType::I32, other.dtype())),
        }
    }

    pub(crate) fn as_s32_mut(&mut self) -> Result<&mut [i32], Error> {
        match self {
            MemoryData::S32(v) => Ok(v),
            other => Err(dtype_err("accelerated memory", DType::I32, other.dtype())),
        }
    }
}

/// An n-dimensional array living in engine-managed memory.
///
/// Cloning shares the underlying memory. Primitives only write to
/// destinations allocated for them, so shared sources are never mutated.
#[derive(Clone)]
pub struct MdArray {
    desc: MemoryDesc,
    data: Arc<RwLock<MemoryData>>,
}

impl MdArray {
    /// Allocates zero-filled memory for `desc`.
    pub fn new(desc: MemoryDesc) -> Self {
        let n = desc.num_elements();
        let data = match desc.dtype() {
            DType::F32 => MemoryData::F32(vec![0.0; n]),
            DType::I32 => MemoryData::S32(vec![0; n]),
        };
        MdArray {
            desc,
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Copies a host array into managed memory.
    pub fn from_host(array: &Array) -> Self {
        let (desc, data) = match array {
            Array::F32(a) => (
                MemoryDesc::new(a.shape(), DType::F32),
                MemoryData::F32(a.iter().copied().collect()),
            ),
            Array::I32(a) => (
                MemoryDesc::new(a.shape(), DType::I32),
                MemoryData::S32(a.iter().copied().collect()),
            ),
        };
        MdArray {
            desc,
            data: Arc::new(RwLock::new(data)),
        }
    }

    pub fn from_vec(data: Vec<f32>, dims: &[usize]) -> Result<Self, Error> {
        Ok(Self::from_host(&Array::from_vec(data, dims)?))
    }

    pub fn to_host(&self) -> Result<Array, Error> {
        let guard = self.read()?;
        let shape = IxDyn(self.desc.dims());
        let array = match &*guard {
            MemoryData::F32(v) => Array::F32(
                ArrayD::from_shape_vec(shape, v.clone())
                    .map_err(|e| Error::ShapeError(e.to_string()))?,
            ),
            MemoryData::S32(v) => Array::I32(
                ArrayD::from_shape_vec(shape, v.clone())
                    .map_err(|e| Error::ShapeError(e.to_string()))?,
            ),
        };
        Ok(array)
    }

    pub fn desc(&self) -> &MemoryDesc {
        &self.desc
    }

    pub fn shape(&self) -> &[usize] {
        self.desc.dims()
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype()
    }

    pub fn shares_memory(&self, other: &MdArray) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, MemoryData>, Error> {
        self.data
            .read()
            .map_err(|_| Error::InternalLogicError("accelerated memory lock poisoned".into()))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryData>, Error> {
        self.data
            .write()
            .map_err(|_| Error::InternalLogicError("accelerated memory lock poisoned".into()))
    }
}

impl fmt::Debug for MdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MdArray")
            .field("dims", &self.desc.dims)
            .field("dtype", &self.desc.dtype)
            .finish()
    }
}

/// Checks a memory against the descriptor a primitive was planned with.
pub(crate) fn expect_desc(role: &str, memory: &MdArray, desc: &MemoryDesc) -> Result<(), Error> {
    if memory.desc() != desc {
        return Err(Error::InvalidOperation(format!(
            "{} memory {:?}/{} does not match descriptor {:?}/{}",
            role,
            memory.shape(),
            memory.dtype(),
            desc.dims(),
            desc.dtype()
        )));
    }
    Ok(())
}

/// Destinations must not share memory with anything else the primitive touches.
pub(crate) fn check_no_alias(dsts: &[&MdArray], others: &[&MdArray]) -> Result<(), Error> {
    for (i, dst) in dsts.iter().enumerate() {
        let aliased = others.iter().any(|o| dst.shares_memory(o))
            || dsts[i + 1..].iter().any(|d| dst.shares_memory(d));
        if aliased {
            return Err(Error::InvalidOperation(
                "primitive destination aliases another memory".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_memory_is_zeroed() {
        let m = MdArray::new(MemoryDesc::new(&[2, 2], DType::F32));
        assert_eq!(m.to_host().unwrap().to_vec_f32(), vec![0.0; 4]);
    }

    #[test]
    fn scalar_desc_has_one_element() {
        let d = MemoryDesc::new(&[], DType::F32);
        assert_eq!(d.num_elements(), 1);
        assert_eq!(d.size_bytes(), 4);
    }

    #[test]
    fn size_bytes_follows_dtype() {
        assert_eq!(MemoryDesc::new(&[3, 2], DType::F32).size_bytes(), 24);
        assert_eq!(MemoryDesc::new(&[5], DType::I32).size_bytes(), 20);
        assert_eq!(MemoryDesc::new(&[0, 4], DType::I32).size_bytes(), 0);
    }

    #[test]
    fn clones_share_memory() {
        let a = MdArray::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let b = a.clone();
        let c = MdArray::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        assert!(a.shares_memory(&b));
        assert!(!a.shares_memory(&c));
        assert!(check_no_alias(&[&a], &[&b]).is_err());
        assert!(check_no_alias(&[&a], &[&c]).is_ok());
    }

    #[test]
    fn dtype_accessors_are_checked() {
        let m = MdArray::from_host(&Array::from_labels(vec![1, 2], &[2]).unwrap());
        let guard = m.read().unwrap();
        assert!(guard.as_f32().is_err());
        assert_eq!(guard.as_s32().unwrap(), &[1, 2]);
    }
}
