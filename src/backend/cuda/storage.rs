use std::sync::Arc;

use cust::memory::{CopyDestination, DeviceBuffer, DeviceCopy, DevicePointer};
use ndarray::{ArrayD, IxDyn};

use crate::array::{dtype_err, Array};
use crate::buffer::DType;
use crate::error::Error;

// Helper for CudaError conversion
fn map_cuda_error(e: cust::error::CudaError) -> Error {
    Error::CudaError(e.to_string())
}

/// Device memory plus its logical shape.
///
/// 0-d and empty shapes still allocate one element so the buffer is never
/// zero-length.
pub struct CudaStorage<T: DeviceCopy> {
    data: DeviceBuffer<T>,
    shape: Vec<usize>,
}

impl<T: DeviceCopy + Default> CudaStorage<T> {
    pub fn new(shape: &[usize]) -> Result<Self, Error> {
        debug_println!("[CudaStorage::new] shape {:?}", shape);
        let size = shape.iter().product::<usize>().max(1);
        let data = unsafe { DeviceBuffer::<T>::uninitialized(size) }.map_err(map_cuda_error)?;
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    pub fn from_slice(data: &[T], shape: &[usize]) -> Result<Self, Error> {
        let mut storage = Self::new(shape)?;
        storage.copy_from_slice(data)?;
        Ok(storage)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of logical elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ptr(&self) -> DevicePointer<T> {
        self.data.as_device_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> DevicePointer<T> {
        self.data.as_device_ptr()
    }

    pub fn copy_from_slice(&mut self, data: &[T]) -> Result<(), Error> {
        if data.len() != self.len() {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                actual: vec![data.len()],
            });
        }
        if !data.is_empty() {
            self.data
                .index(0..data.len())
                .copy_from(data)
                .map_err(map_cuda_error)?;
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<T>, Error> {
        let mut host_data = vec![T::default(); self.len()];
        if !host_data.is_empty() {
            self.data
                .index(0..host_data.len())
                .copy_to(&mut host_data[..])
                .map_err(map_cuda_error)?;
        }
        Ok(host_data)
    }
}

impl<T: DeviceCopy> std::fmt::Debug for CudaStorage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CudaStorage(shape={:?}, ptr={:?})",
            self.shape,
            self.data.as_device_ptr()
        )
    }
}

/// Device-resident array. Cloning shares the device allocation; kernels
/// always write into freshly allocated outputs.
#[derive(Debug, Clone)]
pub enum DeviceArray {
    F32(Arc<CudaStorage<f32>>),
    I32(Arc<CudaStorage<i32>>),
}

impl DeviceArray {
    pub fn from_host(array: &Array) -> Result<Self, Error> {
        match array {
            Array::F32(a) => {
                let data: Vec<f32> = a.iter().copied().collect();
                Ok(DeviceArray::F32(Arc::new(CudaStorage::from_slice(&data, a.shape())?)))
            }
            Array::I32(a) => {
                let data: Vec<i32> = a.iter().copied().collect();
                Ok(DeviceArray::I32(Arc::new(CudaStorage::from_slice(&data, a.shape())?)))
            }
        }
    }

    pub fn to_host(&self) -> Result<Array, Error> {
        let shape = IxDyn(self.shape());
        let array = match self {
            DeviceArray::F32(s) => Array::F32(
                ArrayD::from_shape_vec(shape, s.to_vec()?)
                    .map_err(|e| Error::ShapeError(e.to_string()))?,
            ),
            DeviceArray::I32(s) => Array::I32(
                ArrayD::from_shape_vec(shape, s.to_vec()?)
                    .map_err(|e| Error::ShapeError(e.to_string()))?,
            ),
        };
        Ok(array)
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            DeviceArray::F32(s) => s.shape(),
            DeviceArray::I32(s) => s.shape(),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            DeviceArray::F32(_) => DType::F32,
            DeviceArray::I32(_) => DType::I32,
        }
    }

    pub fn as_f32(&self) -> Result<&CudaStorage<f32>, Error> {
        match self {
            DeviceArray::F32(s) => Ok(&**s),
            DeviceArray::I32(_) => Err(dtype_err("device array", DType::F32, DType::I32)),
        }
    }

    pub fn as_i32(&self) -> Result<&CudaStorage<i32>, Error> {
        match self {
            DeviceArray::I32(s) => Ok(&**s),
            DeviceArray::F32(_) => Err(dtype_err("device array", DType::I32, DType::F32)),
        }
    }
}

impl From<CudaStorage<f32>> for DeviceArray {
    fn from(storage: CudaStorage<f32>) -> Self {
        DeviceArray::F32(Arc::new(storage))
    }
}

impl From<CudaStorage<i32>> for DeviceArray {
    fn from(storage: CudaStorage<i32>) -> Self {
        DeviceArray::I32(Arc::new(storage))
    }
}
