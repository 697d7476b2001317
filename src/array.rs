use crate::buffer::DType;
use crate::error::Error;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use ndarray::{ArrayD, IxDyn, ShapeError};

/// Host-resident n-dimensional array.
///
/// Activations and gradients are `F32`; binary labels are `I32`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum Array {
    F32(ArrayD<f32>),
    I32(ArrayD<i32>),
}

impl Array {
    pub fn new(data: ArrayD<f32>) -> Self {
        Array::F32(data)
    }

    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self, Error> {
        let actual_len = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| shape_err(e, shape, actual_len))?;
        Ok(Array::F32(array))
    }

    /// Builds an `I32` label array.
    pub fn from_labels(data: Vec<i32>, shape: &[usize]) -> Result<Self, Error> {
        let actual_len = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| shape_err(e, shape, actual_len))?;
        Ok(Array::I32(array))
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Array::F32(ArrayD::zeros(IxDyn(shape)))
    }

    pub fn ones(shape: &[usize]) -> Self {
        Array::F32(ArrayD::ones(IxDyn(shape)))
    }

    pub fn full(shape: &[usize], value: f32) -> Self {
        Array::F32(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// 0-dimensional `F32` array.
    pub fn scalar(value: f32) -> Self {
        Array::full(&[], value)
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Array::F32(a) => a.shape(),
            Array::I32(a) => a.shape(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Array::F32(a) => a.len(),
            Array::I32(a) => a.len(),
        }
    }

    /// Returns true if the array contains no elements
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Array::F32(_) => DType::F32,
            Array::I32(_) => DType::I32,
        }
    }

    pub fn as_f32(&self) -> Result<&ArrayD<f32>, Error> {
        match self {
            Array::F32(a) => Ok(a),
            Array::I32(_) => Err(dtype_err("as_f32", DType::F32, DType::I32)),
        }
    }

    pub fn as_i32(&self) -> Result<&ArrayD<i32>, Error> {
        match self {
            Array::I32(a) => Ok(a),
            Array::F32(_) => Err(dtype_err("as_i32", DType::I32, DType::F32)),
        }
    }

    /// Elements in logical (row-major) order, converted to f32.
    pub fn to_vec_f32(&self) -> Vec<f32> {
        match self {
            Array::F32(a) => a.iter().copied().collect(),
            Array::I32(a) => a.iter().map(|&v| v as f32).collect(),
        }
    }

    /// The single element of a size-1 array, converted to f32.
    pub fn scalar_value(&self) -> Result<f32, Error> {
        if self.size() != 1 {
            return Err(Error::ShapeMismatch {
                expected: vec![],
                actual: self.shape().to_vec(),
            });
        }
        Ok(self.to_vec_f32()[0])
    }
}

impl From<ArrayD<f32>> for Array {
    fn from(data: ArrayD<f32>) -> Self {
        Array::F32(data)
    }
}

impl From<ArrayD<i32>> for Array {
    fn from(data: ArrayD<i32>) -> Self {
        Array::I32(data)
    }
}

fn shape_err(_e: ShapeError, shape: &[usize], actual_len: usize) -> Error {
    Error::ShapeMismatch {
        expected: shape.to_vec(),
        actual: vec![actual_len],
    }
}

pub(crate) fn dtype_err(op: &str, expected: DType, actual: DType) -> Error {
    Error::DTypeMismatch {
        op: op.to_string(),
        expected,
        actual,
    }
}
