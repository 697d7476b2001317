//! Full reduction to a 0-d memory, and its gradient broadcast.

use rayon::prelude::*;

use super::engine::Primitive;
use super::memory::{check_no_alias, expect_desc, MdArray, MemoryData, MemoryDesc};
use crate::array::dtype_err;
use crate::buffer::DType;
use crate::error::Error;

#[derive(Debug, Clone)]
pub struct PrimitiveDesc {
    src: MemoryDesc,
    dst: MemoryDesc,
}

impl PrimitiveDesc {
    pub fn new(src: &MemoryDesc) -> Self {
        PrimitiveDesc {
            src: src.clone(),
            dst: MemoryDesc::new(&[], src.dtype()),
        }
    }

    pub fn dst_desc(&self) -> &MemoryDesc {
        &self.dst
    }
}

#[derive(Debug)]
pub struct Reduction {
    src: MdArray,
    dst: MdArray,
}

impl Reduction {
    pub fn new(pd: &PrimitiveDesc, src: &MdArray, dst: &MdArray) -> Result<Self, Error> {
        expect_desc("reduction source", src, &pd.src)?;
        expect_desc("reduction destination", dst, &pd.dst)?;
        check_no_alias(&[dst], &[src])?;
        Ok(Reduction {
            src: src.clone(),
            dst: dst.clone(),
        })
    }
}

impl Primitive for Reduction {
    fn name(&self) -> &'static str {
        "reduction"
    }

    fn execute(&self) -> Result<(), Error> {
        let src = self.src.read()?;
        let mut dst = self.dst.write()?;
        match &*src {
            MemoryData::F32(v) => {
                let total = v.par_iter().map(|&x| x as f64).reduce(|| 0.0, |a, b| a + b);
                dst.as_f32_mut()?[0] = total as f32;
            }
            MemoryData::S32(v) => {
                let total = v
                    .par_iter()
                    .map(|&x| x as i64)
                    .reduce(|| 0, |a, b| a.wrapping_add(b));
                dst.as_s32_mut()?[0] = total as i32;
            }
        }
        Ok(())
    }
}

/// Plans the gradient of a full reduction: a scalar spread over `src_dims`.
#[derive(Debug, Clone)]
pub struct BackwardDesc {
    diff_dst: MemoryDesc,
    diff_src: MemoryDesc,
}

impl BackwardDesc {
    pub fn new(diff_dst: &MemoryDesc, src_dims: &[usize]) -> Result<Self, Error> {
        if diff_dst.num_elements() != 1 {
            return Err(Error::ShapeMismatch {
                expected: vec![],
                actual: diff_dst.dims().to_vec(),
            });
        }
        if diff_dst.dtype() != DType::F32 {
            return Err(dtype_err("reduction backward", DType::F32, diff_dst.dtype()));
        }
        Ok(BackwardDesc {
            diff_dst: diff_dst.clone(),
            diff_src: MemoryDesc::new(src_dims, DType::F32),
        })
    }

    pub fn diff_src_desc(&self) -> &MemoryDesc {
        &self.diff_src
    }
}

#[derive(Debug)]
pub struct ReductionBackward {
    diff_dst: MdArray,
    diff_src: MdArray,
}

impl ReductionBackward {
    pub fn new(pd: &BackwardDesc, diff_dst: &MdArray, diff_src: &MdArray) -> Result<Self, Error> {
        expect_desc("reduction gradient", diff_dst, &pd.diff_dst)?;
        expect_desc("reduction input gradient", diff_src, &pd.diff_src)?;
        check_no_alias(&[diff_src], &[diff_dst])?;
        Ok(ReductionBackward {
            diff_dst: diff_dst.clone(),
            diff_src: diff_src.clone(),
        })
    }
}

impl Primitive for ReductionBackward {
    fn name(&self) -> &'static str {
        "reduction_backward"
    }

    fn execute(&self) -> Result<(), Error> {
        let g = self.diff_dst.read()?.as_f32()?[0];
        self.diff_src
            .write()?
            .as_f32_mut()?
            .par_iter_mut()
            .for_each(|v| *v = g);
        Ok(())
    }
}
