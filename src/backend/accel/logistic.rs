//! Elementwise logistic (sigmoid) forward and backward primitives.

use rayon::prelude::*;

use super::engine::Primitive;
use super::memory::{check_no_alias, expect_desc, MdArray, MemoryDesc};
use crate::array::dtype_err;
use crate::backend::{check_same_shape, numeric};
use crate::buffer::DType;
use crate::error::Error;

fn expect_f32(op: &str, desc: &MemoryDesc) -> Result<(), Error> {
    if desc.dtype() != DType::F32 {
        return Err(dtype_err(op, DType::F32, desc.dtype()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ForwardDesc {
    src: MemoryDesc,
}

impl ForwardDesc {
    pub fn new(src: &MemoryDesc) -> Result<Self, Error> {
        expect_f32("logistic", src)?;
        Ok(ForwardDesc { src: src.clone() })
    }

    pub fn dst_desc(&self) -> &MemoryDesc {
        &self.src
    }
}

#[derive(Debug)]
pub struct Forward {
    src: MdArray,
    dst: MdArray,
}

impl Forward {
    pub fn new(pd: &ForwardDesc, src: &MdArray, dst: &MdArray) -> Result<Self, Error> {
        expect_desc("logistic source", src, &pd.src)?;
        expect_desc("logistic destination", dst, pd.dst_desc())?;
        check_no_alias(&[dst], &[src])?;
        Ok(Forward {
            src: src.clone(),
            dst: dst.clone(),
        })
    }
}

impl Primitive for Forward {
    fn name(&self) -> &'static str {
        "logistic_forward"
    }

    fn execute(&self) -> Result<(), Error> {
        let src = self.src.read()?;
        let x = src.as_f32()?;
        let mut dst = self.dst.write()?;
        dst.as_f32_mut()?
            .par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(y, &x)| *y = numeric::sigmoid(x));
        Ok(())
    }
}

/// Gradient planned from the forward output `dst` rather than its input.
#[derive(Debug, Clone)]
pub struct BackwardDesc {
    dst: MemoryDesc,
    diff_dst: MemoryDesc,
}

impl BackwardDesc {
    pub fn new(dst: &MemoryDesc, diff_dst: &MemoryDesc) -> Result<Self, Error> {
        check_same_shape("logistic_backward", dst.dims(), diff_dst.dims())?;
        expect_f32("logistic_backward", dst)?;
        expect_f32("logistic_backward", diff_dst)?;
        Ok(BackwardDesc {
            dst: dst.clone(),
            diff_dst: diff_dst.clone(),
        })
    }

    pub fn diff_src_desc(&self) -> &MemoryDesc {
        &self.dst
    }
}

#[derive(Debug)]
pub struct Backward {
    dst: MdArray,
    diff_dst: MdArray,
    diff_src: MdArray,
}

impl Backward {
    pub fn new(
        pd: &BackwardDesc,
        dst: &MdArray,
        diff_dst: &MdArray,
        diff_src: &MdArray,
    ) -> Result<Self, Error> {
        expect_desc("logistic output", dst, &pd.dst)?;
        expect_desc("logistic output gradient", diff_dst, &pd.diff_dst)?;
        expect_desc("logistic input gradient", diff_src, pd.diff_src_desc())?;
        check_no_alias(&[diff_src], &[dst, diff_dst])?;
        Ok(Backward {
            dst: dst.clone(),
            diff_dst: diff_dst.clone(),
            diff_src: diff_src.clone(),
        })
    }
}

impl Primitive for Backward {
    fn name(&self) -> &'static str {
        "logistic_backward"
    }

    fn execute(&self) -> Result<(), Error> {
        let dst = self.dst.read()?;
        let diff_dst = self.diff_dst.read()?;
        let (y, gy) = (dst.as_f32()?, diff_dst.as_f32()?);
        let mut diff_src = self.diff_src.write()?;
        diff_src
            .as_f32_mut()?
            .par_iter_mut()
            .zip(y.par_iter().zip(gy.par_iter()))
            .for_each(|(gx, (&y, &g))| *gx = numeric::sigmoid_grad(y, g));
        Ok(())
    }
}
