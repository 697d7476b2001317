//! Sigmoid cross-entropy loss primitives.
//!
//! The forward writes the 0-d mean loss to `dst` and `sigmoid(src)` to a
//! workspace that the backward consumes.

use rayon::prelude::*;

use super::engine::Primitive;
use super::memory::{check_no_alias, expect_desc, MdArray, MemoryDesc};
use crate::array::dtype_err;
use crate::backend::{batch_size, check_same_shape, numeric};
use crate::buffer::DType;
use crate::error::Error;

fn check_operands(op: &str, src: &MemoryDesc, labels: &MemoryDesc) -> Result<usize, Error> {
    check_same_shape(op, src.dims(), labels.dims())?;
    if src.dtype() != DType::F32 {
        return Err(dtype_err(op, DType::F32, src.dtype()));
    }
    if labels.dtype() != DType::I32 {
        return Err(dtype_err(op, DType::I32, labels.dtype()));
    }
    batch_size(op, src.dims())
}

#[derive(Debug, Clone)]
pub struct ForwardDesc {
    src: MemoryDesc,
    labels: MemoryDesc,
    dst: MemoryDesc,
    batch: usize,
}

impl ForwardDesc {
    pub fn new(src: &MemoryDesc, labels: &MemoryDesc) -> Result<Self, Error> {
        let batch = check_operands("sigmoid_cross_entropy", src, labels)?;
        Ok(ForwardDesc {
            src: src.clone(),
            labels: labels.clone(),
            dst: MemoryDesc::new(&[], DType::F32),
            batch,
        })
    }

    pub fn dst_desc(&self) -> &MemoryDesc {
        &self.dst
    }

    pub fn workspace_desc(&self) -> &MemoryDesc {
        &self.src
    }
}

#[derive(Debug)]
pub struct Forward {
    src: MdArray,
    labels: MdArray,
    dst: MdArray,
    workspace: MdArray,
    batch: usize,
}

impl Forward {
    pub fn new(
        pd: &ForwardDesc,
        src: &MdArray,
        labels: &MdArray,
        dst: &MdArray,
        workspace: &MdArray,
    ) -> Result<Self, Error> {
        expect_desc("loss logits", src, &pd.src)?;
        expect_desc("loss labels", labels, &pd.labels)?;
        expect_desc("loss destination", dst, &pd.dst)?;
        expect_desc("loss workspace", workspace, pd.workspace_desc())?;
        check_no_alias(&[dst, workspace], &[src, labels])?;
        Ok(Forward {
            src: src.clone(),
            labels: labels.clone(),
            dst: dst.clone(),
            workspace: workspace.clone(),
            batch: pd.batch,
        })
    }
}

impl Primitive for Forward {
    fn name(&self) -> &'static str {
        "sigmoid_cross_entropy_forward"
    }

    fn execute(&self) -> Result<(), Error> {
        let src = self.src.read()?;
        let labels = self.labels.read()?;
        let (x, t) = (src.as_f32()?, labels.as_s32()?);

        self.workspace
            .write()?
            .as_f32_mut()?
            .par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(y, &x)| *y = numeric::sigmoid(x));

        let total: f64 = x
            .par_iter()
            .zip(t.par_iter())
            .map(|(&x, &t)| numeric::sigmoid_cross_entropy_term(x, t))
            .sum();
        self.dst.write()?.as_f32_mut()?[0] = numeric::mean_loss(total, self.batch);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BackwardDesc {
    workspace: MemoryDesc,
    labels: MemoryDesc,
    diff_dst: MemoryDesc,
    batch: usize,
}

impl BackwardDesc {
    pub fn new(
        workspace: &MemoryDesc,
        labels: &MemoryDesc,
        diff_dst: &MemoryDesc,
    ) -> Result<Self, Error> {
        let batch = check_operands("sigmoid_cross_entropy_backward", workspace, labels)?;
        if diff_dst.num_elements() != 1 {
            return Err(Error::ShapeMismatch {
                expected: vec![],
                actual: diff_dst.dims().to_vec(),
            });
        }
        if diff_dst.dtype() != DType::F32 {
            return Err(dtype_err(
                "sigmoid_cross_entropy_backward",
                DType::F32,
                diff_dst.dtype(),
            ));
        }
        Ok(BackwardDesc {
            workspace: workspace.clone(),
            labels: labels.clone(),
            diff_dst: diff_dst.clone(),
            batch,
        })
    }

    pub fn diff_src_desc(&self) -> &MemoryDesc {
        &self.workspace
    }
}

#[derive(Debug)]
pub struct Backward {
    workspace: MdArray,
    labels: MdArray,
    diff_dst: MdArray,
    diff_src: MdArray,
    batch: usize,
}

impl Backward {
    pub fn new(
        pd: &BackwardDesc,
        workspace: &MdArray,
        labels: &MdArray,
        diff_dst: &MdArray,
        diff_src: &MdArray,
    ) -> Result<Self, Error> {
        expect_desc("loss workspace", workspace, &pd.workspace)?;
        expect_desc("loss labels", labels, &pd.labels)?;
        expect_desc("loss gradient", diff_dst, &pd.diff_dst)?;
        expect_desc("logits gradient", diff_src, pd.diff_src_desc())?;
        check_no_alias(&[diff_src], &[workspace, labels, diff_dst])?;
        Ok(Backward {
            workspace: workspace.clone(),
            labels: labels.clone(),
            diff_dst: diff_dst.clone(),
            diff_src: diff_src.clone(),
            batch: pd.batch,
        })
    }
}

impl Primitive for Backward {
    fn name(&self) -> &'static str {
        "sigmoid_cross_entropy_backward"
    }

    fn execute(&self) -> Result<(), Error> {
        let workspace = self.workspace.read()?;
        let labels = self.labels.read()?;
        let (y, t) = (workspace.as_f32()?, labels.as_s32()?);
        let coeff = self.diff_dst.read()?.as_f32()?[0] / self.batch as f32;

        self.diff_src
            .write()?
            .as_f32_mut()?
            .par_iter_mut()
            .zip(y.par_iter().zip(t.par_iter()))
            .for_each(|(gx, (&y, &t))| *gx = numeric::sigmoid_cross_entropy_grad(coeff, y, t));
        Ok(())
    }
}
