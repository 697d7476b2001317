//! Weighted elementwise sum of N same-shaped memories.

use rayon::prelude::*;

use super::engine::Primitive;
use super::memory::{check_no_alias, expect_desc, MdArray, MemoryDesc};
use crate::backend::check_weighted_sum_args;
use crate::buffer::DType;
use crate::error::Error;

#[derive(Debug, Clone)]
pub struct PrimitiveDesc {
    scales: Vec<f32>,
    srcs: Vec<MemoryDesc>,
    dst: MemoryDesc,
}

impl PrimitiveDesc {
    /// One scale per source; every source must share dims and be `F32`.
    pub fn new(scales: &[f32], srcs: &[MemoryDesc]) -> Result<Self, Error> {
        let shapes: Vec<&[usize]> = srcs.iter().map(MemoryDesc::dims).collect();
        let dtypes: Vec<DType> = srcs.iter().map(MemoryDesc::dtype).collect();
        check_weighted_sum_args(&shapes, &dtypes, scales.len())?;
        let dst = MemoryDesc::new(srcs[0].dims(), DType::F32);
        Ok(PrimitiveDesc {
            scales: scales.to_vec(),
            srcs: srcs.to_vec(),
            dst,
        })
    }

    pub fn dst_desc(&self) -> &MemoryDesc {
        &self.dst
    }

    pub fn scales(&self) -> &[f32] {
        &self.scales
    }
}

#[derive(Debug)]
pub struct Sum {
    scales: Vec<f32>,
    srcs: Vec<MdArray>,
    dst: MdArray,
}

impl Sum {
    pub fn new(pd: &PrimitiveDesc, srcs: &[&MdArray], dst: &MdArray) -> Result<Self, Error> {
        if srcs.len() != pd.srcs.len() {
            return Err(Error::InvalidOperation(format!(
                "sum primitive planned for {} sources, got {}",
                pd.srcs.len(),
                srcs.len()
            )));
        }
        for (src, desc) in srcs.iter().zip(&pd.srcs) {
            expect_desc("sum source", src, desc)?;
        }
        expect_desc("sum destination", dst, &pd.dst)?;
        check_no_alias(&[dst], srcs)?;
        Ok(Sum {
            scales: pd.scales.clone(),
            srcs: srcs.iter().map(|&s| s.clone()).collect(),
            dst: dst.clone(),
        })
    }
}

impl Primitive for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn execute(&self) -> Result<(), Error> {
        let guards = self
            .srcs
            .iter()
            .map(MdArray::read)
            .collect::<Result<Vec<_>, _>>()?;
        let inputs = guards
            .iter()
            .map(|g| g.as_f32())
            .collect::<Result<Vec<&[f32]>, _>>()?;
        let scales = &self.scales;

        let mut dst = self.dst.write()?;
        dst.as_f32_mut()?
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, out)| {
                *out = inputs
                    .iter()
                    .zip(scales)
                    .fold(0.0f32, |acc, (x, &scale)| acc + scale * x[i]);
            });
        Ok(())
    }
}
