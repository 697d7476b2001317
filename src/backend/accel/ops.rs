//! `Backend` implementation over the accelerated engine.
//!
//! Every kernel follows the same protocol: fresh engine, primitive
//! descriptor from the source layouts, destination allocated from the
//! descriptor, one primitive submitted to a stream, wait, return the
//! destination.

use std::borrow::Cow;

use super::engine::{Engine, Primitive, Stream};
use super::memory::{MdArray, MemoryDesc};
use super::{logistic, logistic_loss, reduction, sum};
use crate::backend::{Backend, BackendKind};
use crate::buffer::Buffer;
use crate::error::Error;

/// Marker struct for the accelerated backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelBackend;

fn execute<P: Primitive + 'static>(engine: &Engine, primitive: P) -> Result<(), Error> {
    let mut stream = Stream::new(engine);
    stream.submit(vec![Box::new(primitive)]);
    stream.wait()
}

impl Backend for AccelBackend {
    const KIND: BackendKind = BackendKind::Accelerated;

    type Storage = MdArray;

    fn import(buffer: &Buffer) -> Result<Cow<'_, MdArray>, Error> {
        match buffer {
            Buffer::Accelerated(m) => Ok(Cow::Borrowed(m)),
            Buffer::Host(a) => Ok(Cow::Owned(MdArray::from_host(a))),
            #[cfg(feature = "cuda")]
            Buffer::Device(_) => Err(Error::UnsupportedDomain {
                domain: crate::buffer::StorageDomain::Device,
                reason: "device buffers cannot be wrapped as accelerated memory".to_string(),
            }),
        }
    }

    fn export(storage: MdArray) -> Buffer {
        Buffer::Accelerated(storage)
    }

    fn sigmoid(x: &MdArray) -> Result<MdArray, Error> {
        let engine = Engine::cpu()?;
        let pd = logistic::ForwardDesc::new(x.desc())?;
        let y = MdArray::new(pd.dst_desc().clone());
        execute(&engine, logistic::Forward::new(&pd, x, &y)?)?;
        Ok(y)
    }

    fn sigmoid_backward(y: &MdArray, grad_output: &MdArray) -> Result<MdArray, Error> {
        let engine = Engine::cpu()?;
        let pd = logistic::BackwardDesc::new(y.desc(), grad_output.desc())?;
        let gx = MdArray::new(pd.diff_src_desc().clone());
        execute(&engine, logistic::Backward::new(&pd, y, grad_output, &gx)?)?;
        Ok(gx)
    }

    fn sigmoid_cross_entropy(x: &MdArray, t: &MdArray) -> Result<(MdArray, MdArray), Error> {
        let engine = Engine::cpu()?;
        let pd = logistic_loss::ForwardDesc::new(x.desc(), t.desc())?;
        let loss = MdArray::new(pd.dst_desc().clone());
        let y = MdArray::new(pd.workspace_desc().clone());
        execute(&engine, logistic_loss::Forward::new(&pd, x, t, &loss, &y)?)?;
        Ok((loss, y))
    }

    fn sigmoid_cross_entropy_backward(
        y: &MdArray,
        t: &MdArray,
        grad_loss: &MdArray,
    ) -> Result<MdArray, Error> {
        let engine = Engine::cpu()?;
        let pd = logistic_loss::BackwardDesc::new(y.desc(), t.desc(), grad_loss.desc())?;
        let gx = MdArray::new(pd.diff_src_desc().clone());
        execute(
            &engine,
            logistic_loss::Backward::new(&pd, y, t, grad_loss, &gx)?,
        )?;
        Ok(gx)
    }

    fn sum_all(x: &MdArray) -> Result<MdArray, Error> {
        let engine = Engine::cpu()?;
        let pd = reduction::PrimitiveDesc::new(x.desc());
        let y = MdArray::new(pd.dst_desc().clone());
        execute(&engine, reduction::Reduction::new(&pd, x, &y)?)?;
        Ok(y)
    }

    fn sum_backward(grad_output: &MdArray, input_shape: &[usize]) -> Result<MdArray, Error> {
        let engine = Engine::cpu()?;
        let pd = reduction::BackwardDesc::new(grad_output.desc(), input_shape)?;
        let gx = MdArray::new(pd.diff_src_desc().clone());
        execute(
            &engine,
            reduction::ReductionBackward::new(&pd, grad_output, &gx)?,
        )?;
        Ok(gx)
    }

    fn weighted_sum(xs: &[&MdArray], scales: &[f32]) -> Result<MdArray, Error> {
        let engine = Engine::cpu()?;
        let src_descs: Vec<MemoryDesc> = xs.iter().map(|x| x.desc().clone()).collect();
        let pd = sum::PrimitiveDesc::new(scales, &src_descs)?;
        let y = MdArray::new(pd.dst_desc().clone());
        execute(&engine, sum::Sum::new(&pd, xs, &y)?)?;
        Ok(y)
    }
}
