use std::borrow::Cow;

use cust::context::CurrentContext;
use cust::launch;
use cust::memory::{CopyDestination, DeviceBuffer, DeviceCopy};

use super::context::get_global_context;
use super::storage::{CudaStorage, DeviceArray};
use crate::backend::numeric::mean_loss;
use crate::backend::{batch_size, check_same_shape, check_weighted_sum_args, Backend, BackendKind};
use crate::buffer::{Buffer, DType};
use crate::error::Error;

const BLOCK_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CudaBackend;

fn grid_size(n: usize) -> u32 {
    n.div_ceil(BLOCK_SIZE).max(1) as u32
}

/// Copies one partial per block back and adds them on the host.
fn download_partials<T: DeviceCopy + Default>(partials: &DeviceBuffer<T>) -> Result<Vec<T>, Error> {
    let mut host = vec![T::default(); partials.len()];
    partials.copy_to(&mut host[..])?;
    Ok(host)
}

impl Backend for CudaBackend {
    const KIND: BackendKind = BackendKind::Device;

    type Storage = DeviceArray;

    fn import(buffer: &Buffer) -> Result<Cow<'_, DeviceArray>, Error> {
        match buffer {
            Buffer::Device(d) => Ok(Cow::Borrowed(d)),
            Buffer::Host(a) => Ok(Cow::Owned(DeviceArray::from_host(a)?)),
            Buffer::Accelerated(m) => Ok(Cow::Owned(DeviceArray::from_host(&m.to_host()?)?)),
        }
    }

    fn export(storage: DeviceArray) -> Buffer {
        Buffer::Device(storage)
    }

    fn sigmoid(x: &DeviceArray) -> Result<DeviceArray, Error> {
        let x = x.as_f32()?;
        let n = x.len();
        let mut output = CudaStorage::<f32>::new(x.shape())?;
        if n == 0 {
            return Ok(output.into());
        }
        let ctx = get_global_context()?;
        let kernel = ctx.get_kernel("sigmoid_kernel")?;
        let stream = ctx.get_stream();
        unsafe {
            launch!(kernel<<<grid_size(n), BLOCK_SIZE as u32, 0, stream>>>(
                x.as_ptr(),
                output.as_mut_ptr(),
                n as i32
            ))?;
        }
        stream.synchronize()?;
        Ok(output.into())
    }

    fn sigmoid_backward(y: &DeviceArray, grad_output: &DeviceArray) -> Result<DeviceArray, Error> {
        let (y, gy) = (y.as_f32()?, grad_output.as_f32()?);
        check_same_shape("sigmoid_backward", y.shape(), gy.shape())?;
        let n = y.len();
        let mut output = CudaStorage::<f32>::new(y.shape())?;
        if n == 0 {
            return Ok(output.into());
        }
        let ctx = get_global_context()?;
        let kernel = ctx.get_kernel("sigmoid_backward_kernel")?;
        let stream = ctx.get_stream();
        unsafe {
            launch!(kernel<<<grid_size(n), BLOCK_SIZE as u32, 0, stream>>>(
                y.as_ptr(),
                gy.as_ptr(),
                output.as_mut_ptr(),
                n as i32
            ))?;
        }
        stream.synchronize()?;
        Ok(output.into())
    }

    fn sigmoid_cross_entropy(
        x: &DeviceArray,
        t: &DeviceArray,
    ) -> Result<(DeviceArray, DeviceArray), Error> {
        let (x, t) = (x.as_f32()?, t.as_i32()?);
        check_same_shape("sigmoid_cross_entropy", x.shape(), t.shape())?;
        let batch = batch_size("sigmoid_cross_entropy", x.shape())?;
        let n = x.len();

        let mut y = CudaStorage::<f32>::new(x.shape())?;
        let mut total = 0.0f64;
        if n > 0 {
            let blocks = grid_size(n);
            let partials = DeviceBuffer::<f64>::from_slice(&vec![0.0; blocks as usize])?;
            let ctx = get_global_context()?;
            let kernel = ctx.get_kernel("sigmoid_cross_entropy_fwd_kernel")?;
            let stream = ctx.get_stream();
            unsafe {
                launch!(kernel<<<blocks, BLOCK_SIZE as u32, 0, stream>>>(
                    x.as_ptr(),
                    t.as_ptr(),
                    y.as_mut_ptr(),
                    partials.as_device_ptr(),
                    n as i32
                ))?;
            }
            stream.synchronize()?;
            total = download_partials(&partials)?.iter().sum();
        }

        let loss = CudaStorage::<f32>::from_slice(&[mean_loss(total, batch)], &[])?;
        debug_println!("[CudaBackend::sigmoid_cross_entropy] n={} batch={}", n, batch);
        Ok((loss.into(), y.into()))
    }

    fn sigmoid_cross_entropy_backward(
        y: &DeviceArray,
        t: &DeviceArray,
        grad_loss: &DeviceArray,
    ) -> Result<DeviceArray, Error> {
        let (y, t, g) = (y.as_f32()?, t.as_i32()?, grad_loss.as_f32()?);
        check_same_shape("sigmoid_cross_entropy_backward", y.shape(), t.shape())?;
        let batch = batch_size("sigmoid_cross_entropy_backward", y.shape())?;
        if g.len() != 1 {
            return Err(Error::ShapeMismatch {
                expected: vec![],
                actual: g.shape().to_vec(),
            });
        }
        let coeff = g.to_vec()?[0] / batch as f32;
        let n = y.len();

        let mut gx = CudaStorage::<f32>::new(y.shape())?;
        if n == 0 {
            return Ok(gx.into());
        }
        let ctx = get_global_context()?;
        let kernel = ctx.get_kernel("sigmoid_cross_entropy_bwd_kernel")?;
        let stream = ctx.get_stream();
        unsafe {
            launch!(kernel<<<grid_size(n), BLOCK_SIZE as u32, 0, stream>>>(
                y.as_ptr(),
                t.as_ptr(),
                gx.as_mut_ptr(),
                coeff,
                n as i32
            ))?;
        }
        stream.synchronize()?;
        Ok(gx.into())
    }

    fn sum_all(x: &DeviceArray) -> Result<DeviceArray, Error> {
        let n = match x {
            DeviceArray::F32(s) => s.len(),
            DeviceArray::I32(s) => s.len(),
        };
        let blocks = grid_size(n);
        let ctx = get_global_context()?;
        let stream = ctx.get_stream();

        match x {
            DeviceArray::F32(s) => {
                let mut total = 0.0f64;
                if n > 0 {
                    let partials = DeviceBuffer::<f64>::from_slice(&vec![0.0; blocks as usize])?;
                    let kernel = ctx.get_kernel("sum_reduction_f32_kernel")?;
                    unsafe {
                        launch!(kernel<<<blocks, BLOCK_SIZE as u32, 0, stream>>>(
                            s.as_ptr(),
                            partials.as_device_ptr(),
                            n as i32
                        ))?;
                    }
                    stream.synchronize()?;
                    total = download_partials(&partials)?.iter().sum();
                }
                Ok(CudaStorage::<f32>::from_slice(&[total as f32], &[])?.into())
            }
            DeviceArray::I32(s) => {
                let mut total = 0i64;
                if n > 0 {
                    let partials = DeviceBuffer::<i64>::from_slice(&vec![0; blocks as usize])?;
                    let kernel = ctx.get_kernel("sum_reduction_i32_kernel")?;
                    unsafe {
                        launch!(kernel<<<blocks, BLOCK_SIZE as u32, 0, stream>>>(
                            s.as_ptr(),
                            partials.as_device_ptr(),
                            n as i32
                        ))?;
                    }
                    stream.synchronize()?;
                    total = download_partials(&partials)?
                        .iter()
                        .fold(0i64, |acc, &v| acc.wrapping_add(v));
                }
                Ok(CudaStorage::<i32>::from_slice(&[total as i32], &[])?.into())
            }
        }
    }

    fn sum_backward(grad_output: &DeviceArray, input_shape: &[usize]) -> Result<DeviceArray, Error> {
        let g = grad_output.as_f32()?;
        if g.len() != 1 {
            return Err(Error::ShapeMismatch {
                expected: vec![],
                actual: g.shape().to_vec(),
            });
        }
        let value = g.to_vec()?[0];
        let mut output = CudaStorage::<f32>::new(input_shape)?;
        let n = output.len();
        if n == 0 {
            return Ok(output.into());
        }
        let ctx = get_global_context()?;
        let kernel = ctx.get_kernel("fill_scalar_kernel")?;
        let stream = ctx.get_stream();
        unsafe {
            launch!(kernel<<<grid_size(n), BLOCK_SIZE as u32, 0, stream>>>(
                output.as_mut_ptr(),
                value,
                n as i32
            ))?;
        }
        stream.synchronize()?;
        Ok(output.into())
    }

    fn weighted_sum(xs: &[&DeviceArray], scales: &[f32]) -> Result<DeviceArray, Error> {
        let shapes: Vec<&[usize]> = xs.iter().map(|x| x.shape()).collect();
        let dtypes: Vec<DType> = xs.iter().map(|x| x.dtype()).collect();
        check_weighted_sum_args(&shapes, &dtypes, scales.len())?;

        let shape = shapes[0];
        let n = shape.iter().product::<usize>();
        let mut output = CudaStorage::<f32>::from_slice(&vec![0.0; n], shape)?;
        if n == 0 {
            return Ok(output.into());
        }

        let ctx = get_global_context()?;
        let handle = ctx.get_cublas_handle();
        // output += scale * x, one input at a time, on the default stream.
        // Saxpy may fuse the multiply-add, so results match the host within rounding.
        for (x, &scale) in xs.iter().zip(scales) {
            let x = x.as_f32()?;
            let status = unsafe {
                cublas_sys::cublasSaxpy_v2(
                    handle,
                    n as i32,
                    &scale,
                    x.as_ptr().as_raw() as *const f32,
                    1,
                    output.as_mut_ptr().as_raw() as *mut f32,
                    1,
                )
            };
            if status != cublas_sys::cublasStatus_t::CUBLAS_STATUS_SUCCESS {
                return Err(Error::CublasError(format!(
                    "cuBLAS Saxpy failed with status: {:?} (n={})",
                    status, n
                )));
            }
        }
        CurrentContext::synchronize()?;
        Ok(output.into())
    }
}
