//! Host reference backend using `ndarray`.

use std::borrow::Cow;

use ndarray::{ArrayD, IxDyn, Zip};

use crate::array::Array; // The storage type for this backend
use crate::backend::numeric;
use crate::backend::{batch_size, check_same_shape, check_weighted_sum_args, Backend, BackendKind};
use crate::buffer::{Buffer, DType};
use crate::error::Error;

/// Marker struct for the host backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    const KIND: BackendKind = BackendKind::Host;

    type Storage = Array;

    fn import(buffer: &Buffer) -> Result<Cow<'_, Array>, Error> {
        match buffer {
            Buffer::Host(a) => Ok(Cow::Borrowed(a)),
            other => Ok(Cow::Owned(other.to_host()?)),
        }
    }

    fn export(storage: Array) -> Buffer {
        Buffer::Host(storage)
    }

    fn sigmoid(x: &Array) -> Result<Array, Error> {
        Ok(Array::new(x.as_f32()?.mapv(numeric::sigmoid)))
    }

    fn sigmoid_backward(y: &Array, grad_output: &Array) -> Result<Array, Error> {
        check_same_shape("sigmoid_backward", y.shape(), grad_output.shape())?;
        let gx = Zip::from(y.as_f32()?)
            .and(grad_output.as_f32()?)
            .map_collect(|&y, &g| numeric::sigmoid_grad(y, g));
        Ok(Array::new(gx))
    }

    fn sigmoid_cross_entropy(x: &Array, t: &Array) -> Result<(Array, Array), Error> {
        check_same_shape("sigmoid_cross_entropy", x.shape(), t.shape())?;
        let batch = batch_size("sigmoid_cross_entropy", x.shape())?;
        let x_data = x.as_f32()?;
        let t_data = t.as_i32()?;

        let total = x_data
            .iter()
            .zip(t_data.iter())
            .fold(0.0f64, |acc, (&x, &t)| {
                acc + numeric::sigmoid_cross_entropy_term(x, t)
            });

        let loss = Array::scalar(numeric::mean_loss(total, batch));
        let y = Self::sigmoid(x)?;
        Ok((loss, y))
    }

    fn sigmoid_cross_entropy_backward(
        y: &Array,
        t: &Array,
        grad_loss: &Array,
    ) -> Result<Array, Error> {
        check_same_shape("sigmoid_cross_entropy_backward", y.shape(), t.shape())?;
        let batch = batch_size("sigmoid_cross_entropy_backward", y.shape())?;
        let coeff = grad_loss.scalar_value()? / batch as f32;

        let gx = Zip::from(y.as_f32()?)
            .and(t.as_i32()?)
            .map_collect(|&y, &t| numeric::sigmoid_cross_entropy_grad(coeff, y, t));
        Ok(Array::new(gx))
    }

    fn sum_all(x: &Array) -> Result<Array, Error> {
        match x {
            Array::F32(a) => {
                let total = a.iter().fold(0.0f64, |acc, &v| acc + v as f64);
                Ok(Array::scalar(total as f32))
            }
            Array::I32(a) => {
                // i64 accumulator, wrapped back into i32.
                let total = a.iter().fold(0i64, |acc, &v| acc.wrapping_add(v as i64));
                Ok(Array::I32(ArrayD::from_elem(IxDyn(&[]), total as i32)))
            }
        }
    }

    fn sum_backward(grad_output: &Array, input_shape: &[usize]) -> Result<Array, Error> {
        let g = grad_output.scalar_value()?;
        Ok(Array::full(input_shape, g))
    }

    fn weighted_sum(xs: &[&Array], scales: &[f32]) -> Result<Array, Error> {
        let shapes: Vec<&[usize]> = xs.iter().map(|x| x.shape()).collect();
        let dtypes: Vec<DType> = xs.iter().map(|x| x.dtype()).collect();
        check_weighted_sum_args(&shapes, &dtypes, scales.len())?;

        let mut out = ArrayD::<f32>::zeros(IxDyn(shapes[0]));
        for (x, &scale) in xs.iter().zip(scales) {
            Zip::from(&mut out)
                .and(x.as_f32()?)
                .for_each(|acc, &v| *acc += scale * v);
        }
        Ok(Array::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sum_all_of_int_labels_keeps_dtype() {
        let t = Array::from_labels(vec![1, 0, 1, 1], &[2, 2]).unwrap();
        let s = CpuBackend::sum_all(&t).unwrap();
        assert_eq!(s.dtype(), DType::I32);
        assert!(s.shape().is_empty());
        assert_eq!(s.to_vec_f32(), vec![3.0]);
    }

    #[test]
    fn cross_entropy_rejects_float_labels() {
        let x = Array::zeros(&[2]);
        let t = Array::zeros(&[2]);
        assert!(matches!(
            CpuBackend::sigmoid_cross_entropy(&x, &t),
            Err(Error::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn cross_entropy_at_zero_logits_is_ln2() {
        let x = Array::zeros(&[4, 2]);
        let t = Array::from_labels(vec![0, 1, 1, 0, 1, 1, 0, 0], &[4, 2]).unwrap();
        let (loss, y) = CpuBackend::sigmoid_cross_entropy(&x, &t).unwrap();
        // 8 elements each contributing ln 2, divided by batch 4
        assert_abs_diff_eq!(loss.scalar_value().unwrap(), 2.0 * 2f32.ln(), epsilon = 1e-6);
        assert!(y.to_vec_f32().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn weighted_sum_scales_each_input() {
        let a = Array::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let b = Array::from_vec(vec![10.0, 20.0], &[2]).unwrap();
        let out = CpuBackend::weighted_sum(&[&a, &b], &[2.0, 0.5]).unwrap();
        assert_eq!(out.to_vec_f32(), vec![7.0, 14.0]);
    }
}
