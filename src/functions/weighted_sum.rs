//! Elementwise sum of N same-shaped inputs, each multiplied by its own scale.

use crate::backend::{check_weighted_sum_args, select_backend, Backend, BackendKind};
use crate::buffer::{Buffer, DType};
use crate::config::Config;
use crate::error::Error;
use crate::functions::{
    apply, check_arity, check_dtype, check_grad_outputs, Function, FunctionState, GradientTuple,
    Node,
};
use crate::with_backend;

#[derive(Debug)]
pub struct WeightedSum {
    scales: Vec<f32>,
    differentiable: Vec<bool>,
    config: Config,
    state: FunctionState<BackendKind>,
}

impl WeightedSum {
    /// One scale per input; the arity is `scales.len()`.
    pub fn new(scales: Vec<f32>, config: &Config) -> Self {
        let differentiable = vec![true; scales.len()];
        WeightedSum {
            scales,
            differentiable,
            config: config.clone(),
            state: FunctionState::Ready,
        }
    }

    pub fn scales(&self) -> &[f32] {
        &self.scales
    }
}

fn forward_on<B: Backend>(xs: &[Buffer], scales: &[f32]) -> Result<Buffer, Error> {
    let imported = xs.iter().map(B::import).collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&B::Storage> = imported.iter().map(|c| &**c).collect();
    Ok(B::export(B::weighted_sum(&refs, scales)?))
}

fn backward_on<B: Backend>(gy: &Buffer, scales: &[f32]) -> Result<GradientTuple, Error> {
    let gy = B::import(gy)?;
    scales
        .iter()
        .map(|&scale| -> Result<Option<Buffer>, Error> {
            Ok(Some(B::export(B::weighted_sum(&[&*gy], &[scale])?)))
        })
        .collect()
}

impl Function for WeightedSum {
    fn name(&self) -> &'static str {
        "WeightedSum"
    }

    fn differentiable(&self) -> &[bool] {
        &self.differentiable
    }

    fn forward(&mut self, inputs: &[Buffer]) -> Result<Vec<Buffer>, Error> {
        check_arity(self, inputs)?;
        self.state.ensure_ready(self.name())?;
        let shapes: Vec<&[usize]> = inputs.iter().map(Buffer::shape).collect();
        let dtypes: Vec<DType> = inputs.iter().map(Buffer::dtype).collect();
        check_weighted_sum_args(&shapes, &dtypes, self.scales.len())?;

        let backend = select_backend(inputs, &self.config)?;
        crate::debug_println!("WeightedSum of {} inputs on {}", inputs.len(), backend);
        let y = with_backend!(backend, B => forward_on::<B>(inputs, &self.scales))?;

        self.state.store(backend);
        Ok(vec![y])
    }

    fn backward(
        &mut self,
        inputs: &[Buffer],
        grad_outputs: &[Buffer],
    ) -> Result<GradientTuple, Error> {
        check_arity(self, inputs)?;
        check_grad_outputs(self.name(), grad_outputs, 1)?;
        let first = inputs.first().ok_or_else(|| {
            Error::InvalidOperation("weighted_sum requires at least one input".to_string())
        })?;
        let gy = &grad_outputs[0];
        if gy.shape() != first.shape() {
            return Err(Error::ShapeMismatch {
                expected: first.shape().to_vec(),
                actual: gy.shape().to_vec(),
            });
        }
        check_dtype("weighted_sum gradient", gy, DType::F32)?;
        let backend = self.state.take(self.name())?;

        with_backend!(backend, B => backward_on::<B>(gy, &self.scales))
    }
}

/// `sum_i scales[i] * xs[i]`.
pub fn weighted_sum(xs: Vec<Buffer>, scales: Vec<f32>, config: &Config) -> Result<Node, Error> {
    apply(WeightedSum::new(scales, config), xs)
}

/// Unscaled elementwise sum of `xs`.
pub fn add_n(xs: Vec<Buffer>, config: &Config) -> Result<Node, Error> {
    let scales = vec![1.0; xs.len()];
    weighted_sum(xs, scales, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;
    use crate::config::AccelPreference;

    #[test]
    fn zero_inputs_are_errors_not_panics() {
        let config = Config::default().with_accel(AccelPreference::Never);
        let mut f = WeightedSum::new(vec![], &config);
        assert!(f.differentiable().is_empty());

        let seed = [Buffer::from(Array::scalar(1.0))];
        assert!(matches!(
            f.backward(&[], &seed),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(f.forward(&[]), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn backward_keeps_scales() {
        let config = Config::default().with_accel(AccelPreference::Never);
        let x = Buffer::from(Array::from_vec(vec![1.0, 2.0], &[2]).unwrap());
        let mut f = WeightedSum::new(vec![-3.0], &config);
        f.forward(&[x.clone()]).unwrap();
        let grads = f.backward(&[x], &[Buffer::from(Array::ones(&[2]))]).unwrap();
        assert_eq!(f.scales(), &[-3.0]);
        assert_eq!(grads[0].as_ref().unwrap().to_vec_f32().unwrap(), vec![-3.0, -3.0]);
    }
}
