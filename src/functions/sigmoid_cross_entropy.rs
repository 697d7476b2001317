//! Sigmoid cross-entropy between logits and binary labels.
//!
//! ```text
//! loss = -sum(x * (t - [x >= 0]) - log(1 + exp(-|x|))) / batch
//! ```
//! where `batch` is the length of the leading axis. The gradient with respect
//! to `x` is `g * (sigmoid(x) - t) / batch`; labels get none.

use crate::backend::{batch_size, check_same_shape, select_backend, Backend, BackendKind};
use crate::buffer::{Buffer, DType};
use crate::config::Config;
use crate::error::Error;
use crate::functions::{
    apply, check_arity, check_dtype, check_grad_outputs, check_scalar_grad, Function,
    FunctionState, GradientTuple, Node,
};
use crate::with_backend;

#[derive(Debug)]
struct Cache {
    backend: BackendKind,
    /// `sigmoid(x)` in the backend's domain.
    y: Buffer,
}

#[derive(Debug)]
pub struct SigmoidCrossEntropy {
    config: Config,
    state: FunctionState<Cache>,
}

impl SigmoidCrossEntropy {
    pub fn new(config: &Config) -> Self {
        SigmoidCrossEntropy {
            config: config.clone(),
            state: FunctionState::Ready,
        }
    }
}

fn forward_on<B: Backend>(x: &Buffer, t: &Buffer) -> Result<(Buffer, Buffer), Error> {
    let x = B::import(x)?;
    let t = B::import(t)?;
    let (loss, y) = B::sigmoid_cross_entropy(&x, &t)?;
    Ok((B::export(loss), B::export(y)))
}

fn backward_on<B: Backend>(y: &Buffer, t: &Buffer, gloss: &Buffer) -> Result<Buffer, Error> {
    let y = B::import(y)?;
    let t = B::import(t)?;
    let gloss = B::import(gloss)?;
    Ok(B::export(B::sigmoid_cross_entropy_backward(&y, &t, &gloss)?))
}

impl Function for SigmoidCrossEntropy {
    fn name(&self) -> &'static str {
        "SigmoidCrossEntropy"
    }

    fn differentiable(&self) -> &[bool] {
        &[true, false]
    }

    fn forward(&mut self, inputs: &[Buffer]) -> Result<Vec<Buffer>, Error> {
        check_arity(self, inputs)?;
        self.state.ensure_ready(self.name())?;
        let (x, t) = (&inputs[0], &inputs[1]);

        check_same_shape("sigmoid_cross_entropy", x.shape(), t.shape())?;
        check_dtype("sigmoid_cross_entropy logits", x, DType::F32)?;
        check_dtype("sigmoid_cross_entropy labels", t, DType::I32)?;
        batch_size("sigmoid_cross_entropy", x.shape())?;

        let backend = select_backend(inputs, &self.config)?;
        crate::debug_println!(
            "SigmoidCrossEntropy forward on {} for shape {:?}",
            backend,
            x.shape()
        );
        let (loss, y) = with_backend!(backend, B => forward_on::<B>(x, t))?;

        self.state.store(Cache { backend, y });
        Ok(vec![loss])
    }

    fn backward(
        &mut self,
        inputs: &[Buffer],
        grad_outputs: &[Buffer],
    ) -> Result<GradientTuple, Error> {
        check_arity(self, inputs)?;
        check_grad_outputs(self.name(), grad_outputs, 1)?;
        check_scalar_grad("sigmoid_cross_entropy gradient", &grad_outputs[0])?;
        let cache = self.state.take(self.name())?;

        let t = &inputs[1];
        let gx = with_backend!(cache.backend, B => backward_on::<B>(&cache.y, t, &grad_outputs[0]))?;
        Ok(vec![Some(gx), None])
    }
}

/// Mean sigmoid cross-entropy of logits `x` (`F32`) against labels `t` (`I32`).
///
/// Both must have the same shape with a non-empty leading axis. The loss is a
/// 0-d `F32` buffer.
pub fn sigmoid_cross_entropy(x: Buffer, t: Buffer, config: &Config) -> Result<Node, Error> {
    apply(SigmoidCrossEntropy::new(config), vec![x, t])
}
