//! Differentiable functions and the contract they share.
//!
//! A [`Function`] is created per forward call. `forward` picks a backend,
//! runs the kernel and caches what backward needs; `backward` consumes that
//! cache on the same backend. Factories such as [`sigmoid_cross_entropy`]
//! return a [`Node`] that owns the function together with its inputs and
//! outputs.

use std::fmt::Debug;

use crate::buffer::{Buffer, DType};
use crate::error::Error;

pub mod sigmoid;
pub mod sigmoid_cross_entropy;
pub mod sum;
pub mod weighted_sum;

pub use sigmoid::{sigmoid, Sigmoid};
pub use sigmoid_cross_entropy::{sigmoid_cross_entropy, SigmoidCrossEntropy};
pub use sum::{sum, Sum};
pub use weighted_sum::{add_n, weighted_sum, WeightedSum};

/// Per-input gradients, aligned with the forward inputs. `None` marks an
/// input that is not differentiable.
pub type GradientTuple = Vec<Option<Buffer>>;

pub trait Function: Debug {
    fn name(&self) -> &'static str;

    /// One flag per input position. Its length is the function's arity.
    fn differentiable(&self) -> &[bool];

    fn forward(&mut self, inputs: &[Buffer]) -> Result<Vec<Buffer>, Error>;

    /// Called at most once, after `forward`, with the same inputs.
    fn backward(
        &mut self,
        inputs: &[Buffer],
        grad_outputs: &[Buffer],
    ) -> Result<GradientTuple, Error>;
}

/// Lifecycle of a function instance.
#[derive(Debug)]
pub enum FunctionState<C> {
    Ready,
    AwaitingBackward(C),
    Consumed,
}

impl<C> Default for FunctionState<C> {
    fn default() -> Self {
        FunctionState::Ready
    }
}

impl<C> FunctionState<C> {
    /// Fails unless forward has not run yet.
    pub fn ensure_ready(&self, function: &str) -> Result<(), Error> {
        match self {
            FunctionState::Ready => Ok(()),
            _ => Err(Error::InvalidState(format!(
                "{}: forward called twice on the same instance",
                function
            ))),
        }
    }

    pub fn store(&mut self, cache: C) {
        *self = FunctionState::AwaitingBackward(cache);
    }

    /// Hands the forward cache to backward, exactly once.
    pub fn take(&mut self, function: &str) -> Result<C, Error> {
        match std::mem::replace(self, FunctionState::Consumed) {
            FunctionState::AwaitingBackward(cache) => Ok(cache),
            FunctionState::Ready => {
                *self = FunctionState::Ready;
                Err(Error::InvalidState(format!(
                    "{}: backward called before forward",
                    function
                )))
            }
            FunctionState::Consumed => Err(Error::InvalidState(format!(
                "{}: backward called more than once",
                function
            ))),
        }
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self, FunctionState::Consumed)
    }
}

pub(crate) fn check_arity<F: Function + ?Sized>(function: &F, inputs: &[Buffer]) -> Result<(), Error> {
    let expected = function.differentiable().len();
    if inputs.len() != expected {
        return Err(Error::ArityMismatch {
            function: function.name().to_string(),
            expected,
            actual: inputs.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_grad_outputs(function: &str, grad_outputs: &[Buffer], expected: usize) -> Result<(), Error> {
    if grad_outputs.len() != expected {
        return Err(Error::InvalidOperation(format!(
            "{} produces {} output(s) but got {} upstream gradient(s)",
            function,
            expected,
            grad_outputs.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_dtype(op: &str, buffer: &Buffer, expected: DType) -> Result<(), Error> {
    if buffer.dtype() != expected {
        return Err(crate::array::dtype_err(op, expected, buffer.dtype()));
    }
    Ok(())
}

/// Upstream gradient of a 0-d output.
pub(crate) fn check_scalar_grad(op: &str, grad: &Buffer) -> Result<(), Error> {
    if grad.size() != 1 {
        return Err(Error::ShapeMismatch {
            expected: vec![],
            actual: grad.shape().to_vec(),
        });
    }
    check_dtype(op, grad, DType::F32)
}

/// A function applied to concrete inputs.
#[derive(Debug)]
pub struct Node {
    function: Box<dyn Function>,
    inputs: Vec<Buffer>,
    outputs: Vec<Buffer>,
}

/// Runs `function` forward on `inputs`.
pub fn apply<F: Function + 'static>(mut function: F, inputs: Vec<Buffer>) -> Result<Node, Error> {
    let outputs = function.forward(&inputs)?;
    crate::debug_println!(
        "{} forward produced {} output(s)",
        function.name(),
        outputs.len()
    );
    Ok(Node {
        function: Box::new(function),
        inputs,
        outputs,
    })
}

impl Node {
    pub fn function_name(&self) -> &'static str {
        self.function.name()
    }

    pub fn inputs(&self) -> &[Buffer] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Buffer] {
        &self.outputs
    }

    /// The first output; every function here has exactly one.
    pub fn output(&self) -> &Buffer {
        &self.outputs[0]
    }

    pub fn into_output(mut self) -> Buffer {
        self.outputs.swap_remove(0)
    }

    /// Runs backward, consuming the node.
    pub fn backward(mut self, grad_outputs: &[Buffer]) -> Result<GradientTuple, Error> {
        let grads = self.function.backward(&self.inputs, grad_outputs)?;
        let differentiable = self.function.differentiable();
        if grads.len() != differentiable.len() {
            return Err(Error::InternalLogicError(format!(
                "{} returned {} gradients for {} inputs",
                self.function.name(),
                grads.len(),
                differentiable.len()
            )));
        }
        for (i, (grad, &flag)) in grads.iter().zip(differentiable).enumerate() {
            if grad.is_some() && !flag {
                return Err(Error::InternalLogicError(format!(
                    "{} returned a gradient for non-differentiable input {}",
                    self.function.name(),
                    i
                )));
            }
        }
        Ok(grads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_allows_one_backward() {
        let mut state: FunctionState<u32> = FunctionState::default();
        assert!(state.ensure_ready("f").is_ok());
        state.store(7);
        assert!(state.ensure_ready("f").is_err());
        assert_eq!(state.take("f").unwrap(), 7);
        assert!(state.is_consumed());
        assert!(matches!(state.take("f"), Err(Error::InvalidState(_))));
    }

    #[test]
    fn backward_before_forward_keeps_state_ready() {
        let mut state: FunctionState<u32> = FunctionState::Ready;
        assert!(matches!(state.take("f"), Err(Error::InvalidState(_))));
        assert!(state.ensure_ready("f").is_ok());
    }
}
