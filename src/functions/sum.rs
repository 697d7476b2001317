use crate::backend::{select_backend, Backend, BackendKind};
use crate::buffer::Buffer;
use crate::config::Config;
use crate::error::Error;
use crate::functions::{
    apply, check_arity, check_grad_outputs, check_scalar_grad, Function, FunctionState,
    GradientTuple, Node,
};
use crate::with_backend;

/// Sum of every element into a 0-d buffer of the input's element type.
///
/// The gradient spreads the upstream scalar over the input's shape.
#[derive(Debug)]
pub struct Sum {
    config: Config,
    state: FunctionState<BackendKind>,
}

impl Sum {
    pub fn new(config: &Config) -> Self {
        Sum {
            config: config.clone(),
            state: FunctionState::Ready,
        }
    }
}

fn forward_on<B: Backend>(x: &Buffer) -> Result<Buffer, Error> {
    let x = B::import(x)?;
    Ok(B::export(B::sum_all(&x)?))
}

fn backward_on<B: Backend>(gy: &Buffer, input_shape: &[usize]) -> Result<Buffer, Error> {
    let gy = B::import(gy)?;
    Ok(B::export(B::sum_backward(&gy, input_shape)?))
}

impl Function for Sum {
    fn name(&self) -> &'static str {
        "Sum"
    }

    fn differentiable(&self) -> &[bool] {
        &[true]
    }

    fn forward(&mut self, inputs: &[Buffer]) -> Result<Vec<Buffer>, Error> {
        check_arity(self, inputs)?;
        self.state.ensure_ready(self.name())?;

        let backend = select_backend(inputs, &self.config)?;
        crate::debug_println!("Sum forward on {} for shape {:?}", backend, inputs[0].shape());
        let y = with_backend!(backend, B => forward_on::<B>(&inputs[0]))?;

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
        check_scalar_grad("sum gradient", &grad_outputs[0])?;
        let backend = self.state.take(self.name())?;

        let gx = with_backend!(backend, B => backward_on::<B>(&grad_outputs[0], inputs[0].shape()))?;
        Ok(vec![Some(gx)])
    }
}

pub fn sum(x: Buffer, config: &Config) -> Result<Node, Error> {
    apply(Sum::new(config), vec![x])
}
