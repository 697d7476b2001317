use crate::backend::{check_same_shape, select_backend, Backend, BackendKind};
use crate::buffer::{Buffer, DType};
use crate::config::Config;
use crate::error::Error;
use crate::functions::{
    apply, check_arity, check_dtype, check_grad_outputs, Function, FunctionState, GradientTuple,
    Node,
};
use crate::with_backend;

#[derive(Debug)]
struct Cache {
    backend: BackendKind,
    y: Buffer,
}

/// Elementwise logistic function `1 / (1 + exp(-x))`.
#[derive(Debug)]
pub struct Sigmoid {
    config: Config,
    state: FunctionState<Cache>,
}

impl Sigmoid {
    pub fn new(config: &Config) -> Self {
        Sigmoid {
            config: config.clone(),
            state: FunctionState::Ready,
        }
    }
}

fn forward_on<B: Backend>(x: &Buffer) -> Result<Buffer, Error> {
    let x = B::import(x)?;
    Ok(B::export(B::sigmoid(&x)?))
}

fn backward_on<B: Backend>(y: &Buffer, gy: &Buffer) -> Result<Buffer, Error> {
    let y = B::import(y)?;
    let gy = B::import(gy)?;
    Ok(B::export(B::sigmoid_backward(&y, &gy)?))
}

impl Function for Sigmoid {
    fn name(&self) -> &'static str {
        "Sigmoid"
    }

    fn differentiable(&self) -> &[bool] {
        &[true]
    }

    fn forward(&mut self, inputs: &[Buffer]) -> Result<Vec<Buffer>, Error> {
        check_arity(self, inputs)?;
        self.state.ensure_ready(self.name())?;
        check_dtype("sigmoid", &inputs[0], DType::F32)?;

        let backend = select_backend(inputs, &self.config)?;
        let y = with_backend!(backend, B => forward_on::<B>(&inputs[0]))?;

        self.state.store(Cache {
            backend,
            y: y.clone(),
        });
        Ok(vec![y])
    }

    fn backward(
        &mut self,
        inputs: &[Buffer],
        grad_outputs: &[Buffer],
    ) -> Result<GradientTuple, Error> {
        check_arity(self, inputs)?;
        check_grad_outputs(self.name(), grad_outputs, 1)?;
        let gy = &grad_outputs[0];
        check_same_shape("sigmoid gradient", inputs[0].shape(), gy.shape())?;
        check_dtype("sigmoid gradient", gy, DType::F32)?;
        let cache = self.state.take(self.name())?;

        let gx = with_backend!(cache.backend, B => backward_on::<B>(&cache.y, gy))?;
        Ok(vec![Some(gx)])
    }
}

pub fn sigmoid(x: Buffer, config: &Config) -> Result<Node, Error> {
    apply(Sigmoid::new(config), vec![x])
}
