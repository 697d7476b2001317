use crate::array::Array;
use crate::error::Error;
use rand_distr::{Bernoulli, Distribution, Uniform};

fn checked_size(shape: &[usize]) -> Result<usize, Error> {
    shape
        .iter()
        .try_fold(1usize, |acc, &x| acc.checked_mul(x))
        .ok_or_else(|| {
            Error::InvalidOperation("Shape dimensions multiply to overflow usize".to_string())
        })
}

/// Logits drawn from U(low, high). Returns an `F32` host array.
pub fn uniform(shape: &[usize], low: f32, high: f32) -> Result<Array, Error> {
    if !(low < high) {
        return Err(Error::InvalidOperation(format!(
            "uniform requires low < high, got [{}, {})",
            low, high
        )));
    }
    let dist = Uniform::new(low, high).map_err(|e| Error::InvalidOperation(e.to_string()))?;
    let size = checked_size(shape)?;

    let mut rng = rand::rng();
    let data: Vec<f32> = (0..size).map(|_| dist.sample(&mut rng)).collect();
    Array::from_vec(data, shape)
}

/// Binary labels, each 1 with probability `p`. Returns an `I32` host array.
pub fn binary_labels(shape: &[usize], p: f64) -> Result<Array, Error> {
    let dist = Bernoulli::new(p).map_err(|e| Error::InvalidOperation(e.to_string()))?;
    let size = checked_size(shape)?;

    let mut rng = rand::rng();
    let data: Vec<i32> = (0..size).map(|_| dist.sample(&mut rng) as i32).collect();
    Array::from_labels(data, shape)
}
