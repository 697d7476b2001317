use crate::array::Array;
use crate::buffer::{Buffer, DType};
use crate::functions::{apply, Function};
use crate::Error;

/// Checks the analytical gradient of a function against central differences.
///
/// # Arguments
/// * `make`: builds a fresh function instance; one is needed per evaluation.
/// * `inputs`: forward inputs. The checked input must be `F32`.
/// * `input_idx_to_check`: which input to perturb.
/// * `epsilon`: finite difference step (e.g. 1e-3).
/// * `tolerance`: maximum relative error (absolute for near-zero gradients).
///
/// The objective is the sum of every element of the first output, so the
/// analytical gradient is seeded with ones.
pub fn check_gradient<F, M>(
    make: M,
    inputs: &[Buffer],
    input_idx_to_check: usize,
    epsilon: f32,
    tolerance: f32,
) -> Result<(), Error>
where
    F: Function + 'static,
    M: Fn() -> F,
{
    if input_idx_to_check >= inputs.len() {
        return Err(Error::InvalidOperation(format!(
            "input_idx_to_check ({}) is out of bounds for inputs slice (len {})",
            input_idx_to_check,
            inputs.len()
        )));
    }
    if inputs[input_idx_to_check].dtype() != DType::F32 {
        return Err(Error::InvalidOperation(format!(
            "input {} is not floating point, cannot perturb it",
            input_idx_to_check
        )));
    }

    let analytical = compute_analytical_gradient(&make, inputs, input_idx_to_check)?;
    let numerical = compute_numerical_gradient(&make, inputs, input_idx_to_check, epsilon)?;
    compare_gradients(&analytical, &numerical, tolerance)
}

fn objective<F, M>(make: &M, inputs: Vec<Buffer>) -> Result<f64, Error>
where
    F: Function + 'static,
    M: Fn() -> F,
{
    let node = apply(make(), inputs)?;
    Ok(node
        .output()
        .to_vec_f32()?
        .iter()
        .map(|&v| v as f64)
        .sum())
}

fn compute_analytical_gradient<F, M>(
    make: &M,
    inputs: &[Buffer],
    input_idx_to_check: usize,
) -> Result<Vec<f32>, Error>
where
    F: Function + 'static,
    M: Fn() -> F,
{
    let node = apply(make(), inputs.to_vec())?;
    let seed = Buffer::from(Array::ones(node.output().shape()));
    let grads = node.backward(&[seed])?;

    match grads.into_iter().nth(input_idx_to_check).flatten() {
        Some(grad) => grad.to_vec_f32(),
        None => Err(Error::InvalidOperation(format!(
            "input {} received no gradient",
            input_idx_to_check
        ))),
    }
}

fn compute_numerical_gradient<F, M>(
    make: &M,
    original_inputs: &[Buffer],
    input_idx_to_check: usize,
    epsilon: f32,
) -> Result<Vec<f32>, Error>
where
    F: Function + 'static,
    M: Fn() -> F,
{
    let target = &original_inputs[input_idx_to_check];
    let shape = target.shape().to_vec();
    let original_data = target.to_vec_f32()?;

    let mut numerical = vec![0.0f32; original_data.len()];
    for (i, grad) in numerical.iter_mut().enumerate() {
        let perturbed = |delta: f32| -> Result<f64, Error> {
            let mut data = original_data.clone();
            data[i] += delta;
            let mut inputs = original_inputs.to_vec();
            inputs[input_idx_to_check] = Buffer::from(Array::from_vec(data, &shape)?);
            objective(make, inputs)
        };
        let plus = perturbed(epsilon)?;
        let minus = perturbed(-epsilon)?;
        *grad = ((plus - minus) / (2.0 * epsilon as f64)) as f32;
    }
    Ok(numerical)
}

fn compare_gradients(analytical: &[f32], numerical: &[f32], tolerance: f32) -> Result<(), Error> {
    if analytical.len() != numerical.len() {
        return Err(Error::InternalLogicError(format!(
            "Gradient size mismatch: analytical size={}, numerical size={}",
            analytical.len(),
            numerical.len()
        )));
    }

    let mut max_rel_err = 0.0;
    let mut max_abs_err = 0.0;
    let mut max_err_idx = 0;

    for (i, (a, n)) in analytical.iter().zip(numerical.iter()).enumerate() {
        let abs_err = (a - n).abs();
        let rel_err = if a.abs() > 1e-3 && n.abs() > 1e-3 {
            abs_err / a.abs().max(n.abs())
        } else {
            abs_err
        };

        if rel_err > max_rel_err {
            max_rel_err = rel_err;
            max_abs_err = abs_err;
            max_err_idx = i;
        }
    }

    if max_rel_err <= tolerance {
        Ok(())
    } else {
        Err(Error::GradientCheckError {
            analytical: analytical.to_vec(),
            numerical: numerical.to_vec(),
            max_rel_error: max_rel_err,
            max_abs_error: max_abs_err,
            at_index: max_err_idx,
        })
    }
}

pub fn assert_buffer_eq(a: &Buffer, b: &Buffer) {
    assert_eq!(a.shape(), b.shape(), "Buffer shapes don't match");
    let a_data = a.to_vec_f32().unwrap();
    let b_data = b.to_vec_f32().unwrap();
    for (i, (a_val, b_val)) in a_data.iter().zip(b_data.iter()).enumerate() {
        assert_eq!(
            *a_val, *b_val,
            "Values at index {i} don't match: a={a_val}, b={b_val}"
        );
    }
}

/// Relative closeness, falling back to absolute near zero.
pub fn assert_buffer_close(a: &Buffer, b: &Buffer, rel_tol: f32) {
    assert_eq!(a.shape(), b.shape(), "Buffer shapes don't match");
    let a_data = a.to_vec_f32().unwrap();
    let b_data = b.to_vec_f32().unwrap();
    for (i, (a_val, b_val)) in a_data.iter().zip(b_data.iter()).enumerate() {
        let diff = (a_val - b_val).abs();
        let scale = a_val.abs().max(b_val.abs()).max(1.0);
        assert!(
            diff <= rel_tol * scale,
            "Values at index {i} aren't close enough: a={a_val}, b={b_val}, diff={diff}, rel_tol={rel_tol}"
        );
    }
}
