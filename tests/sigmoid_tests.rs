use approx::assert_relative_eq;
use rust_tensor_functions::functions::Sigmoid;
use rust_tensor_functions::test_utils::check_gradient;
use rust_tensor_functions::{sigmoid, AccelPreference, Array, Buffer, Config, Error};

fn host_config() -> Config {
    Config::default().with_accel(AccelPreference::Never)
}

#[test]
fn test_sigmoid_forward_backward() -> Result<(), Error> {
    let x = Buffer::from(Array::from_vec(vec![0.0, 1.0, -1.0], &[3])?);
    let node = sigmoid(x, &host_config())?;
    let y = node.output().to_vec_f32()?;
    assert_relative_eq!(y[0], 0.5);
    assert_relative_eq!(y[1], 0.731_058_6, max_relative = 1e-6);
    assert_relative_eq!(y[1] + y[2], 1.0, max_relative = 1e-6);

    let grads = node.backward(&[Buffer::from(Array::full(&[3], 2.0))])?;
    let gx = grads[0].as_ref().unwrap().to_vec_f32()?;
    for (g, y) in gx.iter().zip(&y) {
        assert_relative_eq!(*g, 2.0 * y * (1.0 - y), max_relative = 1e-6);
    }
    Ok(())
}

#[test]
fn test_gradient_check() -> Result<(), Error> {
    let config = host_config();
    let x = Buffer::from(Array::from_vec(vec![-2.0, -0.3, 0.0, 0.8, 3.0], &[5])?);
    check_gradient(|| Sigmoid::new(&config), &[x], 0, 1e-2, 1e-2)?;
    Ok(())
}

#[test]
fn test_integer_input_is_rejected() {
    let t = Buffer::from(Array::from_labels(vec![1, 0], &[2]).unwrap());
    assert!(matches!(
        sigmoid(t, &host_config()),
        Err(Error::DTypeMismatch { .. })
    ));
}
