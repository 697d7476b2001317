#![cfg(feature = "accel")]

use rust_tensor_functions::backend::accel::MdArray;
use rust_tensor_functions::init::{binary_labels, uniform};
use rust_tensor_functions::test_utils::assert_buffer_close;
use rust_tensor_functions::{
    add_n, sigmoid, sigmoid_cross_entropy, sum, weighted_sum, AccelPreference, Array, Buffer,
    Config, Error, StorageDomain,
};

const REL_TOL: f32 = 1e-5;

fn host() -> Config {
    Config::default().with_accel(AccelPreference::Never)
}

fn accel() -> Config {
    Config::default().with_accel(AccelPreference::Always)
}

fn random_logits(shape: &[usize]) -> Result<Buffer, Error> {
    Ok(Buffer::from(uniform(shape, -6.0, 6.0)?))
}

fn random_labels(shape: &[usize]) -> Result<Buffer, Error> {
    Ok(Buffer::from(binary_labels(shape, 0.5)?))
}

#[test]
fn test_sigmoid_cross_entropy_agrees_across_backends() -> Result<(), Error> {
    for shape in [vec![1, 1], vec![7, 3], vec![64, 129], vec![5, 2, 4]] {
        let x = random_logits(&shape)?;
        let t = random_labels(&shape)?;
        let seed = Buffer::from(Array::scalar(0.75));

        let on_host = sigmoid_cross_entropy(x.clone(), t.clone(), &host())?;
        let on_accel = sigmoid_cross_entropy(x, t, &accel())?;
        assert_eq!(on_host.output().domain(), StorageDomain::Host);
        assert_eq!(on_accel.output().domain(), StorageDomain::Accelerated);
        assert_eq!(on_accel.output().shape(), &[] as &[usize]);
        assert_buffer_close(on_host.output(), on_accel.output(), REL_TOL);

        let g_host = on_host.backward(&[seed.clone()])?;
        let g_accel = on_accel.backward(&[seed])?;
        assert!(g_host[1].is_none() && g_accel[1].is_none());
        let (g_host, g_accel) = (g_host[0].as_ref().unwrap(), g_accel[0].as_ref().unwrap());
        assert_eq!(g_accel.domain(), StorageDomain::Accelerated);
        assert_buffer_close(g_host, g_accel, REL_TOL);
    }
    Ok(())
}

#[test]
fn test_sum_agrees_across_backends() -> Result<(), Error> {
    let x = Buffer::from(uniform(&[33, 17], -1.0, 1.0)?);
    let on_host = sum(x.clone(), &host())?;
    let on_accel = sum(x, &accel())?;
    assert_buffer_close(on_host.output(), on_accel.output(), REL_TOL);

    let seed = Buffer::from(Array::scalar(-2.0));
    let g_host = on_host.backward(&[seed.clone()])?;
    let g_accel = on_accel.backward(&[seed])?;
    assert_buffer_close(
        g_host[0].as_ref().unwrap(),
        g_accel[0].as_ref().unwrap(),
        REL_TOL,
    );
    Ok(())
}

#[test]
fn test_integer_sum_agrees_across_backends() -> Result<(), Error> {
    let t = Buffer::from(binary_labels(&[100, 3], 0.3)?);
    let on_host = sum(t.clone(), &host())?;
    let on_accel = sum(t, &accel())?;
    assert_eq!(
        on_host.output().to_host()?,
        on_accel.output().to_host()?
    );
    Ok(())
}

#[test]
fn test_weighted_sum_is_bit_identical_across_backends() -> Result<(), Error> {
    let xs: Vec<Buffer> = (0..4)
        .map(|_| uniform(&[16, 9], -3.0, 3.0).map(Buffer::from))
        .collect::<Result<_, _>>()?;
    let scales = vec![0.1, -1.7, 3.0, 0.25];

    let on_host = weighted_sum(xs.clone(), scales.clone(), &host())?;
    let on_accel = weighted_sum(xs, scales, &accel())?;
    // Both accumulate left to right in f32.
    assert_eq!(
        on_host.output().to_vec_f32()?,
        on_accel.output().to_vec_f32()?
    );

    let gy = Buffer::from(uniform(&[16, 9], -1.0, 1.0)?);
    let g_host = on_host.backward(&[gy.clone()])?;
    let g_accel = on_accel.backward(&[gy])?;
    for (h, a) in g_host.iter().zip(&g_accel) {
        assert_buffer_close(h.as_ref().unwrap(), a.as_ref().unwrap(), REL_TOL);
    }
    Ok(())
}

#[test]
fn test_sigmoid_agrees_across_backends() -> Result<(), Error> {
    let x = random_logits(&[10, 10])?;
    let on_host = sigmoid(x.clone(), &host())?;
    let on_accel = sigmoid(x, &accel())?;
    assert_buffer_close(on_host.output(), on_accel.output(), REL_TOL);

    let gy = Buffer::from(Array::ones(&[10, 10]));
    let g_host = on_host.backward(&[gy.clone()])?;
    let g_accel = on_accel.backward(&[gy])?;
    assert_buffer_close(
        g_host[0].as_ref().unwrap(),
        g_accel[0].as_ref().unwrap(),
        REL_TOL,
    );
    Ok(())
}

#[test]
fn test_accelerated_inputs_pick_engine_under_auto() -> Result<(), Error> {
    let a = Buffer::from(MdArray::from_vec(vec![1.0, 2.0], &[2])?);
    let b = Buffer::from(Array::from_vec(vec![3.0, 4.0], &[2])?);
    let node = add_n(vec![a, b], &Config::default())?;
    assert_eq!(node.output().domain(), StorageDomain::Accelerated);
    assert_eq!(node.output().to_vec_f32()?, vec![4.0, 6.0]);
    Ok(())
}

#[test]
fn test_large_host_inputs_pick_engine_under_auto() -> Result<(), Error> {
    let config = Config::default().with_accel_min_elements(64);
    let small = sum(Buffer::from(Array::ones(&[8])), &config)?;
    let large = sum(Buffer::from(Array::ones(&[8, 8])), &config)?;
    assert_eq!(small.output().domain(), StorageDomain::Host);
    assert_eq!(large.output().domain(), StorageDomain::Accelerated);
    Ok(())
}

#[test]
fn test_engine_outputs_do_not_alias_inputs() -> Result<(), Error> {
    let x = MdArray::from_vec(vec![1.0, -1.0, 0.5], &[3])?;
    let node = weighted_sum(vec![Buffer::from(x.clone())], vec![1.0], &accel())?;
    let y = node.output().as_accelerated().unwrap();
    assert!(!y.shares_memory(&x));
    assert_eq!(x.to_host()?.to_vec_f32(), vec![1.0, -1.0, 0.5]);
    Ok(())
}

#[test]
fn test_empty_sum_is_positive_zero_on_both_backends() -> Result<(), Error> {
    let x = Buffer::from(Array::from_vec(vec![], &[0, 4])?);
    for config in [host(), accel()] {
        let node = sum(x.clone(), &config)?;
        let value = node.output().to_vec_f32()?;
        assert_eq!(value.len(), 1);
        assert_eq!(value[0].to_bits(), 0, "expected +0.0, got {:?}", value[0]);

        let grads = node.backward(&[Buffer::from(Array::scalar(1.0))])?;
        assert_eq!(grads[0].as_ref().unwrap().shape(), &[0, 4]);
    }

    let t = Buffer::from(Array::from_labels(vec![], &[0])?);
    let on_accel = sum(t, &accel())?;
    assert_eq!(on_accel.output().domain(), StorageDomain::Accelerated);
    assert_eq!(on_accel.output().to_vec_f32()?, vec![0.0]);
    Ok(())
}

#[test]
fn test_default_auto_picks_engine_for_small_host_inputs() -> Result<(), Error> {
    let node = sum(Buffer::from(Array::ones(&[2, 3])), &Config::default())?;
    assert_eq!(node.output().domain(), StorageDomain::Accelerated);
    assert_eq!(node.output().to_vec_f32()?, vec![6.0]);
    Ok(())
}
