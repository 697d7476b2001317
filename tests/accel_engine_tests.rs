#![cfg(feature = "accel")]

use approx::assert_abs_diff_eq;
use rust_tensor_functions::backend::accel::{
    logistic_loss, reduction, sum, Engine, MdArray, MemoryDesc, Primitive, Stream,
};
use rust_tensor_functions::{Array, DType, Error};

#[test]
fn test_engine_thread_count() -> Result<(), Error> {
    let engine = Engine::with_threads(2)?;
    assert_eq!(engine.num_threads(), 2);
    assert!(Engine::cpu()?.num_threads() >= 1);
    Ok(())
}

#[test]
fn test_chained_primitives_in_one_submission() -> Result<(), Error> {
    let engine = Engine::cpu()?;
    let a = MdArray::from_vec(vec![1.0, 2.0, 3.0], &[3])?;
    let b = MdArray::from_vec(vec![10.0, 20.0, 30.0], &[3])?;

    let sum_pd = sum::PrimitiveDesc::new(&[1.0, 0.5], &[a.desc().clone(), b.desc().clone()])?;
    let ab = MdArray::new(sum_pd.dst_desc().clone());
    let red_pd = reduction::PrimitiveDesc::new(ab.desc());
    let total = MdArray::new(red_pd.dst_desc().clone());

    let primitives = vec![
        Box::new(sum::Sum::new(&sum_pd, &[&a, &b], &ab)?) as Box<dyn Primitive>,
        Box::new(reduction::Reduction::new(&red_pd, &ab, &total)?) as Box<dyn Primitive>,
    ];
    let mut stream = Stream::new(&engine);
    stream.submit(primitives);
    assert_eq!(stream.pending(), 1);
    stream.wait()?;
    assert_eq!(stream.pending(), 0);

    assert_eq!(ab.to_host()?.to_vec_f32(), vec![6.0, 12.0, 18.0]);
    assert_eq!(total.to_host()?.to_vec_f32(), vec![36.0]);
    assert!(total.shape().is_empty());
    Ok(())
}

#[test]
fn test_integer_reduction() -> Result<(), Error> {
    let engine = Engine::cpu()?;
    let t = MdArray::from_host(&Array::from_labels(vec![3, -1, 4, 1, -5], &[5])?);
    let pd = reduction::PrimitiveDesc::new(t.desc());
    assert_eq!(pd.dst_desc().dtype(), DType::I32);
    let dst = MdArray::new(pd.dst_desc().clone());

    Stream::new(&engine)
        .submit(vec![
            Box::new(reduction::Reduction::new(&pd, &t, &dst)?) as Box<dyn Primitive>
        ])
        .wait()?;
    assert_eq!(dst.to_host()?.to_vec_f32(), vec![2.0]);
    Ok(())
}

#[test]
fn test_logistic_loss_at_zero_logits() -> Result<(), Error> {
    let engine = Engine::cpu()?;
    let x = MdArray::from_vec(vec![0.0; 6], &[3, 2])?;
    let t = MdArray::from_host(&Array::from_labels(vec![1, 0, 0, 1, 1, 1], &[3, 2])?);

    let pd = logistic_loss::ForwardDesc::new(x.desc(), t.desc())?;
    let loss = MdArray::new(pd.dst_desc().clone());
    let y = MdArray::new(pd.workspace_desc().clone());
    Stream::new(&engine)
        .submit(vec![
            Box::new(logistic_loss::Forward::new(&pd, &x, &t, &loss, &y)?) as Box<dyn Primitive>
        ])
        .wait()?;

    // Six elements of ln 2 over a batch of three.
    let value = loss.to_host()?.scalar_value()?;
    assert_abs_diff_eq!(value, 2.0 * 2f32.ln(), epsilon = 1e-6);
    assert_eq!(y.to_host()?.to_vec_f32(), vec![0.5; 6]);
    Ok(())
}

#[test]
fn test_destination_must_match_descriptor() -> Result<(), Error> {
    let a = MdArray::from_vec(vec![1.0, 2.0], &[2])?;
    let pd = sum::PrimitiveDesc::new(&[1.0], &[a.desc().clone()])?;
    let wrong = MdArray::new(MemoryDesc::new(&[3], DType::F32));
    assert!(matches!(
        sum::Sum::new(&pd, &[&a], &wrong),
        Err(Error::InvalidOperation(_))
    ));
    Ok(())
}

#[test]
fn test_destination_must_not_alias_sources() -> Result<(), Error> {
    let a = MdArray::from_vec(vec![1.0, 2.0], &[2])?;
    let pd = sum::PrimitiveDesc::new(&[2.0], &[a.desc().clone()])?;
    let alias = a.clone();
    assert!(alias.shares_memory(&a));
    assert!(matches!(
        sum::Sum::new(&pd, &[&a], &alias),
        Err(Error::InvalidOperation(_))
    ));
    Ok(())
}

#[test]
fn test_descriptor_rejects_integer_sources() {
    let desc = MemoryDesc::new(&[2], DType::I32);
    assert!(matches!(
        sum::PrimitiveDesc::new(&[1.0], &[desc]),
        Err(Error::DTypeMismatch { .. })
    ));
}

#[test]
fn test_loss_descriptor_rejects_empty_batch() {
    let x = MemoryDesc::new(&[0, 4], DType::F32);
    let t = MemoryDesc::new(&[0, 4], DType::I32);
    assert!(matches!(
        logistic_loss::ForwardDesc::new(&x, &t),
        Err(Error::EmptyTensor)
    ));
}
