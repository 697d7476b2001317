use rust_tensor_functions::backend::accel::{self, MdArray};
use rust_tensor_functions::backend::{accel_enabled, probe_domains, supports_accelerated_domains};
use rust_tensor_functions::{
    can_use_accelerated, select_backend, AccelPreference, Array, BackendKind, Buffer, Config,
    Error, StorageDomain,
};

fn host_buffer(n: usize) -> Buffer {
    Buffer::from(Array::zeros(&[n]))
}

fn accel_buffer(n: usize) -> Buffer {
    Buffer::from(MdArray::from_host(&Array::zeros(&[n])))
}

#[test]
fn test_never_disables_engine() {
    let config = Config::default().with_accel(AccelPreference::Never);
    assert!(!can_use_accelerated(&[host_buffer(4)], &config));
    assert!(!can_use_accelerated(&[accel_buffer(4)], &config));
    assert!(!can_use_accelerated(&[host_buffer(1 << 20)], &config));
}

#[test]
fn test_always_enables_engine_for_supported_domains() {
    let config = Config::default().with_accel(AccelPreference::Always);
    assert!(can_use_accelerated(&[host_buffer(1)], &config));
    assert!(can_use_accelerated(&[host_buffer(1), accel_buffer(1)], &config));
}

#[test]
fn test_device_domain_is_never_supported() {
    let domains = [StorageDomain::Host, StorageDomain::Device];
    assert!(!supports_accelerated_domains(&domains));

    let always = Config::default().with_accel(AccelPreference::Always);
    assert!(accel_enabled(&always, &domains, 2));
    assert!(!probe_domains(&always, &domains, 2));

    let auto = Config::default().with_accel_min_elements(0);
    assert!(!probe_domains(&auto, &[StorageDomain::Device], 1 << 20));
}

#[test]
fn test_auto_follows_size_threshold() {
    let config = Config::default().with_accel_min_elements(100);
    let domains = [StorageDomain::Host, StorageDomain::Host];
    assert!(!probe_domains(&config, &domains, 99));
    assert_eq!(probe_domains(&config, &domains, 100), accel::is_available());
}

#[test]
fn test_auto_follows_accelerated_inputs() {
    let config = Config::default().with_accel_min_elements(1000);
    assert!(!can_use_accelerated(&[host_buffer(3), host_buffer(3)], &config));
    assert_eq!(
        can_use_accelerated(&[host_buffer(3), accel_buffer(3)], &config),
        accel::is_available()
    );
}

#[test]
fn test_auto_without_threshold_follows_availability() {
    let config = Config::default();
    assert_eq!(config.accel_min_elements, 0);
    assert_eq!(
        can_use_accelerated(&[host_buffer(1)], &config),
        accel::is_available()
    );
    assert_eq!(can_use_accelerated(&[], &config), accel::is_available());
    assert!(supports_accelerated_domains(&[]));
}

#[test]
fn test_select_backend() -> Result<(), Error> {
    let inputs = [host_buffer(8)];

    let never = Config::default().with_accel(AccelPreference::Never);
    assert_eq!(select_backend(&inputs, &never)?, BackendKind::Host);

    let always = Config::default().with_accel(AccelPreference::Always);
    assert_eq!(select_backend(&inputs, &always)?, BackendKind::Accelerated);

    let auto_expected = if accel::is_available() {
        BackendKind::Accelerated
    } else {
        BackendKind::Host
    };
    assert_eq!(select_backend(&inputs, &Config::default())?, auto_expected);

    let thresholded = Config::default().with_accel_min_elements(9);
    assert_eq!(select_backend(&inputs, &thresholded)?, BackendKind::Host);
    Ok(())
}

#[test]
fn test_backend_kind_display() {
    assert_eq!(BackendKind::Host.to_string(), "host");
    assert_eq!(BackendKind::Accelerated.to_string(), "accelerated");
}

#[cfg(feature = "cuda")]
mod cuda {
    use super::*;
    use rust_tensor_functions::backend::cuda::{init_context, CudaContextGuard, DeviceArray};
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_all_device_inputs_stay_on_device() -> Result<(), Error> {
        init_context(0)?;
        let _guard = CudaContextGuard::new()?;
        let d = Buffer::from(DeviceArray::from_host(&Array::ones(&[4]))?);

        let never = Config::default().with_accel(AccelPreference::Never);
        assert_eq!(select_backend(&[d.clone(), d.clone()], &never)?, BackendKind::Device);
        assert!(!can_use_accelerated(&[d.clone()], &Config::default()));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_forced_engine_with_mixed_device_inputs_fails() -> Result<(), Error> {
        init_context(0)?;
        let _guard = CudaContextGuard::new()?;
        let d = Buffer::from(DeviceArray::from_host(&Array::ones(&[4]))?);

        let always = Config::default().with_accel(AccelPreference::Always);
        let result = select_backend(&[d, host_buffer(4)], &always);
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));

        let never = Config::default().with_accel(AccelPreference::Never);
        assert_eq!(
            select_backend(&[host_buffer(4), host_buffer(4)], &never)?,
            BackendKind::Host
        );
        Ok(())
    }
}
