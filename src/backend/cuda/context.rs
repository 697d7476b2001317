// CUDA context management: device initialization, the shared stream, the
// cuBLAS handle and the compiled function kernels.

use super::kernels::{FUNCTIONS_PTX, FUNCTION_KERNELS};
use crate::error::Error;
use cublas_sys;
use cust::context::{Context, CurrentContext};
use cust::device::Device;
use cust::function::Function;
use cust::module::Module;
use cust::stream::{Stream, StreamFlags};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

struct SendSyncRawHandle(cublas_sys::cublasHandle_t);
unsafe impl Send for SendSyncRawHandle {}
unsafe impl Sync for SendSyncRawHandle {}

// Fields drop in declaration order; the context must go last.
pub struct CudaContext {
    kernels: HashMap<String, Function<'static>>,
    // Kept alive for the kernels borrowed from it.
    _module: Option<Arc<Module>>,
    cublas_handle: SendSyncRawHandle,
    stream: Stream,
    #[allow(dead_code)]
    device: Device,
    pub(crate) _context: Context,
}

lazy_static! {
    static ref GLOBAL_CUDA_CONTEXT: Mutex<Option<Arc<CudaContext>>> = Mutex::new(None);
    static ref CUDA_INIT: Once = Once::new();
}

impl CudaContext {
    fn new(device_id: u32) -> Result<Self, Error> {
        cust::init(cust::CudaFlags::empty())?;
        let device = Device::get_device(device_id)?;
        let context = Context::new(device)?;
        let stream = Stream::new(StreamFlags::DEFAULT, None)?;

        let mut handle = std::ptr::null_mut();
        unsafe {
            let status = cublas_sys::cublasCreate_v2(&mut handle);
            if status != cublas_sys::cublasStatus_t::CUBLAS_STATUS_SUCCESS {
                return Err(Error::CublasError(format!(
                    "Failed to create cuBLAS handle: {:?}",
                    status
                )));
            }
        }

        let mut instance = Self {
            kernels: HashMap::new(),
            _module: None,
            cublas_handle: SendSyncRawHandle(handle),
            stream,
            device,
            _context: context,
        };

        instance.load_kernels()?;
        debug_println!(
            "[CudaContext] Loaded kernels: {:?}",
            instance.kernels.keys().collect::<Vec<_>>()
        );
        Ok(instance)
    }

    fn load_kernels(&mut self) -> Result<(), Error> {
        CurrentContext::set_current(&self._context)?;

        let module = Arc::new(
            Module::from_ptx(FUNCTIONS_PTX, &[])
                .map_err(|e| Error::CudaError(format!("Failed to load functions module: {}", e)))?,
        );

        for &kernel_name in FUNCTION_KERNELS {
            let func = module.get_function(kernel_name).map_err(|e| {
                Error::CudaError(format!("Failed to load kernel '{}': {}", kernel_name, e))
            })?;
            // The module is stored next to its kernels and outlives them.
            let static_func =
                unsafe { std::mem::transmute::<Function<'_>, Function<'static>>(func) };
            self.kernels.insert(kernel_name.to_string(), static_func);
        }

        self._module = Some(module);
        Ok(())
    }

    pub fn get_stream(&self) -> &Stream {
        &self.stream
    }

    pub fn get_cublas_handle(&self) -> cublas_sys::cublasHandle_t {
        self.cublas_handle.0
    }

    pub fn get_kernel(&self, name: &str) -> Result<&Function<'static>, Error> {
        self.kernels
            .get(name)
            .ok_or_else(|| Error::CudaError(format!("{} not found in functions.ptx", name)))
    }
}

impl Drop for CudaContext {
    fn drop(&mut self) {
        unsafe {
            cublas_sys::cublasDestroy_v2(self.cublas_handle.0);
        }
        debug_println!("Dropping CudaContext");
    }
}

pub fn init_context(device_id: u32) -> Result<(), Error> {
    CUDA_INIT.call_once(|| {
        let mut global_ctx_guard = match GLOBAL_CUDA_CONTEXT.lock() {
            Ok(guard) => guard,
            Err(_) => {
                eprintln!("FATAL: CUDA context mutex was poisoned during initialization");
                return;
            }
        };

        if global_ctx_guard.is_none() {
            debug_println!("Initializing CUDA context for device {}...", device_id);
            match CudaContext::new(device_id) {
                Ok(context) => *global_ctx_guard = Some(Arc::new(context)),
                Err(e) => eprintln!("FATAL: Failed to initialize CUDA context: {}", e),
            }
        }
    });

    let guard = GLOBAL_CUDA_CONTEXT.lock().map_err(|_| {
        Error::InternalLogicError("CUDA context mutex was poisoned".to_string())
    })?;
    if guard.is_some() {
        Ok(())
    } else {
        Err(Error::CudaError(
            "CUDA context initialization failed or context is not available.".into(),
        ))
    }
}

pub fn get_global_context() -> Result<Arc<CudaContext>, Error> {
    let global_ctx = GLOBAL_CUDA_CONTEXT
        .lock()
        .map_err(|_| Error::InternalLogicError("CUDA context mutex was poisoned".to_string()))?;

    global_ctx.as_ref().cloned().ok_or_else(|| {
        Error::CudaError("CUDA context not initialized. Call init_context first.".into())
    })
}

/// Makes the global context current on this thread while alive.
pub struct CudaContextGuard {
    _context_arc: Arc<CudaContext>,
}

impl CudaContextGuard {
    pub fn new() -> Result<Self, Error> {
        let context = get_global_context()?;
        CurrentContext::set_current(&context._context).map_err(|e| {
            Error::InternalLogicError(format!("Failed to set current CUDA context: {}", e))
        })?;
        debug_println!(
            "[CudaContextGuard::new] context current on thread {:?}",
            std::thread::current().id()
        );
        Ok(CudaContextGuard {
            _context_arc: context,
        })
    }
}
