use std::env;
use std::path::PathBuf;
use std::process::Command;

const KERNEL_SOURCE: &str = "src/backend/cuda/kernels/functions.cu";

fn main() {
    if env::var("CARGO_FEATURE_CUDA").is_err() {
        return;
    }

    // Configure cuBLAS linking
    if let Ok(lib_dir) = env::var("CUBLAS_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", lib_dir);
    }
    if env::var("CUBLAS_STATIC").is_ok() {
        println!("cargo:rustc-link-lib=static=cublas");
    } else {
        println!("cargo:rustc-link-lib=dylib=cublas");
    }
    println!("cargo:rerun-if-env-changed=CUBLAS_LIB_DIR");
    println!("cargo:rerun-if-env-changed=CUBLAS_STATIC");
    println!("cargo:rerun-if-env-changed=CUDA_PATH");

    // Find nvcc - `which` first, then CUDA_PATH and common install locations
    let nvcc_path = match which::which("nvcc") {
        Ok(path) => path,
        Err(_) => {
            if let Ok(cuda_path) = env::var("CUDA_PATH") {
                PathBuf::from(cuda_path).join("bin").join("nvcc")
            } else {
                ["/usr/local/cuda/bin/nvcc", "/opt/cuda/bin/nvcc"]
                    .iter()
                    .map(PathBuf::from)
                    .find(|p| p.exists())
                    .expect("nvcc not found. Ensure CUDA Toolkit is installed and nvcc is in PATH, or set CUDA_PATH.")
            }
        }
    };

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let ptx_path = out_dir.join("functions.ptx");

    let status = Command::new(&nvcc_path)
        .arg("--ptx")
        .arg("-O3")
        .arg("-o")
        .arg(&ptx_path)
        .arg(KERNEL_SOURCE)
        .status()
        .unwrap_or_else(|e| panic!("Failed to execute nvcc for {}: {}", KERNEL_SOURCE, e));

    if !status.success() {
        panic!("nvcc failed to compile {}", KERNEL_SOURCE);
    }
    println!("cargo:rerun-if-changed={}", KERNEL_SOURCE);
}
