//! Compute-backend preference → candle device.

use candle_core::Device;

use agrilm_common::{ComputeBackend, EngineError, Result};

/// Resolve the host's backend preference.
///
/// `Accelerated` is a hard request: no Metal and no CUDA device is an error.
/// `CpuAndGpu` and `Auto` degrade to the CPU.
pub fn select_device(backend: ComputeBackend) -> Result<Device> {
    match backend {
        ComputeBackend::Cpu => Ok(Device::Cpu),
        ComputeBackend::CpuAndGpu => Ok(Device::cuda_if_available(0)?),
        ComputeBackend::Accelerated => accelerated_device().ok_or_else(|| {
            EngineError::UnsupportedBackend(
                "accelerated compute requested but no Metal or CUDA device is available".into(),
            )
        }),
        ComputeBackend::Auto => Ok(accelerated_device().unwrap_or(Device::Cpu)),
    }
}

fn accelerated_device() -> Option<Device> {
    if candle_core::utils::metal_is_available() {
        if let Ok(device) = Device::new_metal(0) {
            return Some(device);
        }
    }
    if candle_core::utils::cuda_is_available() {
        return Device::new_cuda(0).ok();
    }
    None
}

pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
