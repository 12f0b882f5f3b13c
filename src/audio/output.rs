//! Output device selection

use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamBuilder};

/// Open the named output device, or the system default
pub(super) fn open_output_stream(device_name: Option<&str>) -> Result<OutputStream, String> {
    match device_name {
        Some(name) => open_named_device(name),
        None => OutputStreamBuilder::open_default_stream()
            .map_err(|e| format!("Failed to create audio output: {}", e)),
    }
}

fn open_named_device(device_name: &str) -> Result<OutputStream, String> {
    let host = rodio::cpal::default_host();

    let device = host
        .output_devices()
        .map_err(|e| format!("Failed to enumerate devices: {}", e))?
        .find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
        .ok_or_else(|| format!("Device not found: {}", device_name))?;

    let config = device
        .default_output_config()
        .map_err(|e| format!("Failed to get device config: {}", e))?;

    OutputStreamBuilder::from_device(device)
        .map_err(|e| format!("Failed to create stream builder: {}", e))?
        .with_sample_rate(config.sample_rate().0)
        .open_stream()
        .map_err(|e| format!("Failed to open stream: {}", e))
}

/// Names of the available output devices
pub fn list_output_devices() -> Vec<String> {
    let host = rodio::cpal::default_host();
    match host.output_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate output devices: {}", e);
            Vec::new()
        }
    }
}
