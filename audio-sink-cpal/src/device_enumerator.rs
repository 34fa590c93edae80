//! Output device enumeration through the cpal host API.

use cpal::traits::{DeviceTrait, HostTrait};

use audio_sink_core::models::audio_models::AudioDevice;
use audio_sink_core::models::error::SinkError;

use crate::error::BackendError;

/// Lists the output devices of one cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    /// Enumerator for the platform's default host.
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }

    /// Name of the default output device, if there is one.
    pub fn default_output_device_name(&self) -> Option<String> {
        self.host.default_output_device().and_then(|d| d.name().ok())
    }

    /// List output devices. Devices whose name cannot be read are skipped.
    pub fn list_output_devices(&self) -> Result<Vec<AudioDevice>, SinkError> {
        let default_name = self.default_output_device_name();
        let devices = self.host.output_devices().map_err(BackendError::from)?;

        let mut listed = Vec::new();
        for device in devices {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    log::debug!("Skipping output device without a name: {}", e);
                    continue;
                }
            };

            let default_config = device.default_output_config().ok();
            let max_channels = device
                .supported_output_configs()
                .ok()
                .and_then(|configs| configs.map(|c| c.channels()).max());

            listed.push(AudioDevice {
                id: name.clone(),
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                default_sample_rate: default_config.map(|c| c.sample_rate().0),
                max_channels,
            });
        }
        Ok(listed)
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}
