use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait};
use parking_lot::Mutex;

use audio_sink_core::models::audio_models::AudioDevice;
use audio_sink_core::models::config::SharingMode;
use audio_sink_core::models::error::SinkError;
use audio_sink_core::traits::output_device::{OutputDevice, OutputStream, StreamDriver, StreamRequest};

use crate::cpal_stream::{self, CpalOutputStream};
use crate::error::BackendError;

/// Output device backed by the platform's default cpal host.
///
/// cpal only offers shared access: exclusive requests are downgraded with a
/// warning, and the granted mode is reported by the stream.
pub struct CpalOutputDevice {
    device: Mutex<cpal::Device>,
    name: String,
    is_default: bool,
}

impl CpalOutputDevice {
    /// The host's default output device.
    pub fn default_device() -> Result<Self, SinkError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(BackendError::NoDevice)?;
        let name = device.name().map_err(BackendError::from)?;
        Ok(Self {
            device: Mutex::new(device),
            name,
            is_default: true,
        })
    }

    /// The output device whose name matches `name` exactly.
    pub fn with_name(name: &str) -> Result<Self, SinkError> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let device = host
            .output_devices()
            .map_err(BackendError::from)?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| BackendError::DeviceNotFound(name.to_string()))?;
        Ok(Self {
            device: Mutex::new(device),
            name: name.to_string(),
            is_default: default_name.as_deref() == Some(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, request: &StreamRequest, format: cpal::SampleFormat) -> Result<bool, BackendError> {
        let channels = request.format.channel_count();
        let rate = cpal::SampleRate(request.sample_rate);
        let supported = self
            .device
            .lock()
            .supported_output_configs()?
            .any(|range| {
                range.channels() == channels
                    && range.sample_format() == format
                    && range.min_sample_rate() <= rate
                    && rate <= range.max_sample_rate()
            });
        Ok(supported)
    }
}

impl OutputDevice for CpalOutputDevice {
    fn is_available(&self) -> bool {
        self.device.lock().default_output_config().is_ok()
    }

    fn open_stream(
        &self,
        request: &StreamRequest,
        driver: StreamDriver,
    ) -> Result<Arc<dyn OutputStream>, SinkError> {
        let sample_format = cpal_stream::device_sample_format(request.format.format())
            .ok_or_else(|| SinkError::ConfigurationFailed("sample format is unspecified".into()))?;
        if !self.supports(request, sample_format)? {
            return Err(BackendError::UnsupportedConfig {
                channels: request.format.channel_count(),
                sample_rate: request.sample_rate,
                format: sample_format,
            }
            .into());
        }

        if request.sharing_mode == SharingMode::Exclusive {
            log::warn!("Exclusive mode is not available through cpal, opening {} shared", self.name);
        }
        log::debug!(
            "Conversion quality {:?} ignored: cpal does not resample",
            request.conversion_quality
        );

        let device = self.device.lock().clone();
        let stream = CpalOutputStream::open(device, request, driver)?;
        log::info!("Opened cpal output on {}", self.name);
        Ok(Arc::new(stream))
    }

    fn device_info(&self) -> AudioDevice {
        let device = self.device.lock();
        AudioDevice {
            id: self.name.clone(),
            name: self.name.clone(),
            is_default: self.is_default,
            default_sample_rate: device.default_output_config().ok().map(|c| c.sample_rate().0),
            max_channels: device
                .supported_output_configs()
                .ok()
                .and_then(|configs| configs.map(|c| c.channels()).max()),
        }
    }
}
