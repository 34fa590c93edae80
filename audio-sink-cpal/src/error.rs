use audio_sink_core::models::error::SinkError;

/// Failures coming out of cpal, before they are folded into `SinkError`.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no default output device")]
    NoDevice,

    #[error("output device not found: {0}")]
    DeviceNotFound(String),

    #[error("no supported configuration for {channels} ch at {sample_rate} Hz as {format:?}")]
    UnsupportedConfig {
        channels: u16,
        sample_rate: u32,
        format: cpal::SampleFormat,
    },

    #[error(transparent)]
    Devices(#[from] cpal::DevicesError),

    #[error(transparent)]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error(transparent)]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error(transparent)]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error(transparent)]
    Build(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    Play(#[from] cpal::PlayStreamError),

    #[error(transparent)]
    Pause(#[from] cpal::PauseStreamError),

    #[error(transparent)]
    Stream(#[from] cpal::StreamError),

    #[error("output control thread exited")]
    ControlThreadGone,
}

impl From<BackendError> for SinkError {
    fn from(error: BackendError) -> Self {
        use BackendError as E;
        match error {
            E::NoDevice | E::DeviceNotFound(_) => Self::DeviceNotAvailable,
            E::Build(cpal::BuildStreamError::DeviceNotAvailable)
            | E::DefaultConfig(cpal::DefaultStreamConfigError::DeviceNotAvailable)
            | E::SupportedConfigs(cpal::SupportedStreamConfigsError::DeviceNotAvailable) => {
                Self::DeviceNotAvailable
            }
            E::Play(cpal::PlayStreamError::DeviceNotAvailable)
            | E::Pause(cpal::PauseStreamError::DeviceNotAvailable)
            | E::Stream(cpal::StreamError::DeviceNotAvailable) => Self::Disconnected,
            E::UnsupportedConfig { .. } | E::Build(cpal::BuildStreamError::StreamConfigNotSupported) => {
                Self::ConfigurationFailed(error.to_string())
            }
            E::ControlThreadGone => Self::StreamClosed,
            other => Self::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unplugged_device_maps_to_disconnected() {
        let error = BackendError::from(cpal::StreamError::DeviceNotAvailable);
        assert_eq!(SinkError::from(error), SinkError::Disconnected);
    }

    #[test]
    fn acquisition_failures_map_to_device_not_available() {
        assert_eq!(SinkError::from(BackendError::NoDevice), SinkError::DeviceNotAvailable);
        let error = BackendError::from(cpal::BuildStreamError::DeviceNotAvailable);
        assert_eq!(SinkError::from(error), SinkError::DeviceNotAvailable);
    }

    #[test]
    fn unsupported_config_is_a_configuration_error() {
        let error = BackendError::UnsupportedConfig {
            channels: 7,
            sample_rate: 1234,
            format: cpal::SampleFormat::I16,
        };
        assert!(matches!(SinkError::from(error), SinkError::ConfigurationFailed(_)));
        assert!(matches!(
            SinkError::from(BackendError::from(cpal::BuildStreamError::StreamConfigNotSupported)),
            SinkError::ConfigurationFailed(_)
        ));
    }

    #[test]
    fn lost_control_thread_is_a_closed_stream() {
        assert_eq!(SinkError::from(BackendError::ControlThreadGone), SinkError::StreamClosed);
    }
}
