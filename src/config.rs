use serde::{Deserialize, Serialize};

use crate::pcm::{Mode, PcmConfig, SampleFormat, DEFAULT_DEVICE};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // PCM defaults, overridable from the command line
    pub device: &'static str,
    pub mode: Mode,
    pub channels: u32,
    pub rate: u32,
    pub format: SampleFormat,
    pub period_size: usize,
    pub periods: u32,
}

impl Config {
    /// Build the configuration from environment variables set at compile time.
    /// All values come from config.toml via build.rs.
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            device: env!("PCM_DEVICE"),
            mode: env!("PCM_MODE").parse()
                .map_err(|_| "Failed to parse PCM_MODE")?,
            channels: env!("PCM_CHANNELS").parse()
                .map_err(|_| "Failed to parse PCM_CHANNELS")?,
            rate: env!("PCM_RATE").parse()
                .map_err(|_| "Failed to parse PCM_RATE")?,
            format: env!("PCM_FORMAT").parse()
                .map_err(|_| "Failed to parse PCM_FORMAT")?,
            period_size: env!("PCM_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse PCM_PERIOD_SIZE")?,
            periods: env!("PCM_PERIODS").parse()
                .map_err(|_| "Failed to parse PCM_PERIODS")?,
        })
    }

    pub fn pcm_config(&self) -> PcmConfig {
        PcmConfig {
            format: self.format,
            channels: self.channels,
            rate: self.rate,
            period_size: self.period_size,
            periods: self.periods,
        }
    }
}

impl Default for Config {
    /// Library defaults, independent of config.toml.
    fn default() -> Self {
        let pcm = PcmConfig::default();
        Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),
            device: DEFAULT_DEVICE,
            mode: Mode::Normal,
            channels: pcm.channels,
            rate: pcm.rate,
            format: pcm.format,
            period_size: pcm.period_size,
            periods: pcm.periods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_time_config_parses() {
        let config = Config::new().unwrap();
        assert!(!config.device.is_empty());
        assert!(config.pcm_config().validate().is_ok());
    }

    #[test]
    fn test_default_matches_library_defaults() {
        let config = Config::default();
        assert_eq!(config.device, "default");
        assert_eq!(config.mode, Mode::Normal);
        assert_eq!(config.pcm_config(), PcmConfig::default());
    }
}
