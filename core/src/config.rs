//! Client settings and audio target configuration
//!
//! Settings come from compiled-in production defaults with `WAVEBIND_*`
//! environment overrides. Audio targets are validated against the closed
//! sets the service supports.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WavebindError};

/// Account token override; when set the session identity is immutable.
pub const ENV_MASTER_TOKEN: &str = "WAVEBIND_TOKEN";
pub const ENV_API_BASE_URL: &str = "WAVEBIND_API_BASE_URL";
pub const ENV_STORAGE_BUCKET: &str = "WAVEBIND_STORAGE_BUCKET";

const DEFAULT_API_BASE_URL: &str = "https://hub.wavebind.io";
const DEFAULT_STORAGE_BUCKET: &str = "https://storage.googleapis.com/wavebind-file-transfer/";
const DEFAULT_HOSTED_STORAGE_PREFIX: &str = "https://storage.googleapis.com";

pub const VALID_SAMPLE_RATES: [u32; 4] = [22050, 32000, 44100, 48000];
pub const VALID_BIT_DEPTHS: [u16; 2] = [16, 24];
pub const VALID_CHANNELS: [u16; 2] = [1, 2];
pub const VALID_FORMATS: [&str; 5] = ["wav", "mp3", "aif", "aiff", "flac"];

/// Process-level client settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the identity service / work queue
    pub api_base_url: String,
    /// Public prefix under which uploaded files are served
    pub storage_bucket: String,
    /// Prefix identifying request fields that point at hosted storage
    pub hosted_storage_prefix: String,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    /// Master token pinned via the environment, if any
    pub env_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage_bucket: DEFAULT_STORAGE_BUCKET.to_string(),
            hosted_storage_prefix: DEFAULT_HOSTED_STORAGE_PREFIX.to_string(),
            heartbeat_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            env_token: None,
        }
    }
}

impl Settings {
    /// Production defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(url) = env::var(ENV_API_BASE_URL) {
            if !url.is_empty() {
                settings.api_base_url = url;
            }
        }
        if let Ok(bucket) = env::var(ENV_STORAGE_BUCKET) {
            if !bucket.is_empty() {
                settings.storage_bucket = bucket;
            }
        }
        settings.env_token = env::var(ENV_MASTER_TOKEN).ok().filter(|t| !t.is_empty());
        settings
    }
}

/// Supported audio container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Aif,
    Aiff,
    Flac,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aif => "aif",
            AudioFormat::Aiff => "aiff",
            AudioFormat::Flac => "flac",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = WavebindError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            "aif" => Ok(AudioFormat::Aif),
            "aiff" => Ok(AudioFormat::Aiff),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(WavebindError::invalid_format(other)),
        }
    }
}

/// Target format/rate/depth/channels for one direction of audio handling.
///
/// Downloads are converted to the input targets before dispatch; file
/// results are converted to the output targets before upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioTargets {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
}

impl Default for AudioTargets {
    fn default() -> Self {
        Self {
            format: AudioFormat::Wav,
            sample_rate: 44100,
            bit_depth: 16,
            channels: 2,
        }
    }
}

impl AudioTargets {
    pub fn set_sample_rate(&mut self, value: u32) -> Result<()> {
        if !VALID_SAMPLE_RATES.contains(&value) {
            return Err(WavebindError::invalid_sample_rate(value));
        }
        self.sample_rate = value;
        Ok(())
    }

    pub fn set_bit_depth(&mut self, value: u16) -> Result<()> {
        if !VALID_BIT_DEPTHS.contains(&value) {
            return Err(WavebindError::invalid_bit_depth(value));
        }
        self.bit_depth = value;
        Ok(())
    }

    pub fn set_channels(&mut self, value: u16) -> Result<()> {
        if !VALID_CHANNELS.contains(&value) {
            return Err(WavebindError::invalid_channels(value));
        }
        self.channels = value;
        Ok(())
    }

    pub fn set_format(&mut self, value: &str) -> Result<()> {
        self.format = value.parse()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets() {
        let targets = AudioTargets::default();
        assert_eq!(targets.format, AudioFormat::Wav);
        assert_eq!(targets.sample_rate, 44100);
        assert_eq!(targets.bit_depth, 16);
        assert_eq!(targets.channels, 2);
    }

    #[test]
    fn test_sample_rate_validation() {
        let mut targets = AudioTargets::default();
        assert!(targets.set_sample_rate(48000).is_ok());
        assert_eq!(targets.sample_rate, 48000);

        let err = targets.set_sample_rate(96000).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("96000"));
        assert!(message.contains("22050"));
        assert!(message.contains("32000"));
        assert!(message.contains("44100"));
        assert!(message.contains("48000"));
        // rejected value leaves the previous setting in place
        assert_eq!(targets.sample_rate, 48000);
    }

    #[test]
    fn test_bit_depth_and_channel_validation() {
        let mut targets = AudioTargets::default();
        assert!(targets.set_bit_depth(24).is_ok());
        assert!(targets.set_bit_depth(32).is_err());
        assert!(targets.set_channels(1).is_ok());
        assert!(targets.set_channels(6).is_err());
    }

    #[test]
    fn test_format_parsing_is_case_insensitive() {
        let mut targets = AudioTargets::default();
        assert!(targets.set_format("FLAC").is_ok());
        assert_eq!(targets.format, AudioFormat::Flac);

        let err = targets.set_format("wma").unwrap_err();
        assert!(err.to_string().contains("wma"));
        assert!(err.to_string().contains("aiff"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert!(settings.api_base_url.starts_with("https://"));
        assert!(settings.storage_bucket.ends_with('/'));
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert!(settings.env_token.is_none());
    }
}
