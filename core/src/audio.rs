//! Wrapper around the external ffmpeg transcoder
//!
//! ffmpeg is treated as a black box: availability is probed once, and each
//! conversion shells out with the configured target format, sample rate,
//! bit depth, and channel count. Converted files land in a `resampled/`
//! directory next to the source.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{AudioFormat, AudioTargets};
use crate::error::{Result, WavebindError};

pub const FFMPEG_INSTALL_HELP: &str = "ffmpeg is not installed; it is required for processing audio files.\n\
To install it:\n\
- macOS: run 'brew install ffmpeg'\n\
- Debian/Ubuntu: run 'sudo apt-get install ffmpeg'\n\
- Fedora: run 'sudo dnf install ffmpeg'\n\
- Arch Linux: run 'sudo pacman -S ffmpeg'\n\
For other systems see https://ffmpeg.org/download.html";

/// Probes for a usable ffmpeg on PATH
pub fn ffmpeg_available() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Destination path for a converted file: `<dir>/resampled/<stem>.<ext>`
pub fn converted_path(path: &Path, format: AudioFormat) -> PathBuf {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    parent
        .join("resampled")
        .join(format!("{}.{}", stem, format.extension()))
}

/// Converts an audio file to the target format/rate/depth/channels
pub async fn transcode(path: &Path, targets: &AudioTargets) -> Result<PathBuf> {
    let output_path = converted_path(path, targets.format);
    if let Some(dir) = output_path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-i")
        .arg(path)
        .arg("-ar")
        .arg(targets.sample_rate.to_string())
        .arg("-ac")
        .arg(targets.channels.to_string());

    match targets.format {
        AudioFormat::Wav => {
            let codec = if targets.bit_depth == 24 { "pcm_s24le" } else { "pcm_s16le" };
            cmd.arg("-c:a").arg(codec);
        }
        AudioFormat::Aif | AudioFormat::Aiff => {
            let codec = if targets.bit_depth == 24 { "pcm_s24be" } else { "pcm_s16be" };
            cmd.arg("-c:a").arg(codec);
        }
        AudioFormat::Flac => {
            let sample_fmt = if targets.bit_depth == 24 { "s32" } else { "s16" };
            cmd.arg("-sample_fmt").arg(sample_fmt);
        }
        AudioFormat::Mp3 => {
            // mp3 has no pcm bit depth; encode at a fixed quality setting
            cmd.arg("-c:a").arg("libmp3lame").arg("-q:a").arg("2");
        }
    }
    cmd.arg(&output_path);

    let output = cmd.output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WavebindError::Conversion {
            message: format!("ffmpeg exited with {}: {}", output.status, stderr.trim()),
        });
    }

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converted_path_lands_in_resampled_dir() {
        let path = converted_path(Path::new("/tmp/session/take1.mp3"), AudioFormat::Wav);
        assert_eq!(path, PathBuf::from("/tmp/session/resampled/take1.wav"));
    }

    #[test]
    fn test_converted_path_uses_target_extension() {
        let path = converted_path(Path::new("take1.wav"), AudioFormat::Flac);
        assert!(path.ends_with("resampled/take1.flac"));
    }

    #[test]
    fn test_install_help_names_package_managers() {
        assert!(FFMPEG_INSTALL_HELP.contains("brew install"));
        assert!(FFMPEG_INSTALL_HELP.contains("apt-get install"));
    }
}
