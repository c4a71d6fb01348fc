//! File type classification by extension

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WavebindError;

/// Coarse file classification used for result entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Audio,
    Midi,
    Text,
    Video,
    Image,
    Other,
}

impl FileKind {
    pub fn classify(path: &Path) -> FileKind {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "mp3" | "wav" | "aac" | "aif" | "aiff" | "flac" | "ogg" => FileKind::Audio,
            "midi" | "mid" => FileKind::Midi,
            "txt" | "md" | "docx" | "pdf" => FileKind::Text,
            "mp4" | "avi" | "mov" | "mkv" => FileKind::Video,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" | "webp" => FileKind::Image,
            _ => FileKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Audio => "audio",
            FileKind::Midi => "midi",
            FileKind::Text => "text",
            FileKind::Video => "video",
            FileKind::Image => "image",
            FileKind::Other => "other",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the declared type of an externally hosted file. Only the five
/// supported kinds are accepted; "other" is not a declarable type.
impl FromStr for FileKind {
    type Err = WavebindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(FileKind::Audio),
            "midi" => Ok(FileKind::Midi),
            "text" => Ok(FileKind::Text),
            "video" => Ok(FileKind::Video),
            "image" => Ok(FileKind::Image),
            other => Err(WavebindError::UnsupportedFileType {
                file_type: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_extensions() {
        assert_eq!(FileKind::classify(Path::new("render.wav")), FileKind::Audio);
        assert_eq!(FileKind::classify(Path::new("take.AIFF")), FileKind::Audio);
        assert_eq!(FileKind::classify(Path::new("riff.mid")), FileKind::Midi);
        assert_eq!(FileKind::classify(Path::new("notes.md")), FileKind::Text);
        assert_eq!(FileKind::classify(Path::new("clip.mov")), FileKind::Video);
        assert_eq!(FileKind::classify(Path::new("art.png")), FileKind::Image);
    }

    #[test]
    fn test_classify_unknown_is_other() {
        assert_eq!(FileKind::classify(Path::new("model.onnx")), FileKind::Other);
        assert_eq!(FileKind::classify(Path::new("no_extension")), FileKind::Other);
    }

    #[test]
    fn test_declared_type_parsing() {
        assert_eq!("audio".parse::<FileKind>().unwrap(), FileKind::Audio);
        assert_eq!("Image".parse::<FileKind>().unwrap(), FileKind::Image);
        assert!("other".parse::<FileKind>().is_err());
        assert!("archive".parse::<FileKind>().is_err());
    }
}
