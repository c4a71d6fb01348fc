//! Per-invocation results accumulation and delivery
//!
//! The aggregator owns the result bundle for exactly one invocation at a
//! time: outputs are appended while the method runs, published once, and
//! cleared before the next invocation. Conversion and upload failures are
//! captured as result errors; they never propagate past this boundary.

use std::path::Path;

use uuid::Uuid;

use crate::api::ApiClient;
use crate::audio::{self, FFMPEG_INSTALL_HELP};
use crate::config::AudioTargets;
use crate::error::{Result, WavebindError};
use crate::files::FileKind;
use crate::protocol::{FileEntry, MessageStatus, ResponseEnvelope};
use crate::storage::FileUploader;
use crate::tracer::{TraceStage, Tracer};

pub struct ResultsAggregator {
    api: ApiClient,
    uploader: FileUploader,
    tracer: Tracer,
    token: Option<Uuid>,
    targets: AudioTargets,
    ffmpeg_available: bool,
    message_id: Option<String>,
    files: Vec<FileEntry>,
    errors: Vec<String>,
    logs: String,
    messages: Vec<String>,
}

impl ResultsAggregator {
    pub fn new(
        api: ApiClient,
        uploader: FileUploader,
        token: Option<Uuid>,
        targets: AudioTargets,
    ) -> Self {
        Self {
            api,
            uploader,
            tracer: Tracer::default(),
            token,
            targets,
            ffmpeg_available: audio::ffmpeg_available(),
            message_id: None,
            files: Vec::new(),
            errors: Vec::new(),
            logs: String::new(),
            messages: Vec::new(),
        }
    }

    pub fn token(&self) -> Option<Uuid> {
        self.token
    }

    pub fn set_message_id(&mut self, id: impl Into<String>) {
        self.message_id = Some(id.into());
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn add_log(&mut self, log: &str) {
        self.logs.push_str(log);
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn logs(&self) -> &str {
        &self.logs
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Records an already-hosted file by URL with a declared type
    pub fn add_file_url(&mut self, file_url: &str, file_type: &str) -> bool {
        let kind = match file_type.parse::<FileKind>() {
            Ok(kind) => kind,
            Err(e) => {
                self.errors.push(e.to_string());
                return false;
            }
        };

        let parsed = match reqwest::Url::parse(file_url) {
            Ok(url) if url.host().is_some() => url,
            _ => {
                self.errors.push(
                    WavebindError::InvalidFileUrl {
                        url: file_url.to_string(),
                    }
                    .to_string(),
                );
                return false;
            }
        };

        let name = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|s| !s.is_empty())
            .unwrap_or("default_filename")
            .to_string();

        self.files.push(FileEntry {
            name,
            url: file_url.to_string(),
            kind,
        });
        true
    }

    /// Records a local file output: classify, convert audio to the output
    /// targets, upload, and remember the public URL. Failures become
    /// aggregator errors.
    pub async fn add_file(&mut self, path: &Path) -> bool {
        let kind = FileKind::classify(path);
        let mut upload_path = path.to_path_buf();

        if kind == FileKind::Audio {
            if !self.ffmpeg_available {
                tracing::warn!("{}", FFMPEG_INSTALL_HELP);
                self.errors.push(FFMPEG_INSTALL_HELP.to_string());
                return false;
            }
            match audio::transcode(path, &self.targets).await {
                Ok(converted) => {
                    self.tracer.event(
                        self.token,
                        TraceStage::ConvertUpload,
                        &converted.display().to_string(),
                    );
                    upload_path = converted;
                }
                Err(e) => {
                    self.tracer
                        .error(self.token, TraceStage::ConvertUpload, &e.to_string());
                    self.errors.push(e.to_string());
                    return false;
                }
            }
        }

        let token = match self.token {
            Some(token) => token,
            None => {
                self.errors.push(WavebindError::IdentityUnbound.to_string());
                return false;
            }
        };

        let content_type = upload_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.uploader.upload(token, &upload_path, &content_type).await {
            Ok(url) => {
                let name = upload_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "default_filename".to_string());
                self.tracer.event(self.token, TraceStage::UploadAsset, &url);
                self.files.push(FileEntry { name, url, kind });
                true
            }
            Err(e) => {
                self.tracer
                    .error(self.token, TraceStage::UploadAsset, &e.to_string());
                self.errors.push(e.to_string());
                false
            }
        }
    }

    /// Resets the bundle for the next invocation
    pub fn clear(&mut self) {
        self.message_id = None;
        self.errors.clear();
        self.files.clear();
        self.logs.clear();
        self.messages.clear();
    }

    /// The response envelope as it would be published right now
    pub fn build_envelope(&self) -> ResponseEnvelope {
        let status = if self.errors.is_empty() {
            MessageStatus::Completed
        } else {
            MessageStatus::Error
        };
        ResponseEnvelope {
            files: self.files.clone(),
            error: if self.errors.is_empty() {
                None
            } else {
                Some(self.errors.join(", "))
            },
            logs: self.logs.clone(),
            message: if self.messages.is_empty() {
                None
            } else {
                Some(self.messages.join(", "))
            },
            status,
            id: self.message_id.clone(),
        }
    }

    /// Sends the envelope to the service keyed by (identity, message id).
    /// Performs no local state change; callers clear() before the next
    /// invocation.
    pub async fn publish(&self) -> Result<ResponseEnvelope> {
        let token = self.token.ok_or(WavebindError::IdentityUnbound)?;
        let envelope = self.build_envelope();
        self.api
            .send_message_response(token, self.message_id.as_deref(), &envelope)
            .await?;
        self.tracer.event(
            Some(token),
            TraceStage::SendResults,
            &format!("published results for message {:?}", self.message_id),
        );
        Ok(envelope)
    }

    #[cfg(test)]
    pub(crate) fn set_ffmpeg_available(&mut self, available: bool) {
        self.ffmpeg_available = available;
    }
}
