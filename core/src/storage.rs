//! Signed-URL file uploads to cloud storage

use std::path::Path;

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{Result, WavebindError};

#[derive(Debug, Deserialize)]
struct SignedUrl {
    signed_url: String,
}

#[derive(Debug, Clone)]
pub struct FileUploader {
    client: Client,
    api_base_url: String,
    bucket_prefix: String,
}

impl FileUploader {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            bucket_prefix: settings.storage_bucket.trim_end_matches('/').to_string(),
        }
    }

    /// Public URL a file will be served from after upload
    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.bucket_prefix, file_name)
    }

    /// Uploads one file: signed destination, bytes PUT, acceptance check.
    /// Returns the public URL.
    pub async fn upload(&self, token: Uuid, path: &Path, content_type: &str) -> Result<String> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| WavebindError::Upload {
                message: format!("no file name in path '{}'", path.display()),
            })?;

        let signed_url = self.signed_upload_url(token, &file_name).await?;
        let bytes = tokio::fs::read(path).await?;

        let response = self
            .client
            .put(&signed_url)
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(WavebindError::Upload {
                message: format!(
                    "storage rejected '{}' with status {}",
                    file_name,
                    response.status()
                ),
            });
        }

        Ok(self.public_url(&file_name))
    }

    async fn signed_upload_url(&self, token: Uuid, file_name: &str) -> Result<String> {
        let url = format!(
            "{}/api/hub/get_signed_url/?token={}&filename={}",
            self.api_base_url,
            token,
            urlencoding::encode(file_name)
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(WavebindError::ServiceStatus {
                operation: "signed-url request",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json::<SignedUrl>().await?.signed_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_joins_bucket_and_name() {
        let settings = Settings {
            storage_bucket: "https://storage.googleapis.com/wavebind-file-transfer/".to_string(),
            ..Settings::default()
        };
        let uploader = FileUploader::new(&settings);
        assert_eq!(
            uploader.public_url("render.wav"),
            "https://storage.googleapis.com/wavebind-file-transfer/render.wav"
        );
    }
}
