//! Localization of hosted request assets
//!
//! Before dispatch, any string field in the request that points at hosted
//! storage is replaced in place with a locally downloaded (and, for audio,
//! transcoded) file path. The walk recurses through nested maps and
//! sequences; per-file failures leave the original value untouched.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use crate::audio;
use crate::config::AudioTargets;
use crate::error::{Result, WavebindError};
use crate::files::FileKind;
use crate::tracer::{TraceStage, Tracer};

/// Fetches one hosted asset to a local path
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PathBuf>;
}

/// Walks a request value, replacing hosted-storage URL strings with
/// fetched local paths.
pub fn localize_hosted_files<'a>(
    value: &'a mut Value,
    hosted_prefix: &'a str,
    fetcher: &'a dyn AssetFetcher,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        match value {
            Value::Object(map) => {
                for entry in map.values_mut() {
                    replace_or_recurse(entry, hosted_prefix, fetcher).await;
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    replace_or_recurse(item, hosted_prefix, fetcher).await;
                }
            }
            _ => {}
        }
    })
}

async fn replace_or_recurse(value: &mut Value, hosted_prefix: &str, fetcher: &dyn AssetFetcher) {
    let hosted_url = match value {
        Value::String(s) if s.starts_with(hosted_prefix) => Some(s.clone()),
        _ => None,
    };

    if let Some(url) = hosted_url {
        match fetcher.fetch(&url).await {
            Ok(path) => *value = Value::String(path.to_string_lossy().into_owned()),
            Err(e) => tracing::warn!(url = %url, error = %e, "failed to localize hosted asset"),
        }
    } else if value.is_object() || value.is_array() {
        localize_hosted_files(value, hosted_prefix, fetcher).await;
    }
}

/// Production fetcher: downloads into a per-invocation workspace and
/// transcodes audio downloads to the input targets.
pub struct HttpAssetFetcher {
    client: Client,
    workspace: PathBuf,
    input_targets: AudioTargets,
    tracer: Tracer,
    token: Option<Uuid>,
}

impl HttpAssetFetcher {
    pub fn new(
        client: Client,
        workspace: PathBuf,
        input_targets: AudioTargets,
        tracer: Tracer,
        token: Option<Uuid>,
    ) -> Self {
        Self {
            client,
            workspace,
            input_targets,
            tracer,
            token,
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<PathBuf> {
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("download");
        let local_path = self.workspace.join(file_name);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(WavebindError::Download {
                url: url.to_string(),
                message: format!("status {}", status),
            });
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(&local_path, &bytes).await?;

        self.tracer.event(
            self.token,
            TraceStage::DownloadAsset,
            &format!("downloaded: {}", local_path.display()),
        );

        if FileKind::classify(&local_path) == FileKind::Audio {
            match audio::transcode(&local_path, &self.input_targets).await {
                Ok(converted) => {
                    self.tracer.event(
                        self.token,
                        TraceStage::ConvertDownload,
                        &format!("converted download: {}", converted.display()),
                    );
                    return Ok(converted);
                }
                Err(e) => {
                    // hand the unconverted download to the method rather
                    // than dropping the asset
                    self.tracer.error(
                        self.token,
                        TraceStage::ConvertDownload,
                        &format!("error converting download: {}", e),
                    );
                }
            }
        }

        Ok(local_path)
    }
}
