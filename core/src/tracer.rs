//! Structured lifecycle trace events
//!
//! Every noteworthy client transition is emitted as a tracing event tagged
//! with the connection identity and a lifecycle stage, so an external event
//! sink can be attached through a subscriber layer.

use uuid::Uuid;

pub const SERVICE_CLIENT: &str = "wavebind_client";

/// Lifecycle stage a trace event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStage {
    RegisterMethod,
    RunMethod,
    DownloadAsset,
    ConvertDownload,
    ConvertUpload,
    UploadAsset,
    SendResults,
    Connection,
}

impl TraceStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStage::RegisterMethod => "register_method",
            TraceStage::RunMethod => "run_method",
            TraceStage::DownloadAsset => "download_asset",
            TraceStage::ConvertDownload => "convert_download",
            TraceStage::ConvertUpload => "convert_upload",
            TraceStage::UploadAsset => "upload_asset",
            TraceStage::SendResults => "send_results",
            TraceStage::Connection => "connection",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tracer {
    service: &'static str,
}

impl Tracer {
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }

    pub fn event(&self, token: Option<Uuid>, stage: TraceStage, message: &str) {
        tracing::info!(
            service = self.service,
            token = ?token,
            stage = stage.as_str(),
            "{}",
            message
        );
    }

    pub fn error(&self, token: Option<Uuid>, stage: TraceStage, message: &str) {
        tracing::error!(
            service = self.service,
            token = ?token,
            stage = stage.as_str(),
            "{}",
            message
        );
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(SERVICE_CLIENT)
    }
}
