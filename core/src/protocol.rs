//! Wire types exchanged with the work queue

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::contract::ArgMap;
use crate::files::FileKind;

/// Status a queued message moves through on the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Processing,
    Completed,
    Error,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Processing => "processing",
            MessageStatus::Completed => "completed",
            MessageStatus::Error => "error",
        }
    }
}

/// One pending record returned by the work-queue fetch
#[derive(Debug, Clone, Deserialize)]
pub struct PendingRecord {
    pub id: String,
    pub token: Uuid,
    pub request: Value,
}

/// The request payload carried inside a pending record
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueRequest {
    RunMethod {
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        bpm: f64,
        #[serde(default)]
        sample_rate: u32,
        data: RunData,
    },
    CloseConnection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub method_name: String,
    #[serde(default)]
    pub params: HashMap<String, ParamSlot>,
}

/// Parameter values arrive wrapped as `{name: {value}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ParamSlot {
    pub value: Value,
}

impl RunData {
    /// Unwraps the `{name: {value}}` map into plain call arguments
    pub fn arg_values(&self) -> ArgMap {
        self.params
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }
}

/// One published file result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

/// The response envelope published once per invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub files: Vec<FileEntry>,
    pub error: Option<String>,
    pub logs: String,
    pub message: Option<String>,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}
