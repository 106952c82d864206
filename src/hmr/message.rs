//! Hot update message protocol.
//!
//! Defines the JSON payloads pushed to connected clients.
//!
//! # Message Types
//!
//! - `connected`: channel established
//! - `update`: hot-patch one or more boundaries
//! - `full-reload`: no boundary could absorb the change
//! - `prune`: modules no longer imported by anything
//! - `error`: transform error to display as an overlay

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::Timestamp;

/// Channel carrying payloads to the transport layer.
pub type HmrSender = mpsc::UnboundedSender<HmrPayload>;
pub type HmrReceiver = mpsc::UnboundedReceiver<HmrPayload>;

pub fn channel() -> (HmrSender, HmrReceiver) {
    mpsc::unbounded_channel()
}

/// Payload sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrPayload {
    Connected,

    Update {
        updates: Vec<Update>,
    },

    #[serde(rename_all = "camelCase")]
    FullReload {
        /// Page to reload, `*` for every page
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        /// Absolute path of the file that forced the reload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        triggered_by: Option<String>,
    },

    Prune {
        paths: Vec<String>,
    },

    Error {
        message: String,
    },
}

/// Kind of a single hot update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    #[serde(rename = "js-update")]
    Js,
    #[serde(rename = "css-update")]
    Css,
}

/// One boundary to re-import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    #[serde(rename = "type")]
    pub kind: UpdateType,
    pub timestamp: Timestamp,
    /// Url of the boundary module
    pub path: String,
    /// Url of the module whose change the boundary accepts
    pub accepted_path: String,
    #[serde(default)]
    pub is_within_circular_import: bool,
}

impl HmrPayload {
    /// Full reload of every page, caused by `file`.
    pub fn full_reload(triggered_by: impl Into<String>) -> Self {
        Self::FullReload {
            path: Some("*".to_string()),
            triggered_by: Some(triggered_by.into()),
        }
    }

    /// Full reload of a single page.
    pub fn reload_page(path: impl Into<String>) -> Self {
        Self::FullReload {
            path: Some(path.into()),
            triggered_by: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"full-reload"}"#.to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}
