use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::Result;

/// Media kinds whose content is downloaded before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Turns a media message pointer into downloaded content.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    /// `body` is the media sub-message (e.g. the `imageMessage` object).
    async fn resolve(&self, body: &Value, kind: MediaKind) -> Result<Value>;
}
