//! Message content model
//!
//! Requests carry an ordered list of content blocks. Text blocks feed the
//! prompt; image blocks travel differently per backend: inline base64 for
//! backends that accept structured stdin, temp files referenced by path for
//! backends that only take prompt arguments.

use base64::Engine;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{GatewayError, GatewayResult};

/// A single block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image {
        /// Base64-encoded image bytes.
        data: String,
        /// MIME type, e.g. `image/png`.
        media_type: String,
    },
}

/// Ordered message content as supplied by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageContent {
    pub blocks: Vec<ContentBlock>,
}

impl MessageContent {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// All text blocks joined with single spaces, in order.
    pub fn joined_text(&self) -> String {
        let parts: Vec<&str> = self
            .blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Image { .. } => None,
            })
            .collect();
        parts.join(" ")
    }

    pub fn images(&self) -> impl Iterator<Item = (&str, &str)> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Image { data, media_type } => {
                Some((data.as_str(), media_type.as_str()))
            }
            ContentBlock::Text { .. } => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.joined_text().trim().is_empty() && self.images().next().is_none()
    }

    /// Decode image blocks to temp files for backends that take image paths
    /// as CLI arguments. The returned handles keep the files alive; they are
    /// deleted when dropped.
    pub fn write_temp_images(&self) -> GatewayResult<Vec<NamedTempFile>> {
        let mut files = Vec::new();
        for (data, media_type) in self.images() {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| GatewayError::Validation(format!("Invalid image data: {e}")))?;
            let suffix = match media_type {
                "image/jpeg" => ".jpg",
                "image/gif" => ".gif",
                "image/webp" => ".webp",
                _ => ".png",
            };
            let file = tempfile::Builder::new()
                .prefix("switchyard-img-")
                .suffix(suffix)
                .tempfile()?;
            std::fs::write(file.path(), &bytes)?;
            files.push(file);
        }
        Ok(files)
    }
}
