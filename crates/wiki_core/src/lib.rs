pub mod db;
pub mod markdown;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Current version of the stored block payload envelope.
///
/// Bump this when `RenderedBlock` changes shape in a way older readers cannot decode, and teach
/// `decode_block` how to read the previous version.
pub const PAYLOAD_FORMAT_VERSION: u32 = 1;

/// Text emitted by the document renderer to terminate adjacent lists.
///
/// Blocks consisting only of this marker carry no content for the destination workspace.
pub const RENDER_ARTIFACT_MARKER: &str = "<!-- -->";

/// One renderable content unit produced from a source document.
///
/// The variant set mirrors what the destination workspace can display. Anything the renderer
/// cannot classify is emitted as `Text`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderedBlock {
    Text { text: String },
    Header { level: u8, text: String },
    BulletedItem { text: String },
    NumberedItem { text: String },
    Quote { text: String },
    Code { language: Option<String>, text: String },
    Divider,
    Image { source: String, caption: Option<String> },
}

impl RenderedBlock {
    /// Returns true for blocks that only exist as renderer bookkeeping.
    pub fn is_render_artifact(&self) -> bool {
        match self {
            RenderedBlock::Text { text } => text.trim() == RENDER_ARTIFACT_MARKER,
            _ => false,
        }
    }

    /// Plain-text view of the block, used for log context and page titles in tests.
    pub fn plain_text(&self) -> &str {
        match self {
            RenderedBlock::Text { text }
            | RenderedBlock::Header { text, .. }
            | RenderedBlock::BulletedItem { text }
            | RenderedBlock::NumberedItem { text }
            | RenderedBlock::Quote { text }
            | RenderedBlock::Code { text, .. } => text,
            RenderedBlock::Image { source, .. } => source,
            RenderedBlock::Divider => "",
        }
    }
}

#[derive(Serialize)]
struct PayloadEnvelopeRef<'a> {
    version: u32,
    block: &'a RenderedBlock,
}

#[derive(Deserialize)]
struct PayloadEnvelope {
    version: u32,
    block: Value,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unsupported payload format version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("malformed block payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serializes one block into the versioned storage envelope.
pub fn encode_block(block: &RenderedBlock) -> Result<String, PayloadError> {
    let envelope = PayloadEnvelopeRef {
        version: PAYLOAD_FORMAT_VERSION,
        block,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decodes a stored payload, rejecting envelopes written by a newer format version.
pub fn decode_block(payload: &str) -> Result<RenderedBlock, PayloadError> {
    let envelope: PayloadEnvelope = serde_json::from_str(payload)?;
    if envelope.version == 0 || envelope.version > PAYLOAD_FORMAT_VERSION {
        return Err(PayloadError::UnsupportedVersion {
            found: envelope.version,
            supported: PAYLOAD_FORMAT_VERSION,
        });
    }

    Ok(serde_json::from_value(envelope.block)?)
}
