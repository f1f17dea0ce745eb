/// Star record types for Starchain
use serde::{Deserialize, Serialize};

/// Maximum story length in bytes, measured before hex encoding
pub const MAX_STORY_BYTES: usize = 500;

/// A star as submitted by a client. `story` is plain ASCII text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarSubmission {
    #[serde(default)]
    pub ra: String,
    #[serde(default)]
    pub dec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cen: Option<String>,
    #[serde(default)]
    pub story: String,
}

impl StarSubmission {
    pub fn new(ra: &str, dec: &str, story: &str) -> Self {
        StarSubmission {
            ra: ra.to_string(),
            dec: dec.to_string(),
            mag: None,
            cen: None,
            story: story.to_string(),
        }
    }

    /// Seal the submission into its stored form, hex-encoding the story.
    /// Callers validate first; see `StarSubmission::validate`.
    pub fn into_star(self) -> Star {
        Star {
            ra: self.ra,
            dec: self.dec,
            mag: self.mag,
            cen: self.cen,
            story: hex::encode(self.story.as_bytes()),
            story_decoded: None,
        }
    }
}

/// A star as stored in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Star {
    pub ra: String,
    pub dec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cen: Option<String>,
    /// Hex-encoded story bytes
    pub story: String,
    /// Read-side decoding of `story`; never persisted, never hashed
    #[serde(rename = "storyDecoded", default, skip_serializing_if = "Option::is_none")]
    pub story_decoded: Option<String>,
}

impl Star {
    /// Decode the hex story. Returns `None` if the stored story is not valid hex.
    pub fn decode_story(&self) -> Option<String> {
        hex::decode(&self.story)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Block payload for a registered star: the owning address and the star itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StarRecord {
    pub address: String,
    pub star: Star,
}
