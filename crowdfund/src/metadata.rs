use log::warn;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

pub const DATA_URI_PREFIX: &str = "data:application/json,";
pub const NO_DESCRIPTION: &str = "No description available";

// everything encodeURIComponent escapes
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectMode {
    Launchpad,
    #[default]
    Classic,
}

impl std::fmt::Display for ProjectMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectMode::Launchpad => write!(f, "Launchpad"),
            ProjectMode::Classic => write!(f, "Classic"),
        }
    }
}

impl std::str::FromStr for ProjectMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "launchpad" => Ok(Self::Launchpad),
            "classic" => Ok(Self::Classic),
            _ => Err("Invalid mode: launchpad and classic are supported".to_owned()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMetadata {
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    pub project_mode: ProjectMode,
}

impl Default for CampaignMetadata {
    fn default() -> Self {
        Self {
            description: NO_DESCRIPTION.to_string(),
            image: String::new(),
            project_mode: ProjectMode::Classic,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    description: Option<String>,
    image: Option<String>,
    project_mode: Option<String>,
}

impl CampaignMetadata {
    /// Decodes a `data:application/json,` URI; anything unreadable falls back to defaults.
    pub fn from_uri(uri: &str) -> Self {
        let Some(encoded) = uri.strip_prefix(DATA_URI_PREFIX) else {
            return Self::default();
        };
        let json = match percent_decode_str(encoded).decode_utf8() {
            Ok(json) => json,
            Err(e) => {
                warn!("Error decoding metadata: {}", e);
                return Self::default();
            }
        };
        let raw: RawMetadata = match serde_json::from_str(&json) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error parsing metadata: {}", e);
                return Self::default();
            }
        };
        Self {
            description: raw
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            image: raw.image.unwrap_or_default(),
            project_mode: raw
                .project_mode
                .and_then(|m| m.parse().ok())
                .unwrap_or_default(),
        }
    }

    pub fn to_uri(&self) -> crate::error::Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}{}", DATA_URI_PREFIX, utf8_percent_encode(&json, COMPONENT)))
    }
}
