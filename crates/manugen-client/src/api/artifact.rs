//! Artifact submission: send an image on the batch run endpoint and read
//! back the agent's JSON description of it.

use crate::api::reduce::extract_text;
use crate::error::ClientError;
use crate::{AdkClient, InlineData, NewMessage, Part, Session};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// What the figure agent says about a submitted image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ArtifactDescription {
    pub title: String,
    pub description: String,
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub figure_number: u32,
}

// Models sometimes quote the figure number.
fn number_or_numeric_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Parse the reduced text of an artifact run.
///
/// Accepts a bare JSON object or one wrapped in a Markdown code fence.
pub fn parse_artifact_description(text: &str) -> Result<ArtifactDescription, ClientError> {
    serde_json::from_str(strip_code_fence(text)).map_err(|source| ClientError::ArtifactParse {
        text: text.to_string(),
        source,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

impl AdkClient {
    /// Submit an inline payload as the user message of a batch run and parse
    /// the reply as an [`ArtifactDescription`].
    pub async fn submit_artifact(
        &self,
        session: &Session,
        data: InlineData,
    ) -> Result<ArtifactDescription, ClientError> {
        debug!(
            "Submitting artifact {} ({})",
            data.display_name.as_deref().unwrap_or("<unnamed>"),
            data.mime_type
        );
        let events = self
            .run(session, NewMessage::user(vec![Part::inline_data(data)]))
            .await?;
        parse_artifact_description(&extract_text(&events))
    }
}
