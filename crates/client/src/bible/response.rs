//! Bible provider response payloads and normalization.

use serde::Deserialize;

/// Raw passage response from the provider.
#[derive(Debug, Deserialize)]
pub(crate) struct PassageApiResponse {
    pub data: PassageData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PassageData {
    #[serde(default)]
    pub verses: Vec<VersePayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersePayload {
    pub number: u32,
    pub text: String,
}

/// One normalized verse of a fetched passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verse {
    pub number: u32,
    pub text: String,
}

impl From<VersePayload> for Verse {
    fn from(payload: VersePayload) -> Self {
        Self { number: payload.number, text: payload.text.trim().to_string() }
    }
}
