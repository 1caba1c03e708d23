//! Text fetch orchestration.
//!
//! Answers verse, range, and chapter requests from the verse cache, falling
//! through to the licensed text provider on a miss. The bibleFetchCount
//! meter gates provider calls only; a complete cache hit costs the user
//! nothing. Cache reads and writes fail open; the quota store does not.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use engraft_core::{PassageRef, UsageDimension};

/// Input parameters for a text fetch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTextParams {
    pub reference: ReferenceParams,
    pub version: String,
    /// Request the whole chapter regardless of verse bounds.
    #[serde(default)]
    pub is_chapter_request: bool,
}

/// Wire shape of a passage reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceParams {
    pub book: String,
    pub chapter: u32,
    #[serde(default)]
    pub verse_start: Option<u32>,
    #[serde(default)]
    pub verse_end: Option<u32>,
}

/// Output of a text fetch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTextOutput {
    pub reference: String,
    pub version: String,
    /// Concatenated text for verse and range requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Verse-number-to-text map for chapter requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verses_by_number: Option<BTreeMap<u32, String>>,
    pub cached: bool,
}

/// Implementation of the text fetch operation.
pub async fn fetch_text_impl(
    state: &AppState, user_id: &str, params: FetchTextParams,
) -> Result<FetchTextOutput, ApiError> {
    let version = params.version.trim().to_string();
    if version.is_empty() {
        return Err(ApiError::Validation("version must not be empty".into()));
    }

    let reference = PassageRef {
        book: params.reference.book.trim().to_string(),
        chapter: params.reference.chapter,
        verse_start: params.reference.verse_start,
        verse_end: params.reference.verse_end,
    };
    reference.validate()?;

    if params.is_chapter_request || reference.verse_start.is_none() {
        let chapter_ref = PassageRef::chapter(reference.book.clone(), reference.chapter);
        fetch_chapter(state, user_id, &chapter_ref, &version).await
    } else {
        fetch_verses(state, user_id, &reference, &version).await
    }
}

async fn fetch_chapter(
    state: &AppState, user_id: &str, reference: &PassageRef, version: &str,
) -> Result<FetchTextOutput, ApiError> {
    // a chapter can only be served from cache once a provider fetch has
    // taught us its verse count
    if let Some(expected) = state.cache.chapter_verse_count(&reference.book, reference.chapter, version).await
        && let Some(verses) = state.cache.chapter(&reference.book, reference.chapter, version, expected).await
    {
        tracing::debug!("chapter cache hit for {} ({})", reference, version);
        return Ok(FetchTextOutput {
            reference: reference.to_string(),
            version: version.to_string(),
            text: None,
            verses_by_number: Some(verses),
            cached: true,
        });
    }

    let decision = state.quota.check_and_record(user_id, UsageDimension::BibleFetchCount, 1.0).await?;
    if !decision.allowed {
        return Err(ApiError::quota(UsageDimension::BibleFetchCount, &decision));
    }

    let verses = state
        .bible
        .fetch_passage(reference, version)
        .await
        .map_err(|e| ApiError::upstream("bible-text", e))?;

    let pairs: Vec<(u32, String)> = verses.iter().map(|v| (v.number, v.text.clone())).collect();
    state.cache.store_chapter(&reference.book, reference.chapter, pairs.clone(), version).await;

    Ok(FetchTextOutput {
        reference: reference.to_string(),
        version: version.to_string(),
        text: None,
        verses_by_number: Some(pairs.into_iter().collect()),
        cached: false,
    })
}

async fn fetch_verses(
    state: &AppState, user_id: &str, reference: &PassageRef, version: &str,
) -> Result<FetchTextOutput, ApiError> {
    let Some((start, end)) = reference.verse_span() else {
        return Err(ApiError::Validation("verse reference required".into()));
    };

    let hit = if start == end {
        state.cache.verse(&reference.book, reference.chapter, start, version).await
    } else {
        state.cache.verse_range(&reference.book, reference.chapter, start, end, version).await
    };

    if let Some(text) = hit {
        tracing::debug!("verse cache hit for {} ({})", reference, version);
        return Ok(FetchTextOutput {
            reference: reference.to_string(),
            version: version.to_string(),
            text: Some(text),
            verses_by_number: None,
            cached: true,
        });
    }

    let decision = state.quota.check_and_record(user_id, UsageDimension::BibleFetchCount, 1.0).await?;
    if !decision.allowed {
        return Err(ApiError::quota(UsageDimension::BibleFetchCount, &decision));
    }

    let mut verses = state
        .bible
        .fetch_passage(reference, version)
        .await
        .map_err(|e| ApiError::upstream("bible-text", e))?;
    verses.sort_by_key(|v| v.number);

    let pairs: Vec<(u32, String)> = verses.iter().map(|v| (v.number, v.text.clone())).collect();
    state.cache.store_verses(&reference.book, reference.chapter, pairs, version).await;

    let text = verses.iter().map(|v| v.text.as_str()).collect::<Vec<_>>().join(" ");

    Ok(FetchTextOutput {
        reference: reference.to_string(),
        version: version.to_string(),
        text: Some(text),
        verses_by_number: None,
        cached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{FailingBible, StaticBible, StubCleaner, StubSpeech, chapter_verses, state_with};
    use engraft_client::Verse;
    use std::sync::Arc;

    fn verse_params(book: &str, chapter: u32, start: u32, end: Option<u32>) -> FetchTextParams {
        FetchTextParams {
            reference: ReferenceParams {
                book: book.into(),
                chapter,
                verse_start: Some(start),
                verse_end: end,
            },
            version: "ESV".into(),
            is_chapter_request: false,
        }
    }

    fn chapter_params(book: &str, chapter: u32) -> FetchTextParams {
        FetchTextParams {
            reference: ReferenceParams { book: book.into(), chapter, verse_start: None, verse_end: None },
            version: "ESV".into(),
            is_chapter_request: true,
        }
    }

    async fn state_with_bible(bible: Arc<dyn engraft_client::TextProvider>) -> AppState {
        state_with(bible, Arc::new(StubSpeech("raw")), Arc::new(StubCleaner("clean"))).await
    }

    async fn fetches_used(state: &AppState, user_id: &str) -> f64 {
        state
            .quota
            .check_usage(user_id, UsageDimension::BibleFetchCount, 0.0)
            .await
            .unwrap()
            .used
    }

    #[tokio::test]
    async fn test_miss_fetches_and_populates() {
        let bible = Arc::new(StaticBible(vec![Verse { number: 16, text: "For God so loved".into() }]));
        let state = state_with_bible(bible).await;

        let output = fetch_text_impl(&state, "u1", verse_params("John", 3, 16, None)).await.unwrap();
        assert!(!output.cached);
        assert_eq!(output.text.as_deref(), Some("For God so loved"));
        assert_eq!(output.reference, "John 3:16");
        assert_eq!(fetches_used(&state, "u1").await, 1.0);

        // second request is a hit and costs no quota
        let output = fetch_text_impl(&state, "u1", verse_params("John", 3, 16, None)).await.unwrap();
        assert!(output.cached);
        assert_eq!(fetches_used(&state, "u1").await, 1.0);
    }

    #[tokio::test]
    async fn test_cache_hit_never_touches_provider() {
        let state = state_with_bible(Arc::new(FailingBible)).await;
        state
            .cache
            .store_verses("John", 3, vec![(16, "cached text".into())], "ESV")
            .await;

        let output = fetch_text_impl(&state, "u1", verse_params("John", 3, 16, None)).await.unwrap();
        assert!(output.cached);
        assert_eq!(output.text.as_deref(), Some("cached text"));
        assert_eq!(fetches_used(&state, "u1").await, 0.0);
    }

    #[tokio::test]
    async fn test_range_miss_until_complete() {
        let bible = Arc::new(StaticBible(vec![
            Verse { number: 5, text: "five".into() },
            Verse { number: 6, text: "six".into() },
        ]));
        let state = state_with_bible(bible).await;
        // verse 5 alone is not enough for 5-6
        state.cache.store_verses("Psalms", 23, vec![(5, "five".into())], "ESV").await;

        let output = fetch_text_impl(&state, "u1", verse_params("Psalms", 23, 5, Some(6))).await.unwrap();
        assert!(!output.cached);
        assert_eq!(output.text.as_deref(), Some("five six"));

        let output = fetch_text_impl(&state, "u1", verse_params("Psalms", 23, 5, Some(6))).await.unwrap();
        assert!(output.cached);
        assert_eq!(output.text.as_deref(), Some("five six"));
    }

    #[tokio::test]
    async fn test_chapter_requires_learned_verse_count() {
        let bible = Arc::new(StaticBible(chapter_verses(31)));
        let state = state_with_bible(bible).await;

        // verses present but no chapter_meta: the chapter cannot be
        // validated, so the first request still goes upstream
        let pairs = (1..=31).map(|n| (n, format!("verse {n}"))).collect();
        state.cache.store_verses("Genesis", 1, pairs, "ESV").await;

        let output = fetch_text_impl(&state, "u1", chapter_params("Genesis", 1)).await.unwrap();
        assert!(!output.cached);
        assert_eq!(output.verses_by_number.as_ref().unwrap().len(), 31);
        assert_eq!(fetches_used(&state, "u1").await, 1.0);

        // now the count is known and the chapter serves from cache
        let output = fetch_text_impl(&state, "u1", chapter_params("Genesis", 1)).await.unwrap();
        assert!(output.cached);
        assert_eq!(output.verses_by_number.as_ref().unwrap().len(), 31);
        assert_eq!(fetches_used(&state, "u1").await, 1.0);
    }

    #[tokio::test]
    async fn test_quota_exhaustion_rejects_before_provider() {
        let state = state_with_bible(Arc::new(FailingBible)).await;
        state
            .quota
            .record_usage("u1", UsageDimension::BibleFetchCount, 100.0)
            .await
            .unwrap();

        let err = fetch_text_impl(&state, "u1", verse_params("John", 3, 16, None)).await.unwrap_err();
        match err {
            ApiError::QuotaExceeded { used, limit, .. } => {
                assert_eq!(used, 100.0);
                assert_eq!(limit, 100.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_as_upstream() {
        let state = state_with_bible(Arc::new(FailingBible)).await;

        let err = fetch_text_impl(&state, "u1", verse_params("John", 3, 16, None)).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream { provider: "bible-text", .. }));
    }

    #[tokio::test]
    async fn test_invalid_reference_rejected() {
        let state = state_with_bible(Arc::new(FailingBible)).await;

        let err = fetch_text_impl(&state, "u1", verse_params("", 3, 16, None)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(fetches_used(&state, "u1").await, 0.0);
    }

    #[tokio::test]
    async fn test_empty_version_rejected() {
        let state = state_with_bible(Arc::new(FailingBible)).await;

        let mut params = verse_params("John", 3, 16, None);
        params.version = "  ".into();
        let err = fetch_text_impl(&state, "u1", params).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
