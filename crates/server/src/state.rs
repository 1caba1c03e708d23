//! Shared application state passed to all handlers.

use std::sync::Arc;

use engraft_client::{
    BibleClient, BibleConfig, CleanerClient, CleanerConfig, SpeechClient, SpeechConfig, SpeechProvider,
    TextProvider, TranscriptCleaner,
};
use engraft_core::{
    AppConfig, QuotaTracker, StaticTierResolver, StoreDb, TranscriptionLock, VerseCache,
};

/// Shared application context.
///
/// All durable state lives behind the cache/quota/lock handles; the
/// orchestrations themselves are stateless per request. Providers are held
/// as trait objects so tests can substitute them.
#[derive(Clone)]
pub struct AppState {
    pub cache: VerseCache,
    pub quota: QuotaTracker,
    pub lock: TranscriptionLock,
    pub bible: Arc<dyn TextProvider>,
    pub speech: Arc<dyn SpeechProvider>,
    pub cleaner: Arc<dyn TranscriptCleaner>,
}

impl AppState {
    /// Wire up real provider clients and store handles from configuration.
    ///
    /// All three provider API keys are required at boot; a governance layer
    /// whose providers cannot be reached has nothing to govern.
    pub fn from_config(config: &AppConfig, db: StoreDb) -> anyhow::Result<Self> {
        let bible = BibleClient::new(BibleConfig {
            api_key: config.require_bible_api_key()?.to_string(),
            base_url: config.bible_base_url.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
        })?;

        let speech = SpeechClient::new(SpeechConfig {
            api_key: config.require_speech_api_key()?.to_string(),
            base_url: config.speech_base_url.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
            poll_attempts: config.transcribe_poll_attempts,
            poll_interval: config.transcribe_poll_interval(),
            upload_expires_secs: config.upload_expires_secs,
        })?;

        let cleaner = CleanerClient::new(CleanerConfig {
            api_key: config.require_cleaner_api_key()?.to_string(),
            base_url: config.cleaner_base_url.clone(),
            model: config.cleaner_model.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
        })?;

        let tiers = Arc::new(StaticTierResolver::new(config.supporter_user_ids.iter().cloned()));

        Ok(Self {
            cache: VerseCache::new(db.clone(), config.cache_verse_capacity),
            quota: QuotaTracker::new(db.clone(), tiers),
            lock: TranscriptionLock::new(db, config.lock_stale_secs),
            bible: Arc::new(bible),
            speech: Arc::new(speech),
            cleaner: Arc::new(cleaner),
        })
    }
}
