//! Provider clients for engraft.
//!
//! This crate wraps the three external dependencies behind narrow traits so
//! the orchestrators (and their tests) never see wire formats:
//!
//! - [`bible`]: licensed Bible-text provider
//! - [`speech`]: speech-to-text provider (upload, create job, poll, fetch)
//! - [`cleaner`]: LLM transcript cleaning

pub mod bible;
pub mod cleaner;
pub mod speech;

pub use bible::{BibleClient, BibleConfig, BibleError, TextProvider, Verse};
pub use cleaner::{CleanerClient, CleanerConfig, CleanerError, TranscriptCleaner};
pub use speech::{SpeechClient, SpeechConfig, SpeechError, SpeechProvider, UploadSlot};
