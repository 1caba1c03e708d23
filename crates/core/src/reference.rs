//! Passage reference types.
//!
//! A passage reference identifies a verse, verse range, or whole chapter in
//! one book. Verse numbers are 1-based; a missing `verse_start` means the
//! whole chapter.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (book, chapter[, verse_start[, verse_end]]) reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassageRef {
    pub book: String,
    pub chapter: u32,
    pub verse_start: Option<u32>,
    pub verse_end: Option<u32>,
}

impl PassageRef {
    /// Reference to a whole chapter.
    pub fn chapter(book: impl Into<String>, chapter: u32) -> Self {
        Self { book: book.into(), chapter, verse_start: None, verse_end: None }
    }

    /// Reference to a single verse.
    pub fn verse(book: impl Into<String>, chapter: u32, verse: u32) -> Self {
        Self { book: book.into(), chapter, verse_start: Some(verse), verse_end: None }
    }

    /// Reference to an inclusive verse range.
    pub fn range(book: impl Into<String>, chapter: u32, start: u32, end: u32) -> Self {
        Self { book: book.into(), chapter, verse_start: Some(start), verse_end: Some(end) }
    }

    /// Check structural validity of the reference.
    pub fn validate(&self) -> Result<(), Error> {
        if self.book.trim().is_empty() {
            return Err(Error::InvalidReference("book must not be empty".into()));
        }
        if self.chapter < 1 {
            return Err(Error::InvalidReference("chapter must be at least 1".into()));
        }
        match (self.verse_start, self.verse_end) {
            (None, Some(_)) => {
                return Err(Error::InvalidReference("verse_end requires verse_start".into()));
            }
            (Some(start), _) if start < 1 => {
                return Err(Error::InvalidReference("verse numbers are 1-based".into()));
            }
            (Some(start), Some(end)) if end < start => {
                return Err(Error::InvalidReference(format!("verse range {}-{} is inverted", start, end)));
            }
            _ => {}
        }
        Ok(())
    }

    /// The inclusive verse span, if this is a verse or range reference.
    pub fn verse_span(&self) -> Option<(u32, u32)> {
        self.verse_start.map(|start| (start, self.verse_end.unwrap_or(start)))
    }
}

impl fmt::Display for PassageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.book, self.chapter)?;
        match self.verse_span() {
            Some((start, end)) if start == end => write!(f, ":{}", start),
            Some((start, end)) => write!(f, ":{}-{}", start, end),
            None => Ok(()),
        }
    }
}
