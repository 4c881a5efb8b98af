//! Prompt session: the collected prompt list, the active prompt and the
//! operations the presentation layer dispatches on them.

pub mod codec;
mod merge;

pub use codec::CodecError;
pub use merge::{count_words, merge_prompts, WORD_LIMIT};

use crate::caption::{self, CaptionMode, CaptionSource, ImageSource};
use rand::Rng;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default extension for exported prompt lists.
pub const LIST_EXTENSION: &str = "txt";

/// Errors surfaced to the user. None of them leave the session modified.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    NoImage(String),
    #[error("Please select at least 2 prompts to merge ({selected} selected)")]
    TooFewSelected { selected: usize },
    #[error("Prompt {index} does not exist (list has {len})")]
    SelectionOutOfRange { index: usize, len: usize },
    #[error("Captioning failed: {0}")]
    Caption(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone)]
pub struct PromptSession {
    prompts: Vec<String>,
    active: String,
    fast_mode: bool,
    word_limit: usize,
}

impl Default for PromptSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptSession {
    pub fn new() -> Self {
        Self::with_word_limit(WORD_LIMIT)
    }

    pub fn with_word_limit(word_limit: usize) -> Self {
        Self {
            prompts: Vec::new(),
            active: String::new(),
            fast_mode: true,
            word_limit,
        }
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn fast_mode(&self) -> bool {
        self.fast_mode
    }

    pub fn set_fast_mode(&mut self, fast: bool) {
        self.fast_mode = fast;
    }

    pub fn toggle_fast_mode(&mut self) -> bool {
        self.fast_mode = !self.fast_mode;
        self.fast_mode
    }

    pub fn caption_mode(&self) -> CaptionMode {
        CaptionMode::from_fast(self.fast_mode)
    }

    /// Append a captioned prompt and make it the active one.
    pub fn append(&mut self, prompt: String) -> &str {
        self.active.clone_from(&prompt);
        self.prompts.push(prompt);
        &self.active
    }

    /// Caption an image with `source` and append the result.
    pub fn acquire(
        &mut self,
        source: &dyn CaptionSource,
        image: &ImageSource,
    ) -> Result<&str, SessionError> {
        let prompt = caption::acquire_caption(source, image, self.caption_mode())?;
        Ok(self.append(prompt))
    }

    /// Load a list entry into the active prompt.
    pub fn show(&mut self, index: usize) -> Result<&str, SessionError> {
        let prompt = self
            .prompts
            .get(index)
            .ok_or(SessionError::SelectionOutOfRange {
                index,
                len: self.prompts.len(),
            })?;
        self.active.clone_from(prompt);
        Ok(&self.active)
    }

    /// Merge the prompts at `selected` into a new active prompt. Repeated
    /// indices count once. The list itself is left untouched.
    pub fn merge_selected<R: Rng + ?Sized>(
        &mut self,
        selected: &[usize],
        rng: &mut R,
    ) -> Result<&str, SessionError> {
        let selected: BTreeSet<usize> = selected.iter().copied().collect();
        if selected.len() < 2 {
            return Err(SessionError::TooFewSelected {
                selected: selected.len(),
            });
        }
        let sources = selected
            .iter()
            .map(|&index| {
                self.prompts
                    .get(index)
                    .map(String::as_str)
                    .ok_or(SessionError::SelectionOutOfRange {
                        index,
                        len: self.prompts.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let merged = merge_prompts(&sources, self.word_limit, rng)?;
        tracing::info!(
            sources = sources.len(),
            words = count_words(&merged),
            "merged prompts"
        );
        self.active = merged;
        Ok(&self.active)
    }

    /// Empty both the list and the active prompt.
    pub fn clear(&mut self) {
        self.prompts.clear();
        self.active.clear();
    }

    pub fn export_to<W: Write>(&self, mut out: W) -> Result<(), CodecError> {
        let encoded = codec::encode_list(&self.prompts)?;
        out.write_all(encoded.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Write the list to `path`, adding the default extension when the path has
    /// none. Returns the path actually written. Nothing is written if any
    /// prompt cannot be encoded.
    pub fn export_file(&self, path: &Path) -> Result<PathBuf, CodecError> {
        let path = with_default_extension(path);
        let encoded = codec::encode_list(&self.prompts)?;
        std::fs::write(&path, encoded)?;
        tracing::info!(path = %path.display(), prompts = self.prompts.len(), "exported list");
        Ok(path)
    }

    /// Replace the list with the decoded contents of `data`. On error the
    /// current list is kept.
    pub fn import_from(&mut self, data: &[u8]) -> Result<usize, CodecError> {
        self.prompts = codec::decode_list(data)?;
        Ok(self.prompts.len())
    }

    pub fn import_file(&mut self, path: &Path) -> Result<usize, CodecError> {
        let data = std::fs::read(path)?;
        let count = self.import_from(&data)?;
        tracing::info!(path = %path.display(), prompts = count, "imported list");
        Ok(count)
    }
}

fn with_default_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(LIST_EXTENSION)
    }
}
