//! Wordlist membership queries.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors from loading or querying a wordlist.
#[derive(Debug, Error)]
pub enum WordlistError {
    #[error("wordlist not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read wordlist {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("lookup cancelled")]
    Cancelled,
}

/// Answers whether a word is in a wordlist.
pub trait WordlistQuery: Send + Sync + 'static {
    /// Looks up `word`. Implementations observe `cancel` before doing work.
    fn lookup<'a>(
        &'a self,
        word: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<bool, WordlistError>>;
}

/// In-memory wordlist loaded from a newline-separated text file.
///
/// Blank lines and lines starting with `#` are skipped. Matching ignores
/// case and surrounding whitespace.
#[derive(Debug, Default)]
pub struct TextWordlist {
    words: HashSet<String>,
}

impl TextWordlist {
    pub async fn load(path: &Path) -> Result<Self, WordlistError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                WordlistError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                WordlistError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let wordlist = Self::from_words(contents.lines());
        debug!(path = %path.display(), words = wordlist.len(), "Wordlist loaded");
        Ok(wordlist)
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .filter_map(|line| {
                let line = line.as_ref().trim();
                if line.is_empty() || line.starts_with('#') {
                    None
                } else {
                    Some(normalize(line))
                }
            })
            .collect();
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&normalize(word))
    }
}

impl WordlistQuery for TextWordlist {
    fn lookup<'a>(
        &'a self,
        word: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<bool, WordlistError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(WordlistError::Cancelled);
            }
            tokio::task::yield_now().await;
            Ok(self.contains(word))
        })
    }
}

fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}
