//! Wordlist query job.
//!
//! One hidden child per word: lookups run concurrently under the
//! orchestrator's gate without cluttering the progress display.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::executor::{
    checkpoint, handoff, HandoffReceiver, HandoffSender, HostCapability, Progress, SubmitOptions,
    UnitCore, UnitError, UnitFuture, WorkUnit,
};
use crate::wordlist::WordlistQuery;

use super::error::JobError;

/// Outcome of one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordMatch {
    pub word: String,
    pub found: bool,
}

/// Looks up a single word.
pub struct LookupWordJob {
    core: UnitCore,
    wordlist: Arc<dyn WordlistQuery>,
    word: String,
    output: HandoffSender<bool>,
}

impl LookupWordJob {
    pub fn new(wordlist: Arc<dyn WordlistQuery>, word: impl Into<String>) -> Self {
        let (output, _) = handoff("lookup result");
        Self {
            core: UnitCore::new().hidden(),
            wordlist,
            word: word.into(),
            output,
        }
    }

    pub fn output(&self) -> HandoffReceiver<bool> {
        self.output.receiver()
    }
}

impl WorkUnit for LookupWordJob {
    fn name(&self) -> &str {
        "LookupWord"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, _host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let found = self
                .wordlist
                .lookup(&self.word, &cancel)
                .await
                .map_err(JobError::from)?;
            let _ = self.output.publish(found);
            Ok(true)
        })
    }
}

/// Looks up every word and publishes the results in input order.
///
/// Fails with [`JobError::WordsNotFound`] when any word is missing; the
/// results are published first so callers can still show them.
pub struct QueryWordlistJob {
    core: UnitCore,
    wordlist: Arc<dyn WordlistQuery>,
    words: Vec<String>,
    output: HandoffSender<Vec<WordMatch>>,
}

impl QueryWordlistJob {
    pub fn new(wordlist: Arc<dyn WordlistQuery>, words: Vec<String>) -> Self {
        let (output, _) = handoff("query results");
        Self {
            core: UnitCore::new(),
            wordlist,
            words,
            output,
        }
    }

    pub fn output(&self) -> HandoffReceiver<Vec<WordMatch>> {
        self.output.receiver()
    }
}

impl WorkUnit for QueryWordlistJob {
    fn name(&self) -> &str {
        "QueryWordlist"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            if self.words.is_empty() {
                return Err(JobError::InvalidInput("no words to look up".to_string()).into());
            }

            let mut lookups = Vec::with_capacity(self.words.len());
            for word in &self.words {
                checkpoint(&cancel)?;
                let child = LookupWordJob::new(Arc::clone(&self.wordlist), word.clone());
                let result = child.output();
                let handle = host.submit_child(Arc::new(child), SubmitOptions::transient())?;
                lookups.push((word.clone(), result, handle));
            }
            self.core
                .set_description(format!("looking up {} word(s)", lookups.len()));

            host.join_children().await?;
            checkpoint(&cancel)?;

            let mut results = Vec::with_capacity(lookups.len());
            for (word, result, handle) in lookups {
                let found = match (result.get(), handle.last_error()) {
                    (Some(found), _) => *found,
                    (None, Some(source)) => {
                        return Err(JobError::LookupFailed { word, source }.into());
                    }
                    (None, None) => *result.require()?,
                };
                debug!(word = %word, found, "Lookup finished");
                results.push(WordMatch { word, found });
            }

            let missing: Vec<String> = results
                .iter()
                .filter(|m| !m.found)
                .map(|m| m.word.clone())
                .collect();
            info!(
                words = results.len(),
                missing = missing.len(),
                "Wordlist query finished"
            );
            self.core.set_progress(Progress::percent(100.0));
            let _ = self.output.publish(results);

            if missing.is_empty() {
                Ok(true)
            } else {
                Err(UnitError::from(JobError::WordsNotFound { words: missing }))
            }
        })
    }
}
