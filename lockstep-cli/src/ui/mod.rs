//! Terminal presentation: the progress line and interactive prompts.
//!
//! Only used when attached to a terminal; batch runs log progress through
//! `tracing` and answer no requests.

mod progress;
mod prompt;

pub use progress::ConsoleProgressReporter;
pub use prompt::PromptHandler;
