//! Single-line progress display on stderr.

use console::{style, Term};
use lockstep::executor::AggregateProgress;
use lockstep::runtime::ProgressReporter;

/// Rewrites one status line on every poll tick.
pub struct ConsoleProgressReporter {
    term: Term,
}

impl ConsoleProgressReporter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders the status line, truncated to `width` columns.
fn render(progress: &AggregateProgress, width: usize) -> String {
    let percent = progress
        .percent
        .map(|p| format!("{:>5.1}%", p))
        .unwrap_or_else(|| "   --%".to_string());
    let activity = match progress.active.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [first, rest @ ..] => format!("{} (+{} more)", first, rest.len()),
    };
    let line = format!(
        "[{}/{}] {} {} running, {} queued  {}",
        progress.finished(),
        progress.total,
        percent,
        progress.running,
        progress.queued,
        activity
    );
    console::truncate_str(&line, width, "…").into_owned()
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report(&self, progress: &AggregateProgress) {
        let width = self.term.size().1 as usize;
        let _ = self.term.clear_line();
        let _ = self
            .term
            .write_str(&style(render(progress, width.max(20))).dim().to_string());
    }

    fn finish(&self, progress: &AggregateProgress) {
        let _ = self.term.clear_line();
        if progress.failed > 0 || progress.canceled > 0 {
            let _ = self.term.write_line(&format!(
                "{} completed, {} failed, {} canceled",
                progress.completed, progress.failed, progress.canceled
            ));
        }
    }
}
