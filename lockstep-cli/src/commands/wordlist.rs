//! `lockstep wordlist`: download, verify, and query wordlists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Subcommand;
use console::style;
use lockstep::config::ConfigFile;
use lockstep::executor::WorkUnit;
use lockstep::jobs::{
    DownloadWordlistJob, JobError, QueryWordlistJob, VerifyDigestJob, VerifyTarget,
};
use lockstep::wordlist::{ChunkSource, FileChunkSource, HttpChunkSource, TextWordlist};
use tracing::info;

use super::common::{parse_digest, settle};
use crate::error::CliError;
use crate::runner::CliRunner;

/// File name used when the URL does not end in one.
const FALLBACK_FILE_NAME: &str = "wordlist.txt";

/// Wordlist subcommands.
#[derive(Debug, Subcommand)]
pub enum WordlistCommands {
    /// Download a wordlist, resuming a previous partial download
    Download {
        /// Source URL, http(s):// or a local path (default: wordlist.url)
        #[arg(long)]
        url: Option<String>,

        /// Expected SHA-256 of the finished file (default: wordlist.sha256)
        #[arg(long)]
        sha256: Option<String>,

        /// Destination file (default: wordlist.directory plus the URL's file name)
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Replace an existing destination without asking
        #[arg(long)]
        force: bool,
    },

    /// Check a file against a SHA-256 digest
    Verify {
        /// File to check
        path: PathBuf,

        /// Expected SHA-256
        #[arg(long)]
        sha256: String,
    },

    /// Look words up in a wordlist
    Query {
        /// Wordlist file, one word per line
        #[arg(long)]
        wordlist: PathBuf,

        /// Words to look up
        #[arg(required = true)]
        words: Vec<String>,
    },
}

pub async fn run(runner: &CliRunner, command: WordlistCommands) -> Result<(), CliError> {
    match command {
        WordlistCommands::Download {
            url,
            sha256,
            dest,
            force,
        } => run_download(runner, url, sha256, dest, force).await,
        WordlistCommands::Verify { path, sha256 } => run_verify(runner, path, &sha256).await,
        WordlistCommands::Query { wordlist, words } => run_query(runner, &wordlist, words).await,
    }
}

async fn run_download(
    runner: &CliRunner,
    url: Option<String>,
    sha256: Option<String>,
    dest: Option<PathBuf>,
    force: bool,
) -> Result<(), CliError> {
    runner.log_startup("wordlist download");
    let config = runner.config();

    let url = url.or_else(|| config.wordlist.url.clone()).ok_or_else(|| {
        CliError::Usage(
            "No wordlist URL. Pass --url or run 'lockstep config set wordlist.url <URL>'."
                .to_string(),
        )
    })?;
    let expected = sha256
        .or_else(|| config.wordlist.sha256.clone())
        .map(|hex| parse_digest(&hex))
        .transpose()?;
    let dest = dest.unwrap_or_else(|| default_destination(config, &url));
    let source = chunk_source(&url)?;

    info!(url = %url, dest = %dest.display(), verify = expected.is_some(), "Downloading wordlist");

    let root = runner.root_host();
    let download = DownloadWordlistJob::new(source, &dest).with_overwrite(force);
    let output = download.output();

    let mut units: Vec<Arc<dyn WorkUnit>> = Vec::with_capacity(2);
    let download: Arc<dyn WorkUnit> = match expected {
        Some(expected) => {
            let verify: Arc<dyn WorkUnit> = Arc::new(VerifyDigestJob::new(
                VerifyTarget::Download(output.clone()),
                expected,
            ));
            let download: Arc<dyn WorkUnit> = Arc::new(download.then(Arc::clone(&verify)));
            units.push(Arc::clone(&download));
            units.push(verify);
            download
        }
        None => {
            let download: Arc<dyn WorkUnit> = Arc::new(download);
            units.push(Arc::clone(&download));
            download
        }
    };
    root.launch(download)?;

    runner.drive(&root).await?;
    settle(&units)?;

    if let Some(file) = output.get() {
        if file.resumed_from > 0 {
            println!(
                "Resumed at {} bytes, {} bytes total",
                file.resumed_from, file.bytes
            );
        }
        println!("Saved {} ({} bytes)", file.path.display(), file.bytes);
    }
    if units.len() > 1 {
        println!("{}", style("Digest verified").green());
    }
    Ok(())
}

async fn run_verify(runner: &CliRunner, path: PathBuf, sha256: &str) -> Result<(), CliError> {
    runner.log_startup("wordlist verify");
    let expected = parse_digest(sha256)?;

    let root = runner.root_host();
    let verify: Arc<dyn WorkUnit> = Arc::new(VerifyDigestJob::new(
        VerifyTarget::Path(path.clone()),
        expected,
    ));
    root.launch(Arc::clone(&verify))?;

    runner.drive(&root).await?;
    settle(&[verify])?;

    println!("{}: {}", path.display(), style("OK").green());
    Ok(())
}

async fn run_query(runner: &CliRunner, wordlist: &Path, words: Vec<String>) -> Result<(), CliError> {
    runner.log_startup("wordlist query");

    let wordlist = TextWordlist::load(wordlist)
        .await
        .map_err(|e| CliError::Job(JobError::Wordlist(e)))?;
    info!(words = wordlist.len(), "Wordlist loaded");

    let root = runner.root_host();
    let query = Arc::new(QueryWordlistJob::new(Arc::new(wordlist), words));
    let output = query.output();
    root.launch(query.clone())?;

    runner.drive(&root).await?;

    // Results are published even when some words are missing.
    if let Some(results) = output.get() {
        for result in results {
            let mark = if result.found {
                style("found").green()
            } else {
                style("not found").red()
            };
            println!("{:<24} {}", result.word, mark);
        }
    }

    settle(&[query as Arc<dyn WorkUnit>])
}

/// Picks a source for `url`: HTTP(S) URLs go through `reqwest`, anything
/// else is treated as a local path.
fn chunk_source(url: &str) -> Result<Arc<dyn ChunkSource>, CliError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let source = HttpChunkSource::new(url).map_err(|e| CliError::Job(e.into()))?;
        Ok(Arc::new(source))
    } else {
        let path = url.strip_prefix("file://").unwrap_or(url);
        Ok(Arc::new(FileChunkSource::new(path)))
    }
}

fn default_destination(config: &ConfigFile, url: &str) -> PathBuf {
    config.wordlist.directory.join(file_name_from_url(url))
}

fn file_name_from_url(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    match without_query.rsplit('/').next() {
        Some(name) if !name.is_empty() && !without_query.ends_with("://") => name,
        _ => FALLBACK_FILE_NAME,
    }
}
