//! Resumable byte transfer.
//!
//! A [`ChunkSource`] opens a stream of byte chunks starting at an offset.
//! Sources that cannot honour the offset start from zero and say so through
//! [`ChunkStream::offset`], so the caller can discard its partial file.

use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// User agent sent with HTTP requests.
pub const DEFAULT_USER_AGENT: &str = concat!("lockstep/", env!("CARGO_PKG_VERSION"));

/// Chunk size for file-backed sources.
pub const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Errors from a chunk source.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("source not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// An open transfer.
pub struct ChunkStream {
    /// Offset the first chunk starts at. Zero when the source ignored the
    /// requested offset.
    pub offset: u64,
    /// Total length of the resource, when known.
    pub total_len: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes, TransferError>>,
}

/// A resumable source of bytes.
pub trait ChunkSource: Send + Sync + 'static {
    /// Human-readable location, for logs and descriptions.
    fn describe(&self) -> String;

    /// Opens the resource at `offset`.
    fn open(&self, offset: u64) -> BoxFuture<'_, Result<ChunkStream, TransferError>>;
}

// =============================================================================
// HTTP
// =============================================================================

/// Source backed by an HTTP(S) URL, resumed with `Range` requests.
pub struct HttpChunkSource {
    client: reqwest::Client,
    url: String,
}

impl HttpChunkSource {
    pub fn new(url: impl Into<String>) -> Result<Self, TransferError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(DEFAULT_USER_AGENT)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| TransferError::Http {
                url: url.clone(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client, url })
    }
}

impl ChunkSource for HttpChunkSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn open(&self, offset: u64) -> BoxFuture<'_, Result<ChunkStream, TransferError>> {
        Box::pin(async move {
            let mut request = self.client.get(&self.url);
            if offset > 0 {
                request = request.header(RANGE, format!("bytes={}-", offset));
            }

            let response = request.send().await.map_err(|e| {
                warn!(url = %self.url, error = %e, is_connect = e.is_connect(), "HTTP request failed");
                TransferError::Http {
                    url: self.url.clone(),
                    message: e.to_string(),
                }
            })?;

            let status = response.status();
            debug!(url = %self.url, status = status.as_u16(), offset, "HTTP response received");

            if status == StatusCode::NOT_FOUND {
                return Err(TransferError::NotFound(self.url.clone()));
            }
            if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
                // The partial file already holds the whole resource.
                return Ok(ChunkStream {
                    offset,
                    total_len: Some(offset),
                    chunks: stream::empty::<Result<Bytes, TransferError>>().boxed(),
                });
            }
            if !status.is_success() {
                return Err(TransferError::Status {
                    url: self.url.clone(),
                    status: status.as_u16(),
                });
            }

            let start = if status == StatusCode::PARTIAL_CONTENT {
                offset
            } else {
                0
            };
            let total_len = response.content_length().map(|len| start + len);
            let url = self.url.clone();
            let chunks = response
                .bytes_stream()
                .map(move |chunk| {
                    chunk.map_err(|e| TransferError::Http {
                        url: url.clone(),
                        message: e.to_string(),
                    })
                })
                .boxed();

            Ok(ChunkStream {
                offset: start,
                total_len,
                chunks,
            })
        })
    }
}

// =============================================================================
// Local file
// =============================================================================

/// Source backed by a local file. Used for mirrors on removable media and
/// in tests.
pub struct FileChunkSource {
    path: PathBuf,
    chunk_size: usize,
}

impl FileChunkSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: FILE_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl ChunkSource for FileChunkSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self, offset: u64) -> BoxFuture<'_, Result<ChunkStream, TransferError>> {
        Box::pin(async move {
            let mut file = tokio::fs::File::open(&self.path).await.map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    TransferError::NotFound(self.describe())
                } else {
                    TransferError::Io(e)
                }
            })?;

            let total_len = file.metadata().await?.len();
            let start = offset.min(total_len);
            file.seek(SeekFrom::Start(start)).await?;

            let chunks = ReaderStream::with_capacity(file, self.chunk_size)
                .map(|chunk| chunk.map_err(TransferError::Io))
                .boxed();

            Ok(ChunkStream {
                offset: start,
                total_len: Some(total_len),
                chunks,
            })
        })
    }
}
