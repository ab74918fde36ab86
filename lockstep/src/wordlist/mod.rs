//! Wordlist boundaries.
//!
//! - [`query`]: membership lookups against a compiled wordlist.
//! - [`transfer`]: resumable byte sources used to fetch wordlists.

pub mod query;
pub mod transfer;

pub use query::{TextWordlist, WordlistError, WordlistQuery};
pub use transfer::{ChunkSource, ChunkStream, FileChunkSource, HttpChunkSource, TransferError};
