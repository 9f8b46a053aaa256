//! Async I/O traits.
//!
//! Streaming HTTP bodies are exposed as `Box<dyn AsyncRead + Send + Unpin>`
//! and drained with the `AsyncReadExt` helpers.

pub use tokio::io::{
    duplex, empty, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufReader, DuplexStream, Error, ErrorKind, ReadBuf, Result,
};
