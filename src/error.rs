//! Errors reported by the serial download session.
//!
//! Every layer (channel, transfer, command, work parsing and sequencing)
//! returns these as values. Only the command line front-end turns them into
//! user messages and an exit status.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::transport::Report;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The serial device could not be opened or its line attributes set.
    #[error("cannot open serial device: {0}")]
    Open(#[from] serialport::Error),

    /// Queued data could not be discarded or drained.
    #[error("serial line error: {0}")]
    Line(#[source] io::Error),

    /// Fewer than 4 association bytes came back from the boot ROM.
    #[error("magic timeout after {received} byte(s), make sure the device is in recovery mode")]
    HandshakeTimeout {
        received: usize,
        #[source]
        source: io::Error,
    },

    /// The association response is not the magic sequence.
    #[error("magic mismatch, response was {response:02x?}")]
    HandshakeMismatch { response: [u8; 4] },

    /// A read or write call failed in the middle of a transfer.
    #[error("{report:?} transfer failed after {transferred} byte(s): {source}")]
    Transfer {
        report: Report,
        transferred: usize,
        #[source]
        source: io::Error,
    },

    /// The line stayed silent for too many consecutive reads.
    #[error("{report:?} transfer stalled after {transferred} of {expected} byte(s)")]
    Stalled {
        report: Report,
        transferred: usize,
        expected: usize,
    },

    #[error("transfer of {expected} byte(s) does not fit a {capacity} byte buffer")]
    BufferTooSmall { expected: usize, capacity: usize },

    /// The device answered with a word the protocol does not define here.
    #[error("unexpected {what} response 0x{value:08x}")]
    UnexpectedResponse { what: &'static str, value: u32 },

    #[error("device accepted only {written} of {expected} byte(s)")]
    ShortWrite { written: usize, expected: usize },

    /// Read back data differs from what was downloaded.
    #[error("verification failed at 0x{address:08x}")]
    Verify { address: u32 },

    #[error("no load address for {0}, give one with `load` or use an image with an IVT header")]
    NoLoadAddress(PathBuf),

    #[error("{0} has no IVT header to jump to")]
    NoImageHeader(PathBuf),

    #[error("cannot read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read work file {path}: {source}")]
    WorkFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("job argument `{arg}`: {reason}")]
    Job { arg: String, reason: String },

    #[error("work file `{0}` not found")]
    ConfigNotFound(String),

    /// Processing of a work item failed in the command layer.
    #[error("work item #{index} failed: {source}")]
    Item {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// The device stopped answering status queries after a successful item.
    #[error("status check failed: {0}")]
    Status(#[source] Box<Error>),
}
