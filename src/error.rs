use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

use crate::Direction;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed {path}: {source}")]
    Attribute {
        path: PathBuf,
        #[source]
        source: ParseIntError,
    },
    #[error("mapping {len:#x} bytes at {offset:#x} into virtual memory failed: {source}")]
    Mmap {
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },
    #[error("cannot insert kernel module `{0}`")]
    ModuleInsert(String),
    #[error("cannot remove kernel module `{0}`")]
    ModuleRemove(String),
    #[error("{0} channel is in Scatter/Gather mode; only Direct Register Mode is supported")]
    ScatterGather(Direction),
    #[error("accelerator is not ready (control {0:#x})")]
    KernelNotReady(u32),
    #[error("transfer is running")]
    TransactionRunning,
    #[error("transfer was not programmed")]
    TransactionNotProgrammed,
    #[error("transfer was not started")]
    TransactionNotStarted,
    #[error("transfer length {0:#x} exceeds the 26 bit length field")]
    LengthTooLarge(usize),
    #[error("buffer `{0}` was released")]
    BufferReleased(String),
    #[error("transfer of {length:#x} bytes at offset {offset:#x} overruns {size:#x} byte buffer")]
    BufferOverrun {
        offset: usize,
        length: usize,
        size: usize,
    },
    #[error("timed out waiting for hardware")]
    Timeout,
    #[error("wait was cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Error {
        Error::File {
            path: path.into(),
            source,
        }
    }

    /// Misuse of the transfer state machine. Hardware state is untouched and
    /// the handle stays usable; every other variant is an environment or
    /// setup failure that retrying will not fix.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::TransactionRunning
                | Error::TransactionNotProgrammed
                | Error::TransactionNotStarted
                | Error::LengthTooLarge(_)
                | Error::BufferReleased(_)
                | Error::BufferOverrun { .. }
        )
    }

    /// The wait gave up but the hardware is still armed.
    pub fn is_interrupted_wait(&self) -> bool {
        matches!(self, Error::Timeout | Error::Cancelled)
    }
}
