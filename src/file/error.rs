use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PfError {
    #[error("out of memory")]
    NoMem,

    #[error("no buffer space: all frames are fixed")]
    NoBuf,

    #[error("page {1} of file {0} is fixed in the buffer")]
    PageFixed(usize, i32),

    #[error("page {1} of file {0} is not fixed in the buffer")]
    PageUnfixed(usize, i32),

    #[error("page {1} of file {0} is not in the buffer")]
    PageNotInBuf(usize, i32),

    #[error("page {1} of file {0} is already free")]
    PageFree(usize, i32),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("incomplete read of page from file")]
    IncompleteRead,

    #[error("incomplete write of page to file")]
    IncompleteWrite,

    #[error("incomplete read of file header")]
    HdrRead,

    #[error("incomplete write of file header")]
    HdrWrite,

    #[error("invalid page number {0}")]
    InvalidPage(i32),

    #[error("end of file")]
    Eof,

    #[error("file already open: {0}")]
    FileOpen(String),

    #[error("file already exists: {0}")]
    FileExists(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file table is full")]
    FtabFull,

    #[error("invalid file descriptor: {0}")]
    BadFd(usize),

    // Internal invariant violations
    #[error("newly allocated page {1} of file {0} already in buffer")]
    PageInBuf(usize, i32),

    #[error("page table entry not found")]
    HashNotFound,

    #[error("page already exists in page table")]
    HashPageExist,
}

pub type PfResult<T> = Result<T, PfError>;
