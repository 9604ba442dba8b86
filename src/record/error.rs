use crate::file::PfError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("paged file error: {0}")]
    Pf(#[from] PfError),

    #[error("end of file or scan")]
    Eof,

    #[error("record of {0} bytes can never fit on a page")]
    PageFull(usize),

    #[error("invalid record id: page {0}, slot {1}")]
    InvalidRid(i32, i32),

    #[error("no record at page {0}, slot {1}")]
    NoRecord(i32, i32),

    #[error("out of memory")]
    NoMem,
}

pub type HeapResult<T> = Result<T, HeapError>;
