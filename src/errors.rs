use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("page error: {0}")]
    Page(#[from] PageError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WalError {
    #[error("segment of {0} bytes cannot fit in any page")]
    TooLarge(usize),

    #[error("wal page checksum mismatch")]
    ChecksumMismatch,

    #[error("expected a {expected}-byte buffer, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("writer accepted only {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("log is torn: a record fragment was left pending at end of stream")]
    TornTail,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error("page does not have enough space for this entry")]
    NotEnoughSpace,

    #[error("page magic mismatch: expected 0xABCD, got {0:#06x}")]
    BadMagic(u16),

    #[error("expected page type {expected:?}, got {actual:?}")]
    WrongType { expected: u16, actual: u16 },

    #[error("expected a {expected}-byte buffer, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("page id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: u64, actual: u64 },

    #[error("page {0} is not marked used")]
    NotUsed(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("key not found")]
    NotFound,

    #[error("key already exists")]
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock acquisition would deadlock")]
    Deadlock,
}
