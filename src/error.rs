//! Process-setup error taxonomy.
//!
//! Session-local failures (peer-gone / malformed / internal) are classified
//! and handled entirely inside [`crate::session`] and never surface here —
//! only failures that can legitimately end the whole process (socket bind,
//! runtime construction) are represented.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
