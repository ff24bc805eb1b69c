//! Crate-wide error taxonomy (spec.md §7).
//!
//! Every fallible path in this crate returns [`Result`]; nothing here ever
//! aborts the process. This is the one place this crate deliberately departs
//! from the teacher's own style (which leans on `.expect()`/`panic!`
//! throughout `src/mccfr`) because spec.md §9 flags `exit(-1)`-on-error as a
//! pattern to lift into error-value propagation for a library.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// missing/invalid `BettingAbstraction` (or other config) parameters.
    Config(String),
    /// malformed betting sequence: zero successors, out-of-range player,
    /// non-increasing bet size, unreachable fold, etc.
    Tree(String),
    /// unexpected EOF, mismatched file size, or any other I/O failure.
    Io(std::io::Error),
    /// type mismatch (e.g. reading doubles from an int file), bucket/holding
    /// out of bounds, sumprob overflow after halving.
    Value(String),
    /// arena allocation above a configured cap.
    Resource(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
    pub fn tree(msg: impl Into<String>) -> Self {
        Error::Tree(msg.into())
    }
    pub fn value(msg: impl Into<String>) -> Self {
        Error::Value(msg.into())
    }
    pub fn resource(msg: impl Into<String>) -> Self {
        Error::Resource(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Tree(msg) => write!(f, "tree error: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Value(msg) => write!(f, "value error: {msg}"),
            Error::Resource(msg) => write!(f, "resource error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
