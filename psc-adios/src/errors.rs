use std::io;
use std::path::PathBuf;
use std::result;

use thiserror::Error;

use crate::dtype::Dtype;

#[derive(Debug, Error)]
pub enum Error {
    /// A variable handle or file was used after it was closed.
    #[error("psc-adios: {0} is closed")]
    Closed(String),

    /// An index was something other than an in-range scalar or a non-empty, step 1 slice.
    #[error("psc-adios: invalid index: {0}")]
    InvalidSelector(String),

    /// Geometry needs at least one variable to take its shape from.
    #[error("psc-adios: {0:?} contains no variables")]
    EmptyCatalog(PathBuf),

    /// Explicit lookup of a logical field that no catalog entry produces.
    #[error("psc-adios: no such field: {0}")]
    MissingField(String),

    /// A variable or attribute that isn't in the file's catalog.
    #[error("psc-adios: {kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("psc-adios: unable to open {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("psc-adios: engine error: {0}")]
    Engine(String),

    #[error("psc-adios: bad shape: {0}")]
    Shape(String),

    /// An attribute couldn't be interpreted the way the caller needs it.
    #[error("psc-adios: bad attribute {name}: {reason}")]
    Attribute { name: String, reason: String },

    #[error("psc-adios: expecting {expected:?} data, found {found:?}")]
    Dtype { expected: Dtype, found: Dtype },

    #[error("psc-adios: unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    IO(#[from] io::Error),
}

pub type Result<T> = result::Result<T, Error>;
