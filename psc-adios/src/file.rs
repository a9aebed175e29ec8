use std::{
    collections::HashMap,
    mem,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    dtype::{Block, Scalar},
    engine::{Engine, Mode, RawAttribute},
    errors::{Error, Result},
    variable::{SharedEngineFile, Variable},
};

/// An open container file.
///
/// Knows the names of the variables and attributes stored in the file, and hands out `Variable`
/// handles which it closes again when it is itself closed. Closing happens explicitly with
/// `close` or, failing that, when the `File` is dropped.
///
/// None of the methods here take the engine lock. Callers are expected to hold it.
///
pub struct File {
    path: PathBuf,
    io_name: String,
    engine: Arc<dyn Engine>,

    variable_names: Vec<String>,
    attribute_names: Vec<String>,

    state: Mutex<FileState>,
}

enum FileState {
    Open {
        file: SharedEngineFile,
        open_vars: HashMap<String, Arc<Variable>>,
    },
    Closed,
}

/// An attribute value.
///
/// Single element attributes are unwrapped to a `Scalar` (or a single `Text`) as a convenience.
/// Code that needs an array regardless should use `to_f64_vec`.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Scalar(Scalar),
    Array(Block),
    Text(String),
    TextArray(Vec<String>),
}

impl Attribute {
    /// Get numeric attribute data as a flat vector of `f64`.
    ///
    /// Returns `None` for text attributes.
    ///
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Attribute::Scalar(value) => Some(vec![value.to_f64()]),
            Attribute::Array(block) => Some(block.to_f64().iter().copied().collect()),
            Attribute::Text(_) | Attribute::TextArray(_) => None,
        }
    }
}

impl File {
    /// Open a container for reading.
    ///
    /// # Arguments
    ///
    /// * `engine` - The container engine to open the file with.
    /// * `path` - Path to the file. This should already be normalized, since it also names the
    ///   file's entry in the engine's registry.
    /// * `mode` - Only `Mode::Read` is supported.
    ///
    pub fn open(engine: Arc<dyn Engine>, path: &Path, mode: Mode) -> Result<Self> {
        log::debug!("file open {path:?}");
        if mode != Mode::Read {
            return Err(Error::Unsupported(format!("opening {path:?} in {mode:?} mode")));
        }

        let io_name = format!("io-{}", path.display());
        let file = engine.open(&io_name, path, mode)?;
        let variable_names = file.available_variables();
        let attribute_names = file.available_attributes();

        Ok(Self {
            path: path.to_path_buf(),
            io_name,
            engine,
            variable_names,
            attribute_names,
            state: Mutex::new(FileState::Open {
                file: Arc::new(Mutex::new(file)),
                open_vars: HashMap::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the variables in this file, in the engine's catalog order
    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    /// Names of the attributes in this file, in the engine's catalog order
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), FileState::Closed)
    }

    /// Get a handle to a variable.
    ///
    /// The handle stays valid until this file is closed. Asking for the same variable again
    /// returns the same handle.
    ///
    pub fn get_variable(&self, name: &str) -> Result<Arc<Variable>> {
        let mut state = self.state.lock();
        match &mut *state {
            FileState::Closed => Err(self.closed()),
            FileState::Open { file, open_vars } => {
                if let Some(variable) = open_vars.get(name) {
                    return Ok(Arc::clone(variable));
                }

                let raw = file
                    .lock()
                    .inquire_variable(name)
                    .ok_or_else(|| Error::NotFound {
                        kind: "variable",
                        name: name.to_string(),
                    })?;
                let variable = Arc::new(Variable::new(raw, Arc::clone(file)));
                open_vars.insert(name.to_string(), Arc::clone(&variable));

                Ok(variable)
            }
        }
    }

    /// Get the value of an attribute.
    ///
    pub fn get_attribute(&self, name: &str) -> Result<Attribute> {
        let state = self.state.lock();
        match &*state {
            FileState::Closed => Err(self.closed()),
            FileState::Open { file, .. } => {
                let raw = file
                    .lock()
                    .inquire_attribute(name)
                    .ok_or_else(|| Error::NotFound {
                        kind: "attribute",
                        name: name.to_string(),
                    })?;

                Ok(match raw {
                    RawAttribute::Numeric(block) => match block.len() {
                        1 => match block.get_flat(0) {
                            Some(value) => Attribute::Scalar(value),
                            None => Attribute::Array(block),
                        },
                        _ => Attribute::Array(block),
                    },
                    RawAttribute::Text(mut strings) => match strings.len() {
                        1 => Attribute::Text(strings.remove(0)),
                        _ => Attribute::TextArray(strings),
                    },
                })
            }
        }
    }

    /// Close this file, all variables obtained from it, and its entry in the engine registry.
    ///
    /// Closing an already closed file does nothing.
    ///
    pub fn close(&self) -> Result<()> {
        let state = mem::replace(&mut *self.state.lock(), FileState::Closed);
        match state {
            FileState::Closed => Ok(()),
            FileState::Open { file, open_vars } => {
                log::debug!("file close {:?}, open vars {:?}", self.path, open_vars.keys());
                for variable in open_vars.values() {
                    variable.close();
                }
                drop(open_vars);

                let result = file.lock().close();
                if !self.engine.remove_io(&self.io_name) {
                    log::debug!("io {} was already removed", self.io_name);
                }

                result
            }
        }
    }

    fn closed(&self) -> Error {
        Error::Closed(format!("file {:?}", self.path))
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if !self.is_closed() {
            log::debug!("file drop {:?}", self.path);
            if let Err(err) = self.close() {
                log::warn!("error closing {:?}: {err}", self.path);
            }
        }
    }
}
