use std::path::Path;

use crate::{
    dtype::{Block, BufferMut, Dtype},
    errors::Result,
};

/// Access mode requested when opening a container.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    Read,
    Write,
}

/// A trait for the container library that actually reads field output from disk.
///
/// The engine is process global and keeps a registry of declared IOs keyed by name. It is not
/// safe to call into concurrently: all calls on an `Engine`, and on any `EngineFile` it returns,
/// must be serialized by the caller. `Coordinator` does this.
///
pub trait Engine: Send + Sync {
    /// Declare an IO named `io_name` in the engine's registry and open `path` through it.
    ///
    /// Fails if `io_name` is already declared or if `path` can't be opened, in which case nothing
    /// is left declared.
    ///
    fn open(&self, io_name: &str, path: &Path, mode: Mode) -> Result<Box<dyn EngineFile>>;

    /// Remove a previously declared IO from the registry.
    ///
    /// Returns `false` if no IO of that name was declared.
    ///
    fn remove_io(&self, io_name: &str) -> bool;
}

/// One file opened by an `Engine`.
///
/// Shapes, selections and output buffers are all in on-disk axis order, which is the reverse of
/// the order this crate presents to callers.
///
pub trait EngineFile: Send {
    /// Names of all variables in the file, in the engine's catalog order
    fn available_variables(&self) -> Vec<String>;

    /// Names of all attributes in the file, in the engine's catalog order
    fn available_attributes(&self) -> Vec<String>;

    /// Look up a variable by name.
    ///
    /// Should return `Option::None` if there is no variable named `name`.
    ///
    fn inquire_variable(&self, name: &str) -> Option<RawVariable>;

    /// Look up an attribute by name.
    ///
    /// Should return `Option::None` if there is no attribute named `name`.
    ///
    fn inquire_attribute(&self, name: &str) -> Option<RawAttribute>;

    /// Read the selected region of `variable` into `out`, synchronously.
    ///
    /// `out` holds exactly as many elements as the selection, and is filled in on-disk (row
    /// major) order.
    ///
    fn get(&mut self, variable: &RawVariable, out: BufferMut<'_>) -> Result<()>;

    /// Close the file. No other method will be called afterwards.
    fn close(&mut self) -> Result<()>;
}

/// A hyper-rectangle, in on-disk axis order.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub start: Vec<usize>,
    pub count: Vec<usize>,
}

/// A variable as the engine describes it, plus the currently selected region.
///
#[derive(Clone, Debug)]
pub struct RawVariable {
    pub name: String,

    /// Extent of each axis, in on-disk order
    pub shape: Vec<usize>,

    pub dtype: Dtype,

    selection: Option<Region>,
}

impl RawVariable {
    pub fn new<S: Into<String>>(name: S, shape: Vec<usize>, dtype: Dtype) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
            selection: None,
        }
    }

    pub fn set_selection(&mut self, start: Vec<usize>, count: Vec<usize>) {
        self.selection = Some(Region { start, count });
    }

    /// The selected region. With no selection the whole variable is selected.
    ///
    pub fn selection(&self) -> Region {
        match &self.selection {
            Some(region) => region.clone(),
            None => Region {
                start: vec![0; self.shape.len()],
                count: self.shape.clone(),
            },
        }
    }
}

/// Attribute data as the engine stores it.
///
#[derive(Clone, Debug, PartialEq)]
pub enum RawAttribute {
    /// A one dimensional array of numbers
    Numeric(Block),

    Text(Vec<String>),
}
