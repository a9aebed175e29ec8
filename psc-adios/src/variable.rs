use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{
    dtype::{Block, Dtype},
    engine::{EngineFile, RawVariable},
    errors::{Error, Result},
    helpers::reversed,
    selection::{self, Resolved, Selector},
};

pub(crate) type SharedEngineFile = Arc<Mutex<Box<dyn EngineFile>>>;

/// One named array stored in an open container file.
///
/// Shapes, starts and counts are all given in logical axis order, fastest varying axis first.
/// The reversal to and from the container's own axis order happens here and nowhere else.
///
/// Variables are handed out by `File::get_variable` and closed along with their file. Every
/// method fails with `Error::Closed` after that. As with any engine call, reading requires the
/// caller to hold the engine lock.
///
pub struct Variable {
    name: String,
    shape: Vec<usize>,
    dtype: Dtype,
    state: Mutex<VariableState>,
}

enum VariableState {
    Open {
        raw: RawVariable,
        file: SharedEngineFile,
    },
    Closed,
}

impl Variable {
    pub(crate) fn new(raw: RawVariable, file: SharedEngineFile) -> Self {
        log::debug!("variable new {} disk shape {:?}", raw.name, raw.shape);
        Self {
            name: raw.name.clone(),
            shape: reversed(&raw.shape),
            dtype: raw.dtype,
            state: Mutex::new(VariableState::Open { raw, file }),
        }
    }

    pub fn name(&self) -> Result<&str> {
        self.check_open()?;
        Ok(&self.name)
    }

    /// Extent of each axis, in logical order
    pub fn shape(&self) -> Result<&[usize]> {
        self.check_open()?;
        Ok(&self.shape)
    }

    pub fn dtype(&self) -> Result<Dtype> {
        self.check_open()?;
        Ok(self.dtype)
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), VariableState::Closed)
    }

    /// Read a hyper-rectangular block.
    ///
    /// # Arguments
    ///
    /// * `start` - Offset of the block along each axis
    /// * `count` - Extent of the block along each axis. Every count must be at least one.
    ///
    /// The returned block has shape `count` and is laid out in column-major order, which is how
    /// the container stores it once axis order is reversed.
    ///
    pub fn read(&self, start: &[usize], count: &[usize]) -> Result<Block> {
        self.check_open()?;
        self.check_region(start, count)?;

        let mut state = self.state.lock();
        match &mut *state {
            VariableState::Closed => Err(self.closed()),
            VariableState::Open { raw, file } => {
                raw.set_selection(reversed(start), reversed(count));

                let mut block = Block::zeros_f(self.dtype, count);
                let buffer = block.buffer_mut().ok_or_else(|| {
                    Error::Engine(format!("{}: output buffer is not contiguous", self.name))
                })?;
                file.lock().get(raw, buffer)?;

                Ok(block)
            }
        }
    }

    /// Read the block described by a tuple of per-axis selectors.
    ///
    /// Axes selected with `Selector::Index` are dropped from the result. Axes not covered by
    /// `selectors` are read in full. Selectors are validated before anything is read.
    ///
    pub fn get(&self, selectors: &[Selector]) -> Result<Block> {
        self.check_open()?;
        let resolved = selection::resolve(selectors, &self.shape)?;

        self.get_resolved(&resolved)
    }

    pub(crate) fn get_resolved(&self, resolved: &Resolved) -> Result<Block> {
        let block = self.read(&resolved.start, &resolved.count)?;

        Ok(resolved.squeeze(block))
    }

    pub(crate) fn close(&self) {
        log::debug!("variable close {}", self.name);
        *self.state.lock() = VariableState::Closed;
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(self.closed())
        } else {
            Ok(())
        }
    }

    fn closed(&self) -> Error {
        Error::Closed(format!("variable {}", self.name))
    }

    fn check_region(&self, start: &[usize], count: &[usize]) -> Result<()> {
        let ndim = self.shape.len();
        if start.len() != ndim || count.len() != ndim {
            return Err(Error::InvalidSelector(format!(
                "{}: start {start:?} and count {count:?} must both have {ndim} axes",
                self.name
            )));
        }

        for (axis, ((&start, &count), &extent)) in
            start.iter().zip(count).zip(&self.shape).enumerate()
        {
            if count == 0 || start.checked_add(count).map_or(true, |end| end > extent) {
                return Err(Error::InvalidSelector(format!(
                    "{}: {count} from {start} on axis {axis} with extent {extent}",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Variable(name={}, shape={:?}, dtype={:?})",
            self.name, self.shape, self.dtype
        )
    }
}
