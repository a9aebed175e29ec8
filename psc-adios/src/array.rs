use std::{fmt, sync::Arc};

use ndarray::ArrayD;

use crate::{
    dtype::{Block, Dtype, Element},
    errors::{Error, Result},
    selection::{self, Selector},
    store::Store,
};

/// A lazily read array holding one physical field.
///
/// PSC stores several fields per variable, stacked along a trailing component axis. A
/// `FieldArray` presents one of those components as an array in its own right, with the
/// component axis dropped. Nothing is read until one of the `read` methods is called.
///
/// The variable is looked up again in the store's current file on every read, so reads keep
/// working if the file is closed and reopened in between.
///
pub struct FieldArray {
    name: String,
    store: Arc<Store>,
    variable: String,
    component: usize,

    /// Shape of the field, without the component axis
    shape: Vec<usize>,
    ncomponents: usize,
    dtype: Dtype,
}

impl FieldArray {
    /// Set up lazy access to a single component of a variable.
    ///
    /// Looks up the variable's shape and type, under the store's lock, but reads no data.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the field, e.g. `"ex_ec"`
    /// * `store` - The store to read from
    /// * `variable` - Name of the variable in the file that holds the field, e.g. `"jeh"`
    /// * `component` - Position of the field along the variable's trailing axis
    ///
    pub fn new<S, V>(name: S, store: Arc<Store>, variable: V, component: usize) -> Result<Self>
    where
        S: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        let variable = variable.into();
        let (mut shape, dtype) = {
            let _guard = store.lock().acquire();
            let file = store.acquire(false)?;
            let raw = file.get_variable(&variable)?;

            (raw.shape()?.to_vec(), raw.dtype()?)
        };

        let ncomponents = shape.pop().ok_or_else(|| {
            Error::Shape(format!("{variable} is a scalar, expecting a component axis"))
        })?;
        if component >= ncomponents {
            return Err(Error::Shape(format!(
                "{name}: component {component} out of range, {variable} has {ncomponents}"
            )));
        }

        Ok(Self {
            name,
            store,
            variable,
            component,
            shape,
            ncomponents,
            dtype,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the variable the field is stored in
    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn component(&self) -> usize {
        self.component
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Read part of the field.
    ///
    /// Selectors apply to the field's own axes, as for `Variable::get`. Axes selected by index
    /// are dropped from the result.
    ///
    pub fn read_block(&self, selectors: &[Selector]) -> Result<Block> {
        let mut resolved = selection::resolve(selectors, &self.shape)?;
        log::debug!("field read {} shape {:?}", self.name, resolved.shape());
        resolved.start.push(0);
        resolved.count.push(self.ncomponents);

        let block = {
            let _guard = self.store.lock().acquire();
            let file = self.store.acquire(false)?;
            let variable = file.get_variable(&self.variable)?;

            variable.get_resolved(&resolved)?
        };

        // Indexed axes are gone, so the component axis is the last one
        let axis = block.ndim() - 1;

        Ok(block.index_axis_move(axis, self.component))
    }

    /// Read the whole field.
    ///
    pub fn read(&self) -> Result<Block> {
        self.read_block(&[])
    }

    /// Read part of the field as an array of a known element type.
    ///
    /// Fails with `Error::Dtype` if `T` isn't the field's element type.
    ///
    pub fn read_array<T: Element>(&self, selectors: &[Selector]) -> Result<ArrayD<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::Dtype {
                expected: T::DTYPE,
                found: self.dtype,
            });
        }

        self.read_block(selectors)?.into_array()
    }
}

impl fmt::Debug for FieldArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FieldArray(name={}, variable={}, component={}, shape={:?}, dtype={:?})",
            self.name, self.variable, self.component, self.shape, self.dtype
        )
    }
}
