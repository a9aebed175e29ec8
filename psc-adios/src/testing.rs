//! An in-memory container engine for tests.
//!
//! Variables are stored the way the container stores them, in on-disk axis order. Every engine
//! call is counted, and checked against any other call running at the same time: the real engine
//! isn't thread safe, so overlapping calls mean some caller forgot to take the engine lock.
//!
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use indexmap::IndexMap;
use ndarray::{arr1, ArrayD, Axis, IxDyn, Slice};
use num_traits::{NumCast, Zero};
use parking_lot::Mutex;

use crate::{
    dtype::{Block, BufferMut, Element},
    engine::{Engine, EngineFile, Mode, RawAttribute, RawVariable, Region},
    errors::{Error, Result},
};

pub(crate) const PFD_PATH: &str = "/data/pfd.000400.bp";

/// Logical shape of "jeh" in `pfd_file`: 4 x 3 x 2 cells, 9 components
pub(crate) const JEH_SHAPE: [usize; 4] = [4, 3, 2, 9];

/// Logical shape of "all_1st" in `pfd_file`: 4 x 3 x 2 cells, 13 moments for each of 2 species
pub(crate) const ALL_1ST_SHAPE: [usize; 4] = [4, 3, 2, 26];

#[derive(Default)]
pub(crate) struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    gets: AtomicUsize,
    busy: AtomicBool,
    ios: Mutex<Vec<String>>,
}

impl Counters {
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Names of the currently declared IOs
    pub(crate) fn ios(&self) -> Vec<String> {
        self.ios.lock().clone()
    }

    fn enter(&self) -> Call<'_> {
        assert!(
            !self.busy.swap(true, Ordering::SeqCst),
            "overlapping engine calls"
        );

        Call(&self.busy)
    }
}

struct Call<'a>(&'a AtomicBool);

impl Drop for Call<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The contents of one container file.
///
#[derive(Clone, Default)]
pub(crate) struct MemoryFile {
    variables: IndexMap<String, Block>,
    attributes: IndexMap<String, RawAttribute>,
    delay: Option<Duration>,
    counters: Arc<Counters>,
}

impl MemoryFile {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a variable whose data is already in on-disk axis order
    pub(crate) fn disk_variable(mut self, name: &str, data: Block) -> Self {
        self.variables.insert(name.to_string(), data);
        self
    }

    /// Add a variable given in logical axis order
    pub(crate) fn variable<T: Element>(self, name: &str, data: ArrayD<T>) -> Self {
        self.disk_variable(name, T::wrap(data.reversed_axes()))
    }

    pub(crate) fn attribute(mut self, name: &str, value: RawAttribute) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// Make every read take a while, to widen the window for overlapping engine calls
    pub(crate) fn slow(mut self) -> Self {
        self.delay = Some(Duration::from_millis(1));
        self
    }

    /// Counters for files opened with `open_engine_file`
    pub(crate) fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

/// Values in a field array of the given logical shape: `1000c + 100i + 10j + k` at `[i, j, k, c]`
fn field_values<T: Element>(shape: &[usize]) -> ArrayD<T> {
    ArrayD::from_shape_fn(IxDyn(shape), |index| {
        let value = 1000 * index[3] + 100 * index[0] + 10 * index[1] + index[2];
        <T as NumCast>::from(value).unwrap_or_else(Zero::zero)
    })
}

pub(crate) fn jeh_values() -> ArrayD<f32> {
    field_values(&JEH_SHAPE)
}

pub(crate) fn all_1st_values() -> ArrayD<f64> {
    field_values(&ALL_1ST_SHAPE)
}

/// A small field output file, with variables "jeh" (f32) and "all_1st" (f64) and attributes
/// "time", "step" and "species".
pub(crate) fn pfd_file() -> MemoryFile {
    MemoryFile::new()
        .variable("jeh", jeh_values())
        .variable("all_1st", all_1st_values())
        .attribute("time", RawAttribute::Numeric(Block::from(arr1(&[12.5_f64]).into_dyn())))
        .attribute("step", RawAttribute::Numeric(Block::from(arr1(&[400_i32, 10]).into_dyn())))
        .attribute(
            "species",
            RawAttribute::Text(vec![String::from("e"), String::from("i")]),
        )
}

/// Open a file directly, without going through an engine.
pub(crate) fn open_engine_file(data: MemoryFile) -> Box<dyn EngineFile> {
    Box::new(OpenFile {
        counters: data.counters(),
        data,
    })
}

#[derive(Default)]
pub(crate) struct MemoryEngine {
    files: HashMap<PathBuf, MemoryFile>,
    counters: Arc<Counters>,
}

impl MemoryEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file<P: AsRef<Path>>(mut self, path: P, data: MemoryFile) -> Self {
        self.files.insert(path.as_ref().to_path_buf(), data);
        self
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }
}

impl Engine for MemoryEngine {
    fn open(&self, io_name: &str, path: &Path, _mode: Mode) -> Result<Box<dyn EngineFile>> {
        let _call = self.counters.enter();
        let mut ios = self.counters.ios.lock();
        if ios.iter().any(|name| name == io_name) {
            return Err(Error::Engine(format!("IO {io_name} is already declared")));
        }

        let data = self.files.get(path).ok_or_else(|| Error::Open {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        })?;

        ios.push(io_name.to_string());
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(OpenFile {
            data: data.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn remove_io(&self, io_name: &str) -> bool {
        let _call = self.counters.enter();
        let mut ios = self.counters.ios.lock();
        match ios.iter().position(|name| name == io_name) {
            Some(index) => {
                ios.remove(index);
                true
            }
            None => false,
        }
    }
}

struct OpenFile {
    data: MemoryFile,
    counters: Arc<Counters>,
}

impl EngineFile for OpenFile {
    fn available_variables(&self) -> Vec<String> {
        let _call = self.counters.enter();
        self.data.variables.keys().cloned().collect()
    }

    fn available_attributes(&self) -> Vec<String> {
        let _call = self.counters.enter();
        self.data.attributes.keys().cloned().collect()
    }

    fn inquire_variable(&self, name: &str) -> Option<RawVariable> {
        let _call = self.counters.enter();
        self.data
            .variables
            .get(name)
            .map(|data| RawVariable::new(name, data.shape().to_vec(), data.dtype()))
    }

    fn inquire_attribute(&self, name: &str) -> Option<RawAttribute> {
        let _call = self.counters.enter();
        self.data.attributes.get(name).cloned()
    }

    fn get(&mut self, variable: &RawVariable, out: BufferMut<'_>) -> Result<()> {
        let _call = self.counters.enter();
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.data.delay {
            thread::sleep(delay);
        }

        let data = self
            .data
            .variables
            .get(&variable.name)
            .ok_or_else(|| Error::Engine(format!("no variable {}", variable.name)))?;
        let region = variable.selection();

        macro_rules! copy_typed {
            ($($variant:ident),*) => {
                match (data, out) {
                    $((Block::$variant(data), BufferMut::$variant(out)) => {
                        copy_region(data, &region, out)
                    })*
                    (data, _) => Err(Error::Engine(format!(
                        "output buffer doesn't match {} of type {:?}",
                        variable.name,
                        data.dtype()
                    ))),
                }
            };
        }

        copy_typed!(I8, I16, I32, I64, U8, U16, U32, U64, F32, F64)
    }

    fn close(&mut self) -> Result<()> {
        let _call = self.counters.enter();
        self.counters.closes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

fn copy_region<T: Copy>(data: &ArrayD<T>, region: &Region, out: &mut [T]) -> Result<()> {
    if region.start.len() != data.ndim() || region.count.len() != data.ndim() {
        return Err(Error::Engine(format!(
            "selection {region:?} doesn't fit shape {:?}",
            data.shape()
        )));
    }

    let mut view = data.view();
    for (axis, (&start, &count)) in region.start.iter().zip(&region.count).enumerate() {
        if start + count > view.len_of(Axis(axis)) {
            return Err(Error::Engine(format!(
                "selection {region:?} out of bounds for shape {:?}",
                data.shape()
            )));
        }
        view.slice_axis_inplace(Axis(axis), Slice::from(start..start + count));
    }

    if view.len() != out.len() {
        return Err(Error::Engine(format!(
            "selection has {} elements, output buffer has {}",
            view.len(),
            out.len()
        )));
    }

    for (out, value) in out.iter_mut().zip(view.iter()) {
        *out = *value;
    }

    Ok(())
}
