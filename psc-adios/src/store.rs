//! Opening PSC field output as a dataset of lazily read, labeled arrays.
//!
use std::{
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use ndarray::Array1;
use parking_lot::Mutex;

use crate::{
    array::FieldArray,
    catalog::{FieldCatalog, FieldLocation},
    coordinator::{Coordinator, FileRef},
    engine::Mode,
    errors::{Error, Result},
    file::{Attribute, File},
    geom::RunInfo,
    helpers::normalize_path,
    lock::Lock,
};

/// Names of the spatial dimensions of every field
pub const DIMS: [&str; 3] = ["x", "y", "z"];

/// Options for opening a PSC output file.
///
/// ```ignore
/// let dataset = OpenOptions::new()
///     .species_names(["e", "i"])
///     .length([80.0, 1.0, 80.0])
///     .open_dataset(&coordinator, Path::new("pfd.000400.bp"))?;
/// ```
///
#[derive(Clone, Default)]
pub struct OpenOptions {
    species_names: Vec<String>,
    length: Option<[f64; 3]>,
    corner: Option<[f64; 3]>,
    mode: Mode,
    lock: Option<Arc<dyn Lock>>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the particle species in the run, in the order PSC stores them.
    ///
    /// PSC doesn't record these in its output. Without them, no moment fields are available.
    ///
    pub fn species_names<I, S>(mut self, species_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.species_names = species_names.into_iter().map(Into::into).collect();
        self
    }

    /// Physical extent of the domain, overriding the file's "length" attribute
    pub fn length(mut self, length: [f64; 3]) -> Self {
        self.length = Some(length);
        self
    }

    /// Physical position of the domain's lower corner, overriding the file's "corner" attribute
    pub fn corner(mut self, corner: [f64; 3]) -> Self {
        self.corner = Some(corner);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Use a custom lock instead of the coordinator's.
    ///
    /// All reads happen with this lock held, and no other, so it must serialize engine access,
    /// usually by including the coordinator's engine lock.
    ///
    pub fn lock(mut self, lock: Arc<dyn Lock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn open(&self, coordinator: &Coordinator, path: &Path) -> Result<Arc<Store>> {
        Store::open(coordinator, path, self)
    }

    pub fn open_dataset(&self, coordinator: &Coordinator, path: &Path) -> Result<Dataset> {
        open_dataset(coordinator, path, self)
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("species_names", &self.species_names)
            .field("length", &self.length)
            .field("corner", &self.corner)
            .field("mode", &self.mode)
            .field("lock", &self.lock.is_some())
            .finish()
    }
}

/// One open PSC output file, seen as a collection of physical fields.
///
/// The file itself is held through the coordinator, and released by `close` or when the store is
/// dropped. Every `FieldArray` made from a store keeps it alive.
///
pub struct Store {
    path: PathBuf,
    mode: Mode,
    file: Mutex<Option<FileRef>>,
    lock: Arc<dyn Lock>,
    catalog: FieldCatalog,
    geometry: RunInfo,
}

impl Store {
    /// Open a store.
    ///
    /// Acquires the file from the coordinator and derives the run geometry from it. Opening in
    /// `Mode::Write` fails with `Error::Unsupported`.
    ///
    pub fn open(
        coordinator: &Coordinator,
        path: &Path,
        options: &OpenOptions,
    ) -> Result<Arc<Self>> {
        let path = normalize_path(path)?;
        let lock = match &options.lock {
            Some(lock) => Arc::clone(lock),
            None => coordinator.lock_for(&path, options.mode)?,
        };

        let file = coordinator.acquire(&path, options.mode)?;
        let geometry = {
            let _guard = lock.acquire();
            let file = file.acquire(false)?;

            RunInfo::new(&file, options.length, options.corner)?
        };
        log::debug!("store open {path:?}, species {:?}", options.species_names);

        Ok(Arc::new(Self {
            path,
            mode: options.mode,
            file: Mutex::new(Some(file)),
            lock,
            catalog: FieldCatalog::new(&options.species_names),
            geometry,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The lock that guards reads from this store
    pub fn lock(&self) -> &dyn Lock {
        self.lock.as_ref()
    }

    pub fn geometry(&self) -> &RunInfo {
        &self.geometry
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }

    /// Get the open file, reopening it if it was closed behind the store's back.
    ///
    /// # Arguments
    ///
    /// * `needs_lock` - Whether to take the store's lock. Pass `false` if the caller already holds
    ///   it.
    ///
    pub fn acquire(&self, needs_lock: bool) -> Result<Arc<File>> {
        let _guard = needs_lock.then(|| self.lock.acquire());
        let file = self.file.lock();
        match &*file {
            Some(file) => file.acquire(false),
            None => Err(Error::Closed(format!("store {:?}", self.path))),
        }
    }

    /// The fields available in the file, and where each is stored.
    ///
    pub fn fields(&self) -> Result<IndexMap<String, FieldLocation>> {
        let file = self.acquire(true)?;

        Ok(self.catalog.resolve(file.variable_names()))
    }

    /// Get a single field.
    ///
    /// Fails with `Error::MissingField` if no variable in the file provides it.
    ///
    pub fn field(self: &Arc<Self>, name: &str) -> Result<FieldArray> {
        let location = self
            .fields()?
            .swap_remove(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))?;

        FieldArray::new(name, Arc::clone(self), location.variable, location.component)
    }

    /// Every available field, as a labeled array.
    ///
    pub fn get_variables(self: &Arc<Self>) -> Result<IndexMap<String, DataArray>> {
        let mut variables = IndexMap::new();
        for (name, location) in self.fields()? {
            let data = FieldArray::new(
                name.clone(),
                Arc::clone(self),
                location.variable,
                location.component,
            )?;
            variables.insert(name, DataArray::new(data, &self.geometry)?);
        }

        Ok(variables)
    }

    /// Every attribute in the file, in the file's order.
    ///
    pub fn get_attrs(&self) -> Result<IndexMap<String, Attribute>> {
        let _guard = self.lock.acquire();
        let file = self.acquire(false)?;
        file.attribute_names()
            .iter()
            .map(|name| Ok((name.clone(), file.get_attribute(name)?)))
            .collect()
    }

    /// Both `get_variables` and `get_attrs`.
    ///
    #[allow(clippy::type_complexity)]
    pub fn load(
        self: &Arc<Self>,
    ) -> Result<(IndexMap<String, DataArray>, IndexMap<String, Attribute>)> {
        Ok((self.get_variables()?, self.get_attrs()?))
    }

    /// Release the store's file. The file is closed if nothing else is using it.
    ///
    /// Must not be called with the engine lock held. Closing twice does nothing.
    ///
    pub fn close(&self) -> Result<()> {
        let file = self.file.lock().take();
        match file {
            Some(file) => {
                log::debug!("store close {:?}", self.path);
                file.release()
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store(path={:?}, mode={:?}, {:?})",
            self.path, self.mode, self.geometry
        )
    }
}

/// A field with its dimension names and coordinates.
///
#[derive(Debug)]
pub struct DataArray {
    pub name: String,
    pub dims: [&'static str; 3],
    pub coords: IndexMap<String, Array1<f64>>,
    pub data: FieldArray,
}

impl DataArray {
    fn new(data: FieldArray, geometry: &RunInfo) -> Result<Self> {
        if data.ndim() != DIMS.len() {
            return Err(Error::Shape(format!(
                "{} has shape {:?}, expecting one axis for each of {DIMS:?}",
                data.name(),
                data.shape()
            )));
        }

        let coords: IndexMap<String, Array1<f64>> = DIMS
            .iter()
            .enumerate()
            .map(|(axis, dim)| -> Result<(String, Array1<f64>)> {
                let coord = geometry
                    .coord(axis)
                    .ok_or_else(|| Error::Shape(format!("no coordinate for axis {axis}")))?;

                Ok((dim.to_string(), coord.clone()))
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            name: data.name().to_string(),
            dims: DIMS,
            coords,
            data,
        })
    }

    /// Coordinates along a dimension, by name
    pub fn coord(&self, dim: &str) -> Option<&Array1<f64>> {
        self.coords.get(dim)
    }
}

/// The fields and attributes of a PSC output file.
///
#[derive(Debug)]
pub struct Dataset {
    pub data_vars: IndexMap<String, DataArray>,
    pub attrs: IndexMap<String, Attribute>,

    store: Arc<Store>,
}

impl Dataset {
    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.data_vars.get(name)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Close the underlying store.
    ///
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

/// Open a PSC output file as a `Dataset`.
///
/// # Arguments
///
/// * `coordinator` - Coordinates access to the engine
/// * `path` - Path to the file, relative to the current directory or absolute
/// * `options` - Species names, geometry overrides and locking
///
pub fn open_dataset(
    coordinator: &Coordinator,
    path: &Path,
    options: &OpenOptions,
) -> Result<Dataset> {
    let path = normalize_path(path)?;
    let store = Store::open(coordinator, &path, options)?;
    let (data_vars, attrs) = store.load()?;

    Ok(Dataset {
        data_vars,
        attrs,
        store,
    })
}

/// Whether `open_dataset` can be expected to open a path, going by its extension.
///
pub fn guess_can_open<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().extension() == Some(OsStr::new("bp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{arr1, ArrayD, Axis, IxDyn};

    use crate::{
        dtype::{Block, Scalar},
        engine::{Engine, RawAttribute},
        lock::{CombinedLock, SerialLock},
        selection::Selector,
        testing::{self, MemoryEngine, MemoryFile},
    };

    fn open_coordinator(data: MemoryFile) -> (Arc<MemoryEngine>, Coordinator) {
        let engine = Arc::new(MemoryEngine::new().with_file(testing::PFD_PATH, data));
        let coordinator = Coordinator::new(Arc::clone(&engine) as Arc<dyn Engine>);

        (engine, coordinator)
    }

    fn options() -> OpenOptions {
        OpenOptions::new().species_names(["e", "i"])
    }

    #[test]
    fn test_open_dataset() -> Result<()> {
        let (engine, coordinator) = open_coordinator(testing::pfd_file());
        let dataset = options().open_dataset(&coordinator, Path::new(testing::PFD_PATH))?;
        assert_eq!(dataset.data_vars.len(), 9 + 26);
        assert_eq!(engine.counters().gets(), 0);

        let names: Vec<&str> = dataset.data_vars.keys().map(String::as_str).collect();
        assert_eq!(&names[..3], &["jx_ec", "jy_ec", "jz_ec"]);
        assert_eq!(names[9], "rho_e");
        assert_eq!(names[34], "tzx_i");

        let ey = dataset.get("ey_ec").unwrap();
        assert_eq!(ey.name, "ey_ec");
        assert_eq!(ey.dims, ["x", "y", "z"]);
        assert_eq!(ey.coord("x"), Some(&arr1(&[0.0, 1.0, 2.0, 3.0])));
        assert_eq!(ey.coord("z"), Some(&arr1(&[0.0, 1.0])));
        assert_eq!(ey.data.shape(), &[4, 3, 2]);

        let values = ey.data.read_array::<f32>(&[])?;
        assert_eq!(values, testing::jeh_values().index_axis(Axis(3), 4));

        let rho_i = &dataset.data_vars["rho_i"].data;
        assert_eq!(rho_i.variable(), "all_1st");
        assert_eq!(rho_i.component(), 13);
        let selectors = [Selector::Index(3), Selector::Index(2), Selector::Index(1)];
        let value = rho_i.read_array::<f64>(&selectors)?;
        assert_eq!(value.sum(), 13321.0);

        Ok(())
    }

    #[test]
    fn test_attrs() -> Result<()> {
        let (_, coordinator) = open_coordinator(testing::pfd_file());
        let dataset = options().open_dataset(&coordinator, Path::new(testing::PFD_PATH))?;
        let names: Vec<&str> = dataset.attrs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["time", "step", "species"]);
        assert_eq!(dataset.attrs["time"], Attribute::Scalar(Scalar::F64(12.5)));
        assert_eq!(dataset.attrs["step"].to_f64_vec(), Some(vec![400.0, 10.0]));

        Ok(())
    }

    #[test]
    fn test_geometry_options() -> Result<()> {
        let data = testing::pfd_file().attribute(
            "length",
            RawAttribute::Numeric(Block::from(arr1(&[8.0, 6.0, 4.0]).into_dyn())),
        );
        let (_, coordinator) = open_coordinator(data);
        let path = Path::new(testing::PFD_PATH);

        let store = options().open(&coordinator, path)?;
        assert_eq!(store.geometry().corner, [-4.0, -3.0, -2.0]);

        let store = options()
            .corner([0.0, 0.0, 0.0])
            .length([4.0, 4.0, 4.0])
            .open(&coordinator, path)?;
        assert_eq!(store.geometry().length, [4.0, 4.0, 4.0]);
        assert_eq!(store.geometry().y, arr1(&[0.0, 4.0 / 3.0, 8.0 / 3.0]));

        Ok(())
    }

    #[test]
    fn test_no_species() -> Result<()> {
        let (_, coordinator) = open_coordinator(testing::pfd_file());
        let store = OpenOptions::new().open(&coordinator, Path::new(testing::PFD_PATH))?;
        assert_eq!(store.get_variables()?.len(), 9);
        match store.field("rho_e") {
            Err(Error::MissingField(name)) => assert_eq!(name, "rho_e"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(store.field("hx_fc")?.component(), 6);

        Ok(())
    }

    #[test]
    fn test_unknown_variables_skipped() -> Result<()> {
        let gauss = ArrayD::<f64>::zeros(IxDyn(&[4, 3, 2, 1]));
        let data = testing::pfd_file().variable("gauss", gauss);
        let (_, coordinator) = open_coordinator(data);
        let store = options().open(&coordinator, Path::new(testing::PFD_PATH))?;
        let fields = store.fields()?;
        assert_eq!(fields.len(), 9 + 26);
        assert!(fields.values().all(|location| location.variable != "gauss"));

        Ok(())
    }

    #[test]
    fn test_stores_share_file() -> Result<()> {
        let (engine, coordinator) = open_coordinator(testing::pfd_file());
        let path = Path::new(testing::PFD_PATH);
        let first = options().open_dataset(&coordinator, path)?;
        let second = options().open_dataset(&coordinator, path)?;
        assert_eq!(engine.counters().opens(), 1);
        assert_eq!(coordinator.refs(path, Mode::Read), 2);

        first.close()?;
        assert_eq!(engine.counters().closes(), 0);
        assert!(matches!(first.data_vars["ex_ec"].data.read(), Err(Error::Closed(_))));
        second.data_vars["ex_ec"].data.read()?;

        second.close()?;
        assert_eq!(engine.counters().closes(), 1);
        assert_eq!(coordinator.refs(path, Mode::Read), 0);

        // Closing twice is fine
        second.close()?;

        Ok(())
    }

    #[test]
    fn test_drop_releases() -> Result<()> {
        let (engine, coordinator) = open_coordinator(testing::pfd_file());
        let path = Path::new(testing::PFD_PATH);
        let field = {
            let dataset = options().open_dataset(&coordinator, path)?;
            dataset.store().field("ex_ec")?
        };

        // The field keeps the store open
        assert_eq!(coordinator.refs(path, Mode::Read), 1);
        field.read()?;

        drop(field);
        assert_eq!(coordinator.refs(path, Mode::Read), 0);
        assert_eq!(engine.counters().closes(), 1);

        Ok(())
    }

    #[test]
    fn test_open_failures() {
        let (engine, coordinator) = open_coordinator(testing::pfd_file());
        assert!(matches!(
            options().open_dataset(&coordinator, Path::new("/data/nope.bp")),
            Err(Error::Open { .. })
        ));
        assert!(matches!(
            options()
                .mode(Mode::Write)
                .open_dataset(&coordinator, Path::new(testing::PFD_PATH)),
            Err(Error::Unsupported(_))
        ));
        assert!(engine.counters().ios().is_empty());

        let (_, empty) = open_coordinator(MemoryFile::new());
        assert!(matches!(
            options().open_dataset(&empty, Path::new(testing::PFD_PATH)),
            Err(Error::EmptyCatalog(_))
        ));
        assert_eq!(empty.refs(Path::new(testing::PFD_PATH), Mode::Read), 0);
    }

    #[test]
    fn test_custom_lock() -> Result<()> {
        let (_, coordinator) = open_coordinator(testing::pfd_file());
        let extra = Arc::new(SerialLock::new());
        let engine_lock: Arc<dyn Lock> = coordinator.lock();
        let lock = Arc::new(CombinedLock::new(vec![
            engine_lock,
            Arc::clone(&extra) as Arc<dyn Lock>,
        ]));
        let store = options().lock(lock).open(&coordinator, Path::new(testing::PFD_PATH))?;
        {
            let _guard = store.lock().acquire();
            assert!(extra.is_locked());
            assert!(coordinator.lock().is_locked());
        }
        store.field("ex_ec")?.read()?;
        assert!(!extra.is_locked());

        Ok(())
    }

    #[test]
    fn test_guess_can_open() {
        assert!(guess_can_open("pfd.000400.bp"));
        assert!(guess_can_open(Path::new("/data/run/pfd.000400.bp")));
        assert!(!guess_can_open("pfd.000400.h5"));
        assert!(!guess_can_open("bp"));
        assert!(!guess_can_open("pfd.bp.gz"));
    }
}
