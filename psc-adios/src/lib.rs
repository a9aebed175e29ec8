mod array;
mod catalog;
mod coordinator;
mod dtype;
mod engine;
mod errors;
mod file;
mod geom;
mod helpers;
mod lock;
mod selection;
mod store;
mod variable;

#[cfg(test)]
mod testing;

pub use array::FieldArray;

pub use catalog::FieldCatalog;
pub use catalog::FieldLocation;
pub use catalog::MOMENTS;
pub use catalog::MOMENTS_PER_SPECIES;

pub use coordinator::Coordinator;
pub use coordinator::FileRef;

pub use dtype::Block;
pub use dtype::BufferMut;
pub use dtype::Dtype;
pub use dtype::Element;
pub use dtype::Scalar;

pub use engine::Engine;
pub use engine::EngineFile;
pub use engine::Mode;
pub use engine::RawAttribute;
pub use engine::RawVariable;
pub use engine::Region;

pub use errors::Error;
pub use errors::Result;

pub use file::Attribute;
pub use file::File;

pub use geom::RunInfo;

pub use lock::CombinedLock;
pub use lock::Lock;
pub use lock::LockGuard;
pub use lock::SerialLock;

pub use selection::Selector;

pub use store::guess_can_open;
pub use store::open_dataset;
pub use store::DataArray;
pub use store::Dataset;
pub use store::OpenOptions;
pub use store::Store;
pub use store::DIMS;

pub use variable::Variable;
