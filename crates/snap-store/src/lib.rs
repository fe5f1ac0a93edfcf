//! Object storage for snapshot layers.
//!
//! Every layer is stored as a pair of immutable objects under a directory
//! named after its build id: the raw data object (memfile or rootfs) and its
//! header. The snapshot writer produces them once; everything here only
//! reads them (plus the whole-object writes and prefix deletes the storage
//! capability needs for housekeeping).
//!
//! # Capabilities
//!
//! - [`ObjectStorage`] -- path-addressed byte-range storage backend
//! - [`BlockSource`] -- build-addressed, block-granular reads for the diff core
//! - [`HeaderSource`] -- decoded headers by build id
//!
//! # Backends
//!
//! - [`InMemoryStorage`] -- `HashMap`-based store for tests and embedding
//! - [`FileSystemStorage`] -- objects as files under a base directory
//!
//! Cloud bucket backends live outside this workspace; [`StorageConfig`]
//! recognizes them but only opens the local backend.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written.
//! 2. A block is only read from the build that owns it.
//! 3. Retry and timeout policy belongs to the backend, not to callers.

pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod paths;
pub mod template;
pub mod traits;

pub use config::{StorageConfig, StorageProvider};
pub use error::{BlockReadError, StoreError, StoreResult};
pub use fs::FileSystemStorage;
pub use memory::InMemoryStorage;
pub use paths::{Artifact, TemplateFiles};
pub use template::TemplateStorage;
pub use traits::{BlockSource, HeaderSource, ObjectStorage};
