//! streamcv-core: host-side interfaces for stream plugins
//!
//! Generic records, tuples, push-style sources, the named shared-state
//! registry and the capability registry plugins register into.

pub mod context;
pub mod error;
pub mod registry;
pub mod shared_state;
pub mod source;
pub mod tuple;
pub mod value;

pub use context::Context;
pub use error::{Error, PluginError, Result};
pub use registry::{Registry, Udf};
pub use shared_state::{SharedState, SharedStateCreator, SharedStates};
pub use source::{Signal, Source, SourceControl, SourceCreator, Writer};
pub use tuple::Tuple;
pub use value::{Map, MapExt, Value};
