//! Named, long-lived plugin state owned by the host.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::Map;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Upcast helper so `Arc<dyn SharedState>` can be downcast to its concrete type.
pub trait AsAny: Any + Send + Sync {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// State shared by every query of a pipeline.
///
/// `terminate` is called exactly once by the registry when the state is
/// removed or the pipeline is torn down.
pub trait SharedState: AsAny {
    fn terminate(&self, ctx: &Context) -> Result<()>;
}

pub trait SharedStateCreator: Send + Sync {
    fn create_state(&self, ctx: &Context, params: &Map) -> Result<Arc<dyn SharedState>>;
}

#[derive(Default)]
pub struct SharedStates {
    states: RwLock<HashMap<String, Arc<dyn SharedState>>>,
}

impl SharedStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, state: Arc<dyn SharedState>) -> Result<()> {
        let mut states = self.states.write();
        if states.contains_key(name) {
            return Err(Error::StateAlreadyExists(name.to_string()));
        }
        states.insert(name.to_string(), state);
        debug!(state = name, "shared state added");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SharedState>> {
        self.states
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::StateNotFound(name.to_string()))
    }

    /// Looks up `name` and downcasts it to `T`.
    pub fn get_as<T: SharedState>(&self, name: &str) -> Result<Arc<T>> {
        self.get(name)?
            .into_any_arc()
            .downcast::<T>()
            .map_err(|_| Error::StateTypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Removes `name` from the registry and terminates it.
    pub fn remove(&self, ctx: &Context, name: &str) -> Result<()> {
        let state = self
            .states
            .write()
            .remove(name)
            .ok_or_else(|| Error::StateNotFound(name.to_string()))?;
        state.terminate(ctx)
    }

    /// Terminates every registered state. All states are removed even when
    /// some fail; the first failure is returned.
    pub fn terminate_all(&self, ctx: &Context) -> Result<()> {
        // Lock is released before terminating so states may use the registry.
        let drained: Vec<_> = self.states.write().drain().collect();
        let mut first_err = None;
        for (name, state) in drained {
            if let Err(e) = state.terminate(ctx) {
                error!(state = %name, "failed to terminate shared state: {}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
