//! Named capabilities a plugin contributes to the host.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::shared_state::{SharedState, SharedStateCreator};
use crate::source::{Source, SourceCreator};
use crate::value::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// User-defined function callable from queries.
pub trait Udf: Send + Sync {
    fn arity(&self) -> usize;
    fn call(&self, ctx: &Context, args: &[Value]) -> Result<Value>;
}

#[derive(Default)]
pub struct Registry {
    sources: HashMap<String, Arc<dyn SourceCreator>>,
    states: HashMap<String, Arc<dyn SharedStateCreator>>,
    udfs: HashMap<String, Arc<dyn Udf>>,
}

fn insert_unique<T: ?Sized>(
    map: &mut HashMap<String, Arc<T>>,
    name: &str,
    value: Arc<T>,
) -> Result<()> {
    if map.contains_key(name) {
        return Err(Error::AlreadyRegistered(name.to_string()));
    }
    map.insert(name.to_string(), value);
    debug!(name, "registered");
    Ok(())
}

fn lookup<T: ?Sized>(map: &HashMap<String, Arc<T>>, name: &str) -> Result<Arc<T>> {
    map.get(name)
        .cloned()
        .ok_or_else(|| Error::NotRegistered(name.to_string()))
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source_creator(
        &mut self,
        name: &str,
        creator: Arc<dyn SourceCreator>,
    ) -> Result<()> {
        insert_unique(&mut self.sources, name, creator)
    }

    pub fn register_state_creator(
        &mut self,
        name: &str,
        creator: Arc<dyn SharedStateCreator>,
    ) -> Result<()> {
        insert_unique(&mut self.states, name, creator)
    }

    pub fn register_udf(&mut self, name: &str, udf: Arc<dyn Udf>) -> Result<()> {
        insert_unique(&mut self.udfs, name, udf)
    }

    pub fn create_source(&self, ctx: &Context, name: &str, params: &Map) -> Result<Arc<dyn Source>> {
        lookup(&self.sources, name)?.create_source(ctx, params)
    }

    pub fn create_state(
        &self,
        ctx: &Context,
        name: &str,
        params: &Map,
    ) -> Result<Arc<dyn SharedState>> {
        lookup(&self.states, name)?.create_state(ctx, params)
    }

    pub fn call_udf(&self, ctx: &Context, name: &str, args: &[Value]) -> Result<Value> {
        let udf = lookup(&self.udfs, name)?;
        if udf.arity() != args.len() {
            return Err(Error::Arity {
                name: name.to_string(),
                expected: udf.arity(),
                actual: args.len(),
            });
        }
        udf.call(ctx, args)
    }

    pub fn has_source_creator(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn has_state_creator(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn has_udf(&self, name: &str) -> bool {
        self.udfs.contains_key(name)
    }
}
