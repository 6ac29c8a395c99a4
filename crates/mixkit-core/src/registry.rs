//! Name-indexed segment construction.
//!
//! A [`Registry`] maps segment type names to constructors with typed
//! positional arguments, so hosts and plugins can build pipelines from
//! configuration without linking against the concrete types. The registry
//! is an explicit, cloneable handle; there is no process-global table.

use crate::error::{Error, Result};
use crate::segment::{Segment, Value, ValueType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Description of one positional constructor argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgInfo {
    pub name: &'static str,
    pub ty: ValueType,
}

type Constructor = Arc<dyn Fn(&[Value]) -> Result<Box<dyn Segment>> + Send + Sync>;

struct Entry {
    args: Vec<ArgInfo>,
    constructor: Constructor,
}

/// Shared map from segment type names to constructors.
///
/// Clones share the same underlying table.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a segment type under `name`.
    ///
    /// Fails with [`Error::DuplicateSegment`] if the name is taken; the
    /// existing entry is left untouched.
    pub fn register<F>(
        &self,
        name: impl Into<String>,
        args: Vec<ArgInfo>,
        constructor: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Box<dyn Segment>> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(Error::DuplicateSegment(name));
        }
        entries.insert(
            name,
            Entry {
                args,
                constructor: Arc::new(constructor),
            },
        );
        Ok(())
    }

    /// Remove a segment type, freeing the name for reuse.
    pub fn deregister(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.remove(name).is_none() {
            return Err(Error::UnknownSegment(name.into()));
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The argument descriptors of a registered type.
    pub fn args(&self, name: &str) -> Result<Vec<ArgInfo>> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| Error::UnknownSegment(name.into()))?;
        Ok(entry.args.clone())
    }

    /// Construct a segment, checking `args` against the registered
    /// descriptors. Arity or type mismatches fail with
    /// [`Error::InvalidValue`] before the constructor runs.
    pub fn make(&self, name: &str, args: &[Value]) -> Result<Box<dyn Segment>> {
        let (specs, constructor) = {
            let entries = self.entries.read();
            let entry = entries
                .get(name)
                .ok_or_else(|| Error::UnknownSegment(name.into()))?;
            (entry.args.clone(), Arc::clone(&entry.constructor))
        };
        if args.len() != specs.len() {
            return Err(Error::InvalidValue("argument count"));
        }
        for (arg, spec) in args.iter().zip(&specs) {
            if arg.ty() != Some(spec.ty) {
                return Err(Error::InvalidValue(spec.name));
            }
        }
        constructor(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{SegmentFlags, SegmentInfo};

    struct Null;

    impl Segment for Null {
        fn info(&self) -> SegmentInfo {
            SegmentInfo {
                name: "null",
                description: "",
                flags: SegmentFlags::NONE,
                min_inputs: 0,
                max_inputs: 0,
                outputs: 0,
                fields: Vec::new(),
            }
        }
    }

    fn null_args() -> Vec<ArgInfo> {
        vec![ArgInfo {
            name: "gain",
            ty: ValueType::Float,
        }]
    }

    #[test]
    fn register_and_make() {
        let registry = Registry::new();
        registry
            .register("null", null_args(), |_| Ok(Box::new(Null)))
            .unwrap();
        assert!(registry.contains("null"));
        let segment = registry.make("null", &[Value::Float(1.0)]).unwrap();
        assert_eq!(segment.info().name, "null");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = Registry::new();
        registry
            .register("null", null_args(), |_| Ok(Box::new(Null)))
            .unwrap();
        assert_eq!(
            registry
                .register("null", Vec::new(), |_| Ok(Box::new(Null)))
                .unwrap_err(),
            Error::DuplicateSegment("null".into())
        );
        // Original entry intact.
        assert_eq!(registry.args("null").unwrap(), null_args());
    }

    #[test]
    fn deregister_frees_the_name() {
        let registry = Registry::new();
        registry
            .register("null", null_args(), |_| Ok(Box::new(Null)))
            .unwrap();
        registry.deregister("null").unwrap();
        assert!(!registry.contains("null"));
        assert_eq!(
            registry.deregister("null").unwrap_err(),
            Error::UnknownSegment("null".into())
        );
        registry
            .register("null", Vec::new(), |_| Ok(Box::new(Null)))
            .unwrap();
    }

    #[test]
    fn unknown_name_fails() {
        let registry = Registry::new();
        assert_eq!(
            registry.make("missing", &[]).unwrap_err(),
            Error::UnknownSegment("missing".into())
        );
    }

    #[test]
    fn arguments_are_type_checked() {
        let registry = Registry::new();
        registry
            .register("null", null_args(), |_| Ok(Box::new(Null)))
            .unwrap();
        assert_eq!(
            registry.make("null", &[]).unwrap_err(),
            Error::InvalidValue("argument count")
        );
        assert_eq!(
            registry.make("null", &[Value::Bool(true)]).unwrap_err(),
            Error::InvalidValue("gain")
        );
        // Unsigned does not coerce at the registry boundary.
        assert_eq!(
            registry.make("null", &[Value::UInt(1)]).unwrap_err(),
            Error::InvalidValue("gain")
        );
    }

    #[test]
    fn clones_share_the_table() {
        let registry = Registry::new();
        let clone = registry.clone();
        clone
            .register("null", Vec::new(), |_| Ok(Box::new(Null)))
            .unwrap();
        assert!(registry.contains("null"));
        assert_eq!(registry.names(), vec!["null".to_string()]);
    }
}
