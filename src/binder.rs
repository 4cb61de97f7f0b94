//! Type binders map between type tags and their serialized `$type` names
//!
//! A binder is a pure function pair consulted whenever type markers are written or
//! read. Replacing the binder restricts or remaps which types are instantiable from
//! untrusted input; an empty mapping makes instantiation fail rather than fall back
//! to a default. Caches are scoped to the binder instance — there is no process-wide
//! type name state.

use std::collections::HashMap;
use std::sync::RwLock;

/// Maps between type tags and serialized type names
pub trait TypeBinder: Send + Sync {
    /// Serialized name for a type tag, `None` if the type must not be written
    fn name_for(&self, type_tag: &str) -> Option<String>;

    /// Type tag for a serialized name, `None` if the name must not be instantiated
    fn tag_for(&self, name: &str) -> Option<String>;
}

/// Binder which uses the type tag itself as serialized name
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultBinder;

impl TypeBinder for DefaultBinder {
    fn name_for(&self, type_tag: &str) -> Option<String> {
        Some(type_tag.to_owned())
    }

    fn tag_for(&self, name: &str) -> Option<String> {
        Some(name.to_owned())
    }
}

/// Binder with an explicit allow-list of name mappings
///
/// Only registered pairs resolve; everything else fails. An empty mapping therefore
/// rejects every type marker, which is the safe configuration for untrusted input.
#[derive(Clone, Debug, Default)]
pub struct MappedBinder {
    names: HashMap<String, String>,
    tags: HashMap<String, String>,
}

impl MappedBinder {
    /// Creates a binder with an empty mapping
    pub fn new() -> Self {
        MappedBinder::default()
    }

    /// Registers a bidirectional mapping between a type tag and its serialized name
    pub fn map(mut self, type_tag: impl Into<String>, name: impl Into<String>) -> Self {
        let type_tag = type_tag.into();
        let name = name.into();
        self.names.insert(type_tag.clone(), name.clone());
        self.tags.insert(name, type_tag);
        self
    }
}

impl TypeBinder for MappedBinder {
    fn name_for(&self, type_tag: &str) -> Option<String> {
        self.names.get(type_tag).cloned()
    }

    fn tag_for(&self, name: &str) -> Option<String> {
        self.tags.get(name).cloned()
    }
}

/// Memoizing wrapper around another binder
///
/// Lookup results, including negative ones, are cached for the lifetime of this
/// instance. Useful when the wrapped binder derives names with non-trivial cost.
pub struct CachedBinder<B: TypeBinder> {
    inner: B,
    names: RwLock<HashMap<String, Option<String>>>,
    tags: RwLock<HashMap<String, Option<String>>>,
}

impl<B: TypeBinder> CachedBinder<B> {
    /// Creates a caching wrapper around the binder
    pub fn new(inner: B) -> Self {
        CachedBinder {
            inner,
            names: RwLock::new(HashMap::new()),
            tags: RwLock::new(HashMap::new()),
        }
    }
}

impl<B: TypeBinder> TypeBinder for CachedBinder<B> {
    fn name_for(&self, type_tag: &str) -> Option<String> {
        if let Some(cached) = self
            .names
            .read()
            .expect("binder cache lock poisoned")
            .get(type_tag)
        {
            return cached.clone();
        }
        let result = self.inner.name_for(type_tag);
        self.names
            .write()
            .expect("binder cache lock poisoned")
            .entry(type_tag.to_owned())
            .or_insert(result)
            .clone()
    }

    fn tag_for(&self, name: &str) -> Option<String> {
        if let Some(cached) = self
            .tags
            .read()
            .expect("binder cache lock poisoned")
            .get(name)
        {
            return cached.clone();
        }
        let result = self.inner.tag_for(name);
        self.tags
            .write()
            .expect("binder cache lock poisoned")
            .entry(name.to_owned())
            .or_insert(result)
            .clone()
    }
}
