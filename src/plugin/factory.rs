//! Factory registry: capability-tagged constructors inside a loaded plugin.
//!
//! Each registrable implementation declares the finite set of capability
//! tags it satisfies, and [`FactoryRegistry::create`] does a direct bucket
//! lookup instead of walking an inheritance chain. Ambiguity is data, not an
//! emergent property: two default (empty-keyword) registrations with
//! overlapping tag sets are rejected at registration time with a typed
//! error, never logged-and-ignored.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// An object constructed by a plugin factory.
pub type PluginObject = Box<dyn Any + Send>;

/// Constructor function registered for a (capability set, keyword) entry.
pub type Constructor = Arc<dyn Fn(&[String]) -> PluginObject + Send + Sync>;

/// Backward-compatibility construction hook.
///
/// Hooks receive the requested capability and may decline by returning
/// `None`, in which case the keyword/capability table is consulted as usual.
pub type ConstructHook = Arc<dyn Fn(&str, &[String]) -> Option<PluginObject> + Send + Sync>;

/// Errors from factory registration and instantiation.
#[derive(Debug, Clone, Error)]
pub enum FactoryError {
    /// Two default registrations declare overlapping capability sets.
    ///
    /// This is a programming error in the plugin: either registration could
    /// be the wrong default, so neither is silently picked.
    #[error("registration conflict: capability '{capability}' already has a default entry")]
    RegistrationConflict {
        /// The capability tag claimed by both entries.
        capability: String,
    },

    /// A registration declared no capability tags at all.
    #[error("registration declares no capabilities")]
    EmptyCapabilitySet,

    /// No entry satisfies the requested capability under the given keyword.
    #[error("no factory entry for capability '{capability}' (keyword '{keyword}')")]
    NotRegistered {
        /// Requested capability tag.
        capability: String,
        /// Requested keyword ("" for the default bucket).
        keyword: String,
    },

    /// More than one entry satisfies the request; the plugin author must
    /// supply keywords.
    #[error("ambiguous factory entries for capability '{capability}' (keyword '{keyword}')")]
    Ambiguous {
        /// Requested capability tag.
        capability: String,
        /// Requested keyword.
        keyword: String,
    },
}

/// One registered implementation.
struct FactoryEntry {
    /// Disambiguating keyword; empty string is the default bucket.
    keyword: String,
    /// Capability tags this implementation satisfies.
    capabilities: BTreeSet<String>,
    construct: Constructor,
}

/// Registry of pluggable implementations inside one plugin.
///
/// Keyword buckets are distinct: an empty keyword is its own search bucket,
/// not a wildcard that matches every request.
#[derive(Default)]
pub struct FactoryRegistry {
    entries: Vec<FactoryEntry>,
    object_hook: Option<ConstructHook>,
    part_hook: Option<ConstructHook>,
    observers: Vec<Box<dyn Fn(&str) + Send + Sync>>,
}

impl FactoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation.
    ///
    /// `keyword` may be empty, making this a default entry. A default entry
    /// whose capability set overlaps another default entry's set is rejected
    /// with [`FactoryError::RegistrationConflict`].
    pub fn register(
        &mut self,
        keyword: impl Into<String>,
        capabilities: impl IntoIterator<Item = impl Into<String>>,
        construct: Constructor,
    ) -> Result<(), FactoryError> {
        let keyword = keyword.into();
        let capabilities: BTreeSet<String> =
            capabilities.into_iter().map(Into::into).collect();

        if capabilities.is_empty() {
            return Err(FactoryError::EmptyCapabilitySet);
        }

        if keyword.is_empty() {
            for entry in self.entries.iter().filter(|e| e.keyword.is_empty()) {
                if let Some(shared) = entry.capabilities.intersection(&capabilities).next() {
                    return Err(FactoryError::RegistrationConflict {
                        capability: shared.clone(),
                    });
                }
            }
        }

        self.entries.push(FactoryEntry {
            keyword,
            capabilities,
            construct,
        });
        Ok(())
    }

    /// Install the generic object-construction hook, tried before the entry
    /// table on empty-keyword requests.
    pub fn set_object_hook(&mut self, hook: ConstructHook) {
        self.object_hook = Some(hook);
    }

    /// Install the part-construction hook, tried after the object hook on
    /// empty-keyword requests.
    pub fn set_part_hook(&mut self, hook: ConstructHook) {
        self.part_hook = Some(hook);
    }

    /// Subscribe to successful constructions.
    ///
    /// Observers receive the requested capability after each construction.
    /// Used by embedders for lazy per-plugin setup on first use.
    pub fn on_created(&mut self, observer: impl Fn(&str) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Instantiate the implementation satisfying `capability` under
    /// `keyword`.
    ///
    /// An empty `keyword` selects the default bucket; a non-empty keyword
    /// only matches entries registered under that literal keyword. Exactly
    /// one candidate must remain, otherwise the request fails with
    /// [`FactoryError::NotRegistered`] or [`FactoryError::Ambiguous`].
    pub fn create(
        &self,
        capability: &str,
        keyword: &str,
        args: &[String],
    ) -> Result<PluginObject, FactoryError> {
        if keyword.is_empty() {
            for hook in [&self.object_hook, &self.part_hook].into_iter().flatten() {
                if let Some(object) = hook(capability, args) {
                    self.notify(capability);
                    return Ok(object);
                }
            }
        }

        let mut candidates = self
            .entries
            .iter()
            .filter(|e| e.keyword == keyword && e.capabilities.contains(capability));

        let Some(entry) = candidates.next() else {
            return Err(FactoryError::NotRegistered {
                capability: capability.to_string(),
                keyword: keyword.to_string(),
            });
        };
        if candidates.next().is_some() {
            return Err(FactoryError::Ambiguous {
                capability: capability.to_string(),
                keyword: keyword.to_string(),
            });
        }

        let object = (entry.construct)(args);
        self.notify(capability);
        Ok(object)
    }

    /// List every capability tag registered under any keyword, sorted.
    pub fn capabilities(&self) -> Vec<String> {
        let mut tags: BTreeSet<&str> = BTreeSet::new();
        for entry in &self.entries {
            tags.extend(entry.capabilities.iter().map(String::as_str));
        }
        tags.into_iter().map(String::from).collect()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn notify(&self, capability: &str) {
        for observer in &self.observers {
            observer(capability);
        }
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("entries", &self.entries.len())
            .field("has_object_hook", &self.object_hook.is_some())
            .field("has_part_hook", &self.part_hook.is_some())
            .finish()
    }
}

/// The object a plugin entry point returns.
///
/// A factory owns the [`FactoryRegistry`] its plugin populated at
/// construction time and hands out instances through it.
pub trait PluginFactory: Send + Sync {
    /// The registry populated by this plugin.
    fn registry(&self) -> &FactoryRegistry;

    /// Instantiate a capability through the registry.
    fn create(
        &self,
        capability: &str,
        keyword: &str,
        args: &[String],
    ) -> Result<PluginObject, FactoryError> {
        self.registry().create(capability, keyword, args)
    }
}
