//! Capability keys and the per-call authorization result map.
//!
//! Authorization is resolved through an explicit registry keyed by
//! capability type rather than virtual dispatch: a store maps each
//! [`Capability`] to a resolver, fans the requested set out concurrently,
//! and returns a [`CapabilityMap`] holding only the entries that were
//! actually produced.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type-level key naming a capability that a session may be authorized
/// to use.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    type_id: TypeId,
    name: &'static str,
}

impl Capability {
    /// The capability key for type `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The underlying type id.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Human-readable capability name, for denial responses and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type-erased capability provider, as produced by an authorizer.
pub type Provider = Arc<dyn Any + Send + Sync>;

/// Result of one `authorize` call: capability key to provider.
///
/// Constructed fresh per call and owned solely by the caller; absence of a
/// requested capability means the session was not authorized for it (not
/// an error).
#[derive(Default)]
pub struct CapabilityMap {
    entries: HashMap<TypeId, Provider>,
}

impl CapabilityMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a typed provider under its capability key.
    pub fn insert<T: Any + Send + Sync>(&mut self, provider: Arc<T>) {
        self.entries.insert(TypeId::of::<T>(), provider);
    }

    /// Insert a type-erased provider under an explicit key.
    pub fn insert_erased(&mut self, capability: Capability, provider: Provider) {
        self.entries.insert(capability.type_id(), provider);
    }

    /// Look up the provider for capability type `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|p| p.downcast::<T>().ok())
    }

    /// Look up a type-erased provider by key.
    pub fn get_erased(&self, capability: Capability) -> Option<Provider> {
        self.entries.get(&capability.type_id()).cloned()
    }

    /// Number of produced entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no capabilities were produced.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityMap")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Critic {
        score: u32,
    }

    struct Editor;

    #[test]
    fn test_typed_round_trip() {
        let mut map = CapabilityMap::new();
        map.insert(Arc::new(Critic { score: 9 }));

        assert_eq!(map.get::<Critic>().unwrap().score, 9);
        assert!(map.get::<Editor>().is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_erased_lookup_matches_typed_key() {
        let mut map = CapabilityMap::new();
        map.insert_erased(Capability::of::<Critic>(), Arc::new(Critic { score: 1 }));

        assert!(map.get_erased(Capability::of::<Critic>()).is_some());
        assert!(map.get_erased(Capability::of::<Editor>()).is_none());
        assert!(map.get::<Critic>().is_some());
    }

    #[test]
    fn test_capability_name_is_readable() {
        let capability = Capability::of::<Critic>();
        assert!(capability.name().ends_with("Critic"));
        assert_eq!(Capability::of::<Critic>(), capability);
    }
}
