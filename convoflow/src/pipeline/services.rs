//! A minimal typed service scope handed to handlers and steps.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Typed map of shared services.
///
/// Stands in for an application's dependency container: handlers pull what
/// they need from it when they are created for an event.
#[derive(Clone, Default)]
pub struct ServiceScope {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service, replacing any previous one of the same type.
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(mut self, service: T) -> Self {
        self.insert(service);
        self
    }

    /// Adds a service, replacing any previous one of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, service: T) {
        self.services.insert(TypeId::of::<T>(), Arc::new(service));
    }

    /// Adds an already shared service.
    #[must_use]
    pub fn with_arc<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    /// Resolves a service by type.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// Checks whether a service of type `T` is present.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if the scope is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("services", &self.services.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Greeting(&'static str);

    #[test]
    fn test_insert_and_get() {
        let scope = ServiceScope::new().with(Greeting("hi")).with(42_u32);

        assert_eq!(scope.len(), 2);
        assert_eq!(*scope.get::<Greeting>().unwrap(), Greeting("hi"));
        assert_eq!(*scope.get::<u32>().unwrap(), 42);
        assert!(scope.get::<String>().is_none());
    }

    #[test]
    fn test_replace() {
        let mut scope = ServiceScope::new();
        scope.insert(1_u8);
        scope.insert(2_u8);

        assert_eq!(scope.len(), 1);
        assert_eq!(*scope.get::<u8>().unwrap(), 2);
        assert!(scope.contains::<u8>());
    }
}
