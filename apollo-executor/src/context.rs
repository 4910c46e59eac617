//! Per request context handed to resolvers.
//!
//! The context is opaque to the executor: it is created by the caller, passed
//! unchanged to every resolver of one request and never shared with another
//! request unless the caller clones it explicitly.
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::time::Instant;

/// A type map of request scoped values.
///
/// Values are cloned on retrieval through [`Context::get`]; wrap expensive
/// values in an `Arc`.
#[derive(Clone, Default)]
pub struct Extensions {
    inner: http::Extensions,
}

impl Extensions {
    pub fn new() -> Self {
        Self {
            inner: http::Extensions::new(),
        }
    }

    /// Insert a value, returning the previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.inner.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner.get::<T>()
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.inner.get_mut::<T>()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.inner.remove::<T>()
    }

    pub fn contains_key<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.get::<T>().is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.inner.len())
            .finish()
    }
}

/// Holds the context of a request.
///
/// Clones share the same values.
#[derive(Clone, Debug)]
pub struct Context {
    extensions: Arc<parking_lot::Mutex<Extensions>>,
    created_at: Instant,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Context {
            extensions: Default::default(),
            created_at: Instant::now(),
        }
    }

    /// Creates a context holding one value.
    pub fn with_value<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        let context = Self::new();
        context.insert(value);
        context
    }

    /// Insert a value, returning the previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.extensions.lock().insert(value)
    }

    /// Returns a clone of the value of type `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions.lock().get::<T>().cloned()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.lock().contains_key::<T>()
    }

    /// Locks the extensions for interaction.
    ///
    /// The lock will be dropped once the closure completes.
    pub fn with_lock<'a, T, F: FnOnce(ExtensionsGuard<'a>) -> T>(&'a self, func: F) -> T {
        func(ExtensionsGuard {
            guard: self.extensions.lock(),
        })
    }

    /// When the request started.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

pub struct ExtensionsGuard<'a> {
    guard: parking_lot::MutexGuard<'a, Extensions>,
}

impl Deref for ExtensionsGuard<'_> {
    type Target = Extensions;

    fn deref(&self) -> &Extensions {
        &self.guard
    }
}

impl DerefMut for ExtensionsGuard<'_> {
    fn deref_mut(&mut self) -> &mut Extensions {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Viewer(String);

    #[test]
    fn clones_share_values() {
        let context = Context::with_value(Viewer("ada".to_string()));
        let cloned = context.clone();
        assert_eq!(cloned.get::<Viewer>(), Some(Viewer("ada".to_string())));

        cloned.insert(42u32);
        assert!(context.contains::<u32>());
        assert_eq!(
            context.insert(Viewer("grace".to_string())),
            Some(Viewer("ada".to_string()))
        );
    }

    #[test]
    fn with_lock_allows_mutation() {
        let context = Context::new();
        context.with_lock(|mut extensions| {
            extensions.insert(vec![1u8]);
            if let Some(values) = extensions.get_mut::<Vec<u8>>() {
                values.push(2);
            }
        });
        assert_eq!(context.get::<Vec<u8>>(), Some(vec![1, 2]));
        assert_eq!(context.with_lock(|mut e| e.remove::<Vec<u8>>()), Some(vec![1, 2]));
        assert!(context.with_lock(|e| e.is_empty()));
    }

    #[test]
    fn extensions_replace_values_of_the_same_type() {
        let mut extensions = Extensions::new();
        assert_eq!(extensions.insert(Viewer("ada".to_string())), None);
        assert_eq!(
            extensions.insert(Viewer("grace".to_string())),
            Some(Viewer("ada".to_string()))
        );
        assert_eq!(extensions.len(), 1);
        assert!(extensions.contains_key::<Viewer>());
        assert!(!extensions.contains_key::<u32>());
    }
}
