use std::any::Any;
use std::sync::{Arc, Weak};

/// A type-erased, shared reference to any object that can be used as a notification sender.
pub type Object = Arc<dyn Any + Send + Sync>;

/// A type-erased value carried by notifications and property changes.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Identity of an object, derived from its allocation address.
/// Two `ObjectId`s are equal only if they were taken from the same allocation.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    pub fn of(object: &Object) -> Self { ObjectId(Arc::as_ptr(object) as *const () as usize) }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{:#x}", self.0) }
}

/// A non-owning handle to an [`Object`].
///
/// Holding a `WeakObject` never keeps the object alive, but it does keep the
/// allocation reserved, so the [`ObjectId`] cannot be reused by another object
/// for as long as the handle exists. Every use must go through [`WeakObject::upgrade`].
#[derive(Clone)]
pub struct WeakObject {
    id: ObjectId,
    weak: Weak<dyn Any + Send + Sync>,
}

impl WeakObject {
    pub fn new(object: &Object) -> Self { Self { id: ObjectId::of(object), weak: Arc::downgrade(object) } }

    pub fn id(&self) -> ObjectId { self.id }

    /// Resolves to a strong reference if the object is still alive
    pub fn upgrade(&self) -> Option<Object> { self.weak.upgrade() }

    pub fn is_alive(&self) -> bool { self.weak.strong_count() > 0 }

    /// Whether `object` is the object this handle points to
    pub fn is(&self, object: &Object) -> bool { self.id == ObjectId::of(object) }
}

impl std::fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakObject").field("id", &self.id).field("alive", &self.is_alive()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_object_does_not_keep_object_alive() {
        let object: Object = Arc::new(String::from("sender"));
        let weak = WeakObject::new(&object);
        assert!(weak.is_alive());
        assert!(weak.is(&object));

        drop(object);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_distinct_objects_have_distinct_ids() {
        let a: Object = Arc::new("A");
        let b: Object = Arc::new("A");
        assert_ne!(ObjectId::of(&a), ObjectId::of(&b));
        assert_eq!(ObjectId::of(&a), ObjectId::of(&a.clone()));
    }
}
