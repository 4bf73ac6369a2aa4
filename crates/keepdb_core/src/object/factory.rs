//! Custom object construction.

use crate::error::CoreResult;
use crate::object::Object;
use crate::schema::ObjectSchema;

/// A creation strategy bound to one object type.
///
/// Registering a factory in the schema (as [`SchemaItem::Bound`](crate::SchemaItem::Bound))
/// makes every object of its type an instance of the factory. Types without
/// a factory use plain [`Object`] handles.
///
/// ```rust,ignore
/// struct PersonFactory { created: AtomicUsize }
///
/// impl ObjectFactory for PersonFactory {
///     fn object_schema(&self) -> Option<ObjectSchema> {
///         Some(ObjectSchema::new("Person")
///             .with_property(PropertyDescriptor::new("name", PropertyType::String)))
///     }
///
///     fn construct(&self, _object: &Object) -> CoreResult<()> {
///         self.created.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
pub trait ObjectFactory: Send + Sync {
    /// The object type this factory produces.
    ///
    /// Returning `None` makes the schema invalid.
    fn object_schema(&self) -> Option<ObjectSchema>;

    /// Runs once for every object created through `create` or
    /// `create_with`, nested creation included.
    ///
    /// Runs inside the write transaction after the object's values are
    /// stored, so it may modify the object. An error fails the create.
    fn construct(&self, object: &Object) -> CoreResult<()> {
        let _ = object;
        Ok(())
    }

    /// Runs for every object a result set obtained through
    /// `objects_with` hands out.
    fn materialized(&self, object: &Object) {
        let _ = object;
    }

    /// Name used in error messages.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Whether two factory references point at the same instance.
pub(crate) fn same_factory<A, B>(a: &A, b: &B) -> bool
where
    A: ?Sized,
    B: ?Sized,
{
    std::ptr::eq((a as *const A).cast::<()>(), (b as *const B).cast::<()>())
}
