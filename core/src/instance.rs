//! Live instances and the values that flow between them and their mirrors.
//!
//! RULE: the host owns instances (strong `Handle`s). The registry and
//! reference fields only ever hold `WeakHandle`s, so neither keeps an
//! instance alive after the host destroys it.

use crate::{
    descriptor::TypeDescriptor,
    error::{PersistError, PersistResult},
    types::{Identity, NodeId},
};
use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

/// The contract every persistable runtime type fulfils.
///
/// Field access is by declared field name; the generated schema drives
/// which names are read and written and how the values are represented.
pub trait Persistable: Any {
    /// Concrete type name. Must match the descriptor's name.
    fn type_name(&self) -> &'static str;

    fn identity(&self) -> &str;

    fn set_identity(&mut self, id: Identity);

    /// Read a persistable field. `None` if the type has no such field.
    fn read_field(&self, field: &str) -> Option<FieldValue>;

    fn write_field(&mut self, field: &str, value: FieldValue) -> PersistResult<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Static side of a persistable type: its descriptor and how to build a
/// blank instance.
pub trait PersistableType: Persistable + Default + Sized {
    const TYPE_NAME: &'static str;

    fn descriptor() -> TypeDescriptor;
}

/// Builds a fresh instance bound to the given host node.
pub type InstanceFactory = Rc<dyn Fn(NodeId) -> Handle>;

/// Factory for any `PersistableType`, built from its `Default`.
pub fn default_factory<T: PersistableType>() -> InstanceFactory {
    Rc::new(|node| Handle::new(node, T::default()))
}

// ── Handles ───────────────────────────────────────────────────────

/// Strong reference to a live instance plus the host node it lives on.
///
/// The concrete type is cached so type checks never borrow the instance;
/// a record may reference itself while it is being written.
#[derive(Clone)]
pub struct Handle {
    node:      NodeId,
    type_id:   TypeId,
    type_name: &'static str,
    inner:     Rc<RefCell<dyn Persistable>>,
}

impl Handle {
    pub fn new<T: Persistable>(node: NodeId, value: T) -> Self {
        Self {
            node,
            type_id: TypeId::of::<T>(),
            type_name: value.type_name(),
            inner: Rc::new(RefCell::new(value)),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn borrow(&self) -> Ref<'_, dyn Persistable> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn Persistable> {
        self.inner.borrow_mut()
    }

    pub fn identity(&self) -> Identity {
        self.inner.borrow().identity().to_string()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Persistable>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Run `f` against the concrete instance, if it is a `T`.
    pub fn with<T: Persistable, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.inner.borrow();
        guard.as_any().downcast_ref::<T>().map(f)
    }

    pub fn with_mut<T: Persistable, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.inner.borrow_mut();
        guard.as_any_mut().downcast_mut::<T>().map(f)
    }

    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            node:      self.node,
            type_id:   self.type_id,
            type_name: self.type_name,
            inner:     Rc::downgrade(&self.inner),
        }
    }

    /// Pointer identity: the same live instance, not merely equal fields.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => write!(f, "Handle({}#{} {})", self.type_name, self.node, inner.identity()),
            Err(_) => write!(f, "Handle({}#{} <borrowed>)", self.type_name, self.node),
        }
    }
}

/// Non-owning back-reference to an instance.
#[derive(Clone)]
pub struct WeakHandle {
    node:      NodeId,
    type_id:   TypeId,
    type_name: &'static str,
    inner:     Weak<RefCell<dyn Persistable>>,
}

impl WeakHandle {
    pub fn upgrade(&self) -> Option<Handle> {
        self.inner.upgrade().map(|inner| Handle {
            node: self.node,
            type_id: self.type_id,
            type_name: self.type_name,
            inner,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn points_to(&self, handle: &Handle) -> bool {
        Weak::ptr_eq(&self.inner, &Rc::downgrade(&handle.inner))
    }
}

impl std::fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WeakHandle({}#{}, live={})", self.type_name, self.node, self.is_live())
    }
}

// ── Links ─────────────────────────────────────────────────────────

/// A reference field's runtime value: a weak link to another persistable
/// instance, or explicitly absent.
#[derive(Clone, Default)]
pub struct Link {
    target: Option<WeakHandle>,
}

impl Link {
    pub fn to(handle: &Handle) -> Self {
        Self {
            target: Some(handle.downgrade()),
        }
    }

    pub fn absent() -> Self {
        Self { target: None }
    }

    pub fn get(&self) -> Option<Handle> {
        self.target.as_ref().and_then(WeakHandle::upgrade)
    }

    /// True when the link was never set or its target has been destroyed.
    pub fn is_absent(&self) -> bool {
        self.get().is_none()
    }

    /// Identity of the live target, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.get().map(|h| h.identity())
    }

    pub fn points_to(&self, handle: &Handle) -> bool {
        self.target.as_ref().is_some_and(|w| w.points_to(handle))
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(handle) => write!(f, "Link({handle:?})"),
            None => f.write_str("Link(absent)"),
        }
    }
}

// ── Field values ──────────────────────────────────────────────────

/// A field's runtime value as exchanged with a `Persistable`.
#[derive(Debug)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Link(Link),
    List(Vec<FieldValue>),
    /// A runtime value only a converter knows how to record.
    Custom(Box<dyn Any>),
}

impl FieldValue {
    pub fn custom<T: Any>(value: T) -> Self {
        Self::Custom(Box::new(value))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Link(_) => "link",
            Self::List(_) => "list",
            Self::Custom(_) => "custom",
        }
    }

    pub fn into_bool(self, ctx: FieldCtx<'_>) -> PersistResult<bool> {
        match self {
            Self::Bool(v) => Ok(v),
            _ => Err(ctx.mismatch("bool")),
        }
    }

    pub fn into_int(self, ctx: FieldCtx<'_>) -> PersistResult<i64> {
        match self {
            Self::Int(v) => Ok(v),
            _ => Err(ctx.mismatch("int")),
        }
    }

    pub fn into_float(self, ctx: FieldCtx<'_>) -> PersistResult<f64> {
        match self {
            Self::Float(v) => Ok(v),
            Self::Int(v) => Ok(v as f64),
            _ => Err(ctx.mismatch("float")),
        }
    }

    pub fn into_text(self, ctx: FieldCtx<'_>) -> PersistResult<String> {
        match self {
            Self::Text(v) => Ok(v),
            _ => Err(ctx.mismatch("text")),
        }
    }

    pub fn into_link(self, ctx: FieldCtx<'_>) -> PersistResult<Link> {
        match self {
            Self::Link(v) => Ok(v),
            _ => Err(ctx.mismatch("link")),
        }
    }

    pub fn into_list(self, ctx: FieldCtx<'_>) -> PersistResult<Vec<FieldValue>> {
        match self {
            Self::List(v) => Ok(v),
            _ => Err(ctx.mismatch("list")),
        }
    }

    pub fn into_custom<T: Any>(self, ctx: FieldCtx<'_>) -> PersistResult<T> {
        match self {
            Self::Custom(boxed) => boxed
                .downcast::<T>()
                .map(|v| *v)
                .map_err(|_| ctx.mismatch(std::any::type_name::<T>())),
            _ => Err(ctx.mismatch(std::any::type_name::<T>())),
        }
    }

    /// Convert every element of a list with `f`.
    pub fn into_vec<T>(
        self,
        ctx: FieldCtx<'_>,
        f: impl Fn(FieldValue, FieldCtx<'_>) -> PersistResult<T>,
    ) -> PersistResult<Vec<T>> {
        self.into_list(ctx)?.into_iter().map(|v| f(v, ctx)).collect()
    }
}

/// Which field a value conversion is for, so errors can name it.
#[derive(Debug, Clone, Copy)]
pub struct FieldCtx<'a> {
    pub type_name: &'a str,
    pub field:     &'a str,
}

impl<'a> FieldCtx<'a> {
    pub fn new(type_name: &'a str, field: &'a str) -> Self {
        Self { type_name, field }
    }

    pub fn mismatch(&self, expected: &'static str) -> PersistError {
        PersistError::FieldType {
            type_name: self.type_name.to_string(),
            field:     self.field.to_string(),
            expected,
        }
    }

    pub fn unknown(&self) -> PersistError {
        PersistError::UnknownField {
            type_name: self.type_name.to_string(),
            field:     self.field.to_string(),
        }
    }
}
