use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ahash::AHashMap;
use smol_str::SmolStr;

use crate::value::Value;

/// One runtime entity: the class it belongs to plus its attribute values.
///
/// Instances are handed around as [`EntityHandle`]s; the write-state maps key
/// them by referential identity (see [`EntityKey`]) because a generated
/// identifier changes the instance's value identity the moment it is filled
/// in.
#[derive(Debug)]
pub struct EntityInstance {
    class: SmolStr,
    fields: AHashMap<SmolStr, Value>,
}

/// Shared handle to an [`EntityInstance`].
#[derive(Clone)]
pub struct EntityHandle(Rc<RefCell<EntityInstance>>);

impl EntityHandle {
    pub fn new(class: impl Into<SmolStr>) -> Self {
        EntityHandle(Rc::new(RefCell::new(EntityInstance {
            class: class.into(),
            fields: AHashMap::new(),
        })))
    }

    pub fn class(&self) -> SmolStr {
        self.0.borrow().class.clone()
    }

    /// Reads one attribute; absent attributes read as `Value::Null`.
    pub fn get(&self, attribute: &str) -> Value {
        self.0
            .borrow()
            .fields
            .get(attribute)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn set(&self, attribute: impl Into<SmolStr>, value: impl Into<Value>) -> &Self {
        self.0
            .borrow_mut()
            .fields
            .insert(attribute.into(), value.into());
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey(Rc::clone(&self.0))
    }

    pub fn ptr_eq(&self, other: &EntityHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.0.borrow().class, Rc::as_ptr(&self.0))
    }
}

/// Identity key for one entity: hashes and compares by pointer, never by the
/// instance's values. Keeps the handle alive so the address stays unique for
/// the lifetime of the key.
#[derive(Clone)]
pub struct EntityKey(Rc<RefCell<EntityInstance>>);

impl EntityKey {
    pub fn handle(&self) -> EntityHandle {
        EntityHandle(Rc::clone(&self.0))
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.0.borrow().class, Rc::as_ptr(&self.0))
    }
}
