// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity handles.
//!
//! An [`Entity`] is a cheap, cloneable handle around a [`ComponentStore`].
//! Entities are either freestanding (the caller may add and remove
//! components at will) or owned by a [`Pool`](crate::pool::Pool), in which
//! case the set of component kinds is fixed when the pool is built and only
//! component fields may change afterwards.
//!
//! Handles compare by identity: two clones of the same entity are equal,
//! two entities with equal component values are not.

use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::component::{Bundle, Component, ComponentCell, ComponentSlot, ComponentStore};
use crate::error::{EcsError, Result};
use crate::pool::{Pool, PoolInner};
use crate::system::SystemId;

/// Something an entity can be asked whether it "contains".
///
/// Implemented for component kinds (`TypeId`) and for systems, so
/// [`Entity::contains`] answers both "does it carry this kind" and
/// "is it a member of this system".
pub trait Containable {
    fn is_contained_in(&self, entity: &Entity) -> bool;
}

impl Containable for TypeId {
    fn is_contained_in(&self, entity: &Entity) -> bool {
        entity.has_type(*self)
    }
}

struct EntityInner {
    components: RefCell<ComponentStore>,
    /// Owning pool. Never upgraded for ownership, only to route `free`.
    pool: Option<Weak<PoolInner>>,
    /// Systems currently holding this entity
    member_of: RefCell<SmallVec<[SystemId; 4]>>,
}

/// Handle to a bag of components
#[derive(Clone)]
pub struct Entity {
    inner: Rc<EntityInner>,
}

impl Entity {
    /// Create an empty freestanding entity
    pub fn new() -> Self {
        Self::from_parts(ComponentStore::new(), None)
    }

    /// Create a freestanding entity seeded with a bundle of components.
    ///
    /// Fails with [`EcsError::ComponentExists`] if the bundle names the same
    /// kind twice.
    pub fn with<B: Bundle>(bundle: B) -> Result<Self> {
        let mut store = ComponentStore::new();
        for slot in bundle.into_slots() {
            store.insert(slot)?;
        }
        Ok(Self::from_parts(store, None))
    }

    pub(crate) fn pooled(pool: Weak<PoolInner>, store: ComponentStore) -> Self {
        Self::from_parts(store, Some(pool))
    }

    fn from_parts(store: ComponentStore, pool: Option<Weak<PoolInner>>) -> Self {
        Self {
            inner: Rc::new(EntityInner {
                components: RefCell::new(store),
                pool,
                member_of: RefCell::new(SmallVec::new()),
            }),
        }
    }

    /// Add a component.
    ///
    /// # Errors
    /// - [`EcsError::EntityBelongsToPool`] if the entity is pool-owned
    /// - [`EcsError::ComponentExists`] if a component of this kind is present;
    ///   the existing instance is kept
    pub fn add<T: Component>(&self, component: T) -> Result<()> {
        if self.is_pooled() {
            return Err(EcsError::EntityBelongsToPool {
                component: type_name::<T>(),
            });
        }
        self.inner
            .components
            .borrow_mut()
            .insert(ComponentSlot::new(component))
    }

    /// Get the component of kind `T`, or `None` if absent
    pub fn get<T: Component>(&self) -> Option<ComponentCell<T>> {
        self.inner.components.borrow().get::<T>()
    }

    /// Remove and return the component of kind `T`.
    ///
    /// Returns `Ok(None)` when absent, and [`EcsError::EntityBelongsToPool`]
    /// for pool-owned entities.
    pub fn remove<T: Component>(&self) -> Result<Option<ComponentCell<T>>> {
        if self.is_pooled() {
            return Err(EcsError::EntityBelongsToPool {
                component: type_name::<T>(),
            });
        }
        Ok(self.inner.components.borrow_mut().remove::<T>())
    }

    /// Run `f` with a shared borrow of component `T`
    pub fn with_component<T: Component, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let cell = self.get::<T>()?;
        let component = cell.borrow();
        Some(f(&*component))
    }

    /// Run `f` with a mutable borrow of component `T`
    pub fn with_component_mut<T: Component, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let cell = self.get::<T>()?;
        let mut component = cell.borrow_mut();
        Some(f(&mut *component))
    }

    /// Assign fields on the existing component of kind `T`.
    ///
    /// Allowed on pool-owned entities: only the component set is frozen.
    pub fn set_fields<T: Component>(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        self.with_component_mut::<T, _>(f)
            .ok_or(EcsError::ComponentNotFound {
                component: type_name::<T>(),
            })
    }

    /// Check for a component of kind `T`
    pub fn has<T: Component>(&self) -> bool {
        self.has_type(TypeId::of::<T>())
    }

    pub fn has_type(&self, type_id: TypeId) -> bool {
        self.inner.components.borrow().contains_type(type_id)
    }

    /// Check that the entity carries every kind in `kinds`
    pub fn has_all(&self, kinds: &[TypeId]) -> bool {
        self.first_missing(kinds).is_none()
    }

    /// Index into `kinds` of the first kind this entity lacks
    pub fn first_missing(&self, kinds: &[TypeId]) -> Option<usize> {
        let components = self.inner.components.borrow();
        kinds.iter().position(|kind| !components.contains_type(*kind))
    }

    /// Membership query for a component kind or a system
    pub fn contains<C: Containable + ?Sized>(&self, item: &C) -> bool {
        item.is_contained_in(self)
    }

    /// Number of components attached
    pub fn component_count(&self) -> usize {
        self.inner.components.borrow().len()
    }

    /// Kinds attached, in no particular order
    pub fn component_types(&self) -> SmallVec<[TypeId; 8]> {
        self.inner.components.borrow().type_ids().collect()
    }

    /// Whether this entity was created by a pool
    pub fn is_pooled(&self) -> bool {
        self.inner.pool.is_some()
    }

    /// Return the entity to its pool.
    ///
    /// No-op (returns `false`) for freestanding entities, for entities that
    /// are not checked out, and when the pool no longer exists.
    pub fn free(&self) -> bool {
        match self.inner.pool.as_ref().and_then(Weak::upgrade) {
            Some(pool) => Pool::from_inner(pool).free(self),
            None => false,
        }
    }

    pub(crate) fn belongs_to(&self, pool: &Rc<PoolInner>) -> bool {
        self.inner
            .pool
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Rc::as_ptr(pool)))
    }

    /// Systems this entity is currently a member of
    pub fn systems(&self) -> SmallVec<[SystemId; 4]> {
        self.inner.member_of.borrow().clone()
    }

    pub(crate) fn is_member_of(&self, system: SystemId) -> bool {
        self.inner.member_of.borrow().contains(&system)
    }

    pub(crate) fn join(&self, system: SystemId) {
        let mut member_of = self.inner.member_of.borrow_mut();
        if !member_of.contains(&system) {
            member_of.push(system);
        }
    }

    pub(crate) fn leave(&self, system: SystemId) {
        self.inner.member_of.borrow_mut().retain(|id| *id != system);
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.inner).hash(state);
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &Rc::as_ptr(&self.inner))
            .field("components", &self.component_count())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}
