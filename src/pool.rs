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

//! Fixed-capacity entity pools
//!
//! A [`Pool`] builds every entity it will ever hand out when it is created,
//! one component instance per kind declared in its [`Template`]. After that
//! `get` and `free` only move entities between the `available` and `used`
//! lists, run the init/clean hooks and (un)register the entity with the
//! bound systems. No component is constructed or dropped while the pool
//! lives.

use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::component::{Component, ComponentSlot, ComponentStore, DefaultBundle};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::system::EntityGroup;

/// Checkout/checkin hook
pub type Hook = Rc<dyn Fn(&Entity)>;

type Factory = Box<dyn Fn() -> ComponentSlot>;

struct TemplateEntry {
    type_id: TypeId,
    name: &'static str,
    factory: Factory,
}

/// Component kinds (and how to construct them) for every pool slot
#[derive(Default)]
pub struct Template {
    entries: Vec<TemplateEntry>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template with one default-constructed component per kind of `B`
    pub fn of<B: DefaultBundle>() -> Self {
        B::register_defaults(Self::new())
    }

    /// Declare kind `T`, default-constructed
    pub fn with<T: Component + Default>(self) -> Self {
        self.with_fn(T::default)
    }

    /// Declare kind `T`, constructed by `factory` once per slot
    pub fn with_fn<T, F>(mut self, factory: F) -> Self
    where
        T: Component,
        F: Fn() -> T + 'static,
    {
        self.entries.push(TemplateEntry {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            factory: Box::new(move || ComponentSlot::new(factory())),
        });
        self
    }

    /// Declared kinds, in declaration order
    pub fn type_ids(&self) -> SmallVec<[TypeId; 8]> {
        self.entries.iter().map(|entry| entry.type_id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            if self.entries[..index]
                .iter()
                .any(|earlier| earlier.type_id == entry.type_id)
            {
                return Err(EcsError::ComponentExists {
                    component: entry.name,
                });
            }
        }
        Ok(())
    }

    fn instantiate(&self) -> ComponentStore {
        let mut store = ComponentStore::new();
        for entry in &self.entries {
            store.insert_unchecked((entry.factory)());
        }
        store
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| entry.name))
            .finish()
    }
}

pub(crate) struct PoolInner {
    capacity: usize,
    kinds: SmallVec<[TypeId; 8]>,
    available: RefCell<VecDeque<Entity>>,
    used: RefCell<VecDeque<Entity>>,
    systems: Vec<Box<dyn EntityGroup>>,
    on_init: RefCell<Option<Hook>>,
    on_clean: RefCell<Option<Hook>>,
}

/// Fixed-capacity recycler of entities
#[derive(Clone)]
pub struct Pool {
    inner: Rc<PoolInner>,
}

/// Builder for pools with bound systems or hooks
pub struct PoolBuilder {
    capacity: usize,
    template: Template,
    systems: Vec<Box<dyn EntityGroup>>,
    on_init: Option<Hook>,
    on_clean: Option<Hook>,
}

impl PoolBuilder {
    pub fn template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }

    /// Register every checked-out entity with `system`.
    ///
    /// Systems are registered with in the order they are bound.
    pub fn bind<S: EntityGroup + Clone + 'static>(mut self, system: &S) -> Self {
        self.systems.push(Box::new(system.clone()));
        self
    }

    pub fn on_init(mut self, hook: impl Fn(&Entity) + 'static) -> Self {
        self.on_init = Some(Rc::new(hook));
        self
    }

    pub fn on_clean(mut self, hook: impl Fn(&Entity) + 'static) -> Self {
        self.on_clean = Some(Rc::new(hook));
        self
    }

    /// Build the pool and every one of its entities.
    ///
    /// # Errors
    /// - [`EcsError::ComponentExists`] if the template declares a kind twice
    /// - [`EcsError::UnsatisfiedComponent`] if a bound system requires a kind
    ///   the template does not declare
    pub fn build(self) -> Result<Pool> {
        self.template.validate()?;
        let kinds = self.template.type_ids();

        for system in &self.systems {
            let required = system.required_components();
            if let Some(missing) = required.iter().position(|kind| !kinds.contains(kind)) {
                return Err(EcsError::UnsatisfiedComponent {
                    system: system.id(),
                    component: system.required_component_names()[missing],
                });
            }
        }

        let PoolBuilder {
            capacity,
            template,
            systems,
            on_init,
            on_clean,
        } = self;

        let inner = Rc::new_cyclic(|pool| {
            let available = (0..capacity)
                .map(|_| Entity::pooled(pool.clone(), template.instantiate()))
                .collect::<VecDeque<_>>();

            PoolInner {
                capacity,
                kinds,
                available: RefCell::new(available),
                used: RefCell::new(VecDeque::with_capacity(capacity)),
                systems,
                on_init: RefCell::new(on_init),
                on_clean: RefCell::new(on_clean),
            }
        });

        #[cfg(feature = "profiling")]
        tracing::debug!(
            capacity,
            components = inner.kinds.len(),
            systems = inner.systems.len(),
            "pool built"
        );

        Ok(Pool { inner })
    }
}

impl Pool {
    /// Create a pool of `capacity` entities shaped by `template`
    pub fn new(capacity: usize, template: Template) -> Result<Self> {
        Self::builder(capacity).template(template).build()
    }

    pub fn builder(capacity: usize) -> PoolBuilder {
        PoolBuilder {
            capacity,
            template: Template::new(),
            systems: Vec::new(),
            on_init: None,
            on_clean: None,
        }
    }

    pub(crate) fn from_inner(inner: Rc<PoolInner>) -> Self {
        Self { inner }
    }

    /// Check out an entity, or `None` when the pool is exhausted.
    ///
    /// The most recently freed entity is handed out first. The init hook
    /// runs before the entity joins the bound systems.
    pub fn get(&self) -> Option<Entity> {
        let next = self.inner.available.borrow_mut().pop_back();
        let Some(entity) = next else {
            #[cfg(feature = "profiling")]
            tracing::trace!(capacity = self.inner.capacity, "pool exhausted");
            return None;
        };
        self.inner.used.borrow_mut().push_back(entity.clone());

        {
            let _checkout = CheckoutGuard {
                pool: &self.inner,
                entity: &entity,
            };
            if let Some(hook) = self.init_hook() {
                hook(&entity);
            }
        }

        #[cfg(feature = "profiling")]
        tracing::trace!(used = self.used_len(), "pool checkout");

        Some(entity)
    }

    /// Return a checked-out entity to the pool.
    ///
    /// Returns `false` (and does nothing) if the entity is not currently
    /// checked out from this pool. The clean hook runs before the entity
    /// leaves the bound systems.
    pub fn free(&self, entity: &Entity) -> bool {
        let released = {
            let mut used = self.inner.used.borrow_mut();
            used.iter()
                .position(|candidate| candidate == entity)
                .and_then(|index| used.remove(index))
        };
        let Some(entity) = released else {
            return false;
        };

        {
            let _checkin = CheckinGuard {
                pool: &self.inner,
                entity: &entity,
            };
            if let Some(hook) = self.clean_hook() {
                hook(&entity);
            }
        }

        #[cfg(feature = "profiling")]
        tracing::trace!(used = self.used_len(), "pool checkin");

        true
    }

    /// Free every checked-out entity, in checkout order
    pub fn free_all(&self) {
        loop {
            let head = self.inner.used.borrow().front().cloned();
            let Some(entity) = head else {
                break;
            };
            self.free(&entity);
        }
    }

    /// Set the checkout hook, replacing any previous one
    pub fn on_init(&self, hook: impl Fn(&Entity) + 'static) -> Hook {
        let hook: Hook = Rc::new(hook);
        *self.inner.on_init.borrow_mut() = Some(Rc::clone(&hook));
        hook
    }

    /// Set the checkin hook, replacing any previous one
    pub fn on_clean(&self, hook: impl Fn(&Entity) + 'static) -> Hook {
        let hook: Hook = Rc::new(hook);
        *self.inner.on_clean.borrow_mut() = Some(Rc::clone(&hook));
        hook
    }

    fn init_hook(&self) -> Option<Hook> {
        self.inner.on_init.borrow().clone()
    }

    fn clean_hook(&self) -> Option<Hook> {
        self.inner.on_clean.borrow().clone()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn available_len(&self) -> usize {
        self.inner.available.borrow().len()
    }

    pub fn used_len(&self) -> usize {
        self.inner.used.borrow().len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner.available.borrow().is_empty()
    }

    /// Checked-out entities in checkout order
    pub fn used(&self) -> Vec<Entity> {
        self.inner.used.borrow().iter().cloned().collect()
    }

    /// Whether `entity` was built by this pool
    pub fn owns(&self, entity: &Entity) -> bool {
        entity.belongs_to(&self.inner)
    }

    /// Whether `entity` is currently checked out from this pool
    pub fn is_used(&self, entity: &Entity) -> bool {
        self.inner.used.borrow().contains(entity)
    }

    /// Component kinds every pool entity carries
    pub fn component_types(&self) -> &[TypeId] {
        &self.inner.kinds
    }

    /// Number of systems entities are registered with on checkout
    pub fn bound_systems(&self) -> usize {
        self.inner.systems.len()
    }
}

/// Registers a checked-out entity with the bound systems once the init
/// hook returns or unwinds
struct CheckoutGuard<'a> {
    pool: &'a PoolInner,
    entity: &'a Entity,
}

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        // Bound system requirements were checked against the template in `build`.
        for system in &self.pool.systems {
            system.enroll(self.entity);
        }
    }
}

/// Unregisters a released entity and makes it available again once the
/// clean hook returns or unwinds
struct CheckinGuard<'a> {
    pool: &'a PoolInner,
    entity: &'a Entity,
}

impl Drop for CheckinGuard<'_> {
    fn drop(&mut self) {
        for system in &self.pool.systems {
            system.remove_entity(self.entity);
        }
        self.pool.available.borrow_mut().push_back(self.entity.clone());
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("available", &self.available_len())
            .field("used", &self.used_len())
            .field("systems", &self.bound_systems())
            .finish()
    }
}
