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

//! Component, Bundle and the per-entity component store
//!
//! Components are data attached to entities, at most one per kind.
//! Bundles group multiple components for seeding entities and templates.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::{smallvec, SmallVec};

use crate::error::{EcsError, Result};
use crate::pool::Template;

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static {}

/// Automatically implement Component for all valid types
impl<T: 'static> Component for T {}

/// Shared, mutable handle to a single component instance.
///
/// The handle keeps its identity for the whole life of the entity, so a
/// recycled pool entity hands back the very same instances.
pub type ComponentCell<T> = Rc<RefCell<T>>;

/// A type-erased component together with its kind.
pub struct ComponentSlot {
    type_id: TypeId,
    name: &'static str,
    value: Rc<dyn Any>,
}

impl ComponentSlot {
    /// Wrap a component instance
    pub fn new<T: Component>(component: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            value: Rc::new(RefCell::new(component)),
        }
    }

    /// Kind of the wrapped component
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Readable name of the wrapped component's kind
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    fn downcast<T: Component>(&self) -> Option<ComponentCell<T>> {
        Rc::clone(&self.value).downcast::<RefCell<T>>().ok()
    }
}

impl std::fmt::Debug for ComponentSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ComponentSlot").field(&self.name).finish()
    }
}

/// Type-keyed map holding one instance per component kind
#[derive(Debug, Default)]
pub struct ComponentStore {
    components: AHashMap<TypeId, ComponentSlot>,
}

impl ComponentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a component, failing if its kind is already present.
    ///
    /// On failure the existing instance is left untouched.
    pub fn insert(&mut self, slot: ComponentSlot) -> Result<()> {
        if self.components.contains_key(&slot.type_id) {
            return Err(EcsError::ComponentExists {
                component: slot.name,
            });
        }
        self.components.insert(slot.type_id, slot);
        Ok(())
    }

    /// Insert without the uniqueness check.
    ///
    /// Only used while a pool populates its slots from an already validated
    /// template.
    pub(crate) fn insert_unchecked(&mut self, slot: ComponentSlot) {
        self.components.insert(slot.type_id, slot);
    }

    /// Get the component of kind `T`
    pub fn get<T: Component>(&self) -> Option<ComponentCell<T>> {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(ComponentSlot::downcast::<T>)
    }

    /// Remove and return the component of kind `T`
    pub fn remove<T: Component>(&mut self) -> Option<ComponentCell<T>> {
        self.components
            .remove(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast::<T>())
    }

    /// Check whether a component of this kind is present
    pub fn contains_type(&self, type_id: TypeId) -> bool {
        self.components.contains_key(&type_id)
    }

    /// Kinds currently stored, in no particular order
    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.components.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Bundle of components
///
/// Allows seeding entities with multiple components at once, and naming a
/// set of required kinds for a system.
pub trait Bundle: 'static {
    /// Get type IDs of all components in bundle
    fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Get readable names of all components in bundle, matching `type_ids`
    fn type_names() -> SmallVec<[&'static str; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Split the bundle into type-erased slots
    fn into_slots(self) -> SmallVec<[ComponentSlot; MAX_BUNDLE_COMPONENTS]>;
}

/// Bundle whose components can all be default-constructed
pub trait DefaultBundle: Bundle {
    /// Append one default factory per component kind
    fn register_defaults(template: Template) -> Template
    where
        Self: Sized;
}

// Macro for tuple Bundle implementations
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeId::of::<$T>()),*]
            }

            fn type_names() -> SmallVec<[&'static str; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(type_name::<$T>()),*]
            }

            #[allow(non_snake_case)]
            fn into_slots(self) -> SmallVec<[ComponentSlot; MAX_BUNDLE_COMPONENTS]> {
                let ($($T,)*) = self;
                smallvec![$(ComponentSlot::new($T)),*]
            }
        }

        impl<$($T: Component + Default),*> DefaultBundle for ($($T,)*) {
            fn register_defaults(template: Template) -> Template {
                template$(.with::<$T>())*
            }
        }
    };
}

// Implement for tuples of 1-8 components
impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
