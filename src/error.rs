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

//! Error types

use std::fmt;

use crate::system::SystemId;

/// ECS error type
///
/// Pool exhaustion is not represented here: `Pool::get` returns `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The entity already carries a component of this kind
    ComponentExists { component: &'static str },

    /// Structural change attempted on a pool-owned entity
    EntityBelongsToPool { component: &'static str },

    /// A system requires a component kind the entity does not carry
    UnsatisfiedComponent {
        system: SystemId,
        component: &'static str,
    },

    /// Component not found on the entity
    ComponentNotFound { component: &'static str },
}

impl EcsError {
    /// Duplicate kind, or a structural edit the entity does not allow.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EcsError::ComponentExists { .. } | EcsError::EntityBelongsToPool { .. }
        )
    }

    /// The entity is owned by a pool.
    pub fn is_ownership(&self) -> bool {
        matches!(self, EcsError::EntityBelongsToPool { .. })
    }

    /// Name of the component kind involved in the failure
    pub fn component(&self) -> &'static str {
        match self {
            EcsError::ComponentExists { component }
            | EcsError::EntityBelongsToPool { component }
            | EcsError::UnsatisfiedComponent { component, .. }
            | EcsError::ComponentNotFound { component } => component,
        }
    }
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::ComponentExists { component } => {
                write!(f, "Component {component} already exists in entity")
            }
            EcsError::EntityBelongsToPool { component } => write!(
                f,
                "Cannot add or remove {component}: entity belongs to a pool"
            ),
            EcsError::UnsatisfiedComponent { system, component } => {
                write!(f, "System {system:?} requires component {component}")
            }
            EcsError::ComponentNotFound { component } => {
                write!(f, "Component not found: {component}")
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
