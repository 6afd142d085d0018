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

//! Deferred membership changes for a running system
//!
//! While a system iterates its members, `add_entity`/`remove_entity` are
//! recorded here and applied once the pass is over. The last operation
//! recorded for an entity wins: queueing an add cancels a pending remove of
//! the same entity and vice versa.

use crate::entity::Entity;

/// Pending adds and removes, kept as two stacks
#[derive(Debug, Default)]
pub struct MembershipBuffer {
    added: Vec<Entity>,
    removed: Vec<Entity>,
}

/// Changes taken out of a [`MembershipBuffer`], in the order they must be
/// applied: every removal first, then every addition, each stack popped
/// from the top.
#[derive(Debug, Default)]
pub struct DrainedChanges {
    pub removed: Vec<Entity>,
    pub added: Vec<Entity>,
}

impl MembershipBuffer {
    /// Create new buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with capacity for each stack
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            added: Vec::with_capacity(capacity),
            removed: Vec::with_capacity(capacity),
        }
    }

    /// Queue an addition. `is_member` is the entity's applied membership.
    pub fn queue_add(&mut self, entity: &Entity, is_member: bool) {
        if let Some(index) = self.removed.iter().position(|e| e == entity) {
            self.removed.remove(index);
            return;
        }
        if !is_member && !self.added.contains(entity) {
            self.added.push(entity.clone());
        }
    }

    /// Queue a removal. `is_member` is the entity's applied membership.
    pub fn queue_remove(&mut self, entity: &Entity, is_member: bool) {
        if let Some(index) = self.added.iter().position(|e| e == entity) {
            self.added.remove(index);
            return;
        }
        if is_member && !self.removed.contains(entity) {
            self.removed.push(entity.clone());
        }
    }

    /// Whether a removal of `entity` is waiting to be applied
    pub fn is_removal_pending(&self, entity: &Entity) -> bool {
        self.removed.contains(entity)
    }

    /// Whether an addition of `entity` is waiting to be applied
    pub fn is_addition_pending(&self, entity: &Entity) -> bool {
        self.added.contains(entity)
    }

    /// Take every pending change, leaving the buffer empty
    pub fn drain(&mut self) -> DrainedChanges {
        let mut removed = std::mem::take(&mut self.removed);
        let mut added = std::mem::take(&mut self.added);
        removed.reverse();
        added.reverse();
        DrainedChanges { removed, added }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Clear buffer
    pub fn clear(&mut self) {
        self.added.clear();
        self.removed.clear();
    }
}
