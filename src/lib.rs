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

//! Recycle ECS - Entity Component System built around entity pools
//!
//! Entities are bags of components, at most one per kind. Pools build a
//! fixed number of entities up front and recycle them, so a simulation loop
//! never allocates an entity per frame. Systems run a callback over their
//! members and tolerate membership changes (including freeing the entity
//! being processed) from inside that callback.
//!
//! ```
//! use recycle_ecs::prelude::*;
//!
//! #[derive(Default)]
//! struct Position(f32);
//!
//! let movement = System::new(|_, entity: &Entity, dt: &f32| {
//!     entity.set_fields::<Position>(|p| p.0 += *dt).unwrap();
//! });
//! let pool = Pool::builder(8)
//!     .template(Template::of::<(Position,)>())
//!     .bind(&movement)
//!     .build()
//!     .unwrap();
//!
//! let bullet = pool.get().unwrap();
//! movement.run(&0.5);
//! assert_eq!(bullet.with_component::<Position, _>(|p| p.0), Some(0.5));
//! bullet.free();
//! assert!(movement.is_empty());
//! ```

pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod system;


pub use command::*;
pub use component::*;
pub use entity::*;
pub use error::*;
pub use pool::*;
pub use system::*;
