//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use recycle_ecs::prelude::*;
//! ```

pub use crate::component::{Bundle, Component, ComponentCell};
pub use crate::entity::{Containable, Entity};
pub use crate::error::{EcsError, Result};
pub use crate::pool::{Pool, PoolBuilder, Template};
pub use crate::system::{system, EntityGroup, System, SystemId};
