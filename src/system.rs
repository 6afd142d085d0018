//! Systems: a callback plus the ordered set of entities it processes
//!
//! Membership may change from inside the system's own callback. While a
//! pass is running, structural changes go to a [`MembershipBuffer`] and are
//! applied when the pass ends, so every entity that was a member when `run`
//! started gets exactly one callback, and entities added mid-pass are only
//! seen on the next run.

use std::any::TypeId;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::command::MembershipBuffer;
use crate::component::{Bundle, MAX_BUNDLE_COMPONENTS};
use crate::entity::{Containable, Entity};
use crate::error::{EcsError, Result};

static NEXT_SYSTEM_ID: AtomicU32 = AtomicU32::new(0);

/// System ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u32);

impl SystemId {
    fn next() -> Self {
        SystemId(NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-entity callback: `(system, entity, args)`
pub type Callback<A> = Box<dyn FnMut(&System<A>, &Entity, &A)>;

/// Object-safe view of a system's membership.
///
/// Lets a pool hold systems with different argument types.
pub trait EntityGroup {
    fn id(&self) -> SystemId;

    fn name(&self) -> &str;

    /// Component kinds an entity must carry to be added
    fn required_components(&self) -> &[TypeId];

    /// Readable names matching `required_components`
    fn required_component_names(&self) -> &[&'static str];

    fn add_entity(&self, entity: &Entity) -> Result<()>;

    /// Add an entity already known to carry every required kind.
    ///
    /// Pools check bound systems against their template once, at build
    /// time, and register checked-out entities through this path.
    fn enroll(&self, entity: &Entity);

    fn remove_entity(&self, entity: &Entity);

    fn contains(&self, entity: &Entity) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct SystemInner<A: 'static> {
    id: SystemId,
    name: Cow<'static, str>,
    callback: RefCell<Callback<A>>,
    members: RefCell<Vec<Entity>>,
    locked: Cell<bool>,
    pending: RefCell<MembershipBuffer>,
    required: SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>,
    required_names: SmallVec<[&'static str; MAX_BUNDLE_COMPONENTS]>,
}

/// Handle to a system. Clones share the same members and callback.
pub struct System<A: 'static = ()> {
    inner: Rc<SystemInner<A>>,
}

/// Builder for systems with a name or required components
pub struct SystemBuilder<A: 'static = ()> {
    name: Cow<'static, str>,
    callback: Callback<A>,
    required: SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>,
    required_names: SmallVec<[&'static str; MAX_BUNDLE_COMPONENTS]>,
}

impl<A: 'static> SystemBuilder<A> {
    /// Set the system name used in errors and diagnostics
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Require every component kind of bundle `B`
    pub fn requires<B: Bundle>(mut self) -> Self {
        for (type_id, name) in B::type_ids().into_iter().zip(B::type_names()) {
            if !self.required.contains(&type_id) {
                self.required.push(type_id);
                self.required_names.push(name);
            }
        }
        self
    }

    pub fn build(self) -> System<A> {
        System {
            inner: Rc::new(SystemInner {
                id: SystemId::next(),
                name: self.name,
                callback: RefCell::new(self.callback),
                members: RefCell::new(Vec::new()),
                locked: Cell::new(false),
                pending: RefCell::new(MembershipBuffer::new()),
                required: self.required,
                required_names: self.required_names,
            }),
        }
    }
}

/// Wrap a plain function or closure as a system
pub fn system<A, F>(callback: F) -> System<A>
where
    A: 'static,
    F: FnMut(&System<A>, &Entity, &A) + 'static,
{
    System::new(callback)
}

impl<A: 'static> System<A> {
    /// Create a system with no component requirements
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&System<A>, &Entity, &A) + 'static,
    {
        Self::builder(callback).build()
    }

    /// Create a system that only accepts entities carrying every kind in `B`
    pub fn requiring<B: Bundle, F>(callback: F) -> Self
    where
        F: FnMut(&System<A>, &Entity, &A) + 'static,
    {
        Self::builder(callback).requires::<B>().build()
    }

    pub fn builder<F>(callback: F) -> SystemBuilder<A>
    where
        F: FnMut(&System<A>, &Entity, &A) + 'static,
    {
        SystemBuilder {
            name: Cow::Borrowed("system"),
            callback: Box::new(callback),
            required: SmallVec::new(),
            required_names: SmallVec::new(),
        }
    }

    pub fn id(&self) -> SystemId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Add an entity.
    ///
    /// No-op if already a member. Fails with
    /// [`EcsError::UnsatisfiedComponent`] if the entity lacks a required
    /// kind. During a run the addition is deferred to the end of the pass.
    pub fn add_entity(&self, entity: &Entity) -> Result<()> {
        let is_member = self.contains(entity);
        if is_member && !self.inner.pending.borrow().is_removal_pending(entity) {
            return Ok(());
        }

        if let Some(missing) = entity.first_missing(&self.inner.required) {
            return Err(EcsError::UnsatisfiedComponent {
                system: self.inner.id,
                component: self.inner.required_names[missing],
            });
        }

        self.admit(entity, is_member);
        Ok(())
    }

    fn admit(&self, entity: &Entity, is_member: bool) {
        if self.inner.locked.get() {
            self.inner.pending.borrow_mut().queue_add(entity, is_member);
        } else {
            self.attach(entity);
        }
    }

    /// Remove an entity. No-op if it is not a member.
    ///
    /// During a run the removal is deferred to the end of the pass.
    pub fn remove_entity(&self, entity: &Entity) {
        let is_member = self.contains(entity);
        if self.inner.locked.get() {
            self.inner.pending.borrow_mut().queue_remove(entity, is_member);
        } else if is_member {
            self.detach(entity);
        }
    }

    /// Run the callback once for every member, in membership order.
    ///
    /// Calling `run` from inside this system's own callback is a no-op.
    /// Membership changes issued during the pass are applied after it, also
    /// when the callback panics.
    pub fn run(&self, args: &A) {
        if self.inner.locked.get() {
            return;
        }

        #[cfg(feature = "profiling")]
        let span = info_span!("system.run", system = %self.inner.name, members = self.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        self.inner.locked.set(true);
        let _pass = PassGuard { system: self };
        let mut callback = self.inner.callback.borrow_mut();
        let callback = &mut **callback;

        // Members are not touched while locked, so indices stay valid.
        let mut index = 0;
        loop {
            let next = self.inner.members.borrow().get(index).cloned();
            let Some(entity) = next else {
                break;
            };
            callback(self, &entity, args);
            index += 1;
        }
    }

    /// Whether `entity` is currently a member.
    ///
    /// Buffered additions are not yet members.
    pub fn contains(&self, entity: &Entity) -> bool {
        entity.is_member_of(self.inner.id)
    }

    /// Number of members, not counting buffered changes
    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a pass is in progress
    pub fn is_running(&self) -> bool {
        self.inner.locked.get()
    }

    /// Number of buffered membership changes waiting for the pass to end
    pub fn pending_changes(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Snapshot of the members in membership order
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.members.borrow().clone()
    }

    pub fn required_components(&self) -> &[TypeId] {
        &self.inner.required
    }

    fn attach(&self, entity: &Entity) {
        if self.contains(entity) {
            return;
        }
        self.inner.members.borrow_mut().push(entity.clone());
        entity.join(self.inner.id);
    }

    fn detach(&self, entity: &Entity) {
        let mut members = self.inner.members.borrow_mut();
        if let Some(index) = members.iter().position(|member| member == entity) {
            members.remove(index);
            entity.leave(self.inner.id);
        }
    }

    fn finish_pass(&self) {
        self.inner.locked.set(false);
        let drained = self.inner.pending.borrow_mut().drain();
        for entity in &drained.removed {
            self.detach(entity);
        }
        for entity in &drained.added {
            self.attach(entity);
        }
    }
}

/// Unlocks the system and applies buffered changes when a pass ends
struct PassGuard<'a, A: 'static> {
    system: &'a System<A>,
}

impl<A: 'static> Drop for PassGuard<'_, A> {
    fn drop(&mut self) {
        self.system.finish_pass();
    }
}

impl<A: 'static> Clone for System<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: 'static> PartialEq for System<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<A: 'static> Eq for System<A> {}

impl<A: 'static> std::fmt::Debug for System<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("members", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl<A: 'static> Containable for System<A> {
    fn is_contained_in(&self, entity: &Entity) -> bool {
        self.contains(entity)
    }
}

impl<A: 'static> EntityGroup for System<A> {
    fn id(&self) -> SystemId {
        self.inner.id
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn required_components(&self) -> &[TypeId] {
        &self.inner.required
    }

    fn required_component_names(&self) -> &[&'static str] {
        &self.inner.required_names
    }

    fn add_entity(&self, entity: &Entity) -> Result<()> {
        System::add_entity(self, entity)
    }

    fn enroll(&self, entity: &Entity) {
        debug_assert!(entity.has_all(&self.inner.required));
        let is_member = System::contains(self, entity);
        if is_member && !self.inner.pending.borrow().is_removal_pending(entity) {
            return;
        }
        self.admit(entity, is_member);
    }

    fn remove_entity(&self, entity: &Entity) {
        System::remove_entity(self, entity)
    }

    fn contains(&self, entity: &Entity) -> bool {
        System::contains(self, entity)
    }

    fn len(&self) -> usize {
        System::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[derive(Debug, Default)]
    struct Counter(u32);

    #[derive(Debug, Default)]
    struct Position {
        x: f32,
    }

    fn counted(n: usize) -> Vec<Entity> {
        (0..n)
            .map(|_| Entity::with((Counter::default(),)).unwrap())
            .collect()
    }

    fn increment(_: &System, entity: &Entity, _: &()) {
        entity.set_fields::<Counter>(|c| c.0 += 1).unwrap();
    }

    fn count_of(entity: &Entity) -> u32 {
        entity.with_component::<Counter, _>(|c| c.0).unwrap()
    }

    #[test]
    fn test_run_visits_members_in_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&order);
        let entities = counted(3);
        let sys = System::new(move |_, entity: &Entity, _: &()| {
            seen.borrow_mut().push(entity.clone());
        });
        for entity in &entities {
            sys.add_entity(entity).unwrap();
        }

        sys.run(&());
        assert_eq!(*order.borrow(), entities);
    }

    #[test]
    fn test_double_add_is_noop() {
        let sys = system(increment);
        let entity = Entity::with((Counter::default(),)).unwrap();
        sys.add_entity(&entity).unwrap();
        sys.add_entity(&entity).unwrap();
        assert_eq!(sys.len(), 1);
        assert!(entity.contains(&sys));
    }

    #[test]
    fn test_remove_non_member_is_noop() {
        let sys = system(increment);
        let entity = Entity::new();
        sys.remove_entity(&entity);
        assert!(sys.is_empty());
    }

    #[test]
    fn test_extra_args_are_forwarded() {
        let sys = System::new(|_, entity: &Entity, dt: &f32| {
            entity.set_fields::<Position>(|p| p.x += *dt).unwrap();
        });
        let entity = Entity::with((Position::default(),)).unwrap();
        sys.add_entity(&entity).unwrap();

        sys.run(&0.5);
        sys.run(&0.25);
        assert_eq!(entity.with_component::<Position, _>(|p| p.x), Some(0.75));
    }

    #[test]
    fn test_self_removal_during_run() {
        let entities = counted(100);
        let first = entities[0].clone();
        let target = first.clone();
        let sys = System::new(move |sys: &System, entity: &Entity, _: &()| {
            entity.set_fields::<Counter>(|c| c.0 += 1).unwrap();
            if *entity == target {
                sys.remove_entity(entity);
            }
        });
        for entity in &entities {
            sys.add_entity(entity).unwrap();
        }

        sys.run(&());

        assert!(entities.iter().all(|e| count_of(e) == 1));
        assert!(!sys.contains(&first));
        assert_eq!(sys.len(), 99);
    }

    #[test]
    fn test_removal_applies_only_after_pass() {
        let entities = counted(3);
        let last = entities[2].clone();
        let observed_len = Rc::new(Cell::new(0));
        let observed = Rc::clone(&observed_len);
        let sys = System::new(move |sys: &System, entity: &Entity, _: &()| {
            sys.remove_entity(&last);
            observed.set(sys.len());
            entity.set_fields::<Counter>(|c| c.0 += 1).unwrap();
        });
        for entity in &entities {
            sys.add_entity(entity).unwrap();
        }

        sys.run(&());
        assert_eq!(observed_len.get(), 3);
        assert_eq!(count_of(&entities[2]), 1);
        assert_eq!(sys.len(), 2);
        assert!(!sys.contains(&entities[2]));
    }

    #[test]
    fn test_added_during_run_waits_for_next_pass() {
        let newcomer = Entity::with((Counter::default(),)).unwrap();
        let pending = newcomer.clone();
        let member_mid_pass = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&member_mid_pass);
        let sys = System::new(move |sys: &System, entity: &Entity, _: &()| {
            entity.set_fields::<Counter>(|c| c.0 += 1).unwrap();
            sys.add_entity(&pending).unwrap();
            log.borrow_mut().push(sys.contains(&pending));
        });
        let original = Entity::with((Counter::default(),)).unwrap();
        sys.add_entity(&original).unwrap();

        sys.run(&());
        assert_eq!(*member_mid_pass.borrow(), vec![false]);
        assert_eq!(count_of(&newcomer), 0);
        assert!(sys.contains(&newcomer));
        assert_eq!(sys.len(), 2);

        sys.run(&());
        assert_eq!(*member_mid_pass.borrow(), vec![false, true, true]);
        assert_eq!(count_of(&newcomer), 1);
        assert_eq!(count_of(&original), 2);
    }

    #[test]
    fn test_reentrant_run_is_noop() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let sys = System::new(move |sys: &System, _: &Entity, _: &()| {
            counter.set(counter.get() + 1);
            assert!(sys.is_running());
            sys.run(&());
        });
        for entity in counted(4) {
            sys.add_entity(&entity).unwrap();
        }

        sys.run(&());
        assert_eq!(calls.get(), 4);
        assert!(!sys.is_running());
    }

    #[test]
    fn test_required_components() {
        let sys = System::<()>::requiring::<(Position, Counter), _>(|_, _, _| {});
        let partial = Entity::with((Position::default(),)).unwrap();
        let full = Entity::with((Position::default(), Counter::default())).unwrap();

        let err = sys.add_entity(&partial).unwrap_err();
        match err {
            EcsError::UnsatisfiedComponent { system, component } => {
                assert_eq!(system, sys.id());
                assert!(component.ends_with("Counter"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!sys.contains(&partial));

        sys.add_entity(&full).unwrap();
        assert!(sys.contains(&full));
        assert_eq!(sys.required_components().len(), 2);
    }

    #[test]
    fn test_remove_then_readd_in_same_pass_keeps_member() {
        let entities = counted(2);
        let sys = System::new(|sys: &System, entity: &Entity, _: &()| {
            sys.remove_entity(entity);
            sys.add_entity(entity).unwrap();
        });
        for entity in &entities {
            sys.add_entity(entity).unwrap();
        }

        sys.run(&());
        assert_eq!(sys.entities(), entities);
        assert_eq!(sys.pending_changes(), 0);
    }

    #[test]
    fn test_add_then_remove_in_same_pass_is_dropped() {
        let outsider = Entity::with((Counter::default(),)).unwrap();
        let target = outsider.clone();
        let sys = System::new(move |sys: &System, _: &Entity, _: &()| {
            sys.add_entity(&target).unwrap();
            sys.remove_entity(&target);
        });
        let member = Entity::with((Counter::default(),)).unwrap();
        sys.add_entity(&member).unwrap();

        sys.run(&());
        assert!(!sys.contains(&outsider));
        assert_eq!(sys.len(), 1);
    }

    #[test]
    fn test_buffered_additions_apply_last_first() {
        let newcomers = counted(3);
        let queued = newcomers.clone();
        let sys = System::new(move |sys: &System, _: &Entity, _: &()| {
            for entity in &queued {
                sys.add_entity(entity).unwrap();
            }
        });
        let seed = Entity::with((Counter::default(),)).unwrap();
        sys.add_entity(&seed).unwrap();

        sys.run(&());
        let members = sys.entities();
        assert_eq!(members[0], seed);
        assert_eq!(&members[1..], &[
            newcomers[2].clone(),
            newcomers[1].clone(),
            newcomers[0].clone()
        ]);
    }

    #[test]
    fn test_panic_in_callback_unlocks_and_applies() {
        let entities = counted(2);
        let sys = System::new(|sys: &System, entity: &Entity, _: &()| {
            sys.remove_entity(entity);
            panic!("callback failure");
        });
        for entity in &entities {
            sys.add_entity(entity).unwrap();
        }

        let result = catch_unwind(AssertUnwindSafe(|| sys.run(&())));
        assert!(result.is_err());
        assert!(!sys.is_running());
        assert_eq!(sys.len(), 1);
        assert!(!sys.contains(&entities[0]));
        assert!(sys.contains(&entities[1]));
    }

    #[test]
    fn test_enroll_follows_run_buffering() {
        let late = Entity::with((Counter::default(),)).unwrap();
        let queued = late.clone();
        let sys = System::new(move |sys: &System, _: &Entity, _: &()| {
            EntityGroup::enroll(sys, &queued);
            EntityGroup::enroll(sys, &queued);
        });
        let first = Entity::with((Counter::default(),)).unwrap();
        EntityGroup::enroll(&sys, &first);
        EntityGroup::enroll(&sys, &first);
        assert_eq!(sys.len(), 1);

        sys.run(&());
        assert_eq!(sys.entities(), vec![first, late]);
        assert_eq!(sys.pending_changes(), 0);
    }

    #[test]
    fn test_named_system() {
        let sys = System::<()>::builder(|_, _, _| {}).name("physics").build();
        assert_eq!(sys.name(), "physics");
        assert_ne!(sys.id(), system::<(), _>(|_, _, _| {}).id());
    }
}
