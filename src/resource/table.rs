//! Per-instantiation resource handle tables.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::ResourceError;
use crate::logging;

/// An opaque integer resource handle crossing the boundary.
pub type Handle = u32;

/// A host-side resource representation, shared with interior mutability
/// owned by the host implementation.
pub type HostRep = Arc<dyn Any + Send + Sync>;

/// Destructor invoked exactly once when an owned host resource is dropped.
pub type Destructor = Arc<dyn Fn(HostRep) + Send + Sync>;

/// What a handle refers to: a host-side object, or a reference the remote
/// side owns and we only name by its index.
#[derive(Clone)]
pub enum Representation {
    Host(HostRep),
    Remote(u32),
}

impl std::fmt::Debug for Representation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(_) => f.write_str("Representation::Host(..)"),
            Self::Remote(idx) => write!(f, "Representation::Remote({idx})"),
        }
    }
}

/// Proof of an outstanding borrow of a handle. Must be released through
/// [`ResourceHandleTable::release_borrow`] before the owning handle can be
/// dropped; a token discarded without release is reported as a leak at
/// table teardown.
#[derive(Debug)]
pub struct BorrowToken {
    handle: Handle,
    generation: u64,
}

impl BorrowToken {
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

/// Counts reported by [`ResourceHandleTable::close`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Owned handles still live at teardown, force-dropped (destructors run).
    pub forced_drops: usize,
    /// Borrow tokens never released: a protocol leak on the caller's side.
    pub leaked_borrows: usize,
}

impl TeardownReport {
    pub fn merge(&mut self, other: TeardownReport) {
        self.forced_drops += other.forced_drops;
        self.leaked_borrows += other.leaked_borrows;
    }
}

struct Slot {
    rep: Representation,
    generation: u64,
    borrows: u32,
}

#[derive(Default)]
struct TableState {
    slots: BTreeMap<Handle, Slot>,
    next_handle: Handle,
    next_generation: u64,
    destructor: Option<Destructor>,
}

/// Handle table for one resource kind of one connected instantiation.
///
/// Handles are allocated monotonically starting at 1 and never reused.
/// All operations serialize on an internal lock; clones share the same
/// underlying table.
#[derive(Default, Clone)]
pub struct ResourceHandleTable {
    state: Arc<Mutex<TableState>>,
}

impl ResourceHandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register the destructor run when owned host resources are dropped.
    pub fn set_destructor(&self, destructor: Destructor) {
        self.state().destructor = Some(destructor);
    }

    /// Register the destructor only if none is set yet.
    pub fn ensure_destructor(&self, destructor: &Destructor) {
        let mut state = self.state();
        if state.destructor.is_none() {
            state.destructor = Some(Arc::clone(destructor));
        }
    }

    /// Allocate a fresh owned handle for a representation.
    pub fn allocate_own(&self, rep: Representation) -> Handle {
        let mut state = self.state();
        state.next_handle += 1;
        state.next_generation += 1;
        let handle = state.next_handle;
        let generation = state.next_generation;
        state.slots.insert(
            handle,
            Slot {
                rep,
                generation,
                borrows: 0,
            },
        );
        logging::trace!(handle, "allocated own handle");
        handle
    }

    /// Register a host-created representation under a fresh handle, so the
    /// remote side can subsequently reference it purely by handle.
    pub fn register_host_representation(&self, rep: HostRep) -> Handle {
        self.allocate_own(Representation::Host(rep))
    }

    /// Resolve a handle back to the representation it was allocated with.
    pub fn dereference(&self, handle: Handle) -> Result<Representation, ResourceError> {
        let state = self.state();
        state
            .slots
            .get(&handle)
            .map(|slot| slot.rep.clone())
            .ok_or(ResourceError::UnknownHandle { handle })
    }

    /// Resolve a handle back to its host representation.
    pub fn resolve_host_representation(&self, handle: Handle) -> Result<HostRep, ResourceError> {
        match self.dereference(handle)? {
            Representation::Host(rep) => Ok(rep),
            Representation::Remote(_) => Err(ResourceError::NotHostOwned { handle }),
        }
    }

    /// Take a temporary reference to a handle for the duration of a call.
    pub fn allocate_borrow(&self, handle: Handle) -> Result<BorrowToken, ResourceError> {
        let mut state = self.state();
        let slot = state
            .slots
            .get_mut(&handle)
            .ok_or(ResourceError::UnknownHandle { handle })?;
        slot.borrows += 1;
        let generation = slot.generation;
        logging::trace!(handle, "allocated borrow");
        Ok(BorrowToken { handle, generation })
    }

    /// Release a borrow token. A token for an already-dropped generation is
    /// stale and rejected.
    pub fn release_borrow(&self, token: BorrowToken) -> Result<(), ResourceError> {
        let mut state = self.state();
        let slot = state
            .slots
            .get_mut(&token.handle)
            .ok_or(ResourceError::UnknownHandle {
                handle: token.handle,
            })?;
        if slot.generation != token.generation {
            return Err(ResourceError::StaleBorrow {
                handle: token.handle,
            });
        }
        slot.borrows = slot.borrows.saturating_sub(1);
        Ok(())
    }

    /// Drop an owned handle, invoking the destructor if one is registered.
    ///
    /// Fails with [`ResourceError::ResourceInUse`] while borrow tokens are
    /// outstanding; the handle stays valid in that case.
    pub fn drop_own(&self, handle: Handle) -> Result<(), ResourceError> {
        let (rep, destructor) = {
            let mut state = self.state();
            let slot = state
                .slots
                .get(&handle)
                .ok_or(ResourceError::UnknownHandle { handle })?;
            if slot.borrows > 0 {
                return Err(ResourceError::ResourceInUse {
                    handle,
                    borrows: slot.borrows,
                });
            }
            let slot = state
                .slots
                .remove(&handle)
                .ok_or(ResourceError::UnknownHandle { handle })?;
            (slot.rep, state.destructor.clone())
        };
        logging::trace!(handle, "dropped own handle");
        // Destructor runs outside the table lock
        if let (Representation::Host(rep), Some(destructor)) = (rep, destructor) {
            destructor(rep);
        }
        Ok(())
    }

    /// Number of live handles in the table.
    pub fn live_handles(&self) -> usize {
        self.state().slots.len()
    }

    /// Tear the table down: force-drop every outstanding owned handle
    /// (running destructors) and count borrow tokens never released.
    pub fn close(&self) -> TeardownReport {
        let (slots, destructor) = {
            let mut state = self.state();
            (std::mem::take(&mut state.slots), state.destructor.clone())
        };

        let mut report = TeardownReport::default();
        for (_handle, slot) in slots {
            report.forced_drops += 1;
            report.leaked_borrows += slot.borrows as usize;
            if let (Representation::Host(rep), Some(destructor)) = (slot.rep, &destructor) {
                destructor(rep);
            }
        }
        if report.leaked_borrows > 0 {
            logging::warn!(
                leaked = report.leaked_borrows,
                "borrow tokens leaked at table teardown"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn host_rep(v: u32) -> HostRep {
        Arc::new(v)
    }

    #[test]
    fn handles_allocate_monotonically_from_one() {
        let table = ResourceHandleTable::new();
        assert_eq!(table.allocate_own(Representation::Host(host_rep(0))), 1);
        assert_eq!(table.allocate_own(Representation::Remote(7)), 2);
        table.drop_own(1).unwrap();
        // Freed handle values are never reused
        assert_eq!(table.allocate_own(Representation::Host(host_rep(1))), 3);
    }

    #[test]
    fn dereference_after_drop_fails_with_unknown_handle() {
        let table = ResourceHandleTable::new();
        let h = table.register_host_representation(host_rep(42));
        assert!(table.dereference(h).is_ok());
        table.drop_own(h).unwrap();
        assert!(matches!(
            table.dereference(h),
            Err(ResourceError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn drop_with_live_borrow_fails_and_leaves_handle_valid() {
        let table = ResourceHandleTable::new();
        let h = table.register_host_representation(host_rep(1));
        let token = table.allocate_borrow(h).unwrap();
        assert!(matches!(
            table.drop_own(h),
            Err(ResourceError::ResourceInUse { borrows: 1, .. })
        ));
        assert!(table.dereference(h).is_ok());
        table.release_borrow(token).unwrap();
        table.drop_own(h).unwrap();
    }

    #[test]
    fn destructor_runs_exactly_once() {
        let table = ResourceHandleTable::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        table.set_destructor(Arc::new(move |_rep| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let h = table.register_host_representation(host_rep(9));
        table.drop_own(h).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(table.drop_own(h).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_reports_forced_drops_and_leaked_borrows() {
        let table = ResourceHandleTable::new();
        let a = table.register_host_representation(host_rep(1));
        let _b = table.register_host_representation(host_rep(2));
        let _leaked = table.allocate_borrow(a).unwrap();
        let report = table.close();
        assert_eq!(report.forced_drops, 2);
        assert_eq!(report.leaked_borrows, 1);
    }
}
