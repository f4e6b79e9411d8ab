//! Active source binding
//!
//! At most one source is bound at a time. Every bind hands out an
//! [`ObserverHandle`]; once the binding is replaced or cleared the handle is
//! stale and notifications carrying it are ignored.

use crate::budget::SegmentBudget;

/// Identity of a single bind operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Token attached to chunk, completion and failure notifications of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle {
    binding: BindingId,
}

impl ObserverHandle {
    pub fn binding(&self) -> BindingId {
        self.binding
    }
}

/// The source currently being consumed
pub struct ActiveBinding<S> {
    id: BindingId,
    source: S,
    pub budget: SegmentBudget,
}

impl<S> ActiveBinding<S> {
    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn handle(&self) -> ObserverHandle {
        ObserverHandle { binding: self.id }
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

/// Owner of the single active binding
pub struct Binder<S> {
    active: Option<ActiveBinding<S>>,
    next_id: u64,
}

impl<S> Binder<S> {
    pub fn new() -> Self {
        Self {
            active: None,
            next_id: 0,
        }
    }

    /// Bind `source`, replacing (and unbinding) whatever was bound before
    pub fn bind(&mut self, source: S, expected_bytes: Option<u64>) -> ObserverHandle {
        self.unbind();
        self.next_id += 1;
        let binding = ActiveBinding {
            id: BindingId(self.next_id),
            source,
            budget: SegmentBudget::new(expected_bytes),
        };
        let handle = binding.handle();
        self.active = Some(binding);
        handle
    }

    /// Release the bound source. Its handle is stale from here on.
    pub fn unbind(&mut self) -> Option<BindingId> {
        self.active.take().map(|binding| binding.id)
    }

    /// Stale-event guard: does `handle` belong to the current binding?
    pub fn is_current(&self, handle: ObserverHandle) -> bool {
        self.active
            .as_ref()
            .is_some_and(|binding| binding.id == handle.binding)
    }

    pub fn is_bound(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveBinding<S>> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveBinding<S>> {
        self.active.as_mut()
    }
}

impl<S> Default for Binder<S> {
    fn default() -> Self {
        Self::new()
    }
}
