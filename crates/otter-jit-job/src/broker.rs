//! Heap-snapshot facade and the background local heap
//!
//! The broker owns the persistent handle token while a job's heap accesses
//! are serialized. When the job moves to a background thread the broker
//! lends the token to that thread's [`LocalHeap`] and takes it back once
//! the background phase is done. Only the broker can move the token in and
//! out of a local heap, so the chain cannot skip a link.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{AttachError, JobError, Result};
use crate::handles::{Handle, HandleHolder, HandleSlot, PersistentHandles};
use crate::isolate::{Isolate, IsolateId};

/// Thread-safe view of the heap used during background compilation
pub struct HeapBroker {
    isolate: IsolateId,
    tracing: bool,
    handles: HandleSlot,
}

impl HeapBroker {
    /// Broker for `isolate`. `tracing` enables access tracing.
    pub fn new(isolate: &Isolate, tracing: bool) -> Self {
        Self {
            isolate: isolate.id(),
            tracing,
            handles: HandleSlot::new(HandleHolder::HeapBroker),
        }
    }

    /// Isolate the broker serves
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }

    /// Whether heap accesses are traced
    pub fn tracing_enabled(&self) -> bool {
        self.tracing
    }

    /// Take ownership of the token
    pub fn attach_persistent_handles(
        &mut self,
        handles: PersistentHandles,
    ) -> std::result::Result<(), AttachError> {
        self.handles.attach(handles)
    }

    /// Give up ownership of the token
    pub fn detach_persistent_handles(&mut self) -> Result<PersistentHandles> {
        self.handles.detach()
    }

    /// Whether the broker currently holds the token
    pub fn has_persistent_handles(&self) -> bool {
        self.handles.is_attached()
    }

    /// Token held by the broker
    pub fn persistent_handles(&self) -> Option<&PersistentHandles> {
        self.handles.get()
    }

    /// Persist `handle` into the held token so it survives scope exit
    pub fn persist<T: Any + Send + Sync>(&mut self, handle: &Handle<T>) -> Result<Handle<T>> {
        let handles = self.handles.get_mut().ok_or(JobError::NoHandlesAttached {
            holder: HandleHolder::HeapBroker,
        })?;
        if self.tracing {
            tracing::trace!(
                target: "otter::jit",
                container = ?handles.location(),
                "broker persisting handle"
            );
        }
        Ok(handles.persist(handle))
    }

    /// Lend the token to a background thread's local heap.
    ///
    /// On failure the broker still holds the token.
    pub fn attach_local_heap(&mut self, local_heap: &mut LocalHeap) -> Result<()> {
        let handles = self.handles.detach()?;
        if let Err(err) = local_heap.handles.attach(handles) {
            let holder = err.holder();
            self.handles.attach(err.into_handles())?;
            return Err(JobError::HandlesAlreadyAttached { holder });
        }
        tracing::debug!(
            target: "otter::jit",
            isolate = %self.isolate,
            "local heap attached to broker"
        );
        Ok(())
    }

    /// Take the token back from a local heap.
    ///
    /// Fails without moving anything if the broker already holds a token or
    /// the local heap holds none.
    pub fn detach_local_heap(&mut self, local_heap: &mut LocalHeap) -> Result<()> {
        if self.handles.is_attached() {
            return Err(JobError::HandlesAlreadyAttached {
                holder: HandleHolder::HeapBroker,
            });
        }
        let handles = local_heap.handles.detach()?;
        self.handles.attach(handles)?;
        tracing::debug!(
            target: "otter::jit",
            isolate = %self.isolate,
            "local heap detached from broker"
        );
        Ok(())
    }
}

impl fmt::Debug for HeapBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapBroker")
            .field("isolate", &self.isolate)
            .field("tracing", &self.tracing)
            .field("handles", &self.handles.get())
            .finish()
    }
}

/// Background thread's view of an isolate's heap
pub struct LocalHeap {
    isolate: IsolateId,
    handles: HandleSlot,
}

impl LocalHeap {
    /// Local heap for a background thread working on `isolate`
    pub fn new(isolate: &Isolate) -> Self {
        Self {
            isolate: isolate.id(),
            handles: HandleSlot::new(HandleHolder::LocalHeap),
        }
    }

    /// Isolate this local heap belongs to
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }

    /// Whether the local heap currently holds the token
    pub fn has_persistent_handles(&self) -> bool {
        self.handles.is_attached()
    }

    /// Token lent by the broker
    pub fn persistent_handles(&self) -> Option<&PersistentHandles> {
        self.handles.get()
    }

    /// Root `object` in the lent token. Background threads have no handle
    /// scope, so every handle they create must be persistent.
    pub fn new_persistent_handle<T: Any + Send + Sync>(
        &mut self,
        object: Arc<T>,
    ) -> Result<Handle<T>> {
        let handles = self.handles.get_mut().ok_or(JobError::NoHandlesAttached {
            holder: HandleHolder::LocalHeap,
        })?;
        Ok(handles.new_handle(object))
    }
}

impl fmt::Debug for LocalHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHeap")
            .field("isolate", &self.isolate)
            .field("handles", &self.handles.get())
            .finish()
    }
}
