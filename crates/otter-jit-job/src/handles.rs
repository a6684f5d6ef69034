//! GC-safe handles and the persistent handle token
//!
//! A [`Handle`] keeps its object alive and remembers where it was created:
//! either a [`HandleScope`] on an isolate, or a [`PersistentHandles`]
//! container. Scope-bound handles must not cross threads; persistent ones
//! may, as long as the container travels with them.
//!
//! [`PersistentHandles`] is the ownership token moved between the
//! compilation job, the heap broker and the background local heap. It is
//! neither `Clone` nor constructible outside this module except through
//! [`PersistentHandlesScope::detach`].

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{AttachError, JobError, Result};
use crate::isolate::{Isolate, IsolateId};

/// Where a handle lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleLocation {
    /// Bound to a handle scope (scope 0 is the isolate's root scope)
    Scope {
        /// Owning isolate
        isolate: IsolateId,
        /// Scope id
        scope: u32,
    },
    /// Owned by a persistent handle container
    Persistent {
        /// Owning isolate
        isolate: IsolateId,
        /// Container id
        container: u64,
    },
}

/// GC-safe reference to a managed object
pub struct Handle<T> {
    object: Arc<T>,
    location: HandleLocation,
}

impl<T> Handle<T> {
    /// Create a handle in the isolate's current scope
    pub fn new(object: Arc<T>, isolate: &Isolate) -> Self {
        Self {
            object,
            location: isolate.current_scope(),
        }
    }

    pub(crate) fn with_location(object: Arc<T>, location: HandleLocation) -> Self {
        Self { object, location }
    }

    /// Where this handle lives
    pub fn location(&self) -> HandleLocation {
        self.location
    }

    /// Whether this handle is owned by a persistent container
    pub fn is_persistent(&self) -> bool {
        matches!(self.location, HandleLocation::Persistent { .. })
    }

    /// Referenced object
    pub fn object(&self) -> &Arc<T> {
        &self.object
    }

    /// Same object, re-expressed in the isolate's current scope
    pub fn reopen(&self, isolate: &Isolate) -> Self {
        Self::new(self.object.clone(), isolate)
    }

    /// Whether both handles reference the same object
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.object, &b.object)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            location: self.location,
        }
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("object", &self.object)
            .field("location", &self.location)
            .finish()
    }
}

/// RAII handle scope. Handles created while it is open are tagged with it.
pub struct HandleScope<'i> {
    isolate: &'i Isolate,
    scope: u32,
}

impl<'i> HandleScope<'i> {
    /// Open a new scope on `isolate`
    pub fn new(isolate: &'i Isolate) -> Self {
        let scope = isolate.enter_scope();
        Self { isolate, scope }
    }

    /// Location of handles created in this scope
    pub fn location(&self) -> HandleLocation {
        HandleLocation::Scope {
            isolate: self.isolate.id(),
            scope: self.scope,
        }
    }
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        self.isolate.exit_scope(self.scope);
    }
}

/// Component that can own the persistent handle token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleHolder {
    /// The compilation job
    CompilationInfo,
    /// The heap-snapshot facade
    HeapBroker,
    /// The background thread's local heap
    LocalHeap,
}

impl fmt::Display for HandleHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CompilationInfo => "compilation info",
            Self::HeapBroker => "heap broker",
            Self::LocalHeap => "local heap",
        })
    }
}

const LEASE_IN_TRANSIT: u8 = 0;
const LEASE_COMPILATION_INFO: u8 = 1;
const LEASE_HEAP_BROKER: u8 = 2;
const LEASE_LOCAL_HEAP: u8 = 3;
const LEASE_RELEASED: u8 = 4;

/// Shared record of where a token currently is. Lets a former holder
/// check on drop that the token did not leak to the background.
#[derive(Debug)]
pub(crate) struct HandleLease {
    state: AtomicU8,
}

impl HandleLease {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(LEASE_IN_TRANSIT),
        }
    }

    fn set_holder(&self, holder: Option<HandleHolder>) {
        let state = match holder {
            None => LEASE_IN_TRANSIT,
            Some(HandleHolder::CompilationInfo) => LEASE_COMPILATION_INFO,
            Some(HandleHolder::HeapBroker) => LEASE_HEAP_BROKER,
            Some(HandleHolder::LocalHeap) => LEASE_LOCAL_HEAP,
        };
        self.state.store(state, Ordering::Release);
    }

    fn set_released(&self) {
        self.state.store(LEASE_RELEASED, Ordering::Release);
    }

    pub(crate) fn holder(&self) -> Option<HandleHolder> {
        match self.state.load(Ordering::Acquire) {
            LEASE_COMPILATION_INFO => Some(HandleHolder::CompilationInfo),
            LEASE_HEAP_BROKER => Some(HandleHolder::HeapBroker),
            LEASE_LOCAL_HEAP => Some(HandleHolder::LocalHeap),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        self.state.load(Ordering::Acquire) == LEASE_RELEASED
    }
}

/// Batch of references valid outside any handle scope.
///
/// Move-only: exactly one holder owns it at a time.
pub struct PersistentHandles {
    isolate: IsolateId,
    container: u64,
    roots: Vec<Arc<dyn Any + Send + Sync>>,
    lease: Arc<HandleLease>,
}

impl PersistentHandles {
    fn new(isolate: &Isolate) -> Self {
        Self {
            isolate: isolate.id(),
            container: isolate.next_persistent_id(),
            roots: Vec::new(),
            lease: Arc::new(HandleLease::new()),
        }
    }

    /// Isolate the handles belong to
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }

    /// Location tag carried by handles from this container
    pub fn location(&self) -> HandleLocation {
        HandleLocation::Persistent {
            isolate: self.isolate,
            container: self.container,
        }
    }

    /// Number of rooted objects
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether nothing is rooted
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Root `object` and return a persistent handle to it
    pub fn new_handle<T: Any + Send + Sync>(&mut self, object: Arc<T>) -> Handle<T> {
        let root: Arc<dyn Any + Send + Sync> = object.clone();
        self.roots.push(root);
        Handle::with_location(object, self.location())
    }

    /// Re-express a handle as a persistent one owned by this container
    pub fn persist<T: Any + Send + Sync>(&mut self, handle: &Handle<T>) -> Handle<T> {
        self.new_handle(handle.object().clone())
    }

    /// Whether `handle` was issued by this container
    pub fn contains<T: Any + Send + Sync>(&self, handle: &Handle<T>) -> bool {
        if handle.location() != self.location() {
            return false;
        }
        let target = Arc::as_ptr(handle.object()) as *const ();
        self.roots
            .iter()
            .any(|root| Arc::as_ptr(root) as *const () == target)
    }

    /// Current holder, `None` while in transit
    pub fn holder(&self) -> Option<HandleHolder> {
        self.lease.holder()
    }

    /// Drop every root. Handles already handed out keep their objects alive
    /// on their own; the container just stops pinning them.
    pub fn release(self) -> usize {
        let released = self.roots.len();
        tracing::trace!(
            target: "otter::jit",
            container = self.container,
            released,
            "persistent handles released"
        );
        released
    }

    pub(crate) fn lease(&self) -> Arc<HandleLease> {
        self.lease.clone()
    }
}

impl Drop for PersistentHandles {
    fn drop(&mut self) {
        self.lease.set_released();
    }
}

impl fmt::Debug for PersistentHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentHandles")
            .field("isolate", &self.isolate)
            .field("container", &self.container)
            .field("roots", &self.roots.len())
            .field("holder", &self.holder())
            .finish()
    }
}

/// Scope whose handles outlive it. The only way to mint a
/// [`PersistentHandles`] token.
pub struct PersistentHandlesScope<'i> {
    isolate: &'i Isolate,
    handles: PersistentHandles,
}

impl<'i> PersistentHandlesScope<'i> {
    /// Open a persistent scope on `isolate`
    pub fn new(isolate: &'i Isolate) -> Self {
        Self {
            isolate,
            handles: PersistentHandles::new(isolate),
        }
    }

    /// Create a persistent handle to `object`
    pub fn persist<T: Any + Send + Sync>(&mut self, object: Arc<T>) -> Handle<T> {
        self.handles.new_handle(object)
    }

    /// Create a persistent handle to the object behind `handle`
    pub fn persist_handle<T: Any + Send + Sync>(&mut self, handle: &Handle<T>) -> Handle<T> {
        self.handles.persist(handle)
    }

    /// Close the scope and take its handles as a token
    pub fn detach(self) -> PersistentHandles {
        tracing::trace!(
            target: "otter::jit",
            isolate = %self.isolate.id(),
            roots = self.handles.len(),
            "persistent handle scope detached"
        );
        self.handles
    }
}

/// Storage for the token inside one holder
#[derive(Debug)]
pub(crate) struct HandleSlot {
    owner: HandleHolder,
    handles: Option<PersistentHandles>,
}

impl HandleSlot {
    pub(crate) const fn new(owner: HandleHolder) -> Self {
        Self {
            owner,
            handles: None,
        }
    }

    pub(crate) fn attach(
        &mut self,
        handles: PersistentHandles,
    ) -> std::result::Result<(), AttachError> {
        if self.handles.is_some() {
            return Err(AttachError::new(self.owner, handles));
        }
        handles.lease.set_holder(Some(self.owner));
        tracing::trace!(
            target: "otter::jit",
            holder = %self.owner,
            container = handles.container,
            "persistent handles attached"
        );
        self.handles = Some(handles);
        Ok(())
    }

    pub(crate) fn detach(&mut self) -> Result<PersistentHandles> {
        let handles = self
            .handles
            .take()
            .ok_or(JobError::NoHandlesAttached { holder: self.owner })?;
        handles.lease.set_holder(None);
        tracing::trace!(
            target: "otter::jit",
            holder = %self.owner,
            container = handles.container,
            "persistent handles detached"
        );
        Ok(handles)
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.handles.is_some()
    }

    pub(crate) fn get(&self) -> Option<&PersistentHandles> {
        self.handles.as_ref()
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut PersistentHandles> {
        self.handles.as_mut()
    }
}
