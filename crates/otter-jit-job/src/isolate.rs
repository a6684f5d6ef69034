//! Execution context owning handle scopes and id counters

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::JitPolicy;
use crate::handles::HandleLocation;

static NEXT_ISOLATE_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies an [`Isolate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsolateId(u32);

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "isolate#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct ScopeStack {
    open: Vec<u32>,
    next: u32,
}

/// Main-thread execution context.
///
/// Owns the handle scope stack and hands out optimization ids.
pub struct Isolate {
    id: IsolateId,
    policy: JitPolicy,
    next_optimization_id: AtomicI32,
    next_persistent_id: AtomicU64,
    scopes: Mutex<ScopeStack>,
}

impl Isolate {
    /// Create an isolate using the process-wide policy
    pub fn new() -> Self {
        Self::with_policy(JitPolicy::global().clone())
    }

    /// Create an isolate with an explicit policy
    pub fn with_policy(policy: JitPolicy) -> Self {
        Self {
            id: IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed)),
            policy,
            next_optimization_id: AtomicI32::new(0),
            next_persistent_id: AtomicU64::new(1),
            scopes: Mutex::new(ScopeStack::default()),
        }
    }

    /// Isolate id
    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// JIT policy for jobs compiled on this isolate
    pub fn policy(&self) -> &JitPolicy {
        &self.policy
    }

    /// Draw the next optimization id
    pub fn next_optimization_id(&self) -> i32 {
        self.next_optimization_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Location new handles are created in. Scope 0 is the root scope.
    pub fn current_scope(&self) -> HandleLocation {
        let scope = self.scopes.lock().open.last().copied().unwrap_or(0);
        HandleLocation::Scope {
            isolate: self.id,
            scope,
        }
    }

    /// Number of open handle scopes, not counting the root scope
    pub fn scope_depth(&self) -> usize {
        self.scopes.lock().open.len()
    }

    pub(crate) fn enter_scope(&self) -> u32 {
        let mut scopes = self.scopes.lock();
        scopes.next += 1;
        let scope = scopes.next;
        scopes.open.push(scope);
        scope
    }

    pub(crate) fn exit_scope(&self, scope: u32) {
        let mut scopes = self.scopes.lock();
        let top = scopes.open.pop();
        debug_assert_eq!(top, Some(scope), "handle scopes must close in LIFO order");
    }

    pub(crate) fn next_persistent_id(&self) -> u64 {
        self.next_persistent_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Isolate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Isolate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("id", &self.id)
            .field("scope_depth", &self.scope_depth())
            .finish_non_exhaustive()
    }
}
