//! Persistent handle ownership across the compilation pipeline
//!
//! The token travels job -> broker -> background local heap -> broker and
//! must have exactly one holder at every step.

use std::sync::Arc;

use bumpalo::Bump;
use otter_jit_job::{
    BytecodeArray, CompilationInfo, Handle, HandleHolder, HandleLocation, HandleScope, HeapBroker,
    Isolate, JitPolicy, JobError, JobKind, JsFunction, LocalHeap, PersistentHandles,
    PersistentHandlesScope, SharedFunctionInfo, SourcePosition,
};

fn isolate() -> Isolate {
    Isolate::with_policy(JitPolicy::default())
}

fn function(isolate: &Isolate, name: &str) -> (Handle<SharedFunctionInfo>, Handle<JsFunction>) {
    let bytecode = Arc::new(BytecodeArray::new(vec![1, 2, 3, 4]));
    let shared = Arc::new(SharedFunctionInfo::new(name, Some(bytecode)));
    let closure = Arc::new(JsFunction::new(shared.clone(), None));
    (Handle::new(shared, isolate), Handle::new(closure, isolate))
}

fn token_for(isolate: &Isolate, shared: &Handle<SharedFunctionInfo>) -> PersistentHandles {
    let mut scope = PersistentHandlesScope::new(isolate);
    scope.persist_handle(shared);
    scope.detach()
}

#[test]
fn test_full_ownership_chain() {
    let mut zone = Bump::new();
    let isolate = isolate();
    let (shared, closure) = function(&isolate, "background");
    let token = token_for(&isolate, &shared);
    let mut info = CompilationInfo::new_for_function(&mut zone, &isolate, shared, closure, false);

    info.attach_persistent_handles(token).expect("job holds nothing");
    assert!(info.has_persistent_handles());
    assert_eq!(
        info.persistent_handles().and_then(|h| h.holder()),
        Some(HandleHolder::CompilationInfo)
    );

    // Job -> broker
    let mut broker = HeapBroker::new(&isolate, info.trace_heap_broker());
    let token = info.detach_persistent_handles().expect("job holds token");
    assert!(!info.has_persistent_handles());
    broker
        .attach_persistent_handles(token)
        .expect("broker holds nothing");

    // Broker -> local heap, used on a background thread
    let mut local_heap = LocalHeap::new(&isolate);
    broker
        .attach_local_heap(&mut local_heap)
        .expect("broker holds token");
    assert!(!broker.has_persistent_handles());

    let local_heap = std::thread::spawn(move || {
        let mut local_heap = local_heap;
        let handle = local_heap
            .new_persistent_handle(Arc::new(BytecodeArray::new(vec![9; 3])))
            .expect("token lent to this thread");
        assert!(handle.is_persistent());
        assert_eq!(
            local_heap.persistent_handles().and_then(|h| h.holder()),
            Some(HandleHolder::LocalHeap)
        );
        local_heap
    })
    .join()
    .expect("background phase");

    // Local heap -> broker
    let mut local_heap = local_heap;
    broker
        .detach_local_heap(&mut local_heap)
        .expect("local heap holds token");
    assert!(broker.has_persistent_handles());
    assert!(!local_heap.has_persistent_handles());
    assert_eq!(
        broker.persistent_handles().map(|h| h.len()),
        Some(2),
        "handles created in the background are kept"
    );

    drop(broker);
    drop(info);
}

#[test]
fn test_job_moves_to_background_worker_and_back() {
    let mut zone = Bump::new();
    let isolate = isolate();
    let (shared, closure) = function(&isolate, "concurrent");
    let token = token_for(&isolate, &shared);
    let mut info = CompilationInfo::new_for_function(&mut zone, &isolate, shared, closure, false);
    info.attach_persistent_handles(token).expect("job holds nothing");

    let callee_bytecode = Arc::new(BytecodeArray::new(vec![7; 6]));
    let callee = Arc::new(SharedFunctionInfo::new(
        "callee",
        Some(callee_bytecode.clone()),
    ));
    let callee = Handle::new(callee, &isolate);
    let callee_bytecode = Handle::new(callee_bytecode, &isolate);

    let info = std::thread::scope(|s| {
        s.spawn(move || {
            let mut info = info;
            let id = info.record_inline(callee, callee_bytecode, SourcePosition::new(12));
            assert_eq!(id.index(), 0);
            let scratch = info.zone_mut().alloc(id.index());
            assert_eq!(*scratch, 0);
            info.tick_counter().tick();
            info
        })
        .join()
        .expect("background phase")
    });

    assert_eq!(info.inlined_functions().len(), 1);
    assert_eq!(info.inlined_functions()[0].shared_info().name(), "callee");
    assert_eq!(info.inlined_bytecode_size(), 6);
    assert_eq!(info.tick_counter().current(), 1);
    assert!(info.zone().allocated_bytes() > 0);
    assert_eq!(
        info.persistent_handles().and_then(|h| h.holder()),
        Some(HandleHolder::CompilationInfo)
    );
}

#[test]
fn test_double_attach_rejected_and_token_returned() {
    let mut zone = Bump::new();
    let isolate = isolate();
    let mut info = CompilationInfo::new_synthetic_with_policy(
        "stub",
        &mut zone,
        JobKind::Stub,
        isolate.policy(),
    );

    info.attach_persistent_handles(PersistentHandlesScope::new(&isolate).detach())
        .expect("first attach");

    let second = PersistentHandlesScope::new(&isolate).detach();
    let container = second.location();
    let err = info
        .attach_persistent_handles(second)
        .expect_err("second attach");
    assert_eq!(err.holder(), HandleHolder::CompilationInfo);
    let returned = err.into_handles();
    assert_eq!(returned.location(), container);
    assert_eq!(returned.holder(), None);
}

#[test]
fn test_double_detach_rejected() {
    let mut zone = Bump::new();
    let isolate = isolate();
    let mut info = CompilationInfo::new_synthetic_with_policy(
        "stub",
        &mut zone,
        JobKind::Stub,
        isolate.policy(),
    );

    assert!(matches!(
        info.detach_persistent_handles(),
        Err(JobError::NoHandlesAttached {
            holder: HandleHolder::CompilationInfo
        })
    ));

    info.attach_persistent_handles(PersistentHandlesScope::new(&isolate).detach())
        .expect("attach");
    let token = info.detach_persistent_handles().expect("first detach");
    assert!(info.detach_persistent_handles().is_err());
    assert_eq!(token.release(), 0);
}

#[test]
fn test_attach_error_converts_to_job_error() {
    let isolate = isolate();
    let mut broker = HeapBroker::new(&isolate, false);
    broker
        .attach_persistent_handles(PersistentHandlesScope::new(&isolate).detach())
        .expect("attach");

    let result: otter_jit_job::Result<()> = broker
        .attach_persistent_handles(PersistentHandlesScope::new(&isolate).detach())
        .map_err(JobError::from);
    assert!(matches!(
        result,
        Err(JobError::HandlesAlreadyAttached {
            holder: HandleHolder::HeapBroker
        })
    ));
}

#[test]
fn test_reopen_moves_handles_into_current_scope() {
    let mut zone = Bump::new();
    let isolate = isolate();
    let (shared, closure) = function(&isolate, "reopen");
    let original = shared.object().clone();
    let mut info = CompilationInfo::new_for_function(&mut zone, &isolate, shared, closure, false);

    let root_location = isolate.current_scope();
    assert_eq!(
        info.shared_info().map(|h| h.location()),
        Some(root_location)
    );

    let scope = HandleScope::new(&isolate);
    info.reopen_handles_in_new_scope(&isolate);

    let shared = info.shared_info().expect("function job");
    assert_eq!(shared.location(), scope.location());
    assert!(Arc::ptr_eq(shared.object(), &original));
    assert_eq!(
        info.bytecode_array().map(|h| h.location()),
        Some(scope.location())
    );
    assert!(matches!(
        info.closure().map(|h| h.location()),
        Some(HandleLocation::Scope { .. })
    ));
    drop(info);
    drop(scope);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "background local heap")]
fn test_dropping_job_while_token_in_background_panics() {
    let mut zone = Bump::new();
    let isolate = isolate();
    let mut info = CompilationInfo::new_synthetic_with_policy(
        "leaky",
        &mut zone,
        JobKind::Stub,
        isolate.policy(),
    );
    info.attach_persistent_handles(PersistentHandlesScope::new(&isolate).detach())
        .expect("attach");

    let mut broker = HeapBroker::new(&isolate, false);
    broker
        .attach_persistent_handles(info.detach_persistent_handles().expect("detach"))
        .expect("broker attach");
    let mut local_heap = LocalHeap::new(&isolate);
    broker.attach_local_heap(&mut local_heap).expect("lend");

    drop(info);
    drop(local_heap);
}
