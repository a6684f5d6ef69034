//! Managed objects a compilation job refers to
//!
//! These are the pieces of the heap the job reads; the collector itself
//! lives elsewhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::bailout::BailoutReason;
use crate::config::TraceFilter;
use crate::kind::JobKind;

/// Interpreter bytecode for one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArray {
    bytes: Vec<u8>,
}

impl BytecodeArray {
    /// Wrap raw bytecode
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Length in bytes
    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    /// Raw bytecode
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Per-function data shared by all closures of the same function
#[derive(Debug)]
pub struct SharedFunctionInfo {
    name: String,
    bytecode: Mutex<Option<Arc<BytecodeArray>>>,
    optimization_disabled: AtomicBool,
    disable_reason: Mutex<BailoutReason>,
}

impl SharedFunctionInfo {
    /// Function named `name` (empty for anonymous)
    pub fn new(name: impl Into<String>, bytecode: Option<Arc<BytecodeArray>>) -> Self {
        Self {
            name: name.into(),
            bytecode: Mutex::new(bytecode),
            optimization_disabled: AtomicBool::new(false),
            disable_reason: Mutex::new(BailoutReason::NoReason),
        }
    }

    /// Function name, empty for anonymous functions
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current bytecode, if not flushed
    pub fn bytecode_array(&self) -> Option<Arc<BytecodeArray>> {
        self.bytecode.lock().clone()
    }

    /// Whether bytecode is present
    pub fn has_bytecode_array(&self) -> bool {
        self.bytecode.lock().is_some()
    }

    /// Drop the function's own reference to its bytecode, as the runtime
    /// does for cold functions. Anyone still holding a handle keeps it alive.
    pub fn flush_bytecode(&self) -> Option<Arc<BytecodeArray>> {
        self.bytecode.lock().take()
    }

    /// Whether this function passes the trace filter
    pub fn passes_filter(&self, filter: &TraceFilter) -> bool {
        filter.passes(&self.name)
    }

    /// Permanently stop optimizing this function
    pub fn disable_optimization(&self, reason: BailoutReason) {
        *self.disable_reason.lock() = reason;
        self.optimization_disabled.store(true, Ordering::Release);
    }

    /// Whether optimization has been disabled
    pub fn is_optimization_disabled(&self) -> bool {
        self.optimization_disabled.load(Ordering::Acquire)
    }

    /// Reason passed to [`disable_optimization`](Self::disable_optimization)
    pub fn disable_optimization_reason(&self) -> BailoutReason {
        *self.disable_reason.lock()
    }
}

/// Global object of a native context
#[derive(Debug, Default)]
pub struct JsGlobalObject {
    /// Diagnostic label
    pub label: String,
}

/// Top-level context of a realm
#[derive(Debug)]
pub struct NativeContext {
    global_object: Arc<JsGlobalObject>,
}

impl NativeContext {
    /// Native context with the given global object
    pub fn new(global_object: Arc<JsGlobalObject>) -> Self {
        Self { global_object }
    }

    /// Global object
    pub fn global_object(&self) -> &Arc<JsGlobalObject> {
        &self.global_object
    }
}

/// Function context a closure was created in
#[derive(Debug)]
pub struct Context {
    native_context: Option<Arc<NativeContext>>,
}

impl Context {
    /// Context chained to `native_context`
    pub fn new(native_context: Option<Arc<NativeContext>>) -> Self {
        Self { native_context }
    }

    /// Native context at the root of the chain
    pub fn native_context(&self) -> Option<&Arc<NativeContext>> {
        self.native_context.as_ref()
    }
}

/// A JS closure
#[derive(Debug)]
pub struct JsFunction {
    shared: Arc<SharedFunctionInfo>,
    context: Option<Arc<Context>>,
}

impl JsFunction {
    /// Closure over `shared` created in `context`
    pub fn new(shared: Arc<SharedFunctionInfo>, context: Option<Arc<Context>>) -> Self {
        Self { shared, context }
    }

    /// Shared function info
    pub fn shared(&self) -> &Arc<SharedFunctionInfo> {
        &self.shared
    }

    /// Creation context
    pub fn context(&self) -> Option<&Arc<Context>> {
        self.context.as_ref()
    }
}

/// Generated machine code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    kind: JobKind,
    instructions: Vec<u8>,
    builtin_index: Option<i32>,
}

impl Code {
    /// Code object of `kind`
    pub fn new(kind: JobKind, instructions: Vec<u8>) -> Self {
        Self {
            kind,
            instructions,
            builtin_index: None,
        }
    }

    /// Tag the code with a builtin index
    pub fn with_builtin_index(mut self, index: i32) -> Self {
        self.builtin_index = Some(index);
        self
    }

    /// Kind of job that produced the code
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Instruction bytes
    pub fn instructions(&self) -> &[u8] {
        &self.instructions
    }

    /// Builtin index, if the code is a builtin
    pub fn builtin_index(&self) -> Option<i32> {
        self.builtin_index
    }
}
