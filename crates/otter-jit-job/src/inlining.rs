//! Inlined function ledger
//!
//! Append-only: ids are assigned in insertion order starting at zero and are
//! referenced later by deopt data and source position tables. Each record
//! holds a handle to the callee's bytecode so the runtime cannot flush it
//! while the job is in flight.

use std::fmt;

use crate::handles::Handle;
use crate::heap::{BytecodeArray, SharedFunctionInfo};

/// Index of an inlined function within its job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InliningId(usize);

impl InliningId {
    /// Raw index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for InliningId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Script offset plus the inlining that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    script_offset: Option<u32>,
    inlining_id: Option<InliningId>,
}

impl SourcePosition {
    /// Position in the outermost function
    pub const fn new(script_offset: u32) -> Self {
        Self {
            script_offset: Some(script_offset),
            inlining_id: None,
        }
    }

    /// Position inside the function inlined as `inlining_id`
    pub const fn inlined(script_offset: u32, inlining_id: InliningId) -> Self {
        Self {
            script_offset: Some(script_offset),
            inlining_id: Some(inlining_id),
        }
    }

    /// No known position
    pub const fn unknown() -> Self {
        Self {
            script_offset: None,
            inlining_id: None,
        }
    }

    /// Whether a script offset is known
    pub fn is_known(&self) -> bool {
        self.script_offset.is_some()
    }

    /// Script offset
    pub fn script_offset(&self) -> Option<u32> {
        self.script_offset
    }

    /// Inlining the position belongs to, `None` for the outermost function
    pub fn inlining_id(&self) -> Option<InliningId> {
        self.inlining_id
    }
}

/// Call site of an inlined function and the id it was assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InliningPosition {
    /// Position of the call in the caller
    pub position: SourcePosition,
    /// Id assigned to the inlined function
    pub inlined_function_id: InliningId,
}

/// One entry of the ledger
#[derive(Debug)]
pub struct InlinedFunction {
    shared_info: Handle<SharedFunctionInfo>,
    bytecode_array: Handle<BytecodeArray>,
    position: InliningPosition,
}

impl InlinedFunction {
    /// Inlined function
    pub fn shared_info(&self) -> &Handle<SharedFunctionInfo> {
        &self.shared_info
    }

    /// Bytecode the inlined body was built from
    pub fn bytecode_array(&self) -> &Handle<BytecodeArray> {
        &self.bytecode_array
    }

    /// Call site and assigned id
    pub fn position(&self) -> InliningPosition {
        self.position
    }

    /// Assigned id
    pub fn id(&self) -> InliningId {
        self.position.inlined_function_id
    }
}

/// Append-only record of functions inlined into a job.
///
/// Owns its records so the job carrying it can move between threads.
#[derive(Default)]
pub struct InliningLedger {
    functions: Vec<InlinedFunction>,
    inlined_bytecode_size: usize,
}

impl InliningLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its id, which equals the number of
    /// records before the append.
    pub fn record(
        &mut self,
        shared_info: Handle<SharedFunctionInfo>,
        bytecode_array: Handle<BytecodeArray>,
        position: SourcePosition,
    ) -> InliningId {
        let id = InliningId(self.functions.len());
        self.inlined_bytecode_size += bytecode_array.length();
        self.functions.push(InlinedFunction {
            shared_info,
            bytecode_array,
            position: InliningPosition {
                position,
                inlined_function_id: id,
            },
        });
        id
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether nothing was inlined
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Record for `id`
    pub fn get(&self, id: InliningId) -> Option<&InlinedFunction> {
        self.functions.get(id.0)
    }

    /// Records in id order
    pub fn as_slice(&self) -> &[InlinedFunction] {
        &self.functions
    }

    /// Total bytecode length of everything inlined so far
    pub fn inlined_bytecode_size(&self) -> usize {
        self.inlined_bytecode_size
    }

    /// Override the inlined bytecode total
    pub fn set_inlined_bytecode_size(&mut self, size: usize) {
        self.inlined_bytecode_size = size;
    }
}

impl fmt::Debug for InliningLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InliningLedger")
            .field("functions", &self.functions.len())
            .field("inlined_bytecode_size", &self.inlined_bytecode_size)
            .finish()
    }
}
