//! Output artifact of a compilation job

use crate::error::{JobError, Result};
use crate::handles::Handle;
use crate::heap::Code;

/// Compiled wasm function body, handed to the module once released
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WasmCompilationResult {
    /// Index of the function within its module
    pub func_index: u32,
    /// Machine code
    pub code: Vec<u8>,
    /// Stack slots used by the frame
    pub frame_slot_count: u32,
    /// Parameter slots holding tagged values
    pub tagged_parameter_slots: u32,
    /// Offsets of loads that may trap on out-of-bounds access
    pub protected_instructions: Vec<u32>,
    /// `(code offset, wasm byte offset)` pairs
    pub source_positions: Vec<(u32, u32)>,
}

/// What a job has produced so far.
///
/// At most one artifact ever exists: the code object for JS, stub and OSR
/// jobs, or the wasm result for wasm bodies.
#[derive(Debug, Default)]
pub enum CompilationOutput {
    /// Nothing produced yet
    #[default]
    Empty,
    /// Compiled code object
    Code(Handle<Code>),
    /// Wasm result waiting to be released
    Wasm(Box<WasmCompilationResult>),
    /// Wasm result already handed out
    WasmReleased,
}

impl CompilationOutput {
    /// Whether nothing has been produced
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Code object, if one was produced
    pub fn code(&self) -> Option<&Handle<Code>> {
        match self {
            Self::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Whether a wasm result is waiting to be released
    pub fn has_wasm_result(&self) -> bool {
        matches!(self, Self::Wasm(_))
    }

    pub(crate) fn set_code(&mut self, code: Handle<Code>) -> Result<()> {
        if !self.is_empty() {
            return Err(JobError::OutputAlreadySet);
        }
        *self = Self::Code(code);
        Ok(())
    }

    pub(crate) fn set_wasm_result(&mut self, result: Box<WasmCompilationResult>) -> Result<()> {
        if !self.is_empty() {
            return Err(JobError::OutputAlreadySet);
        }
        *self = Self::Wasm(result);
        Ok(())
    }

    pub(crate) fn release_wasm_result(&mut self) -> Option<Box<WasmCompilationResult>> {
        match std::mem::take(self) {
            Self::Wasm(result) => {
                *self = Self::WasmReleased;
                Some(result)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// Drop an unpublished artifact after a bailout. A released wasm result
    /// already belongs to someone else and stays accounted for.
    pub(crate) fn discard(&mut self) -> bool {
        match self {
            Self::Code(_) | Self::Wasm(_) => {
                *self = Self::Empty;
                true
            }
            Self::Empty | Self::WasmReleased => false,
        }
    }
}
