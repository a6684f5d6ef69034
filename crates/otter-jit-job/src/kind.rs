//! Job kinds and output frame layouts

use std::fmt;

/// What a compilation job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Optimized code for a JS function
    OptimizedFunction,
    /// Interpreter bytecode handler
    BytecodeHandler,
    /// Runtime builtin
    Builtin,
    /// Code stub
    Stub,
    /// Wasm function body
    WasmFunction,
    /// JS-to-wasm call wrapper
    JsToWasmFunction,
    /// Wasm-to-JS call wrapper
    WasmToJsFunction,
    /// Entry from native code into wasm
    CWasmEntry,
    /// Test compilation
    ForTesting,
}

/// Coarse grouping of [`JobKind`] that decides which flags are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobCategory {
    /// Optimizing a JS function
    Optimizing,
    /// Stubs, builtins, handlers and wasm call wrappers
    Stub,
    /// Wasm function bodies
    Wasm,
    /// Tests
    Testing,
}

impl JobKind {
    /// Category this kind belongs to
    pub const fn category(self) -> JobCategory {
        match self {
            Self::OptimizedFunction => JobCategory::Optimizing,
            Self::BytecodeHandler
            | Self::Builtin
            | Self::Stub
            | Self::JsToWasmFunction
            | Self::WasmToJsFunction
            | Self::CWasmEntry => JobCategory::Stub,
            Self::WasmFunction => JobCategory::Wasm,
            Self::ForTesting => JobCategory::Testing,
        }
    }

    /// Whether this job optimizes a JS function
    pub const fn is_optimizing(self) -> bool {
        matches!(self, Self::OptimizedFunction)
    }

    /// Whether this job compiles a wasm function body
    pub const fn is_wasm(self) -> bool {
        matches!(self, Self::WasmFunction)
    }

    /// Whether the result is published as a wasm compilation result
    /// rather than a code object
    pub const fn produces_wasm_result(self) -> bool {
        matches!(self, Self::WasmFunction | Self::ForTesting)
    }

    /// Whether the result is published as a code object
    pub const fn produces_code(self) -> bool {
        !matches!(self, Self::WasmFunction)
    }

    /// Short lowercase name used in logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::OptimizedFunction => "optimized-function",
            Self::BytecodeHandler => "bytecode-handler",
            Self::Builtin => "builtin",
            Self::Stub => "stub",
            Self::WasmFunction => "wasm-function",
            Self::JsToWasmFunction => "js-to-wasm",
            Self::WasmToJsFunction => "wasm-to-js",
            Self::CWasmEntry => "c-wasm-entry",
            Self::ForTesting => "for-testing",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frame layout the code generator must emit for the job's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackFrameType {
    /// Regular optimized JS frame entered at the function start
    Optimized,
    /// Optimized JS frame entered from a suspended interpreter frame
    OptimizedOsr,
    /// Stub frame (builtins, handlers, tests)
    Stub,
    /// Wasm frame
    Wasm,
    /// JS-to-wasm wrapper frame
    JsToWasm,
    /// Wasm-to-JS wrapper frame
    WasmToJs,
    /// Native-to-wasm entry frame
    CWasmEntry,
}

impl StackFrameType {
    /// Frame type for a job of `kind`, entered through OSR when `is_osr`.
    ///
    /// `is_osr` only matters for optimized functions.
    pub const fn for_job(kind: JobKind, is_osr: bool) -> Self {
        match kind {
            JobKind::OptimizedFunction if is_osr => Self::OptimizedOsr,
            JobKind::OptimizedFunction => Self::Optimized,
            JobKind::BytecodeHandler | JobKind::Builtin | JobKind::Stub | JobKind::ForTesting => {
                Self::Stub
            }
            JobKind::WasmFunction => Self::Wasm,
            JobKind::JsToWasmFunction => Self::JsToWasm,
            JobKind::WasmToJsFunction => Self::WasmToJs,
            JobKind::CWasmEntry => Self::CWasmEntry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_onto_categories() {
        assert_eq!(JobKind::OptimizedFunction.category(), JobCategory::Optimizing);
        assert_eq!(JobKind::Builtin.category(), JobCategory::Stub);
        assert_eq!(JobKind::JsToWasmFunction.category(), JobCategory::Stub);
        assert_eq!(JobKind::WasmFunction.category(), JobCategory::Wasm);
        assert_eq!(JobKind::ForTesting.category(), JobCategory::Testing);
    }

    #[test]
    fn frame_type_tracks_osr_only_for_optimized_functions() {
        assert_eq!(
            StackFrameType::for_job(JobKind::OptimizedFunction, false),
            StackFrameType::Optimized
        );
        assert_eq!(
            StackFrameType::for_job(JobKind::OptimizedFunction, true),
            StackFrameType::OptimizedOsr
        );
        assert_eq!(StackFrameType::for_job(JobKind::Stub, true), StackFrameType::Stub);
        assert_eq!(
            StackFrameType::for_job(JobKind::WasmToJsFunction, false),
            StackFrameType::WasmToJs
        );
    }

    #[test]
    fn output_slots_by_kind() {
        assert!(JobKind::WasmFunction.produces_wasm_result());
        assert!(!JobKind::WasmFunction.produces_code());
        assert!(JobKind::ForTesting.produces_wasm_result());
        assert!(JobKind::ForTesting.produces_code());
        assert!(!JobKind::Builtin.produces_wasm_result());
    }
}
