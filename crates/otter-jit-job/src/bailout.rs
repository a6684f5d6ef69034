//! Bailout reasons and the job status machine.
//!
//! A job starts [`CompilationStatus::Active`]. Any pipeline stage may end it:
//!
//! ```text
//! Active ──abort(reason)──▶ Aborted(reason)          (disables future optimization)
//!   │
//!   └────retry(reason)──▶ RetryRequested(reason)    (driver may re-enqueue later)
//! ```
//!
//! Both terminal states accept further transitions and the last one wins,
//! so callers must stop driving the pipeline after the first. The
//! disable-future-optimization latch set by an abort is never cleared: a
//! retry recorded after an abort changes the reported reason but the
//! function stays disabled.

use std::fmt;

/// Why an optimization attempt was abandoned.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BailoutReason {
    /// No bailout recorded
    #[default]
    NoReason = 0,
    /// Source construct the optimizing tier does not support
    UnsupportedConstruct = 1,
    /// Speculation disagreed with observed feedback
    SpeculationMismatch = 2,
    /// A compile-time resource budget ran out
    ResourceBudgetExceeded = 3,
    /// Function is too large to optimize
    FunctionTooBig = 4,
    /// Graph construction failed
    GraphBuildingFailed = 5,
    /// Backend failed to emit code
    CodeGenerationFailed = 6,
    /// Register allocator ran out of virtual registers
    NotEnoughVirtualRegisters = 7,
    /// Escape analysis found a cyclic object state
    CyclicObjectStateInEscapeAnalysis = 8,
    /// A map was deprecated while compiling concurrently
    ConcurrentMapDeprecation = 9,
    /// Heap snapshot could not serve a consistent view
    HeapBrokerAborted = 10,
    /// Function is being debugged
    FunctionBeingDebugged = 11,
    /// Function is marked never-optimize
    NeverOptimize = 12,
    /// Optimization was disabled earlier
    OptimizationDisabled = 13,
    /// Optimization disabled by a test
    OptimizationDisabledForTest = 14,
    /// OSR entry could not be built
    OsrEntryFailed = 15,
    /// Wasm body failed validation or compilation
    WasmCompilationFailed = 16,
}

impl BailoutReason {
    /// Numeric code, stable across releases.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Reason for a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::NoReason,
            1 => Self::UnsupportedConstruct,
            2 => Self::SpeculationMismatch,
            3 => Self::ResourceBudgetExceeded,
            4 => Self::FunctionTooBig,
            5 => Self::GraphBuildingFailed,
            6 => Self::CodeGenerationFailed,
            7 => Self::NotEnoughVirtualRegisters,
            8 => Self::CyclicObjectStateInEscapeAnalysis,
            9 => Self::ConcurrentMapDeprecation,
            10 => Self::HeapBrokerAborted,
            11 => Self::FunctionBeingDebugged,
            12 => Self::NeverOptimize,
            13 => Self::OptimizationDisabled,
            14 => Self::OptimizationDisabledForTest,
            15 => Self::OsrEntryFailed,
            16 => Self::WasmCompilationFailed,
            _ => return None,
        })
    }

    /// Human readable message
    pub fn message(self) -> &'static str {
        match self {
            Self::NoReason => "no reason",
            Self::UnsupportedConstruct => "unsupported construct",
            Self::SpeculationMismatch => "speculation mismatch",
            Self::ResourceBudgetExceeded => "resource budget exceeded",
            Self::FunctionTooBig => "function is too big to be optimized",
            Self::GraphBuildingFailed => "optimized graph construction failed",
            Self::CodeGenerationFailed => "code generation failed",
            Self::NotEnoughVirtualRegisters => "not enough virtual registers (regalloc)",
            Self::CyclicObjectStateInEscapeAnalysis => {
                "cyclic object state detected by escape analysis"
            }
            Self::ConcurrentMapDeprecation => "map became deprecated during optimization",
            Self::HeapBrokerAborted => "heap snapshot aborted",
            Self::FunctionBeingDebugged => "function is being debugged",
            Self::NeverOptimize => "optimization is always disabled",
            Self::OptimizationDisabled => "optimization disabled",
            Self::OptimizationDisabledForTest => "optimization disabled for test",
            Self::OsrEntryFailed => "OSR entry could not be built",
            Self::WasmCompilationFailed => "wasm compilation failed",
        }
    }
}

impl fmt::Display for BailoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Where a job stands in the bailout protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompilationStatus {
    /// Still compiling
    #[default]
    Active,
    /// Abandoned; future optimization of the function is disabled
    Aborted(BailoutReason),
    /// Abandoned for now; the driver may try again later
    RetryRequested(BailoutReason),
}

impl CompilationStatus {
    /// Recorded reason, [`BailoutReason::NoReason`] while active
    pub fn reason(self) -> BailoutReason {
        match self {
            Self::Active => BailoutReason::NoReason,
            Self::Aborted(reason) | Self::RetryRequested(reason) => reason,
        }
    }

    /// Whether a bailout has been recorded
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}
