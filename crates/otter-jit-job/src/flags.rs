//! Capability mask for a compilation job
//!
//! Each flag is one bit. Which flags a job may touch depends on its
//! [`JobCategory`]; see [`CompilationFlags::valid_for`].

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::kind::JobCategory;

bitflags! {
    /// Compilation options and properties of the produced code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompilationFlags: u32 {
        /// Specialize to the closure's function context
        const FUNCTION_CONTEXT_SPECIALIZING = 1 << 0;
        /// Inline callees
        const INLINING = 1 << 1;
        /// Never optimize this function again (set by aborts)
        const DISABLE_FUTURE_OPTIMIZATION = 1 << 2;
        /// Split blocks for better scheduling
        const SPLITTING = 1 << 3;
        /// Track source positions
        const SOURCE_POSITIONS = 1 << 4;
        /// Bail out when feedback is uninitialized
        const BAILOUT_ON_UNINITIALIZED = 1 << 5;
        /// Peel the first loop iteration
        const LOOP_PEELING = 1 << 6;
        /// Emit speculative-execution mitigations for untrusted code
        const UNTRUSTED_CODE_MITIGATIONS = 1 << 7;
        /// Lower dense switches to jump tables
        const SWITCH_JUMP_TABLE = 1 << 8;
        /// Callers pass the code start address in a register
        const CALLED_WITH_CODE_START_REGISTER = 1 << 9;
        /// Poison register arguments on entry
        const POISON_REGISTER_ARGUMENTS = 1 << 10;
        /// Fold adjacent allocations
        const ALLOCATION_FOLDING = 1 << 11;
        /// Prune dead environment slots at deopt points
        const ANALYZE_ENVIRONMENT_LIVENESS = 1 << 12;
        /// Dump pipeline JSON
        const TRACE_JSON = 1 << 13;
        /// Dump the graph after each phase
        const TRACE_GRAPH = 1 << 14;
        /// Dump the schedule
        const TRACE_SCHEDULED = 1 << 15;
        /// Trace register allocation
        const TRACE_ALLOCATION = 1 << 16;
        /// Trace heap snapshot accesses
        const TRACE_HEAP_BROKER = 1 << 17;
        /// Wasm traps raise catchable runtime exceptions
        const WASM_RUNTIME_EXCEPTION_SUPPORT = 1 << 18;
        /// Control-flow-aware register allocation
        const CONTROL_FLOW_AWARE_ALLOCATION = 1 << 19;
        /// Preprocess live ranges before allocation
        const PREPROCESS_RANGES = 1 << 20;
        /// Run inlining against the heap snapshot on the background thread
        const CONCURRENT_INLINING = 1 << 21;
        /// Generate code that does not embed the native context
        const NATIVE_CONTEXT_INDEPENDENT = 1 << 22;
    }
}

impl CompilationFlags {
    /// Flags resolved by the tracing gate
    pub const TRACING: Self = Self::TRACE_JSON
        .union(Self::TRACE_GRAPH)
        .union(Self::TRACE_SCHEDULED)
        .union(Self::TRACE_ALLOCATION)
        .union(Self::TRACE_HEAP_BROKER);

    /// Flags meaningful only when optimizing a JS function
    pub const OPTIMIZING_ONLY: Self = Self::FUNCTION_CONTEXT_SPECIALIZING
        .union(Self::BAILOUT_ON_UNINITIALIZED)
        .union(Self::LOOP_PEELING)
        .union(Self::ANALYZE_ENVIRONMENT_LIVENESS)
        .union(Self::CONCURRENT_INLINING)
        .union(Self::NATIVE_CONTEXT_INDEPENDENT)
        .union(Self::TRACE_HEAP_BROKER);

    /// Flags meaningful only for wasm function bodies
    pub const WASM_ONLY: Self = Self::WASM_RUNTIME_EXCEPTION_SUPPORT;

    /// Flags meaningful for every job
    pub const COMMON: Self = Self::all()
        .difference(Self::OPTIMIZING_ONLY)
        .difference(Self::WASM_ONLY);

    /// Flags a job of `category` may read and write.
    pub const fn valid_for(category: JobCategory) -> Self {
        match category {
            JobCategory::Optimizing => Self::COMMON.union(Self::OPTIMIZING_ONLY),
            JobCategory::Stub => Self::COMMON,
            JobCategory::Wasm => Self::COMMON.union(Self::WASM_ONLY),
            JobCategory::Testing => Self::all(),
        }
    }

    /// Whether every bit of `self` is meaningful for `category`
    pub const fn is_valid_for(self, category: JobCategory) -> bool {
        Self::valid_for(category).contains(self)
    }

    /// Whether `self` names exactly one flag
    pub const fn is_single(self) -> bool {
        self.bits().is_power_of_two()
    }
}

/// How aggressively generated code defends against speculative execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum PoisoningMitigationLevel {
    /// No poisoning
    #[default]
    DontPoison,
    /// Poison only loads that feed security-critical checks
    PoisonCriticalOnly,
    /// Poison every load
    PoisonAll,
}

impl PoisoningMitigationLevel {
    /// Whether any countermeasure is emitted
    pub fn is_enabled(self) -> bool {
        self != Self::DontPoison
    }
}

impl fmt::Display for PoisoningMitigationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DontPoison => "none",
            Self::PoisonCriticalOnly => "critical",
            Self::PoisonAll => "all",
        })
    }
}

impl FromStr for PoisoningMitigationLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "none" | "off" => Ok(Self::DontPoison),
            "1" | "critical" => Ok(Self::PoisonCriticalOnly),
            "2" | "all" => Ok(Self::PoisonAll),
            other => Err(format!("unknown poisoning level: {other}")),
        }
    }
}
