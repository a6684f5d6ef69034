//! # Otter JIT Job
//!
//! Per-job state for the optimizing JIT pipeline.
//!
//! A [`CompilationInfo`] is created once per compilation attempt and passed
//! by reference through every pipeline stage. Stages may run on a background
//! worker, so the job is `Send` and moves there and back whole. It carries:
//!
//! - **Configuration**: the capability mask ([`CompilationFlags`]) and the
//!   poisoning mitigation level, derived from [`JitPolicy`]
//! - **Outcome**: bailout/retry status and the output artifact
//! - **Bookkeeping**: inlined functions, OSR entry, tick counter, profiler data
//! - **Handles**: the [`PersistentHandles`] token that lets GC-safe references
//!   travel to a background thread and back
//!
//! ## Handle ownership chain
//!
//! ```text
//! CompilationInfo ──detach──▶ HeapBroker ──attach_local_heap──▶ LocalHeap
//!                                  ▲                               │
//!                                  └──────detach_local_heap────────┘
//! ```
//!
//! Exactly one holder owns the token at any time. The token is not `Clone`
//! and can only be minted by [`PersistentHandlesScope::detach`].

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod bailout;
pub mod broker;
pub mod config;
pub mod error;
pub mod flags;
pub mod handles;
pub mod heap;
pub mod info;
pub mod inlining;
pub mod isolate;
pub mod kind;
pub mod osr;
pub mod output;
pub mod profiler;
pub mod tick_counter;

pub use bailout::{BailoutReason, CompilationStatus};
pub use broker::{HeapBroker, LocalHeap};
pub use config::{JitPolicy, TraceFilter, TracePolicy};
pub use error::{AttachError, JobError, Result};
pub use flags::{CompilationFlags, PoisoningMitigationLevel};
pub use handles::{
    Handle, HandleHolder, HandleLocation, HandleScope, PersistentHandles, PersistentHandlesScope,
};
pub use heap::{
    BytecodeArray, Code, Context, JsFunction, JsGlobalObject, NativeContext, SharedFunctionInfo,
};
pub use info::{CompilationInfo, NO_OPTIMIZATION_ID};
pub use inlining::{InlinedFunction, InliningId, InliningLedger, InliningPosition, SourcePosition};
pub use isolate::{Isolate, IsolateId};
pub use kind::{JobCategory, JobKind, StackFrameType};
pub use osr::{BytecodeOffset, OsrFrame};
pub use output::{CompilationOutput, WasmCompilationResult};
pub use profiler::BasicBlockProfilerData;
pub use tick_counter::{TickCounter, TickWatch};
