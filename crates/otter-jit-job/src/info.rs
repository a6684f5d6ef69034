//! The compilation job context
//!
//! One [`CompilationInfo`] exists per compilation attempt. It is created by
//! the pipeline driver, handed by `&mut` to each stage in turn, and dropped
//! with the pipeline. Working memory comes from the caller's zone, which
//! must outlive the job.
//!
//! The job is `Send`: the pipeline may move it to a background worker for
//! a phase such as concurrent inlining and move it back afterwards. It is
//! never shared between threads, so it needs no internal locking.

use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

use bumpalo::Bump;

use crate::bailout::{BailoutReason, CompilationStatus};
use crate::config::{JitPolicy, TracePolicy};
use crate::error::{AttachError, JobError, Result};
use crate::flags::{CompilationFlags, PoisoningMitigationLevel};
use crate::handles::{Handle, HandleHolder, HandleLease, HandleSlot, PersistentHandles};
use crate::heap::{
    BytecodeArray, Code, Context, JsFunction, JsGlobalObject, NativeContext, SharedFunctionInfo,
};
use crate::inlining::{InlinedFunction, InliningId, InliningLedger, SourcePosition};
use crate::isolate::Isolate;
use crate::kind::{JobKind, StackFrameType};
use crate::osr::{BytecodeOffset, OsrDescriptor, OsrFrame};
use crate::output::{CompilationOutput, WasmCompilationResult};
use crate::profiler::BasicBlockProfilerData;
use crate::tick_counter::TickCounter;

/// Optimization id carried by jobs that do not optimize a JS function
pub const NO_OPTIMIZATION_ID: i32 = -1;

/// Flags only the job itself writes: the tracing bits (by the tracing gate)
/// and the disable latch (by aborts).
const MANAGED_FLAGS: CompilationFlags =
    CompilationFlags::TRACING.union(CompilationFlags::DISABLE_FUTURE_OPTIMIZATION);

macro_rules! flag_getters {
    ($($getter:ident => $flag:ident),* $(,)?) => {
        $(
            #[doc = concat!("Whether [`CompilationFlags::", stringify!($flag), "`] is set")]
            pub fn $getter(&self) -> bool {
                self.flag(CompilationFlags::$flag)
            }
        )*
    };
}

macro_rules! flag_setters {
    ($($setter:ident => $flag:ident),* $(,)?) => {
        $(
            #[doc = concat!("Set [`CompilationFlags::", stringify!($flag), "`]")]
            pub fn $setter(&mut self) {
                self.set_flag(CompilationFlags::$flag)
            }
        )*
    };
}

/// Everything a pipeline stage needs to know about the job it works on.
pub struct CompilationInfo<'z> {
    zone: &'z mut Bump,
    kind: JobKind,
    flags: CompilationFlags,
    tracing_resolved: bool,
    poisoning_level: PoisoningMitigationLevel,
    status: CompilationStatus,
    optimization_id: i32,
    builtin_index: Option<i32>,
    debug_name: Box<str>,
    shared_info: Option<Handle<SharedFunctionInfo>>,
    bytecode_array: Option<Handle<BytecodeArray>>,
    closure: Option<Handle<JsFunction>>,
    osr: OsrDescriptor,
    inlining: InliningLedger,
    output: CompilationOutput,
    handles: HandleSlot,
    handle_lease: Option<Arc<HandleLease>>,
    trace_output_filename: Option<String>,
    tick_counter: TickCounter,
    profiler_data: Option<Arc<BasicBlockProfilerData>>,
}

impl<'z> CompilationInfo<'z> {
    fn blank(zone: &'z mut Bump, kind: JobKind, debug_name: Box<str>) -> Self {
        Self {
            zone,
            kind,
            flags: CompilationFlags::empty(),
            tracing_resolved: false,
            poisoning_level: PoisoningMitigationLevel::DontPoison,
            status: CompilationStatus::Active,
            optimization_id: NO_OPTIMIZATION_ID,
            builtin_index: None,
            debug_name,
            shared_info: None,
            bytecode_array: None,
            closure: None,
            osr: OsrDescriptor::default(),
            inlining: InliningLedger::new(),
            output: CompilationOutput::Empty,
            handles: HandleSlot::new(HandleHolder::CompilationInfo),
            handle_lease: None,
            trace_output_filename: None,
            tick_counter: TickCounter::new(),
            profiler_data: None,
        }
    }

    /// Job optimizing `closure`, whose shared function info is `shared`.
    ///
    /// Draws a fresh optimization id from `isolate` and derives the
    /// capability mask from the isolate's policy. With
    /// `native_context_independent` the generated code must not embed the
    /// native context.
    pub fn new_for_function(
        zone: &'z mut Bump,
        isolate: &Isolate,
        shared: Handle<SharedFunctionInfo>,
        closure: Handle<JsFunction>,
        native_context_independent: bool,
    ) -> Self {
        debug_assert!(
            Arc::ptr_eq(closure.shared(), shared.object()),
            "closure must belong to the shared function info"
        );
        let policy = isolate.policy();

        let mut info = Self::blank(zone, JobKind::OptimizedFunction, Box::default());
        info.bytecode_array = shared
            .bytecode_array()
            .map(|bytecode| Handle::with_location(bytecode, shared.location()));
        info.optimization_id = isolate.next_optimization_id();
        if native_context_independent {
            info.flags.insert(CompilationFlags::NATIVE_CONTEXT_INDEPENDENT);
        }
        info.configure_flags(policy);
        let passes_filter = shared.passes_filter(&policy.trace.filter);
        info.shared_info = Some(shared);
        info.closure = Some(closure);
        info.set_tracing_flags(&policy.trace, passes_filter);
        info.poisoning_level = policy.poisoning_level;

        tracing::debug!(
            target: "otter::jit",
            optimization_id = info.optimization_id,
            kind = %info.kind,
            name = %info.debug_name(),
            flags = ?info.flags,
            "compilation job created"
        );
        info
    }

    /// Stub, builtin, wasm or test job under the process-wide policy
    pub fn new_synthetic(debug_name: &str, zone: &'z mut Bump, kind: JobKind) -> Self {
        Self::new_synthetic_with_policy(debug_name, zone, kind, JitPolicy::global())
    }

    /// Stub, builtin, wasm or test job under an explicit policy
    pub fn new_synthetic_with_policy(
        debug_name: &str,
        zone: &'z mut Bump,
        kind: JobKind,
        policy: &JitPolicy,
    ) -> Self {
        debug_assert!(
            !kind.is_optimizing(),
            "optimized function jobs need a closure"
        );
        let mut info = Self::blank(zone, kind, debug_name.into());
        info.configure_flags(policy);
        let passes_filter = policy.trace.filter.passes(debug_name);
        info.set_tracing_flags(&policy.trace, passes_filter);
        info.poisoning_level = policy.poisoning_level;

        tracing::debug!(
            target: "otter::jit",
            kind = %info.kind,
            name = debug_name,
            flags = ?info.flags,
            "compilation job created"
        );
        info
    }

    /// Derive the initial mask from `policy`. Writes bits directly: the
    /// validity checks on [`set_flag`](Self::set_flag) guard later stages,
    /// not construction.
    fn configure_flags(&mut self, policy: &JitPolicy) {
        let mut flags = CompilationFlags::empty();
        flags.set(
            CompilationFlags::UNTRUSTED_CODE_MITIGATIONS,
            policy.untrusted_code_mitigations,
        );

        match self.kind {
            JobKind::OptimizedFunction => {
                flags.set(
                    CompilationFlags::FUNCTION_CONTEXT_SPECIALIZING,
                    policy.function_context_specialization
                        && !self
                            .flags
                            .contains(CompilationFlags::NATIVE_CONTEXT_INDEPENDENT),
                );
                flags.set(CompilationFlags::SPLITTING, policy.splitting);
                flags.set(CompilationFlags::INLINING, policy.inlining);
                flags.set(CompilationFlags::LOOP_PEELING, policy.loop_peeling);
                flags.set(
                    CompilationFlags::ALLOCATION_FOLDING,
                    policy.allocation_folding,
                );
                flags.set(
                    CompilationFlags::ANALYZE_ENVIRONMENT_LIVENESS,
                    policy.analyze_environment_liveness,
                );
                flags.set(
                    CompilationFlags::CONCURRENT_INLINING,
                    policy.concurrent_inlining,
                );
                flags.set(CompilationFlags::SOURCE_POSITIONS, policy.source_positions);
                flags.set(
                    CompilationFlags::BAILOUT_ON_UNINITIALIZED,
                    !policy.always_opt,
                );
                flags.insert(
                    CompilationFlags::CALLED_WITH_CODE_START_REGISTER
                        | CompilationFlags::SWITCH_JUMP_TABLE,
                );
                flags.set(
                    CompilationFlags::POISON_REGISTER_ARGUMENTS,
                    policy.untrusted_code_mitigations,
                );
            }
            JobKind::BytecodeHandler => {
                flags.insert(CompilationFlags::CALLED_WITH_CODE_START_REGISTER);
                flags.set(CompilationFlags::SPLITTING, policy.splitting);
            }
            JobKind::Builtin | JobKind::Stub => {
                flags.set(CompilationFlags::SPLITTING, policy.splitting);
            }
            JobKind::WasmFunction
            | JobKind::JsToWasmFunction
            | JobKind::WasmToJsFunction
            | JobKind::CWasmEntry => {
                flags.insert(CompilationFlags::SWITCH_JUMP_TABLE);
            }
            JobKind::ForTesting => {
                flags.set(CompilationFlags::SPLITTING, policy.splitting);
                flags.set(
                    CompilationFlags::ANALYZE_ENVIRONMENT_LIVENESS,
                    policy.analyze_environment_liveness,
                );
            }
        }

        if policy.control_flow_aware_allocation {
            flags.insert(CompilationFlags::CONTROL_FLOW_AWARE_ALLOCATION);
        } else {
            flags.insert(CompilationFlags::PREPROCESS_RANGES);
        }

        self.flags.insert(flags);
    }

    /// Resolve the tracing bits. Runs once, from the constructor.
    fn set_tracing_flags(&mut self, trace: &TracePolicy, passes_filter: bool) {
        debug_assert!(!self.tracing_resolved, "tracing gate already resolved");

        let mut enabled = CompilationFlags::empty();
        if passes_filter {
            enabled.set(CompilationFlags::TRACE_JSON, trace.json);
            enabled.set(CompilationFlags::TRACE_GRAPH, trace.graph);
            enabled.set(CompilationFlags::TRACE_SCHEDULED, trace.scheduled);
            enabled.set(CompilationFlags::TRACE_ALLOCATION, trace.allocation);
            enabled.set(CompilationFlags::TRACE_HEAP_BROKER, trace.heap_broker);
            enabled &= CompilationFlags::valid_for(self.kind.category());
        }
        self.flags.remove(CompilationFlags::TRACING);
        self.flags.insert(enabled);
        self.tracing_resolved = true;

        if trace.any() {
            tracing::debug!(
                target: "otter::jit",
                kind = %self.kind,
                passes_filter,
                enabled = ?enabled,
                "tracing gate resolved"
            );
        }
    }

    // ---------------------------------------------------------------------
    // Capability mask

    /// Whether `flag` may be read on this job.
    ///
    /// False for multi-bit masks, flags outside the kind's validity table,
    /// tracing flags before the tracing gate ran, and a set
    /// `POISON_REGISTER_ARGUMENTS` without both untrusted-code mitigations
    /// and the code start register.
    pub fn flag_get_is_valid(&self, flag: CompilationFlags) -> bool {
        if !flag.is_single() || !flag.is_valid_for(self.kind.category()) {
            return false;
        }
        if CompilationFlags::TRACING.contains(flag) && !self.tracing_resolved {
            return false;
        }
        if flag == CompilationFlags::POISON_REGISTER_ARGUMENTS && self.flags.contains(flag) {
            return self.flags.contains(
                CompilationFlags::UNTRUSTED_CODE_MITIGATIONS
                    | CompilationFlags::CALLED_WITH_CODE_START_REGISTER,
            );
        }
        true
    }

    /// Whether `flag` may be set on this job.
    ///
    /// False for multi-bit masks, flags outside the kind's validity table,
    /// the tracing bits and the disable latch (the job manages those
    /// itself), and any flag once the job has bailed out. Poisoning register
    /// arguments needs untrusted-code mitigations; function context
    /// specialization is incompatible with native-context-independent code.
    pub fn flag_set_is_valid(&self, flag: CompilationFlags) -> bool {
        if !flag.is_single() || !flag.is_valid_for(self.kind.category()) {
            return false;
        }
        if MANAGED_FLAGS.contains(flag) || self.status.is_terminal() {
            return false;
        }
        if flag == CompilationFlags::POISON_REGISTER_ARGUMENTS {
            return self
                .flags
                .contains(CompilationFlags::UNTRUSTED_CODE_MITIGATIONS);
        }
        if flag == CompilationFlags::FUNCTION_CONTEXT_SPECIALIZING {
            return !self
                .flags
                .contains(CompilationFlags::NATIVE_CONTEXT_INDEPENDENT);
        }
        true
    }

    /// Read one flag. Reading a flag not valid for this job is a contract
    /// violation caught by debug assertions.
    #[inline]
    pub fn flag(&self, flag: CompilationFlags) -> bool {
        debug_assert!(
            self.flag_get_is_valid(flag),
            "flag {flag:?} is not readable on a {} job",
            self.kind
        );
        self.flags.contains(flag)
    }

    /// Set one flag. Setting a flag not valid for this job is a contract
    /// violation caught by debug assertions; release builds still refuse
    /// to mutate a job that has bailed out.
    pub fn set_flag(&mut self, flag: CompilationFlags) {
        debug_assert!(
            self.flag_set_is_valid(flag),
            "flag {flag:?} is not writable on a {} job in state {:?}",
            self.kind,
            self.status
        );
        if self.status.is_terminal() {
            tracing::warn!(
                target: "otter::jit",
                flag = ?flag,
                reason = %self.status.reason(),
                "ignoring flag change after bailout"
            );
            return;
        }
        self.flags.insert(flag);
    }

    /// Raw mask, bypassing validity checks
    pub fn flags(&self) -> CompilationFlags {
        self.flags
    }

    /// Whether the tracing gate has run
    pub fn tracing_resolved(&self) -> bool {
        self.tracing_resolved
    }

    flag_getters! {
        is_function_context_specializing => FUNCTION_CONTEXT_SPECIALIZING,
        is_inlining_enabled => INLINING,
        is_splitting_enabled => SPLITTING,
        is_source_positions_enabled => SOURCE_POSITIONS,
        is_bailout_on_uninitialized => BAILOUT_ON_UNINITIALIZED,
        is_loop_peeling_enabled => LOOP_PEELING,
        has_untrusted_code_mitigations => UNTRUSTED_CODE_MITIGATIONS,
        is_switch_jump_table_enabled => SWITCH_JUMP_TABLE,
        called_with_code_start_register => CALLED_WITH_CODE_START_REGISTER,
        is_poison_register_arguments => POISON_REGISTER_ARGUMENTS,
        is_allocation_folding_enabled => ALLOCATION_FOLDING,
        is_analyze_environment_liveness => ANALYZE_ENVIRONMENT_LIVENESS,
        trace_json => TRACE_JSON,
        trace_graph => TRACE_GRAPH,
        trace_scheduled => TRACE_SCHEDULED,
        trace_allocation => TRACE_ALLOCATION,
        trace_heap_broker => TRACE_HEAP_BROKER,
        has_wasm_runtime_exception_support => WASM_RUNTIME_EXCEPTION_SUPPORT,
        is_control_flow_aware_allocation => CONTROL_FLOW_AWARE_ALLOCATION,
        is_preprocess_ranges => PREPROCESS_RANGES,
        is_concurrent_inlining => CONCURRENT_INLINING,
        is_native_context_independent => NATIVE_CONTEXT_INDEPENDENT,
    }

    flag_setters! {
        set_function_context_specializing => FUNCTION_CONTEXT_SPECIALIZING,
        set_inlining => INLINING,
        set_splitting => SPLITTING,
        set_source_positions => SOURCE_POSITIONS,
        set_bailout_on_uninitialized => BAILOUT_ON_UNINITIALIZED,
        set_loop_peeling => LOOP_PEELING,
        set_untrusted_code_mitigations => UNTRUSTED_CODE_MITIGATIONS,
        set_switch_jump_table => SWITCH_JUMP_TABLE,
        set_called_with_code_start_register => CALLED_WITH_CODE_START_REGISTER,
        set_poison_register_arguments => POISON_REGISTER_ARGUMENTS,
        set_allocation_folding => ALLOCATION_FOLDING,
        set_analyze_environment_liveness => ANALYZE_ENVIRONMENT_LIVENESS,
        set_wasm_runtime_exception_support => WASM_RUNTIME_EXCEPTION_SUPPORT,
        set_control_flow_aware_allocation => CONTROL_FLOW_AWARE_ALLOCATION,
        set_preprocess_ranges => PREPROCESS_RANGES,
        set_concurrent_inlining => CONCURRENT_INLINING,
        set_native_context_independent => NATIVE_CONTEXT_INDEPENDENT,
    }

    /// Speculative-execution countermeasure level
    pub fn poisoning_mitigation_level(&self) -> PoisoningMitigationLevel {
        self.poisoning_level
    }

    /// Override the countermeasure level. Like flag changes, rejected once
    /// the job has bailed out.
    pub fn set_poisoning_mitigation_level(&mut self, level: PoisoningMitigationLevel) {
        debug_assert!(
            !self.status.is_terminal(),
            "poisoning level is not writable on a {} job in state {:?}",
            self.kind,
            self.status
        );
        if self.status.is_terminal() {
            tracing::warn!(
                target: "otter::jit",
                level = %level,
                reason = %self.status.reason(),
                "ignoring poisoning level change after bailout"
            );
            return;
        }
        self.poisoning_level = level;
    }

    // ---------------------------------------------------------------------
    // Bailout

    /// Abandon the job and disable future optimization of the function.
    pub fn abort_optimization(&mut self, reason: BailoutReason) {
        if self.record_bailout(CompilationStatus::Aborted(reason)) {
            self.flags
                .insert(CompilationFlags::DISABLE_FUTURE_OPTIMIZATION);
        }
    }

    /// Abandon the job but allow the driver to try again later.
    pub fn retry_optimization(&mut self, reason: BailoutReason) {
        self.record_bailout(CompilationStatus::RetryRequested(reason));
    }

    /// Returns false, leaving the job untouched, for a bailout without a
    /// reason.
    fn record_bailout(&mut self, status: CompilationStatus) -> bool {
        debug_assert_ne!(
            status.reason(),
            BailoutReason::NoReason,
            "bailouts need a reason"
        );
        if status.reason() == BailoutReason::NoReason {
            tracing::warn!(
                target: "otter::jit",
                name = %self.debug_name(),
                "ignoring bailout without a reason"
            );
            return false;
        }
        if self.status.is_terminal() {
            tracing::warn!(
                target: "otter::jit",
                name = %self.debug_name(),
                previous = %self.status.reason(),
                reason = %status.reason(),
                "bailout overwrites an earlier bailout"
            );
        }
        self.status = status;

        if self.output.discard() {
            tracing::debug!(target: "otter::jit", "discarded unpublished output");
        }

        match status {
            CompilationStatus::Aborted(reason) => tracing::info!(
                target: "otter::jit",
                name = %self.debug_name(),
                reason = %reason,
                "optimization aborted"
            ),
            CompilationStatus::RetryRequested(reason) => tracing::debug!(
                target: "otter::jit",
                name = %self.debug_name(),
                reason = %reason,
                "optimization retry requested"
            ),
            CompilationStatus::Active => {}
        }
        true
    }

    /// Last recorded bailout reason, [`BailoutReason::NoReason`] if none
    pub fn bailout_reason(&self) -> BailoutReason {
        self.status.reason()
    }

    /// Position in the bailout protocol
    pub fn status(&self) -> CompilationStatus {
        self.status
    }

    /// Whether any bailout has been recorded
    pub fn has_bailed_out(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether an abort disabled future optimization. Never cleared.
    pub fn is_future_optimization_disabled(&self) -> bool {
        self.flags
            .contains(CompilationFlags::DISABLE_FUTURE_OPTIMIZATION)
    }

    // ---------------------------------------------------------------------
    // Identity

    /// Zone all working memory comes from
    pub fn zone(&self) -> &Bump {
        &*self.zone
    }

    /// Zone for stages that allocate while holding the job
    pub fn zone_mut(&mut self) -> &mut Bump {
        &mut *self.zone
    }

    /// Kind of job
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Whether this job optimizes a JS function
    pub fn is_optimizing(&self) -> bool {
        self.kind.is_optimizing()
    }

    /// Whether this job compiles a wasm function body
    pub fn is_wasm(&self) -> bool {
        self.kind.is_wasm()
    }

    /// Stubs, builtins, handlers, wrappers and tests
    pub fn is_not_optimized_function_or_wasm_function(&self) -> bool {
        !self.is_optimizing() && !self.is_wasm()
    }

    /// Id drawn when the job was created. Only optimizing jobs have one.
    pub fn optimization_id(&self) -> i32 {
        debug_assert!(self.is_optimizing(), "only optimizing jobs have an id");
        self.optimization_id
    }

    /// Builtin index for builtin jobs
    pub fn builtin_index(&self) -> Option<i32> {
        self.builtin_index
    }

    /// Record the builtin being compiled
    pub fn set_builtin_index(&mut self, index: i32) {
        self.builtin_index = Some(index);
    }

    /// Name for logs: the function's name for real functions, otherwise the
    /// name given at construction.
    pub fn debug_name(&self) -> String {
        match &self.shared_info {
            Some(shared) => shared.name().to_owned(),
            None => self.debug_name.to_string(),
        }
    }

    /// [`debug_name`](Self::debug_name) as a NUL-terminated string,
    /// truncated at the first interior NUL.
    pub fn debug_name_cstr(&self) -> CString {
        let name = self.debug_name();
        let end = name.find('\0').unwrap_or(name.len());
        CString::new(&name[..end]).unwrap_or_default()
    }

    /// File trace output goes to, if redirected
    pub fn trace_output_filename(&self) -> Option<&str> {
        self.trace_output_filename.as_deref()
    }

    /// Redirect trace output to `filename`
    pub fn set_trace_output_filename(&mut self, filename: impl Into<String>) {
        self.trace_output_filename = Some(filename.into());
    }

    // ---------------------------------------------------------------------
    // Source function

    /// Shared function info of the function being optimized
    pub fn shared_info(&self) -> Option<&Handle<SharedFunctionInfo>> {
        self.shared_info.as_ref()
    }

    /// Whether this job has a source function
    pub fn has_shared_info(&self) -> bool {
        self.shared_info.is_some()
    }

    /// Bytecode captured when the job was created
    pub fn bytecode_array(&self) -> Option<&Handle<BytecodeArray>> {
        self.bytecode_array.as_ref()
    }

    /// Whether bytecode was captured
    pub fn has_bytecode_array(&self) -> bool {
        self.bytecode_array.is_some()
    }

    /// Closure being optimized
    pub fn closure(&self) -> Option<&Handle<JsFunction>> {
        self.closure.as_ref()
    }

    /// Whether the closure has a creation context
    pub fn has_context(&self) -> bool {
        self.context().is_some()
    }

    /// Creation context of the closure
    pub fn context(&self) -> Option<&Arc<Context>> {
        self.closure.as_ref().and_then(|closure| closure.context())
    }

    /// Whether a native context is reachable
    pub fn has_native_context(&self) -> bool {
        self.native_context().is_some()
    }

    /// Native context of the closure's creation context
    pub fn native_context(&self) -> Option<&Arc<NativeContext>> {
        self.context().and_then(|context| context.native_context())
    }

    /// Whether a global object is reachable
    pub fn has_global_object(&self) -> bool {
        self.global_object().is_some()
    }

    /// Global object of the native context
    pub fn global_object(&self) -> Option<&Arc<JsGlobalObject>> {
        self.native_context().map(|native| native.global_object())
    }

    // ---------------------------------------------------------------------
    // Inlining

    /// Record a function inlined into this job and return its id
    pub fn record_inline(
        &mut self,
        shared_info: Handle<SharedFunctionInfo>,
        bytecode_array: Handle<BytecodeArray>,
        position: SourcePosition,
    ) -> InliningId {
        tracing::trace!(
            target: "otter::jit",
            callee = shared_info.name(),
            bytecode_length = bytecode_array.length(),
            id = self.inlining.len(),
            "recording inlined function"
        );
        self.inlining.record(shared_info, bytecode_array, position)
    }

    /// Inlined functions in id order
    pub fn inlined_functions(&self) -> &[InlinedFunction] {
        self.inlining.as_slice()
    }

    /// Inlining ledger
    pub fn inlining(&self) -> &InliningLedger {
        &self.inlining
    }

    /// Total bytecode size of inlined functions
    pub fn inlined_bytecode_size(&self) -> usize {
        self.inlining.inlined_bytecode_size()
    }

    /// Override the inlined bytecode total
    pub fn set_inlined_bytecode_size(&mut self, size: usize) {
        self.inlining.set_inlined_bytecode_size(size);
    }

    // ---------------------------------------------------------------------
    // OSR

    /// Compile for entry from the suspended `frame` at `offset`.
    ///
    /// Only optimizing jobs can be OSR jobs, and only once.
    pub fn configure_osr(&mut self, offset: BytecodeOffset, frame: OsrFrame) -> Result<()> {
        self.osr.configure(self.kind, offset, frame)?;
        tracing::debug!(
            target: "otter::jit",
            name = %self.debug_name(),
            offset = %offset,
            "configured for OSR"
        );
        Ok(())
    }

    /// Whether this job compiles an OSR entry
    pub fn is_osr(&self) -> bool {
        self.osr.is_osr()
    }

    /// OSR entry offset, [`BytecodeOffset::NONE`] for regular jobs
    pub fn osr_offset(&self) -> BytecodeOffset {
        self.osr.offset()
    }

    /// Suspended frame being replaced
    pub fn osr_frame(&self) -> Option<OsrFrame> {
        self.osr.frame()
    }

    /// Frame layout the generated code must use
    pub fn stack_frame_type(&self) -> StackFrameType {
        StackFrameType::for_job(self.kind, self.is_osr())
    }

    // ---------------------------------------------------------------------
    // Output

    /// Publish the compiled code object.
    pub fn set_code(&mut self, code: Handle<Code>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(JobError::OutputAfterBailout {
                reason: self.status.reason(),
            });
        }
        if !self.kind.produces_code() {
            return Err(JobError::CodeOutputOnWasmJob { kind: self.kind });
        }
        self.output.set_code(code)
    }

    /// Compiled code object, once published
    pub fn code(&self) -> Option<&Handle<Code>> {
        self.output.code()
    }

    /// Publish the wasm compilation result.
    pub fn set_wasm_result(&mut self, result: Box<WasmCompilationResult>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(JobError::OutputAfterBailout {
                reason: self.status.reason(),
            });
        }
        if !self.kind.produces_wasm_result() {
            return Err(JobError::WasmOutputOnNonWasmJob { kind: self.kind });
        }
        self.output.set_wasm_result(result)
    }

    /// Take the wasm result. Returns it once; later calls return `None`.
    pub fn release_wasm_result(&mut self) -> Option<Box<WasmCompilationResult>> {
        self.output.release_wasm_result()
    }

    /// Output slot
    pub fn output(&self) -> &CompilationOutput {
        &self.output
    }

    // ---------------------------------------------------------------------
    // Persistent handles

    /// Take ownership of the persistent handle token.
    ///
    /// Rejected if the job already holds one; the error hands the token
    /// back.
    pub fn attach_persistent_handles(
        &mut self,
        handles: PersistentHandles,
    ) -> std::result::Result<(), AttachError> {
        let lease = handles.lease();
        self.handles.attach(handles)?;
        self.handle_lease = Some(lease);
        Ok(())
    }

    /// Give up the token, typically to a [`HeapBroker`](crate::HeapBroker)
    pub fn detach_persistent_handles(&mut self) -> Result<PersistentHandles> {
        self.handles.detach()
    }

    /// Whether the job holds the token
    pub fn has_persistent_handles(&self) -> bool {
        self.handles.is_attached()
    }

    /// Token held by the job
    pub fn persistent_handles(&self) -> Option<&PersistentHandles> {
        self.handles.get()
    }

    /// Re-express the job's handles in `isolate`'s current scope so results
    /// from a background phase can be published on the main thread.
    pub fn reopen_handles_in_new_scope(&mut self, isolate: &Isolate) {
        if let Some(shared) = &mut self.shared_info {
            *shared = shared.reopen(isolate);
        }
        if let Some(bytecode) = &mut self.bytecode_array {
            *bytecode = bytecode.reopen(isolate);
        }
        if let Some(closure) = &mut self.closure {
            *closure = closure.reopen(isolate);
        }
        tracing::trace!(
            target: "otter::jit",
            scope = ?isolate.current_scope(),
            "job handles reopened"
        );
    }

    // ---------------------------------------------------------------------
    // Diagnostics

    /// Progress counter polled by watchdogs
    pub fn tick_counter(&self) -> &TickCounter {
        &self.tick_counter
    }

    /// Basic-block profiler record, if profiling
    pub fn profiler_data(&self) -> Option<&Arc<BasicBlockProfilerData>> {
        self.profiler_data.as_ref()
    }

    /// Attach or detach the profiler record
    pub fn set_profiler_data(&mut self, data: Option<Arc<BasicBlockProfilerData>>) {
        self.profiler_data = data;
    }
}

impl Drop for CompilationInfo<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            if let Some(lease) = &self.handle_lease {
                debug_assert_ne!(
                    lease.holder(),
                    Some(HandleHolder::LocalHeap),
                    "persistent handles still held by a background local heap"
                );
            }
        }

        if self.is_future_optimization_disabled() {
            if let Some(shared) = &self.shared_info {
                let reason = self.status.reason();
                shared.disable_optimization(reason);
                tracing::info!(
                    target: "otter::jit",
                    name = shared.name(),
                    reason = %reason,
                    "optimization disabled"
                );
            }
        }
    }
}

impl fmt::Debug for CompilationInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationInfo")
            .field("kind", &self.kind)
            .field("name", &self.debug_name())
            .field("optimization_id", &self.optimization_id)
            .field("flags", &self.flags)
            .field("status", &self.status)
            .field("osr_offset", &self.osr.offset())
            .field("inlined", &self.inlining.len())
            .field("output", &self.output)
            .field("has_persistent_handles", &self.has_persistent_handles())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceFilter;
    use crate::kind::JobCategory;

    fn stub<'z>(zone: &'z mut Bump, kind: JobKind, policy: &JitPolicy) -> CompilationInfo<'z> {
        CompilationInfo::new_synthetic_with_policy("stub", zone, kind, policy)
    }

    fn function_job<'z>(
        zone: &'z mut Bump,
        isolate: &Isolate,
        name: &str,
        nci: bool,
    ) -> CompilationInfo<'z> {
        let bytecode = Arc::new(BytecodeArray::new(vec![0; 16]));
        let shared = Arc::new(SharedFunctionInfo::new(name, Some(bytecode)));
        let closure = Arc::new(JsFunction::new(shared.clone(), None));
        CompilationInfo::new_for_function(
            zone,
            isolate,
            Handle::new(shared, isolate),
            Handle::new(closure, isolate),
            nci,
        )
    }

    #[test]
    fn optimizing_jobs_pick_up_policy() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy {
            function_context_specialization: true,
            source_positions: true,
            ..JitPolicy::default()
        });
        let info = function_job(&mut zone, &isolate, "hot", false);

        assert!(info.is_function_context_specializing());
        assert!(info.is_inlining_enabled());
        assert!(info.is_loop_peeling_enabled());
        assert!(info.is_source_positions_enabled());
        assert!(info.is_bailout_on_uninitialized());
        assert!(info.called_with_code_start_register());
        assert!(info.is_switch_jump_table_enabled());
        assert!(info.is_control_flow_aware_allocation());
        assert!(!info.is_preprocess_ranges());
        assert!(!info.is_poison_register_arguments());
        assert!(info.has_bytecode_array());
        assert_eq!(info.optimization_id(), 0);
    }

    #[test]
    fn always_opt_skips_bailout_on_uninitialized() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy {
            always_opt: true,
            control_flow_aware_allocation: false,
            ..JitPolicy::default()
        });
        let info = function_job(&mut zone, &isolate, "f", false);
        assert!(!info.is_bailout_on_uninitialized());
        assert!(info.is_preprocess_ranges());
    }

    #[test]
    fn native_context_independent_blocks_specialization() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy {
            function_context_specialization: true,
            ..JitPolicy::default()
        });
        let info = function_job(&mut zone, &isolate, "nci", true);
        assert!(info.is_native_context_independent());
        assert!(!info.is_function_context_specializing());
        assert!(!info.flag_set_is_valid(CompilationFlags::FUNCTION_CONTEXT_SPECIALIZING));
    }

    #[test]
    fn mitigations_poison_optimized_register_arguments() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy {
            untrusted_code_mitigations: true,
            ..JitPolicy::default()
        });
        let info = function_job(&mut zone, &isolate, "f", false);
        assert!(info.has_untrusted_code_mitigations());
        assert!(info.is_poison_register_arguments());

        let mut stub_zone = Bump::new();
        let stub = stub(&mut stub_zone, JobKind::Stub, isolate.policy());
        assert!(stub.has_untrusted_code_mitigations());
        assert!(!stub.is_poison_register_arguments());
    }

    #[test]
    fn per_kind_configuration() {
        let mut zone = Bump::new();
        let policy = JitPolicy::default();

        let handler = stub(&mut zone, JobKind::BytecodeHandler, &policy);
        assert!(handler.called_with_code_start_register());
        assert!(handler.is_splitting_enabled());
        drop(handler);

        let builtin = stub(&mut zone, JobKind::Builtin, &policy);
        assert!(builtin.is_splitting_enabled());
        assert!(!builtin.called_with_code_start_register());
        drop(builtin);

        let wasm = stub(&mut zone, JobKind::WasmFunction, &policy);
        assert!(wasm.is_switch_jump_table_enabled());
        assert!(!wasm.is_splitting_enabled());
        drop(wasm);

        let wrapper = stub(&mut zone, JobKind::JsToWasmFunction, &policy);
        assert!(wrapper.is_switch_jump_table_enabled());
    }

    #[test]
    fn validity_follows_category_table() {
        let mut zone = Bump::new();
        let policy = JitPolicy::default();
        for kind in [
            JobKind::Stub,
            JobKind::WasmFunction,
            JobKind::ForTesting,
            JobKind::CWasmEntry,
        ] {
            let info = stub(&mut zone, kind, &policy);
            for flag in CompilationFlags::all().iter() {
                let in_table = flag.is_valid_for(kind.category());
                if !in_table {
                    assert!(!info.flag_get_is_valid(flag), "{kind}: {flag:?}");
                    assert!(!info.flag_set_is_valid(flag), "{kind}: {flag:?}");
                }
            }
        }
        assert_eq!(JobKind::CWasmEntry.category(), JobCategory::Stub);
    }

    #[test]
    fn multi_bit_masks_are_never_valid() {
        let mut zone = Bump::new();
        let info = stub(&mut zone, JobKind::ForTesting, &JitPolicy::default());
        let both = CompilationFlags::INLINING | CompilationFlags::SPLITTING;
        assert!(!info.flag_get_is_valid(both));
        assert!(!info.flag_set_is_valid(both));
    }

    #[test]
    fn managed_flags_cannot_be_set_directly() {
        let mut zone = Bump::new();
        let info = stub(&mut zone, JobKind::ForTesting, &JitPolicy::default());
        assert!(!info.flag_set_is_valid(CompilationFlags::DISABLE_FUTURE_OPTIMIZATION));
        for flag in CompilationFlags::TRACING.iter() {
            assert!(!info.flag_set_is_valid(flag));
            assert!(info.flag_get_is_valid(flag));
        }
    }

    #[test]
    fn tracing_gate_applies_filter() {
        let mut zone = Bump::new();
        let mut policy = JitPolicy::default();
        policy.trace.graph = true;
        policy.trace.heap_broker = true;
        policy.trace.filter = TraceFilter::new("hot*");

        let traced = stub(&mut zone, JobKind::ForTesting, &policy);
        assert!(traced.tracing_resolved());
        assert!(!traced.trace_graph(), "\"stub\" does not match hot*");
        drop(traced);

        let isolate = Isolate::with_policy(policy);
        let hot = function_job(&mut zone, &isolate, "hot_loop", false);
        assert!(hot.trace_graph());
        assert!(hot.trace_heap_broker());
        assert!(!hot.trace_json());
        drop(hot);

        let cold = function_job(&mut zone, &isolate, "cold", false);
        assert!(!cold.trace_graph());
        assert!(!cold.trace_heap_broker());
    }

    #[test]
    fn tracing_gate_masks_bits_invalid_for_kind() {
        let mut zone = Bump::new();
        let mut policy = JitPolicy::default();
        policy.trace.heap_broker = true;
        policy.trace.json = true;

        let info = stub(&mut zone, JobKind::Builtin, &policy);
        assert!(info.trace_json());
        assert!(!info.flags().contains(CompilationFlags::TRACE_HEAP_BROKER));
    }

    #[test]
    fn debug_name_prefers_function_name() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy::default());
        let info = function_job(&mut zone, &isolate, "fib", false);
        assert_eq!(info.debug_name(), "fib");
        drop(info);

        let synthetic = stub(&mut zone, JobKind::Stub, &JitPolicy::default());
        assert_eq!(synthetic.debug_name(), "stub");
        assert_eq!(synthetic.debug_name_cstr().as_bytes(), b"stub");
    }

    #[test]
    fn debug_name_cstr_truncates_at_nul() {
        let mut zone = Bump::new();
        let info = CompilationInfo::new_synthetic_with_policy(
            "bad\0name",
            &mut zone,
            JobKind::Stub,
            &JitPolicy::default(),
        );
        assert_eq!(info.debug_name_cstr().as_bytes(), b"bad");
    }

    #[test]
    fn synthetic_jobs_have_no_source_function() {
        let mut zone = Bump::new();
        let info = stub(&mut zone, JobKind::Builtin, &JitPolicy::default());
        assert!(!info.has_shared_info());
        assert!(!info.has_bytecode_array());
        assert!(info.closure().is_none());
        assert!(!info.has_context());
        assert!(!info.has_native_context());
        assert!(!info.has_global_object());
        assert!(info.is_not_optimized_function_or_wasm_function());
    }

    #[test]
    fn global_object_reached_through_closure() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy::default());
        let global = Arc::new(JsGlobalObject {
            label: "realm".into(),
        });
        let native = Arc::new(NativeContext::new(global.clone()));
        let context = Arc::new(Context::new(Some(native)));
        let shared = Arc::new(SharedFunctionInfo::new("g", None));
        let closure = Arc::new(JsFunction::new(shared.clone(), Some(context)));

        let info = CompilationInfo::new_for_function(
            &mut zone,
            &isolate,
            Handle::new(shared, &isolate),
            Handle::new(closure, &isolate),
            false,
        );
        assert!(info.has_context());
        assert!(info.has_native_context());
        let reached = info.global_object().expect("global reachable");
        assert!(Arc::ptr_eq(reached, &global));
        assert!(!info.has_bytecode_array());
    }

    #[test]
    fn builtin_index_and_trace_file() {
        let mut zone = Bump::new();
        let mut info = stub(&mut zone, JobKind::Builtin, &JitPolicy::default());
        assert_eq!(info.builtin_index(), None);
        info.set_builtin_index(42);
        assert_eq!(info.builtin_index(), Some(42));

        assert_eq!(info.trace_output_filename(), None);
        info.set_trace_output_filename("turbo-builtin.json");
        assert_eq!(info.trace_output_filename(), Some("turbo-builtin.json"));
    }

    #[test]
    fn bailout_discards_staged_code() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy::default());
        let mut info = stub(&mut zone, JobKind::Stub, isolate.policy());
        let code = Handle::new(Arc::new(Code::new(JobKind::Stub, vec![0xc3])), &isolate);
        info.set_code(code).expect("active job");

        info.retry_optimization(BailoutReason::ResourceBudgetExceeded);
        assert!(info.code().is_none());
        assert!(info.output().is_empty());
    }

    #[test]
    fn output_kind_must_match_job() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy::default());
        let mut wasm = stub(&mut zone, JobKind::WasmFunction, isolate.policy());
        let code = Handle::new(Arc::new(Code::new(JobKind::Stub, vec![])), &isolate);
        assert!(matches!(
            wasm.set_code(code),
            Err(JobError::CodeOutputOnWasmJob {
                kind: JobKind::WasmFunction
            })
        ));
        drop(wasm);

        let mut builtin = stub(&mut zone, JobKind::Builtin, isolate.policy());
        assert!(matches!(
            builtin.set_wasm_result(Box::default()),
            Err(JobError::WasmOutputOnNonWasmJob {
                kind: JobKind::Builtin
            })
        ));
    }

    #[test]
    fn profiler_data_is_borrowed_not_owned() {
        let mut zone = Bump::new();
        let mut info = stub(&mut zone, JobKind::Builtin, &JitPolicy::default());
        let data = Arc::new(BasicBlockProfilerData::new("stub", vec![0, 1]));
        info.set_profiler_data(Some(data.clone()));
        info.profiler_data().expect("attached").record(1);
        drop(info);
        assert_eq!(data.snapshot(), vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn tick_counter_is_watchable() {
        let mut zone = Bump::new();
        let info = stub(&mut zone, JobKind::Stub, &JitPolicy::default());
        let mut watch = info.tick_counter().watch();
        info.tick_counter().tick();
        assert!(watch.has_progressed());
    }

    #[test]
    fn job_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CompilationInfo<'static>>();
        assert_send::<InliningLedger>();
    }

    #[test]
    fn stages_allocate_from_the_zone() {
        let mut zone = Bump::new();
        let mut info = stub(&mut zone, JobKind::Stub, &JitPolicy::default());
        let block_ids = info.zone_mut().alloc_slice_copy(&[1_u32, 2, 3]);
        assert_eq!(block_ids, [1, 2, 3]);
        assert!(info.zone().allocated_bytes() > 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "not writable")]
    fn setting_optimizing_only_flag_on_stub_panics() {
        let mut zone = Bump::new();
        let mut info = stub(&mut zone, JobKind::Stub, &JitPolicy::default());
        info.set_loop_peeling();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "not readable")]
    fn reading_wasm_only_flag_on_optimizing_job_panics() {
        let mut zone = Bump::new();
        let isolate = Isolate::with_policy(JitPolicy::default());
        let info = function_job(&mut zone, &isolate, "f", false);
        info.has_wasm_runtime_exception_support();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "not writable")]
    fn poisoning_without_mitigations_panics() {
        let mut zone = Bump::new();
        let mut info = stub(&mut zone, JobKind::ForTesting, &JitPolicy::default());
        info.set_poison_register_arguments();
    }
}
