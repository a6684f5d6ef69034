//! Runtime-wide JIT policy
//!
//! Compilation jobs derive their capability mask from a [`JitPolicy`]. The
//! process-wide policy is read once from `OTTER_JIT_*` environment variables;
//! tests and embedders build policies explicitly.

use std::sync::OnceLock;

use crate::flags::PoisoningMitigationLevel;

static GLOBAL_POLICY: OnceLock<JitPolicy> = OnceLock::new();

fn parse_env_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0")
        && !value.trim().eq_ignore_ascii_case("false")
        && !value.trim().eq_ignore_ascii_case("off")
        && !value.trim().eq_ignore_ascii_case("no")
}

/// Decides which functions the tracing flags apply to.
///
/// Pattern syntax:
/// - empty: matches only anonymous functions
/// - `*`: matches everything
/// - `~`: matches anonymous functions
/// - `name*`: prefix match
/// - `name`: exact match
/// - a leading `-` negates the pattern; `-` alone matches every named function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFilter {
    pattern: String,
}

impl TraceFilter {
    /// Filter from a pattern
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// Filter that matches every function
    pub fn all() -> Self {
        Self::new("*")
    }

    /// Raw pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether a function named `name` passes the filter
    pub fn passes(&self, name: &str) -> bool {
        if self.pattern.is_empty() {
            return name.is_empty();
        }

        let (positive, pattern) = match self.pattern.strip_prefix('-') {
            Some(rest) => (false, rest),
            None => (true, self.pattern.as_str()),
        };

        if pattern.is_empty() {
            return !name.is_empty();
        }
        if pattern.starts_with('*') {
            return positive;
        }
        if pattern.starts_with('~') {
            return name.is_empty() == positive;
        }

        let matched = match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == pattern,
        };
        matched == positive
    }
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Tracing toggles. Only applied to jobs that pass [`TracePolicy::filter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracePolicy {
    /// Dump pipeline JSON (`OTTER_JIT_TRACE`)
    pub json: bool,
    /// Dump graphs (`OTTER_JIT_TRACE_GRAPH`)
    pub graph: bool,
    /// Dump schedules (`OTTER_JIT_TRACE_SCHEDULED`)
    pub scheduled: bool,
    /// Trace register allocation (`OTTER_JIT_TRACE_ALLOC`)
    pub allocation: bool,
    /// Trace heap snapshot accesses (`OTTER_JIT_TRACE_BROKER`)
    pub heap_broker: bool,
    /// Which functions are traced (`OTTER_JIT_TRACE_FILTER`, default `*`)
    pub filter: TraceFilter,
}

impl TracePolicy {
    /// Whether any trace toggle is on
    pub fn any(&self) -> bool {
        self.json || self.graph || self.scheduled || self.allocation || self.heap_broker
    }
}

/// Feature toggles from which each job's capability mask is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitPolicy {
    /// `OTTER_JIT_FUNCTION_CONTEXT_SPECIALIZATION`, default off
    pub function_context_specialization: bool,
    /// `OTTER_JIT_SPLITTING`, default on
    pub splitting: bool,
    /// `OTTER_JIT_INLINING`, default on
    pub inlining: bool,
    /// `OTTER_JIT_LOOP_PEELING`, default on
    pub loop_peeling: bool,
    /// `OTTER_JIT_ALLOCATION_FOLDING`, default on
    pub allocation_folding: bool,
    /// `OTTER_JIT_ENV_LIVENESS`, default on
    pub analyze_environment_liveness: bool,
    /// `OTTER_JIT_CONCURRENT_INLINING`, default off
    pub concurrent_inlining: bool,
    /// `OTTER_JIT_SOURCE_POSITIONS`, default off
    pub source_positions: bool,
    /// `OTTER_JIT_UNTRUSTED_CODE_MITIGATIONS`, default off
    pub untrusted_code_mitigations: bool,
    /// `OTTER_JIT_ALWAYS_OPT`, default off
    pub always_opt: bool,
    /// `OTTER_JIT_CFA_ALLOCATION`, default on; off selects range preprocessing
    pub control_flow_aware_allocation: bool,
    /// `OTTER_JIT_POISONING` (`none`, `critical`, `all`), default `none`
    pub poisoning_level: PoisoningMitigationLevel,
    /// Tracing toggles
    pub trace: TracePolicy,
}

impl Default for JitPolicy {
    fn default() -> Self {
        Self {
            function_context_specialization: false,
            splitting: true,
            inlining: true,
            loop_peeling: true,
            allocation_folding: true,
            analyze_environment_liveness: true,
            concurrent_inlining: false,
            source_positions: false,
            untrusted_code_mitigations: false,
            always_opt: false,
            control_flow_aware_allocation: true,
            poisoning_level: PoisoningMitigationLevel::DontPoison,
            trace: TracePolicy::default(),
        }
    }
}

impl JitPolicy {
    /// Process-wide policy, read from the environment on first use.
    pub fn global() -> &'static JitPolicy {
        GLOBAL_POLICY.get_or_init(Self::from_env)
    }

    /// Policy from `OTTER_JIT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Policy from an arbitrary variable lookup. Unset variables keep
    /// their defaults; unparsable poisoning levels are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut policy = Self::default();
        let toggle = |name: &str, slot: &mut bool| {
            if let Some(value) = lookup(name) {
                *slot = parse_env_truthy(&value);
            }
        };

        toggle(
            "OTTER_JIT_FUNCTION_CONTEXT_SPECIALIZATION",
            &mut policy.function_context_specialization,
        );
        toggle("OTTER_JIT_SPLITTING", &mut policy.splitting);
        toggle("OTTER_JIT_INLINING", &mut policy.inlining);
        toggle("OTTER_JIT_LOOP_PEELING", &mut policy.loop_peeling);
        toggle("OTTER_JIT_ALLOCATION_FOLDING", &mut policy.allocation_folding);
        toggle(
            "OTTER_JIT_ENV_LIVENESS",
            &mut policy.analyze_environment_liveness,
        );
        toggle(
            "OTTER_JIT_CONCURRENT_INLINING",
            &mut policy.concurrent_inlining,
        );
        toggle("OTTER_JIT_SOURCE_POSITIONS", &mut policy.source_positions);
        toggle(
            "OTTER_JIT_UNTRUSTED_CODE_MITIGATIONS",
            &mut policy.untrusted_code_mitigations,
        );
        toggle("OTTER_JIT_ALWAYS_OPT", &mut policy.always_opt);
        toggle(
            "OTTER_JIT_CFA_ALLOCATION",
            &mut policy.control_flow_aware_allocation,
        );
        toggle("OTTER_JIT_TRACE", &mut policy.trace.json);
        toggle("OTTER_JIT_TRACE_GRAPH", &mut policy.trace.graph);
        toggle("OTTER_JIT_TRACE_SCHEDULED", &mut policy.trace.scheduled);
        toggle("OTTER_JIT_TRACE_ALLOC", &mut policy.trace.allocation);
        toggle("OTTER_JIT_TRACE_BROKER", &mut policy.trace.heap_broker);

        if let Some(level) = lookup("OTTER_JIT_POISONING").and_then(|v| v.parse().ok()) {
            policy.poisoning_level = level;
        }
        if let Some(filter) = lookup("OTTER_JIT_TRACE_FILTER") {
            policy.trace.filter = TraceFilter::new(filter);
        }

        policy
    }
}
