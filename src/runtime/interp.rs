//! Command interpreter.
//!
//! A `Session` executes structured commands against a bit buffer, resolving
//! parameters per step, recording every executed step, and reporting structured
//! outcomes instead of raising: every command returns success flag, the
//! resulting bits, a message or error, and the count of sub-operations that
//! actually executed, so a driving console can always render "3 of 5 steps
//! completed".

use std::collections::BTreeMap;
use std::time::Instant;

use crate::{
    Command, MetricRegistry, OpInvocation, OpRegistry, Params, TransformationStep, canonical_op_id,
    resolve,
};

/// Cost charged for an `EXEC` script evaluation.
const EXEC_COST: u64 = 1;

/// Macro storage, explicitly owned and injected rather than process-global.
/// Lifecycle is tied to whoever owns it (typically one session).
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: BTreeMap<String, Command>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any prior definition of the same name.
    pub fn define(&mut self, name: &str, body: Command) {
        self.macros.insert(name.to_ascii_lowercase(), body);
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.macros.get(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.macros.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.macros.clear();
    }
}

/// Tri-state command result. `success == false` still carries the bits
/// accumulated before the failing step (partial-failure semantics).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub success: bool,
    pub bits: String,
    pub message: Option<String>,
    pub error: Option<String>,
    pub operations_executed: u64,
    /// For conditionals: whether the condition held, even when the chosen
    /// body was empty.
    pub condition_met: Option<bool>,
}

impl CommandOutcome {
    fn ok(bits: String, executed: u64, message: Option<String>) -> Self {
        Self {
            success: true,
            bits,
            message,
            error: None,
            operations_executed: executed,
            condition_met: None,
        }
    }

    fn fail(bits: String, executed: u64, error: String) -> Self {
        Self {
            success: false,
            bits,
            message: None,
            error: Some(error),
            operations_executed: executed,
            condition_met: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Run-level default seed, preferred over content derivation when the
    /// caller supplied no per-operation seed.
    pub default_seed: Option<u64>,
    /// Advisory budget: once cumulative step cost exceeds it, the current
    /// command stops with a failed outcome. Operations are not preempted
    /// mid-flight.
    pub cost_ceiling: Option<u64>,
    /// Evaluation budget for `EXEC` scripts.
    pub script_step_budget: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_seed: None,
            cost_ceiling: None,
            script_step_budget: 4096,
        }
    }
}

/// Execution state for one logical console/run: registries, injected macro
/// storage, the recorded step log, and cumulative cost.
pub struct Session<'a> {
    ops: &'a OpRegistry,
    metrics: &'a MetricRegistry,
    macros: MacroRegistry,
    options: SessionOptions,
    steps: Vec<TransformationStep>,
    cost_spent: u64,
}

impl<'a> Session<'a> {
    pub fn new(ops: &'a OpRegistry, metrics: &'a MetricRegistry, options: SessionOptions) -> Self {
        Self::with_macros(ops, metrics, MacroRegistry::new(), options)
    }

    pub fn with_macros(
        ops: &'a OpRegistry,
        metrics: &'a MetricRegistry,
        macros: MacroRegistry,
        options: SessionOptions,
    ) -> Self {
        Self {
            ops,
            metrics,
            macros,
            options,
            steps: Vec::new(),
            cost_spent: 0,
        }
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    /// Recorded steps so far. Each entry was snapshotted right after its
    /// operation finished and is never mutated afterward.
    pub fn steps(&self) -> &[TransformationStep] {
        &self.steps
    }

    pub fn take_steps(&mut self) -> Vec<TransformationStep> {
        std::mem::take(&mut self.steps)
    }

    pub fn cost_spent(&self) -> u64 {
        self.cost_spent
    }

    /// True once the advisory cost ceiling has been reached; callers use
    /// this to distinguish a cancelled run from a failed one.
    pub fn cost_exhausted(&self) -> bool {
        self.options
            .cost_ceiling
            .is_some_and(|ceiling| self.cost_spent >= ceiling)
    }

    pub fn execute_line(&mut self, line: &str, bits: &str) -> CommandOutcome {
        let command = crate::parse(line);
        self.execute(&command, bits)
    }

    pub fn execute(&mut self, command: &Command, bits: &str) -> CommandOutcome {
        let mut stack = Vec::new();
        self.execute_inner(command, bits, &mut stack)
    }

    fn execute_inner(
        &mut self,
        command: &Command,
        bits: &str,
        macro_stack: &mut Vec<String>,
    ) -> CommandOutcome {
        match command {
            Command::Help => CommandOutcome::ok(
                bits.to_string(),
                0,
                Some(help_text(self.ops, self.metrics)),
            ),
            Command::Noop { raw } => CommandOutcome::ok(
                bits.to_string(),
                0,
                if raw.is_empty() || raw.starts_with('#') {
                    None
                } else {
                    Some(format!("ignored unrecognized input {raw:?}"))
                },
            ),
            Command::Op(op) => self.run_ops(std::slice::from_ref(op), bits),
            Command::Pipeline { ops } => self.run_ops(ops, bits),
            Command::Repeat { times, body } => {
                let mut current = bits.to_string();
                let mut executed = 0u64;
                for _ in 0..*times {
                    let outcome = self.run_ops(body, &current);
                    executed += outcome.operations_executed;
                    current = outcome.bits;
                    if !outcome.success {
                        return CommandOutcome::fail(
                            current,
                            executed,
                            outcome.error.unwrap_or_else(|| "loop body failed".to_string()),
                        );
                    }
                }
                CommandOutcome::ok(current, executed, None)
            }
            Command::If {
                condition,
                then_body,
                else_body,
            } => {
                let Some(value) = self.metrics.evaluate(&condition.metric, bits) else {
                    return CommandOutcome::fail(
                        bits.to_string(),
                        0,
                        format!("unknown metric {:?}", condition.metric),
                    );
                };
                let met = condition.comparator.holds(value, condition.threshold);
                let body = if met { then_body } else { else_body };
                let mut outcome = if body.is_empty() {
                    CommandOutcome::ok(bits.to_string(), 0, None)
                } else {
                    self.run_ops(body, bits)
                };
                outcome.condition_met = Some(met);
                if outcome.message.is_none() {
                    outcome.message = Some(format!(
                        "condition {} {} {} was {}",
                        condition.metric,
                        comparator_text(condition.comparator),
                        condition.threshold,
                        if met { "met" } else { "not met" }
                    ));
                }
                outcome
            }
            Command::Define { name, body } => {
                self.macros.define(name, (**body).clone());
                CommandOutcome::ok(bits.to_string(), 0, Some(format!("defined macro {name:?}")))
            }
            Command::Apply { name } => {
                let lowered = name.to_ascii_lowercase();
                if macro_stack.contains(&lowered) {
                    return CommandOutcome::fail(
                        bits.to_string(),
                        0,
                        format!(
                            "macro cycle detected: {} -> {lowered}",
                            macro_stack.join(" -> ")
                        ),
                    );
                }
                let Some(body) = self.macros.lookup(&lowered).cloned() else {
                    return CommandOutcome::fail(
                        bits.to_string(),
                        0,
                        format!("unknown macro {name:?}"),
                    );
                };
                macro_stack.push(lowered);
                let outcome = self.execute_inner(&body, bits, macro_stack);
                macro_stack.pop();
                outcome
            }
            Command::Exec { code } => {
                let started = Instant::now();
                match crate::script::evaluate(code, bits, self.options.script_step_budget) {
                    Ok(out) => {
                        // Recorded under the reserved `exec` step id so replay
                        // can re-evaluate the script: the code travels in
                        // `value`, the budget in `count`.
                        let duration_micros =
                            started.elapsed().as_micros().min(u128::from(u64::MAX)) as u64;
                        self.cost_spent += EXEC_COST;
                        self.steps.push(TransformationStep {
                            index: self.steps.len(),
                            operation: "exec".to_string(),
                            params: Params {
                                value: Some(code.clone()),
                                count: Some(self.options.script_step_budget),
                                ..Params::default()
                            },
                            bit_range: None,
                            full_before_bits: bits.to_string(),
                            full_after_bits: out.clone(),
                            metrics: self.metrics.evaluate_all(&out),
                            cost: EXEC_COST,
                            duration_micros,
                        });
                        CommandOutcome::ok(out, 1, None)
                    }
                    Err(err) => {
                        CommandOutcome::fail(bits.to_string(), 0, format!("exec failed: {err}"))
                    }
                }
            }
        }
    }

    /// Ordered execution with first-failure abort. Later operations observe
    /// earlier output; no reordering.
    fn run_ops(&mut self, ops: &[OpInvocation], bits: &str) -> CommandOutcome {
        let mut current = bits.to_string();
        let mut executed = 0u64;

        for op in ops {
            if let Some(ceiling) = self.options.cost_ceiling
                && self.cost_spent >= ceiling
            {
                return CommandOutcome::fail(
                    current,
                    executed,
                    format!("cost ceiling {ceiling} reached after {executed} operation(s)"),
                );
            }

            let canonical = canonical_op_id(&op.id, op.params.direction).to_string();
            let Some(def) = self.ops.lookup(&canonical) else {
                return CommandOutcome::fail(
                    current,
                    executed,
                    format!("unknown operation {:?}", op.id),
                );
            };
            let cost = def.cost;

            let params = resolve(
                self.ops,
                &canonical,
                &current,
                &op.params,
                self.options.default_seed,
            );

            let started = Instant::now();
            let result = self.ops.apply(&canonical, &current, &params);
            let duration_micros = started.elapsed().as_micros().min(u128::from(u64::MAX)) as u64;

            match result {
                Ok(next) => {
                    tracing::debug!(op = %canonical, len = next.len(), "applied operation");
                    self.cost_spent += cost;
                    self.steps.push(TransformationStep {
                        index: self.steps.len(),
                        operation: canonical,
                        params: params.clone(),
                        bit_range: params.range,
                        full_before_bits: current.clone(),
                        full_after_bits: next.clone(),
                        metrics: self.metrics.evaluate_all(&next),
                        cost,
                        duration_micros,
                    });
                    executed += 1;
                    current = next;
                }
                Err(err) => {
                    return CommandOutcome::fail(
                        current,
                        executed,
                        format!("operation {:?} failed: {err}", op.id),
                    );
                }
            }
        }

        CommandOutcome::ok(current, executed, None)
    }
}

fn comparator_text(c: crate::Comparator) -> &'static str {
    match c {
        crate::Comparator::Gt => ">",
        crate::Comparator::Lt => "<",
        crate::Comparator::Ge => ">=",
        crate::Comparator::Le => "<=",
        crate::Comparator::Eq => "==",
        crate::Comparator::Ne => "!=",
    }
}

fn help_text(ops: &OpRegistry, metrics: &MetricRegistry) -> String {
    let op_ids: Vec<&str> = ops.ids().collect();
    let metric_ids: Vec<&str> = metrics.ids().collect();
    format!(
        "commands:\n  \
         HELP\n  \
         DEFINE <name> = <body>\n  \
         APPLY <name>\n  \
         CUSTOM <op> {{ key: value, ... }}\n  \
         EXEC {{ <expr> }}\n  \
         REPEAT <n> {{ <op> [| <op> ...] }}\n  \
         IF <metric> (>|<|>=|<=|==|!=) <number> THEN <body> [ELSE <body>]\n  \
         <op> [mask] [count] [encode|decode] [[start:end]]\n  \
         <op> | <op> | ...\n\
         operations: {}\n\
         metrics: {}",
        op_ids.join(", "),
        metric_ids.join(", ")
    )
}
