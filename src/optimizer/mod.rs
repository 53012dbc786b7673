//! Fixed-point rewriting of generated IR into structured form.
//!
//! A [`Pipeline`] owns three ordered catalogs. Statement optimizers look at a
//! short window of statements starting at an anchor, expression optimizers
//! at one value, control-flow optimizers at goto/label shapes spanning whole
//! regions. Every optimizer either declines without touching the IR
//! (`Ok(false)`) or commits its whole rewrite (`Ok(true)`).

pub mod control_flow;
pub mod expression;
mod resolver;
pub mod statement;

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use crate::error::{invariant, DecompileError, Result};
use crate::ir::{
    check, BlockId, Ir, LabelId, Literal, Owner, SlotRole, StatementsMethod, StmtId, StmtKind, ValueId,
    ValueKind, VarId,
};
use crate::types::{JvmType, MethodHeader, StackCategory};

pub use resolver::{ConstantResolver, ResolvedField};

/// Options controlling which optimizer families run.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub statements: bool,
    pub expressions: bool,
    pub control_flow: bool,
    pub string_concat: bool,
    pub null_checks: bool,
    /// Replace literals by the constant fields they came from. Needs a
    /// [`ConstantResolver`].
    pub constant_fields: bool,
    /// Run the consistency checker after every single rewrite.
    pub validate_each_rewrite: bool,
    /// Abort with [`DecompileError::PassLimit`] after this many passes.
    pub max_passes: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            statements: true,
            expressions: true,
            control_flow: true,
            string_concat: true,
            null_checks: true,
            constant_fields: true,
            validate_each_rewrite: false,
            max_passes: None,
        }
    }
}

/// What one pipeline run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Passes that performed a rewrite.
    pub passes: usize,
    /// Rewrites per optimizer name.
    pub rewrites: BTreeMap<&'static str, usize>,
}

impl PipelineStats {
    pub fn total_rewrites(&self) -> usize {
        self.rewrites.values().sum()
    }

    pub fn count(&self, optimizer: &str) -> usize {
        self.rewrites.get(optimizer).copied().unwrap_or(0)
    }

    fn record(&mut self, optimizer: &'static str) {
        self.passes += 1;
        *self.rewrites.entry(optimizer).or_insert(0) += 1;
    }
}

/// Read-only facts about the method being optimized.
pub struct Context<'a> {
    pub header: &'a MethodHeader,
    pub this_var: Option<VarId>,
    pub resolver: Option<&'a dyn ConstantResolver>,
}

/// Rewrites a window of consecutive statements starting at an anchor.
pub trait StatementOptimizer {
    fn name(&self) -> &'static str;

    fn apply(&self, ir: &mut Ir, cx: &Context<'_>, stmt: StmtId) -> Result<bool>;
}

/// Rewrites one value in place.
pub trait ExpressionOptimizer {
    fn name(&self) -> &'static str;

    fn apply(&self, ir: &mut Ir, cx: &Context<'_>, value: ValueId) -> Result<bool>;
}

/// Turns a goto/label region anchored at a statement into a structured
/// statement.
pub trait ControlFlowOptimizer {
    fn name(&self) -> &'static str;

    fn apply(&self, ir: &mut Ir, cx: &Context<'_>, stmt: StmtId) -> Result<bool>;
}

/// The ordered optimizer catalogs and the fixed-point driver.
pub struct Pipeline<'r> {
    options: PipelineOptions,
    resolver: Option<&'r dyn ConstantResolver>,
    statements: Vec<Box<dyn StatementOptimizer>>,
    expressions: Vec<Box<dyn ExpressionOptimizer>>,
    control_flow: Vec<Box<dyn ControlFlowOptimizer>>,
}

impl Default for Pipeline<'_> {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

impl<'r> Pipeline<'r> {
    pub fn new(options: PipelineOptions) -> Self {
        let statements = if options.statements {
            statement::catalog(&options)
        } else {
            Vec::new()
        };
        let expressions = if options.expressions {
            expression::catalog(&options)
        } else {
            Vec::new()
        };
        let control_flow = if options.control_flow {
            control_flow::catalog(&options)
        } else {
            Vec::new()
        };
        Pipeline {
            options,
            resolver: None,
            statements,
            expressions,
            control_flow,
        }
    }

    /// Supplies the class metadata lookup used for constant fields.
    pub fn with_resolver(mut self, resolver: &'r dyn ConstantResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Rewrites `method` until no optimizer applies.
    pub fn run(&self, method: &mut StatementsMethod) -> Result<PipelineStats> {
        let this_var = method.this_var();
        let StatementsMethod { header, ir, body, .. } = method;
        let cx = Context {
            header: &*header,
            this_var,
            resolver: if self.options.constant_fields { self.resolver } else { None },
        };
        let body = *body;

        let mut stats = PipelineStats::default();
        loop {
            while self.local_pass(ir, &cx, body, &mut stats)? {}
            if !self.control_flow_pass(ir, &cx, body, &mut stats)? {
                break;
            }
        }
        debug!(
            "optimized {}.{}: {} passes, {} live statements",
            header.owner,
            header.name,
            stats.passes,
            ir.live_stmt_count()
        );
        Ok(stats)
    }

    /// One statement pass, or one expression pass when no statement
    /// optimizer applies. Returns whether a rewrite happened.
    fn local_pass(&self, ir: &mut Ir, cx: &Context<'_>, body: BlockId, stats: &mut PipelineStats) -> Result<bool> {
        for optimizer in &self.statements {
            for stmt in ir.walk(body) {
                if ir.stmt(stmt).is_alive() && optimizer.apply(ir, cx, stmt)? {
                    return self.committed(ir, body, optimizer.name(), stats).map(|_| true);
                }
            }
        }
        for optimizer in &self.expressions {
            for stmt in ir.walk(body) {
                for value in stmt_values(ir, stmt) {
                    if ir.value(value).is_alive() && ir.is_attached(value) && optimizer.apply(ir, cx, value)? {
                        return self.committed(ir, body, optimizer.name(), stats).map(|_| true);
                    }
                }
            }
        }
        Ok(false)
    }

    fn control_flow_pass(
        &self,
        ir: &mut Ir,
        cx: &Context<'_>,
        body: BlockId,
        stats: &mut PipelineStats,
    ) -> Result<bool> {
        for optimizer in &self.control_flow {
            for stmt in ir.walk(body) {
                if ir.stmt(stmt).is_alive() && optimizer.apply(ir, cx, stmt)? {
                    return self.committed(ir, body, optimizer.name(), stats).map(|_| true);
                }
            }
        }
        Ok(false)
    }

    fn committed(&self, ir: &Ir, body: BlockId, name: &'static str, stats: &mut PipelineStats) -> Result<()> {
        stats.record(name);
        trace!("pass {}: {}", stats.passes, name);
        if self.options.validate_each_rewrite {
            check(ir, body).map_err(|err| invariant!("after {}: {}", name, err))?;
        }
        match self.options.max_passes {
            Some(limit) if stats.passes > limit => Err(DecompileError::PassLimit(limit)),
            _ => Ok(()),
        }
    }
}

/// Every value reachable from a statement's slots, parents first.
fn stmt_values(ir: &Ir, stmt: StmtId) -> Vec<ValueId> {
    let mut out = Vec::new();
    let mut pending: Vec<ValueId> = ir.stmt_kind(stmt).operands();
    pending.reverse();
    while let Some(value) = pending.pop() {
        out.push(value);
        let mut operands = ir.value_kind(value).operands();
        operands.reverse();
        pending.extend(operands);
    }
    out
}

// ============================================================
// Shared rewrite helpers
// ============================================================

/// Detaches `old`, builds its replacement and puts the replacement in
/// `old`'s slot. Parts of `old` the builder did not reuse are discarded.
pub(crate) fn rebuild(
    ir: &mut Ir,
    old: ValueId,
    build: impl FnOnce(&mut Ir, ValueId) -> Result<ValueId>,
) -> Result<ValueId> {
    let slot = ir
        .parent(old)
        .ok_or_else(|| invariant!("{} has no slot to rebuild", old))?;
    ir.take(slot)?;
    let new = build(ir, old)?;
    let placeholder = ir.set_slot(slot, new)?;
    ir.discard(placeholder)?;
    if ir.value(old).is_alive() && ir.parent(old).is_none() {
        ir.discard(old)?;
    }
    Ok(new)
}

/// Takes every operand out of a detached value, in slot order.
pub(crate) fn take_operands(ir: &mut Ir, value: ValueId) -> Result<Vec<ValueId>> {
    let count = ir.value_kind(value).operands().len();
    (0..count).map(|index| ir.take_operand(value, index)).collect()
}

pub(crate) fn is_floating(ir: &Ir, value: ValueId) -> bool {
    matches!(
        ir.category(value),
        Some(StackCategory::Float) | Some(StackCategory::Double)
    )
}

/// The logical negation of a detached condition, consuming it.
///
/// Comparisons flip their operator unless they compare floating-point
/// values, where NaN makes the flipped form differ. `&&` and `||` are
/// pushed through by De Morgan.
pub(crate) fn negate(ir: &mut Ir, value: ValueId) -> Result<ValueId> {
    let int = Some(StackCategory::Int);
    match ir.value_kind(value) {
        ValueKind::Not { .. } => {
            let operand = ir.take_operand(value, 0)?;
            ir.discard(value)?;
            Ok(operand)
        }
        ValueKind::Condition { op, lhs, .. } if !is_floating(ir, *lhs) => {
            let op = op.negate();
            let operands = take_operands(ir, value)?;
            ir.discard(value)?;
            ir.new_value(
                ValueKind::Condition {
                    op,
                    lhs: operands[0],
                    rhs: operands[1],
                },
                int,
            )
        }
        ValueKind::LogicalAnd { .. } | ValueKind::LogicalOr { .. } => {
            let and = matches!(ir.value_kind(value), ValueKind::LogicalAnd { .. });
            let operands = take_operands(ir, value)?;
            ir.discard(value)?;
            let lhs = negate(ir, operands[0])?;
            let rhs = negate(ir, operands[1])?;
            let kind = if and {
                ValueKind::LogicalOr { lhs, rhs }
            } else {
                ValueKind::LogicalAnd { lhs, rhs }
            };
            ir.new_value(kind, int)
        }
        ValueKind::Constant(Literal::Boolean(flag)) => {
            let flag = !*flag;
            ir.discard(value)?;
            Ok(ir.constant(Literal::Boolean(flag)))
        }
        _ => ir.new_value(ValueKind::Not { operand: value }, int),
    }
}

/// True when control falling off the end of `stmt` arrives at `label`.
pub(crate) fn continues_to(ir: &Ir, stmt: StmtId, label: LabelId) -> bool {
    let Some(next) = ir.next(stmt) else {
        return false;
    };
    if !matches!(ir.stmt_kind(next), StmtKind::BlockEnd) {
        return ir.label_target(label) == Some(next);
    }
    let Some(owner) = ir.owner_of(ir.stmt(next).block()) else {
        return false;
    };
    match ir.stmt_kind(owner) {
        StmtKind::If { .. } | StmtKind::Synchronized { .. } => continues_to(ir, owner, label),
        StmtKind::While { .. } => ir.label_target(label) == Some(owner),
        _ => false,
    }
}

/// The assigned stack identifier and value of an `s = e;` statement.
pub(crate) fn stack_assign(ir: &Ir, stmt: StmtId) -> Option<(VarId, ValueId, ValueId)> {
    let StmtKind::Expression { value } = ir.stmt_kind(stmt) else {
        return None;
    };
    let ValueKind::Assign { target, value: rhs } = ir.value_kind(*value) else {
        return None;
    };
    match ir.value_kind(*target) {
        ValueKind::Stack(_) => Some((ir.ref_var(*target)?, *value, *rhs)),
        _ => None,
    }
}

/// The assignment held by an expression statement, as `(assign, target, value)`.
pub(crate) fn assign_stmt(ir: &Ir, stmt: StmtId) -> Option<(ValueId, ValueId, ValueId)> {
    let StmtKind::Expression { value } = ir.stmt_kind(stmt) else {
        return None;
    };
    match ir.value_kind(*value) {
        ValueKind::Assign { target, value: rhs } => Some((*value, *target, *rhs)),
        _ => None,
    }
}

/// The statement after `stmt` in its block, sentinels excluded.
pub(crate) fn next_stmt(ir: &Ir, stmt: StmtId) -> Option<StmtId> {
    ir.next(stmt)
        .filter(|next| !ir.stmt_kind(*next).is_sentinel())
}

/// Values evaluated completely before `target` when `stmt` runs, with the
/// role of the slot each sits in. `None` when `target` is not in `stmt`.
pub(crate) fn evaluated_before(ir: &Ir, stmt: StmtId, target: ValueId) -> Option<Vec<(ValueId, SlotRole)>> {
    fn visit(ir: &Ir, value: ValueId, role: SlotRole, target: ValueId, out: &mut Vec<(ValueId, SlotRole)>) -> bool {
        if value == target {
            return true;
        }
        let kind = ir.value_kind(value);
        for (index, operand) in kind.operands().into_iter().enumerate() {
            if visit(ir, operand, kind.role(index), target, out) {
                return true;
            }
        }
        out.push((value, role));
        false
    }

    let kind = ir.stmt_kind(stmt);
    let mut out = Vec::new();
    for (index, operand) in kind.operands().into_iter().enumerate() {
        if visit(ir, operand, kind.role(index), target, &mut out) {
            return Some(out);
        }
    }
    None
}

/// True when moving a computation that writes `written` past `before`
/// cannot change what either observes.
pub(crate) fn can_move_past(ir: &Ir, before: &[(ValueId, SlotRole)], written: &BTreeSet<VarId>) -> bool {
    before.iter().all(|(value, role)| {
        let kind = ir.value_kind(*value);
        match kind {
            ValueKind::Constant(_) => true,
            ValueKind::Local(_) | ValueKind::Stack(_) => {
                *role == SlotRole::Write || ir.ref_var(*value).map_or(false, |var| !written.contains(&var))
            }
            _ if *role == SlotRole::Write && kind.is_lvalue() => true,
            _ => !kind.has_side_effect() && !kind.reads_memory(),
        }
    })
}

/// Removes a statement whose labels have no users left.
pub(crate) fn excise(ir: &mut Ir, stmt: StmtId) -> Result<()> {
    ir.drop_unused_labels(stmt);
    ir.remove_stmt(stmt)
}

/// Removes `stmt`, moving the labels still jumped to onto `to`.
pub(crate) fn excise_into(ir: &mut Ir, stmt: StmtId, to: StmtId) -> Result<()> {
    ir.carry_labels(stmt, to)?;
    ir.remove_stmt(stmt)
}

/// True when `value` is only evaluated on some executions of its statement:
/// a ternary arm or the right side of `&&`/`||`.
pub(crate) fn is_conditionally_evaluated(ir: &Ir, value: ValueId) -> bool {
    let mut current = value;
    while let Some(slot) = ir.parent(current) {
        let Owner::Value(parent) = slot.owner else {
            return false;
        };
        let conditional = match ir.value_kind(parent) {
            ValueKind::Ternary { .. } => slot.index > 0,
            ValueKind::LogicalAnd { .. } | ValueKind::LogicalOr { .. } => slot.index == 1,
            _ => false,
        };
        if conditional {
            return true;
        }
        current = parent;
    }
    false
}

/// The type the consumer of `value` expects, when it is known.
pub(crate) fn expected_type(ir: &Ir, cx: &Context<'_>, value: ValueId) -> Option<JvmType> {
    let slot = ir.parent(value)?;
    match slot.owner {
        Owner::Stmt(stmt) => match ir.stmt_kind(stmt) {
            StmtKind::ReturnValue { .. } => Some(cx.header.descriptor.ret.clone()),
            StmtKind::IfGoto { .. } | StmtKind::If { .. } | StmtKind::While { .. } | StmtKind::DoWhile { .. } => {
                Some(JvmType::Boolean)
            }
            _ => None,
        },
        Owner::Value(parent) => match ir.value_kind(parent) {
            ValueKind::Assign { target, .. } if slot.index == 1 => ir.value_type(*target),
            ValueKind::Invoke { method, receiver, .. } => {
                let offset = usize::from(receiver.is_some());
                let index = slot.index.checked_sub(offset)?;
                method.signature().ok()?.params.get(index).cloned()
            }
            ValueKind::New { constructor, .. } => constructor.signature().ok()?.params.get(slot.index).cloned(),
            ValueKind::Not { .. } | ValueKind::LogicalAnd { .. } | ValueKind::LogicalOr { .. } => {
                Some(JvmType::Boolean)
            }
            ValueKind::Ternary { .. } if slot.index == 0 => Some(JvmType::Boolean),
            ValueKind::Ternary { .. } => expected_type(ir, cx, parent),
            ValueKind::Condition { lhs, rhs, .. } => {
                let other = if slot.index == 0 { *rhs } else { *lhs };
                ir.value_type(other).filter(|ty| {
                    matches!(
                        ty,
                        JvmType::Boolean | JvmType::Char | JvmType::Byte | JvmType::Short
                    )
                })
            }
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests;
