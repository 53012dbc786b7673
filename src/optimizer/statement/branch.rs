use log::trace;

use crate::error::Result;
use crate::ir::{Ir, StmtId, StmtKind, ValueKind};
use crate::optimizer::{continues_to, excise, negate, next_stmt, stack_assign, Context, StatementOptimizer};

/// Merges two adjacent conditional jumps into one short-circuit condition.
///
/// `if (a) goto L; if (b) goto L;` becomes `if (a || b) goto L;` and
/// `if (a) goto M; if (b) goto L; M: ...` becomes `if (!a && b) goto L;`.
pub struct LogicalCondition;

impl StatementOptimizer for LogicalCondition {
    fn name(&self) -> &'static str {
        "logical_condition"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::IfGoto { target: first, .. } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let first = *first;
        let Some(second_stmt) = next_stmt(ir, stmt) else {
            return Ok(false);
        };
        let StmtKind::IfGoto { target: second, .. } = ir.stmt_kind(second_stmt) else {
            return Ok(false);
        };
        let second = *second;
        if ir.has_used_labels(second_stmt) {
            return Ok(false);
        }
        let or = first == second;
        if !or && !continues_to(ir, second_stmt, first) {
            return Ok(false);
        }

        let lhs = ir.take_stmt_operand(stmt, 0)?;
        let rhs = ir.take_stmt_operand(second_stmt, 0)?;
        let int = ir.category(rhs);
        let cond = if or {
            ir.new_value(ValueKind::LogicalOr { lhs, rhs }, int)?
        } else {
            let lhs = negate(ir, lhs)?;
            ir.new_value(ValueKind::LogicalAnd { lhs, rhs }, int)?
        };
        trace!("joined conditions of {} and {}", stmt, second_stmt);
        ir.rewrite_stmt(stmt, StmtKind::IfGoto { cond, target: second })?;
        excise(ir, second_stmt)?;
        Ok(true)
    }
}

/// Collapses a conditional jump over two assignments of the same stack
/// value into a ternary:
///
/// ```text
///     if (c) goto E;
///     s = a;
///     goto J;
/// E:  s = b;
/// J:  ...
/// ```
///
/// becomes `s = !c ? a : b;`. The else arm may also end in its own
/// `goto J`, as in the arms of a nested conditional; that jump stays behind
/// the rewritten assignment.
pub struct TernaryValue;

impl StatementOptimizer for TernaryValue {
    fn name(&self) -> &'static str {
        "ternary_value"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::IfGoto { target: else_label, .. } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let else_label = *else_label;
        let Some(then_stmt) = next_stmt(ir, stmt) else {
            return Ok(false);
        };
        let Some((var, then_assign, _)) = stack_assign(ir, then_stmt) else {
            return Ok(false);
        };
        let Some(jump) = next_stmt(ir, then_stmt) else {
            return Ok(false);
        };
        let StmtKind::Goto { target: join } = ir.stmt_kind(jump) else {
            return Ok(false);
        };
        let join = *join;
        let Some(else_stmt) = next_stmt(ir, jump) else {
            return Ok(false);
        };
        let Some((else_var, else_assign, _)) = stack_assign(ir, else_stmt) else {
            return Ok(false);
        };
        if ir.has_used_labels(then_stmt) || ir.has_used_labels(jump) || else_var != var {
            return Ok(false);
        }
        let rejoins = continues_to(ir, else_stmt, join)
            || next_stmt(ir, else_stmt).is_some_and(
                |next| matches!(ir.stmt_kind(next), StmtKind::Goto { target } if *target == join),
            );
        if ir.label_target(else_label) != Some(else_stmt)
            || ir.label(else_label).users().len() != 1
            || !rejoins
            || ir.var(var).producers().len() < 2
        {
            return Ok(false);
        }
        let other_labels = ir
            .stmt(else_stmt)
            .labels()
            .iter()
            .any(|label| *label != else_label && ir.label_in_use(*label));
        if other_labels {
            return Ok(false);
        }

        let cond = ir.take_stmt_operand(stmt, 0)?;
        let cond = negate(ir, cond)?;
        let then_value = ir.take_operand(then_assign, 1)?;
        let else_value = ir.take_operand(else_assign, 1)?;
        let category = ir.category(then_value);
        let ternary = ir.new_value(
            ValueKind::Ternary {
                cond,
                then_value,
                else_value,
            },
            category,
        )?;
        let target = ir.take_operand(then_assign, 0)?;
        let assign = ir.new_value(ValueKind::Assign { target, value: ternary }, category)?;
        trace!("ternary for {} at {}", var, stmt);
        ir.rewrite_stmt(stmt, StmtKind::Expression { value: assign })?;
        excise(ir, then_stmt)?;
        excise(ir, jump)?;
        excise(ir, else_stmt)?;
        Ok(true)
    }
}
