use std::collections::BTreeSet;

use log::trace;

use crate::error::Result;
use crate::ir::{Ir, StmtId, StmtKind, ValueId, VarId};
use crate::optimizer::{
    can_move_past, evaluated_before, excise, excise_into, is_conditionally_evaluated, next_stmt, stack_assign,
    Context, StatementOptimizer,
};

/// Turns the assignment of a stack value nobody reads into a plain
/// expression statement, or removes it when evaluating it does nothing.
pub struct UnusedStackValue;

impl StatementOptimizer for UnusedStackValue {
    fn name(&self) -> &'static str {
        "unused_stack_value"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let Some((var, assign, value)) = stack_assign(ir, stmt) else {
            return Ok(false);
        };
        let node = ir.var(var);
        if node.consumer_count() != 0 || node.producers().len() != 1 {
            return Ok(false);
        }
        if ir.is_pure(value) {
            match next_stmt(ir, stmt) {
                Some(next) => {
                    excise_into(ir, stmt, next)?;
                    return Ok(true);
                }
                None if !ir.has_used_labels(stmt) => {
                    excise(ir, stmt)?;
                    return Ok(true);
                }
                None => {}
            }
        }
        let value = ir.take_operand(assign, 1)?;
        ir.rewrite_stmt(stmt, StmtKind::Expression { value })?;
        Ok(true)
    }
}

/// Substitutes a stack value read exactly once by the next statement into
/// the place it is read.
///
/// Whatever the next statement evaluates before the read must be unaffected
/// by moving the computation later.
pub struct InlineStackValue;

impl StatementOptimizer for InlineStackValue {
    fn name(&self) -> &'static str {
        "inline_stack_value"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let Some((var, assign, value)) = stack_assign(ir, stmt) else {
            return Ok(false);
        };
        let node = ir.var(var);
        if node.producers().len() != 1 || node.consumer_count() != 1 {
            return Ok(false);
        }
        let Some(consumer) = node.consumers().next() else {
            return Ok(false);
        };
        let Some(next) = next_stmt(ir, stmt) else {
            return Ok(false);
        };
        if ir.root_stmt(consumer) != Some(next)
            || ir.has_used_labels(next)
            || matches!(ir.stmt_kind(next), StmtKind::While { .. } | StmtKind::DoWhile { .. })
        {
            return Ok(false);
        }
        if is_conditionally_evaluated(ir, consumer) && !ir.is_pure(value) {
            return Ok(false);
        }
        let Some(before) = evaluated_before(ir, next, consumer) else {
            return Ok(false);
        };
        let safe = if ir.is_stable(value) {
            let read = read_vars(ir, value);
            before.iter().all(|(value, _)| {
                !ir.value_kind(*value).has_side_effect() || ir.written_vars(*value).is_disjoint(&read)
            })
        } else {
            can_move_past(ir, &before, &ir.written_vars(value))
        };
        if !safe {
            return Ok(false);
        }

        trace!("inlining {} into {}", var, next);
        let value = ir.take_operand(assign, 1)?;
        ir.replace_value(consumer, value)?;
        excise_into(ir, stmt, next)?;
        Ok(true)
    }
}

/// Root identifiers referenced anywhere inside `value`.
fn read_vars(ir: &Ir, value: ValueId) -> BTreeSet<VarId> {
    let mut out = BTreeSet::new();
    let mut pending = vec![value];
    while let Some(current) = pending.pop() {
        if let Some(var) = ir.ref_var(current) {
            out.insert(var);
        }
        pending.extend(ir.value_kind(current).operands());
    }
    out
}
