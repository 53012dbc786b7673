use log::debug;

use super::{between, block_of, find_after, is_closed_except};
use crate::error::Result;
use crate::ir::{Ir, LabelId, StmtId, StmtKind};
use crate::optimizer::{continues_to, excise, negate, ControlFlowOptimizer, Context};

/// ```text
///     if (c) goto E;
///     then
///     goto J;
/// E:  else
/// J:  ...
/// ```
///
/// becomes `if (!c) { then } else { else }`, or `if (c) { else }` when
/// `then` is empty.
pub struct IfElse;

impl ControlFlowOptimizer for IfElse {
    fn name(&self) -> &'static str {
        "if_else"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::IfGoto { target: skip, .. } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let skip = *skip;
        let Some(else_first) = forward_target(ir, stmt, skip) else {
            return Ok(false);
        };
        if ir.label(skip).users().len() != 1 {
            return Ok(false);
        }
        let Some(jump) = ir.prev(else_first) else {
            return Ok(false);
        };
        let StmtKind::Goto { target: join } = ir.stmt_kind(jump) else {
            return Ok(false);
        };
        let join = *join;
        if jump == stmt || ir.has_used_labels(jump) || ir.stmt(else_first).labels().contains(&join) {
            return Ok(false);
        }
        let then_span = between(ir, stmt, jump);
        if !is_closed_except(ir, &then_span, &[]) {
            return Ok(false);
        }
        let Some(else_span) = span_until(ir, else_first, join) else {
            return Ok(false);
        };
        if !is_closed_except(ir, &else_span, &[skip]) {
            return Ok(false);
        }

        let cond = ir.take_stmt_operand(stmt, 0)?;
        let kind = if then_span.is_empty() {
            StmtKind::If {
                cond,
                then_block: block_of(ir, &else_span)?,
                else_block: None,
            }
        } else {
            StmtKind::If {
                cond: negate(ir, cond)?,
                then_block: block_of(ir, &then_span)?,
                else_block: Some(block_of(ir, &else_span)?),
            }
        };
        let line = ir.stmt(stmt).line();
        let branch = ir.insert_before(stmt, kind, line)?;
        ir.carry_labels(stmt, branch)?;
        ir.remove_stmt(stmt)?;
        excise(ir, jump)?;
        ir.drop_unused_labels(else_first);
        debug!(
            "if/else at {} with {} and {} statements",
            branch,
            then_span.len(),
            else_span.len()
        );
        Ok(true)
    }
}

/// ```text
///     if (c) goto J;
///     then
/// J:  ...
/// ```
///
/// becomes `if (!c) { then }`.
pub struct IfThen;

impl ControlFlowOptimizer for IfThen {
    fn name(&self) -> &'static str {
        "if_then"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::IfGoto { target: skip, .. } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let skip = *skip;
        let Some(then_span) = span_until(ir, stmt, skip).map(|mut span| {
            span.remove(0);
            span
        }) else {
            return Ok(false);
        };
        if then_span.is_empty() || !is_closed_except(ir, &then_span, &[]) {
            return Ok(false);
        }
        // an if/else whose then arm still has jumps into its closing goto
        if then_span
            .last()
            .is_some_and(|last| matches!(ir.stmt_kind(*last), StmtKind::Goto { .. }) && ir.has_used_labels(*last))
        {
            return Ok(false);
        }

        let cond = ir.take_stmt_operand(stmt, 0)?;
        let cond = negate(ir, cond)?;
        let then_block = block_of(ir, &then_span)?;
        let line = ir.stmt(stmt).line();
        let branch = ir.insert_before(
            stmt,
            StmtKind::If {
                cond,
                then_block,
                else_block: None,
            },
            line,
        )?;
        ir.carry_labels(stmt, branch)?;
        ir.remove_stmt(stmt)?;
        debug!("if at {} with {} statements", branch, then_span.len());
        Ok(true)
    }
}

/// The target of `label` when it lies after `from` in the same block.
fn forward_target(ir: &Ir, from: StmtId, label: LabelId) -> Option<StmtId> {
    let target = ir.label_target(label)?;
    find_after(ir, from, |_, candidate| candidate == target)
}

/// `first` and the statements following it up to, not including, the target
/// of `label`. When the target is not further down the block, the span runs
/// to the end of the block, which then has to fall through to `label`.
fn span_until(ir: &Ir, first: StmtId, label: LabelId) -> Option<Vec<StmtId>> {
    match forward_target(ir, first, label) {
        Some(end) => {
            let mut span = between(ir, first, end);
            span.insert(0, first);
            Some(span)
        }
        None => {
            if ir.label_target(label) == Some(first) {
                return None;
            }
            let mut span = vec![first];
            let mut current = first;
            while let Some(next) = ir.next(current).filter(|next| !ir.stmt_kind(*next).is_sentinel()) {
                span.push(next);
                current = next;
            }
            continues_to(ir, current, label).then_some(span)
        }
    }
}
