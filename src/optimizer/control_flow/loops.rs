use log::debug;

use super::{between, block_of, find_after, is_closed_except};
use crate::error::Result;
use crate::ir::{Ir, Literal, StmtId, StmtKind};
use crate::optimizer::{continues_to, excise, negate, ControlFlowOptimizer, Context};

/// ```text
/// C:  if (c) goto E;
///     body
///     goto C;
/// E:  ...
/// ```
///
/// becomes `while (!c) { body }`.
pub struct WhileTopTested;

impl ControlFlowOptimizer for WhileTopTested {
    fn name(&self) -> &'static str {
        "while_top_tested"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::IfGoto { target: exit, .. } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let exit = *exit;
        let heads: Vec<_> = ir.stmt(stmt).labels().to_vec();
        if !heads.iter().any(|label| ir.label_in_use(*label)) {
            return Ok(false);
        }
        let Some(back) = find_after(ir, stmt, |ir, candidate| match ir.stmt_kind(candidate) {
            StmtKind::Goto { target } => heads.contains(target) && continues_to(ir, candidate, exit),
            _ => false,
        }) else {
            return Ok(false);
        };
        let body = between(ir, stmt, back);
        if !is_closed_except(ir, &body, &[]) {
            return Ok(false);
        }

        let cond = ir.take_stmt_operand(stmt, 0)?;
        let cond = negate(ir, cond)?;
        let block = block_of(ir, &body)?;
        let line = ir.stmt(stmt).line();
        let looped = ir.insert_before(stmt, StmtKind::While { cond, body: block }, line)?;
        ir.carry_labels(stmt, looped)?;
        ir.carry_labels(back, looped)?;
        ir.remove_stmt(stmt)?;
        ir.remove_stmt(back)?;
        debug!("while loop at {} with {} statements", looped, body.len());
        Ok(true)
    }
}

/// ```text
///     goto C;
/// B:  body
/// C:  if (c) goto B;
/// ```
///
/// becomes `while (c) { body }`.
pub struct WhileBottomTested;

impl ControlFlowOptimizer for WhileBottomTested {
    fn name(&self) -> &'static str {
        "while_bottom_tested"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::Goto { target: check } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let check = *check;
        let Some(test) = ir.label_target(check) else {
            return Ok(false);
        };
        let StmtKind::IfGoto { target: top, .. } = ir.stmt_kind(test) else {
            return Ok(false);
        };
        let top = *top;
        let Some(first) = ir.next(stmt) else {
            return Ok(false);
        };
        if ir.label_target(top) != Some(first) || first == test || ir.stmt(test).block() != ir.stmt(stmt).block() {
            return Ok(false);
        }
        if ir.label(top).users().len() != 1 {
            return Ok(false);
        }
        let body = between(ir, stmt, test);
        if body.first() != Some(&first) || !is_closed_except(ir, &body, &[top]) {
            return Ok(false);
        }

        let cond = ir.take_stmt_operand(test, 0)?;
        let block = block_of(ir, &body)?;
        let line = ir.stmt(test).line();
        let looped = ir.insert_before(stmt, StmtKind::While { cond, body: block }, line)?;
        ir.carry_labels(stmt, looped)?;
        ir.carry_labels(test, looped)?;
        ir.remove_stmt(stmt)?;
        ir.remove_stmt(test)?;
        ir.drop_unused_labels(first);
        debug!("bottom-tested while loop at {}", looped);
        Ok(true)
    }
}

/// ```text
/// B:  body
///     if (c) goto B;
/// ```
///
/// becomes `do { body } while (c);`.
pub struct DoWhileLoop;

impl ControlFlowOptimizer for DoWhileLoop {
    fn name(&self) -> &'static str {
        "do_while_loop"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::IfGoto { target: top, .. } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let top = *top;
        let Some(first) = ir.label_target(top) else {
            return Ok(false);
        };
        if first == stmt
            || ir.stmt(first).block() != ir.stmt(stmt).block()
            || ir.label(top).users().len() != 1
            || ir.has_used_labels(stmt)
        {
            return Ok(false);
        }
        // the target has to come before the jump
        if find_after(ir, stmt, |_, candidate| candidate == first).is_some() {
            return Ok(false);
        }
        let mut body = between(ir, first, stmt);
        body.insert(0, first);
        let head_labels = ir.stmt(first).labels().to_vec();
        if !is_closed_except(ir, &body, &head_labels) {
            return Ok(false);
        }

        let cond = ir.take_stmt_operand(stmt, 0)?;
        let line = ir.stmt(stmt).line();
        excise(ir, stmt)?;
        let block = ir.new_block();
        let looped = ir.insert_before(first, StmtKind::DoWhile { body: block, cond }, line)?;
        ir.carry_labels(first, looped)?;
        let last = body[body.len() - 1];
        ir.move_span(first, last, block)?;
        debug!("do-while loop at {}", looped);
        Ok(true)
    }
}

/// ```text
/// L:  body
///     goto L;
/// ```
///
/// becomes `while (true) { body }`, taking the last jump back to `L` in the
/// block as the loop end.
pub struct WhileTrue;

impl ControlFlowOptimizer for WhileTrue {
    fn name(&self) -> &'static str {
        "while_true"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let heads: Vec<_> = ir
            .stmt(stmt)
            .labels()
            .iter()
            .copied()
            .filter(|label| ir.label_in_use(*label))
            .collect();
        if heads.is_empty() {
            return Ok(false);
        }
        let mut back = None;
        let mut current = stmt;
        while let Some(candidate) = find_after(ir, current, |ir, candidate| {
            matches!(ir.stmt_kind(candidate), StmtKind::Goto { target } if heads.contains(target))
        }) {
            back = Some(candidate);
            current = candidate;
        }
        let Some(back) = back else {
            return Ok(false);
        };
        let mut body = between(ir, stmt, back);
        body.insert(0, stmt);
        if !is_closed_except(ir, &body, &heads) {
            return Ok(false);
        }

        let cond = ir.constant(Literal::Boolean(true));
        let line = ir.stmt(stmt).line();
        let block = ir.new_block();
        let looped = ir.insert_before(stmt, StmtKind::While { cond, body: block }, line)?;
        ir.carry_labels(stmt, looped)?;
        ir.carry_labels(back, looped)?;
        ir.remove_stmt(back)?;
        let last = body[body.len() - 1];
        ir.move_span(stmt, last, block)?;
        debug!("endless loop at {}", looped);
        Ok(true)
    }
}
