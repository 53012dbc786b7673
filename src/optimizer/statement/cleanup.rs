use crate::error::Result;
use crate::ir::{Ir, Slot, StmtId, StmtKind, ValueKind};
use crate::optimizer::{assign_stmt, continues_to, excise, excise_into, next_stmt, Context, StatementOptimizer};

/// Drops labels no statement jumps to any more.
pub struct UnusedLabels;

impl StatementOptimizer for UnusedLabels {
    fn name(&self) -> &'static str {
        "unused_labels"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let unused = ir
            .stmt(stmt)
            .labels()
            .iter()
            .any(|label| !ir.label_in_use(*label));
        if unused {
            ir.drop_unused_labels(stmt);
        }
        Ok(unused)
    }
}

/// Removes a jump to the place control reaches anyway.
///
/// `if (c) goto L` is removed too when evaluating `c` has no effect.
pub struct RedundantGoto;

impl StatementOptimizer for RedundantGoto {
    fn name(&self) -> &'static str {
        "redundant_goto"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let target = match ir.stmt_kind(stmt) {
            StmtKind::Goto { target } => *target,
            StmtKind::IfGoto { cond, target } if ir.is_pure(*cond) => *target,
            _ => return Ok(false),
        };
        if !continues_to(ir, stmt, target) {
            return Ok(false);
        }
        match next_stmt(ir, stmt) {
            Some(next) => excise_into(ir, stmt, next)?,
            None if ir.has_used_labels(stmt) => return Ok(false),
            None => excise(ir, stmt)?,
        }
        Ok(true)
    }
}

/// Lets a handler write the caught exception straight into the local it is
/// stored to: `catch R (s); l = s;` becomes `catch R (l);`.
pub struct CatchVariable;

impl StatementOptimizer for CatchVariable {
    fn name(&self) -> &'static str {
        "catch_variable"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::Catch { exception, .. } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let Some(caught) = ir.ref_var(*exception) else {
            return Ok(false);
        };
        if !matches!(ir.value_kind(*exception), ValueKind::Stack(_)) || ir.var(caught).consumer_count() != 1 {
            return Ok(false);
        }
        let Some(store) = next_stmt(ir, stmt) else {
            return Ok(false);
        };
        let Some((assign, target, value)) = assign_stmt(ir, store) else {
            return Ok(false);
        };
        if !matches!(ir.value_kind(target), ValueKind::Local(_))
            || ir.ref_var(value) != Some(caught)
            || ir.has_used_labels(store)
        {
            return Ok(false);
        }

        let local = ir.take_operand(assign, 0)?;
        let old = ir.set_slot(Slot::of_stmt(stmt, 0), local)?;
        ir.discard(old)?;
        excise(ir, store)?;
        Ok(true)
    }
}
