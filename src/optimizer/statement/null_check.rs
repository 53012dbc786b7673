use log::trace;

use crate::error::Result;
use crate::ir::{Ir, StmtId, StmtKind, ValueKind};
use crate::optimizer::{
    can_move_past, evaluated_before, excise_into, next_stmt, rebuild, Context, StatementOptimizer,
};

/// Folds a call made only to throw on `null` into the next use of the
/// checked value.
///
/// javac guards qualified inner-class creation and some method references
/// with `x.getClass()` or `Objects.requireNonNull(x)` on a duplicated
/// receiver and drops the result:
///
/// ```text
/// s.getClass();
/// s.bar();
/// ```
///
/// becomes `nullcheck(s).bar();`.
pub struct NullCheck;

impl StatementOptimizer for NullCheck {
    fn name(&self) -> &'static str {
        "null_check"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::Expression { value } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let checked = match ir.value_kind(*value) {
            ValueKind::Invoke {
                method,
                receiver: Some(receiver),
                args,
                ..
            } if method.name == "getClass" && method.descriptor == "()Ljava/lang/Class;" && args.is_empty() => {
                *receiver
            }
            ValueKind::Invoke {
                method,
                receiver: None,
                args,
                ..
            } if method.is("java/util/Objects", "requireNonNull")
                && method.descriptor == "(Ljava/lang/Object;)Ljava/lang/Object;"
                && args.len() == 1 =>
            {
                args[0]
            }
            _ => return Ok(false),
        };
        if !matches!(ir.value_kind(checked), ValueKind::Stack(_)) {
            return Ok(false);
        }
        let Some(var) = ir.ref_var(checked) else {
            return Ok(false);
        };
        let Some(next) = next_stmt(ir, stmt) else {
            return Ok(false);
        };
        let node = ir.var(var);
        if node.consumer_count() != 2 {
            return Ok(false);
        }
        let Some(other) = node.consumers().find(|consumer| *consumer != checked) else {
            return Ok(false);
        };
        if ir.root_stmt(other) != Some(next) || ir.has_used_labels(next) {
            return Ok(false);
        }
        let Some(before) = evaluated_before(ir, next, other) else {
            return Ok(false);
        };
        if !can_move_past(ir, &before, &Default::default()) {
            return Ok(false);
        }

        trace!("null check on {} folded into {}", var, next);
        let category = ir.category(other);
        rebuild(ir, other, |ir, old| {
            ir.new_value(ValueKind::NullChecked { operand: old }, category)
        })?;
        excise_into(ir, stmt, next)?;
        Ok(true)
    }
}
