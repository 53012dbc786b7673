use crate::error::Result;
use crate::ir::{BinaryOp, Fixity, Ir, Owner, ShiftOp, StmtKind, ValueId, ValueKind};
use crate::optimizer::statement::unit_step;
use crate::optimizer::{rebuild, Context, ExpressionOptimizer};

#[derive(Copy, Clone)]
enum Operator {
    Binary(BinaryOp),
    Shift(ShiftOp),
}

/// `x = x op v` becomes `x op= v` for locals, fields, statics and array
/// elements whose address evaluates the same both times.
pub struct CompoundAssignment;

impl ExpressionOptimizer for CompoundAssignment {
    fn name(&self) -> &'static str {
        "compound_assignment"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let ValueKind::Assign { target, value: rhs } = ir.value_kind(value) else {
            return Ok(false);
        };
        let (target, rhs) = (*target, *rhs);
        let target_kind = ir.value_kind(target);
        if !target_kind.is_lvalue()
            || matches!(target_kind, ValueKind::Stack(_))
            || !target_kind.operands().into_iter().all(|operand| ir.is_stable(operand))
        {
            return Ok(false);
        }
        let (lhs, op) = match ir.value_kind(rhs) {
            ValueKind::Binary { op, lhs, .. } => (*lhs, Operator::Binary(*op)),
            ValueKind::Shift { op, lhs, .. } => (*lhs, Operator::Shift(*op)),
            _ => return Ok(false),
        };
        if !ir.same_lvalue(target, lhs) {
            return Ok(false);
        }

        let category = ir.category(target);
        rebuild(ir, value, |ir, old| {
            let target = ir.take_operand(old, 0)?;
            let value = ir.take_operand(rhs, 1)?;
            let kind = match op {
                Operator::Binary(op) => ValueKind::CompoundAssign { op, target, value },
                Operator::Shift(op) => ValueKind::ShiftAssign { op, target, value },
            };
            ir.new_value(kind, category)
        })?;
        Ok(true)
    }
}

/// `x += 1` becomes `x++` as a statement and `++x` inside an expression;
/// `x -= 1` likewise.
pub struct IncrementExpression;

impl ExpressionOptimizer for IncrementExpression {
    fn name(&self) -> &'static str {
        "increment_expression"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let ValueKind::CompoundAssign { op, value: amount, .. } = ir.value_kind(value) else {
            return Ok(false);
        };
        let Some(step) = ir.value_kind(*amount).literal().and_then(|literal| unit_step(*op, literal)) else {
            return Ok(false);
        };
        let fixity = match ir.parent(value).map(|slot| slot.owner) {
            Some(Owner::Stmt(stmt)) if matches!(ir.stmt_kind(stmt), StmtKind::Expression { .. }) => Fixity::Suffix,
            _ => Fixity::Prefix,
        };
        let category = ir.category(value);
        rebuild(ir, value, |ir, old| {
            let target = ir.take_operand(old, 0)?;
            ir.new_value(ValueKind::Increment { fixity, step, target }, category)
        })?;
        Ok(true)
    }
}
