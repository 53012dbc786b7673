use crate::error::Result;
use crate::ir::{CompareOp, Ir, Literal, ValueId, ValueKind};
use crate::optimizer::{expected_type, is_floating, negate, rebuild, Context, ExpressionOptimizer};
use crate::types::JvmType;

/// True for values that hold a JVM boolean (`0` or `1`) in an int.
fn is_boolean(ir: &Ir, value: ValueId) -> bool {
    if ir.value_type(value) == Some(JvmType::Boolean) {
        return true;
    }
    match ir.value_kind(value) {
        ValueKind::Ternary {
            then_value,
            else_value,
            ..
        } => is_zero_or_one(ir, *then_value) && is_zero_or_one(ir, *else_value),
        _ => false,
    }
}

fn int_constant(ir: &Ir, value: ValueId) -> Option<i32> {
    ir.value_kind(value).literal().and_then(Literal::as_int)
}

fn is_zero_or_one(ir: &Ir, value: ValueId) -> bool {
    matches!(int_constant(ir, value), Some(0) | Some(1))
}

/// `b != 0` becomes `b` and `b == 0` becomes `!b` for boolean-valued `b`.
pub struct BooleanComparison;

impl ExpressionOptimizer for BooleanComparison {
    fn name(&self) -> &'static str {
        "boolean_comparison"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let ValueKind::Condition { op, lhs, rhs } = ir.value_kind(value) else {
            return Ok(false);
        };
        let (op, lhs, rhs) = (*op, *lhs, *rhs);
        if !matches!(op, CompareOp::Eq | CompareOp::Ne) || int_constant(ir, rhs) != Some(0) || !is_boolean(ir, lhs) {
            return Ok(false);
        }
        rebuild(ir, value, |ir, old| {
            let operand = ir.take_operand(old, 0)?;
            match op {
                CompareOp::Ne => Ok(operand),
                _ => negate(ir, operand),
            }
        })?;
        Ok(true)
    }
}

/// `c ? 1 : 0` becomes `c` and `c ? 0 : 1` becomes `!c` where a boolean is
/// expected.
pub struct BooleanTernary;

impl ExpressionOptimizer for BooleanTernary {
    fn name(&self) -> &'static str {
        "boolean_ternary"
    }

    fn apply(&self, ir: &mut Ir, cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let ValueKind::Ternary {
            then_value,
            else_value,
            ..
        } = ir.value_kind(value)
        else {
            return Ok(false);
        };
        let inverted = match (int_constant(ir, *then_value), int_constant(ir, *else_value)) {
            (Some(1), Some(0)) => false,
            (Some(0), Some(1)) => true,
            _ => return Ok(false),
        };
        if expected_type(ir, cx, value) != Some(JvmType::Boolean) {
            return Ok(false);
        }
        rebuild(ir, value, |ir, old| {
            let cond = ir.take_operand(old, 0)?;
            if inverted {
                negate(ir, cond)
            } else {
                Ok(cond)
            }
        })?;
        Ok(true)
    }
}

/// Removes a negation that can be pushed into its operand: `!!x`, `!(a < b)`
/// on non-floating operands, and `!true`.
pub struct NotSimplification;

impl ExpressionOptimizer for NotSimplification {
    fn name(&self) -> &'static str {
        "not_simplification"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let ValueKind::Not { operand } = ir.value_kind(value) else {
            return Ok(false);
        };
        let simplifies = match ir.value_kind(*operand) {
            ValueKind::Not { .. } => true,
            ValueKind::Condition { lhs, .. } => !is_floating(ir, *lhs),
            ValueKind::Constant(Literal::Boolean(_)) => true,
            _ => false,
        };
        if !simplifies {
            return Ok(false);
        }
        rebuild(ir, value, |ir, old| {
            let operand = ir.take_operand(old, 0)?;
            negate(ir, operand)
        })?;
        Ok(true)
    }
}
