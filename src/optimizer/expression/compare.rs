use crate::error::Result;
use crate::ir::{CompareOp, Ir, NanBias, ValueId, ValueKind};
use crate::optimizer::{rebuild, Context, ExpressionOptimizer};
use crate::types::StackCategory;

/// Turns `lcmp(a, b) < 0` into `a < b`, and the `fcmp`/`dcmp` forms into
/// the relational condition that agrees with them on NaN.
///
/// `fcmpl` pushes -1 for NaN, so `fcmpl(a, b) op 0` is exactly `a op b` for
/// `>`, `>=`, `==` and `!=`; for `<` and `<=` it becomes `!(a >= b)` and
/// `!(a > b)`. `fcmpg` mirrors that.
pub struct ThreeWayCompare;

impl ExpressionOptimizer for ThreeWayCompare {
    fn name(&self) -> &'static str {
        "three_way_compare"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let ValueKind::Condition { op, lhs, rhs } = ir.value_kind(value) else {
            return Ok(false);
        };
        let (op, compare) = (*op, *lhs);
        if ir.value_kind(*rhs).literal().and_then(|literal| literal.as_int()) != Some(0) {
            return Ok(false);
        }
        let exact = match ir.value_kind(compare) {
            ValueKind::LongCompare { .. } => true,
            ValueKind::FloatCompare { bias: NanBias::Less, .. } => {
                matches!(op, CompareOp::Gt | CompareOp::Ge | CompareOp::Eq | CompareOp::Ne)
            }
            ValueKind::FloatCompare {
                bias: NanBias::Greater,
                ..
            } => matches!(op, CompareOp::Lt | CompareOp::Le | CompareOp::Eq | CompareOp::Ne),
            _ => return Ok(false),
        };

        let int = Some(StackCategory::Int);
        rebuild(ir, value, |ir, _| {
            let lhs = ir.take_operand(compare, 0)?;
            let rhs = ir.take_operand(compare, 1)?;
            if exact {
                ir.new_value(ValueKind::Condition { op, lhs, rhs }, int)
            } else {
                let inverse = ir.new_value(
                    ValueKind::Condition {
                        op: op.negate(),
                        lhs,
                        rhs,
                    },
                    int,
                )?;
                ir.new_value(ValueKind::Not { operand: inverse }, int)
            }
        })?;
        Ok(true)
    }
}
