use crate::error::Result;
use crate::ir::{BinaryOp, Fixity, Ir, Literal, Slot, Step, StmtId, StmtKind, ValueId, ValueKind, VarId};
use crate::optimizer::{assign_stmt, excise, next_stmt, stack_assign, Context, StatementOptimizer};

/// The step of `op` by `literal`, when it adds or subtracts one.
pub(crate) fn unit_step(op: BinaryOp, literal: &Literal) -> Option<Step> {
    match op {
        BinaryOp::Add if literal.is_one() => Some(Step::Increment),
        BinaryOp::Add if literal.is_minus_one() => Some(Step::Decrement),
        BinaryOp::Sub if literal.is_one() => Some(Step::Decrement),
        BinaryOp::Sub if literal.is_minus_one() => Some(Step::Increment),
        _ => None,
    }
}

/// A storage location that can be read and updated twice without the two
/// accesses evaluating anything different.
fn is_simple_lvalue(ir: &Ir, value: ValueId) -> bool {
    let kind = ir.value_kind(value);
    kind.is_lvalue()
        && !matches!(kind, ValueKind::Stack(_))
        && kind.operands().into_iter().all(|operand| ir.is_stable(operand))
}

/// How the statement after a load updates the loaded location by one.
fn unit_update(ir: &Ir, stmt: StmtId, location: ValueId, loaded: Option<ValueId>) -> Option<Step> {
    let StmtKind::Expression { value } = ir.stmt_kind(stmt) else {
        return None;
    };
    match ir.value_kind(*value) {
        ValueKind::CompoundAssign { op, target, value } if ir.same_lvalue(*target, location) => {
            unit_step(*op, ir.value_kind(*value).literal()?)
        }
        ValueKind::Increment { step, target, .. } if ir.same_lvalue(*target, location) => Some(*step),
        ValueKind::Assign { target, value } if ir.same_lvalue(*target, location) => {
            let ValueKind::Binary { op, lhs, rhs } = ir.value_kind(*value) else {
                return None;
            };
            let loaded = ir.ref_var(loaded?)?;
            if ir.ref_var(*lhs) != Some(loaded) || !matches!(ir.value_kind(*lhs), ValueKind::Stack(_)) {
                return None;
            }
            unit_step(*op, ir.value_kind(*rhs).literal()?)
        }
        _ => None,
    }
}

/// `s = x; x += 1;` and `s = x; x = s + 1;` become `s = x++;`.
pub struct SuffixIncrement;

impl StatementOptimizer for SuffixIncrement {
    fn name(&self) -> &'static str {
        "suffix_increment"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let Some((_, assign, location)) = stack_assign(ir, stmt) else {
            return Ok(false);
        };
        if !is_simple_lvalue(ir, location) {
            return Ok(false);
        }
        let Some(update) = next_stmt(ir, stmt) else {
            return Ok(false);
        };
        if ir.has_used_labels(update) {
            return Ok(false);
        }
        let target = ir.slot_value(Slot::of_value(assign, 0));
        let Some(step) = unit_update(ir, update, location, target) else {
            return Ok(false);
        };

        let location = ir.take_operand(assign, 1)?;
        let category = ir.category(location);
        let increment = ir.new_value(
            ValueKind::Increment {
                fixity: Fixity::Suffix,
                step,
                target: location,
            },
            category,
        )?;
        let placeholder = ir.set_slot(Slot::of_value(assign, 1), increment)?;
        ir.discard(placeholder)?;
        excise(ir, update)?;
        Ok(true)
    }
}

/// `x += 1; s = x;` becomes `s = ++x;`.
pub struct PrefixIncrement;

impl StatementOptimizer for PrefixIncrement {
    fn name(&self) -> &'static str {
        "prefix_increment"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let StmtKind::Expression { value: update } = ir.stmt_kind(stmt) else {
            return Ok(false);
        };
        let update = *update;
        let (location, step) = match ir.value_kind(update) {
            ValueKind::CompoundAssign { op, target, value } => {
                let Some(step) = ir.value_kind(*value).literal().and_then(|literal| unit_step(*op, literal)) else {
                    return Ok(false);
                };
                (*target, step)
            }
            ValueKind::Increment { step, target, .. } => (*target, *step),
            _ => return Ok(false),
        };
        if !is_simple_lvalue(ir, location) {
            return Ok(false);
        }
        let Some(load) = next_stmt(ir, stmt) else {
            return Ok(false);
        };
        let Some((_, _, loaded)) = stack_assign(ir, load) else {
            return Ok(false);
        };
        if ir.has_used_labels(load) || !ir.same_lvalue(location, loaded) {
            return Ok(false);
        }

        let update = ir.take_stmt_operand(stmt, 0)?;
        let target = ir.take_operand(update, 0)?;
        let category = ir.category(target);
        ir.discard(update)?;
        let increment = ir.new_value(
            ValueKind::Increment {
                fixity: Fixity::Prefix,
                step,
                target,
            },
            category,
        )?;
        ir.replace_value(loaded, increment)?;
        ir.carry_labels(stmt, load)?;
        ir.remove_stmt(stmt)?;
        Ok(true)
    }
}

/// `s = e; x = s;` where `s` is read again later becomes `s = (x = e);`.
pub struct AssignmentChain;

impl StatementOptimizer for AssignmentChain {
    fn name(&self) -> &'static str {
        "assignment_chain"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let Some((var, assign, _)) = stack_assign(ir, stmt) else {
            return Ok(false);
        };
        if ir.var(var).consumer_count() < 2 {
            return Ok(false);
        }
        let Some(store) = next_stmt(ir, stmt) else {
            return Ok(false);
        };
        let Some((store_assign, location, stored)) = assign_stmt(ir, store) else {
            return Ok(false);
        };
        if ir.ref_var(stored) != Some(var)
            || !matches!(ir.value_kind(stored), ValueKind::Stack(_))
            || ir.has_used_labels(store)
            || !is_simple_lvalue(ir, location)
            || mentions(ir, location, var)
        {
            return Ok(false);
        }

        let location = ir.take_operand(store_assign, 0)?;
        let value = ir.take_operand(assign, 1)?;
        let category = ir.category(value);
        let chained = ir.new_value(ValueKind::Assign { target: location, value }, category)?;
        let placeholder = ir.set_slot(Slot::of_value(assign, 1), chained)?;
        ir.discard(placeholder)?;
        excise(ir, store)?;
        Ok(true)
    }
}

/// True when `value` references the identifier `var` anywhere.
fn mentions(ir: &Ir, value: ValueId, var: VarId) -> bool {
    ir.ref_var(value) == Some(var)
        || ir
            .value_kind(value)
            .operands()
            .into_iter()
            .any(|operand| mentions(ir, operand, var))
}
