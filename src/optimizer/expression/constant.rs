use log::trace;

use crate::error::Result;
use crate::ir::{Ir, Literal, Owner, ValueId, ValueKind};
use crate::optimizer::{expected_type, rebuild, Context, ExpressionOptimizer};
use crate::types::{JvmType, StackCategory};

/// Gives an int constant the narrower type its consumer expects:
/// `boolean`, `char`, `byte` or `short`, when the value fits.
pub struct ConstantRetype;

impl ExpressionOptimizer for ConstantRetype {
    fn name(&self) -> &'static str {
        "constant_retype"
    }

    fn apply(&self, ir: &mut Ir, cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let ValueKind::Constant(Literal::Int(n)) = ir.value_kind(value) else {
            return Ok(false);
        };
        let n = *n;
        let literal = match expected_type(ir, cx, value) {
            Some(JvmType::Boolean) if n == 0 || n == 1 => Literal::Boolean(n == 1),
            Some(JvmType::Char) => match u16::try_from(n) {
                Ok(c) => Literal::Char(c),
                Err(_) => return Ok(false),
            },
            Some(JvmType::Byte) => match i8::try_from(n) {
                Ok(b) => Literal::Byte(b),
                Err(_) => return Ok(false),
            },
            Some(JvmType::Short) => match i16::try_from(n) {
                Ok(s) => Literal::Short(s),
                Err(_) => return Ok(false),
            },
            _ => return Ok(false),
        };
        rebuild(ir, value, |ir, _| Ok(ir.constant(literal)))?;
        Ok(true)
    }
}

/// Replaces a literal by the constant field javac inlined it from, asking
/// the [`ConstantResolver`](crate::optimizer::ConstantResolver) of the
/// pipeline.
///
/// Only literals whose owning class is evident are looked up: arguments of
/// a call (the callee's class), operands compared with a field read and
/// values stored to a field (the field's class).
pub struct ConstantField;

impl ExpressionOptimizer for ConstantField {
    fn name(&self) -> &'static str {
        "constant_field"
    }

    fn apply(&self, ir: &mut Ir, cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let Some(resolver) = cx.resolver else {
            return Ok(false);
        };
        let ValueKind::Constant(literal) = ir.value_kind(value) else {
            return Ok(false);
        };
        if matches!(literal, Literal::Null | Literal::Type(_) | Literal::MethodType(_) | Literal::Handle(_) | Literal::Dynamic(_)) {
            return Ok(false);
        }
        let Some((owner, stored_to)) = lookup_owner(ir, value) else {
            return Ok(false);
        };
        let Some(resolved) = resolver.constant_field(&owner, literal) else {
            return Ok(false);
        };
        if Some(&resolved.field) == stored_to.as_ref() {
            return Ok(false);
        }
        if cx.header.name == "<clinit>" && resolved.field.owner == cx.header.owner {
            return Ok(false);
        }
        let category = resolved
            .field
            .field_type()
            .ok()
            .and_then(|ty| ty.category())
            .unwrap_or(StackCategory::Reference);

        let replacement = if resolved.is_static {
            ValueKind::StaticField { field: resolved.field }
        } else {
            let Some(this) = cx.this_var else {
                return Ok(false);
            };
            if resolved.field.owner != cx.header.owner || cx.header.is_constructor() {
                return Ok(false);
            }
            let object = ir.var_ref(this);
            ValueKind::InstanceField {
                field: resolved.field,
                object,
            }
        };
        trace!("literal {} resolved to a constant field", value);
        rebuild(ir, value, |ir, _| ir.new_value(replacement, Some(category)))?;
        Ok(true)
    }
}

/// The class whose constants a literal most likely refers to, and the field
/// it is being stored to, if any.
fn lookup_owner(ir: &Ir, value: ValueId) -> Option<(String, Option<crate::visitor::FieldRef>)> {
    let slot = ir.parent(value)?;
    let Owner::Value(parent) = slot.owner else {
        return None;
    };
    match ir.value_kind(parent) {
        ValueKind::Invoke { method, receiver, .. } if slot.index >= usize::from(receiver.is_some()) => {
            Some((method.owner.clone(), None))
        }
        ValueKind::New { constructor, .. } => Some((constructor.owner.clone(), None)),
        ValueKind::Condition { lhs, rhs, .. } => {
            let other = if slot.index == 0 { *rhs } else { *lhs };
            match ir.value_kind(other) {
                ValueKind::StaticField { field } | ValueKind::InstanceField { field, .. } => {
                    Some((field.owner.clone(), None))
                }
                _ => None,
            }
        }
        ValueKind::Assign { target, .. } | ValueKind::CompoundAssign { target, .. } if slot.index == 1 => {
            match ir.value_kind(*target) {
                ValueKind::StaticField { field } | ValueKind::InstanceField { field, .. } => {
                    Some((field.owner.clone(), Some(field.clone())))
                }
                _ => None,
            }
        }
        _ => None,
    }
}
