use log::trace;

use crate::error::{DecompileError, Result};
use crate::ir::{InvokeKind, Ir, Literal, ValueId, ValueKind};
use crate::optimizer::{rebuild, Context, ExpressionOptimizer};
use crate::types::StackCategory;
use crate::visitor::{CallSite, Constant};

const STRING_CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";
const TAG_ARG: char = '\u{1}';
const TAG_CONST: char = '\u{2}';

fn is_builder(class: &str) -> bool {
    class == "java/lang/StringBuilder" || class == "java/lang/StringBuffer"
}

/// One piece of the concatenation, before it is taken out of the old tree.
enum Part {
    /// Operand `index` of a node in the old tree.
    Operand(ValueId, usize),
    Literal(Literal),
}

/// Recognizes both ways javac concatenates strings and turns them into one
/// `concat(...)` value: a `StringBuilder`/`StringBuffer` chain ending in
/// `toString()`, and `invokedynamic` through `StringConcatFactory`.
pub struct StringConcat;

impl ExpressionOptimizer for StringConcat {
    fn name(&self) -> &'static str {
        "string_concat"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, value: ValueId) -> Result<bool> {
        let parts = match ir.value_kind(value) {
            ValueKind::Invoke {
                kind: InvokeKind::Virtual,
                method,
                receiver: Some(receiver),
                args,
            } if is_builder(&method.owner)
                && method.name == "toString"
                && method.descriptor == "()Ljava/lang/String;"
                && args.is_empty() =>
            {
                builder_parts(ir, *receiver)
            }
            ValueKind::InvokeDynamic { call_site, args } if call_site.bootstrap.owner == STRING_CONCAT_FACTORY => {
                Some(indy_parts(self.name(), value, call_site, args.len())?)
            }
            _ => None,
        };
        let Some(parts) = parts else {
            return Ok(false);
        };
        if parts.is_empty() {
            return Ok(false);
        }

        trace!("string concatenation of {} parts at {}", parts.len(), value);
        rebuild(ir, value, |ir, _| {
            let mut taken = Vec::with_capacity(parts.len());
            for part in parts {
                taken.push(match part {
                    Part::Operand(owner, index) => ir.take_operand(owner, index)?,
                    Part::Literal(literal) => ir.constant(literal),
                });
            }
            ir.new_value(ValueKind::Concat { parts: taken }, Some(StackCategory::Reference))
        })?;
        Ok(true)
    }
}

/// Walks `new StringBuilder(..).append(a).append(b)` from the outermost
/// `append` inwards.
fn builder_parts(ir: &Ir, receiver: ValueId) -> Option<Vec<Part>> {
    let mut appended = Vec::new();
    let mut current = receiver;
    loop {
        match ir.value_kind(current) {
            ValueKind::Invoke {
                kind: InvokeKind::Virtual,
                method,
                receiver: Some(inner),
                args,
            } if is_builder(&method.owner) && method.name == "append" && args.len() == 1 => {
                appended.push(Part::Operand(current, 1));
                current = *inner;
            }
            ValueKind::New {
                class,
                constructor,
                args,
            } if is_builder(class) => {
                let mut parts = Vec::new();
                match constructor.descriptor.as_str() {
                    "()V" => {}
                    "(Ljava/lang/String;)V" | "(Ljava/lang/CharSequence;)V" if args.len() == 1 => {
                        parts.push(Part::Operand(current, 0));
                    }
                    _ => return None,
                }
                parts.extend(appended.into_iter().rev());
                return Some(parts);
            }
            _ => return None,
        }
    }
}

/// Splits a `makeConcatWithConstants` recipe into argument and constant
/// parts; `makeConcat` just concatenates its arguments.
fn indy_parts(optimizer: &'static str, value: ValueId, call_site: &CallSite, arg_count: usize) -> Result<Vec<Part>> {
    let shape = |found: String| DecompileError::UnexpectedShape { optimizer, found };
    match call_site.name.as_str() {
        "makeConcat" => Ok((0..arg_count).map(|index| Part::Operand(value, index)).collect()),
        "makeConcatWithConstants" => {
            let Some(Constant::String(recipe)) = call_site.bootstrap_args.first() else {
                return Err(shape(format!("recipe {:?}", call_site.bootstrap_args.first())));
            };
            let mut constants = call_site.bootstrap_args[1..].iter();
            let mut parts = Vec::new();
            let mut text = String::new();
            let mut next_arg = 0;
            for ch in recipe.chars() {
                if ch != TAG_ARG && ch != TAG_CONST {
                    text.push(ch);
                    continue;
                }
                if !text.is_empty() {
                    parts.push(Part::Literal(Literal::String(std::mem::take(&mut text))));
                }
                if ch == TAG_ARG {
                    if next_arg >= arg_count {
                        return Err(shape(format!("recipe {:?} with {} arguments", recipe, arg_count)));
                    }
                    parts.push(Part::Operand(value, next_arg));
                    next_arg += 1;
                } else {
                    let constant = constants
                        .next()
                        .ok_or_else(|| shape(format!("recipe {:?} without constant", recipe)))?;
                    parts.push(Part::Literal(Literal::from(constant.clone())));
                }
            }
            if !text.is_empty() {
                parts.push(Part::Literal(Literal::String(text)));
            }
            if next_arg != arg_count {
                return Err(shape(format!("recipe {:?} with {} arguments", recipe, arg_count)));
            }
            Ok(parts)
        }
        _ => Ok(Vec::new()),
    }
}
