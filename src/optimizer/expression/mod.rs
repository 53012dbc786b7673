//! Expression optimizers: in-place rewrites of one value.

mod assign;
mod boolean;
mod compare;
mod concat;
mod constant;

use super::{ExpressionOptimizer, PipelineOptions};

pub use assign::{CompoundAssignment, IncrementExpression};
pub use boolean::{BooleanComparison, BooleanTernary, NotSimplification};
pub use compare::ThreeWayCompare;
pub use concat::StringConcat;
pub use constant::{ConstantField, ConstantRetype};

/// The expression catalog in priority order.
pub(super) fn catalog(options: &PipelineOptions) -> Vec<Box<dyn ExpressionOptimizer>> {
    let mut catalog: Vec<Box<dyn ExpressionOptimizer>> = vec![Box::new(ThreeWayCompare)];
    if options.string_concat {
        catalog.push(Box::new(StringConcat));
    }
    catalog.push(Box::new(BooleanComparison));
    catalog.push(Box::new(BooleanTernary));
    catalog.push(Box::new(NotSimplification));
    catalog.push(Box::new(CompoundAssignment));
    catalog.push(Box::new(IncrementExpression));
    catalog.push(Box::new(ConstantRetype));
    if options.constant_fields {
        catalog.push(Box::new(ConstantField));
    }
    catalog
}
