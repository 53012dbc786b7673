//! Statement optimizers: rewrites over a short window of consecutive
//! statements anchored at one statement.

mod branch;
mod cleanup;
mod inline;
mod null_check;
mod update;

use super::{PipelineOptions, StatementOptimizer};

pub use branch::{LogicalCondition, TernaryValue};
pub use cleanup::{CatchVariable, RedundantGoto, UnusedLabels};
pub use inline::{InlineStackValue, UnusedStackValue};
pub use null_check::NullCheck;
pub use update::{AssignmentChain, PrefixIncrement, SuffixIncrement};

pub(crate) use update::unit_step;

/// The statement catalog in priority order.
pub(super) fn catalog(options: &PipelineOptions) -> Vec<Box<dyn StatementOptimizer>> {
    let mut catalog: Vec<Box<dyn StatementOptimizer>> = vec![
        Box::new(UnusedLabels),
        Box::new(RedundantGoto),
        Box::new(UnusedStackValue),
        Box::new(InlineStackValue),
        Box::new(SuffixIncrement),
        Box::new(PrefixIncrement),
        Box::new(AssignmentChain),
        Box::new(LogicalCondition),
        Box::new(TernaryValue),
        Box::new(CatchVariable),
    ];
    if options.null_checks {
        catalog.push(Box::new(NullCheck));
    }
    catalog
}
