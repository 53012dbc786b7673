//! Control-flow optimizers: goto/label regions into structured statements.
//!
//! Each rewrite builds fresh child blocks, links the structured statement in
//! front of the region, moves the interior spans into the child blocks and
//! removes the jumps it made redundant. Labels still jumped to are carried
//! onto the surviving statement at the region boundary.

mod branch;
mod loops;
mod sync;

use super::{ControlFlowOptimizer, PipelineOptions};
use crate::error::Result;
use crate::ir::{BlockId, Ir, LabelId, StmtId};

pub use branch::{IfElse, IfThen};
pub use loops::{DoWhileLoop, WhileBottomTested, WhileTopTested, WhileTrue};
pub use sync::SynchronizedBlock;

/// The control-flow catalog in priority order.
pub(super) fn catalog(_options: &PipelineOptions) -> Vec<Box<dyn ControlFlowOptimizer>> {
    vec![
        Box::new(SynchronizedBlock),
        Box::new(WhileTopTested),
        Box::new(WhileBottomTested),
        Box::new(DoWhileLoop),
        Box::new(WhileTrue),
        Box::new(IfElse),
        Box::new(IfThen),
    ]
}

/// The first statement after `from` in its block satisfying `found`.
fn find_after(ir: &Ir, from: StmtId, found: impl Fn(&Ir, StmtId) -> bool) -> Option<StmtId> {
    let mut current = ir.next(from)?;
    while !ir.stmt_kind(current).is_sentinel() {
        if found(ir, current) {
            return Some(current);
        }
        current = ir.next(current)?;
    }
    None
}

/// Statements strictly between `first` and `last`, which share a block.
fn between(ir: &Ir, first: StmtId, last: StmtId) -> Vec<StmtId> {
    let mut out = Vec::new();
    let mut current = ir.next(first);
    while let Some(stmt) = current {
        if stmt == last || ir.stmt_kind(stmt).is_sentinel() {
            break;
        }
        out.push(stmt);
        current = ir.next(stmt);
    }
    out
}

/// True when every label inside `stmts`, except those in `exempt`, is only
/// jumped to from inside `stmts`.
fn is_closed_except(ir: &Ir, stmts: &[StmtId], exempt: &[LabelId]) -> bool {
    ir.labels_within(stmts)
        .into_iter()
        .filter(|label| !exempt.contains(label))
        .all(|label| ir.users_within(label, stmts))
}

/// A fresh block holding `stmts`, moved out of their current block.
fn block_of(ir: &mut Ir, stmts: &[StmtId]) -> Result<BlockId> {
    let block = ir.new_block();
    if let (Some(first), Some(last)) = (stmts.first(), stmts.last()) {
        ir.move_span(*first, *last, block)?;
    }
    Ok(block)
}
