use log::debug;

use super::{between, block_of, find_after, is_closed_except};
use crate::error::Result;
use crate::ir::{Ir, RegionId, StmtId, StmtKind, ValueId, ValueKind, VarId};
use crate::optimizer::{continues_to, excise, next_stmt, ControlFlowOptimizer, Context};

/// Rebuilds `synchronized` from the monitor skeleton javac emits:
///
/// ```text
///     monitorenter(l = o);
///     try-start A;
///     body
///     monitorexit(l);
///     try-end A;
///     goto J;
///     try-start B;
///     catch (A, B) e;
///     monitorexit(l);
///     try-end B;
///     throw e;
/// J:  ...
/// ```
///
/// into `synchronized (o) { body }`. The lock local must be written once and
/// read by the two exits only.
pub struct SynchronizedBlock;

struct Skeleton {
    assign: ValueId,
    body: Vec<StmtId>,
    rest: Vec<StmtId>,
}

impl ControlFlowOptimizer for SynchronizedBlock {
    fn name(&self) -> &'static str {
        "synchronized_block"
    }

    fn apply(&self, ir: &mut Ir, _cx: &Context<'_>, stmt: StmtId) -> Result<bool> {
        let Some(skeleton) = match_skeleton(ir, stmt) else {
            return Ok(false);
        };
        if !is_closed_except(ir, &skeleton.body, &[]) {
            return Ok(false);
        }
        if skeleton.rest.iter().any(|stmt| ir.has_used_labels(*stmt)) {
            return Ok(false);
        }

        let lock = ir.take_operand(skeleton.assign, 1)?;
        let body = block_of(ir, &skeleton.body)?;
        let line = ir.stmt(stmt).line();
        let sync = ir.insert_before(stmt, StmtKind::Synchronized { lock, body }, line)?;
        ir.carry_labels(stmt, sync)?;
        ir.remove_stmt(stmt)?;
        for part in skeleton.rest {
            excise(ir, part)?;
        }
        debug!("synchronized block at {} with {} statements", sync, skeleton.body.len());
        Ok(true)
    }
}

fn match_skeleton(ir: &Ir, enter: StmtId) -> Option<Skeleton> {
    let StmtKind::MonitorEnter { lock: assign } = ir.stmt_kind(enter) else {
        return None;
    };
    let ValueKind::Assign { target, .. } = ir.value_kind(*assign) else {
        return None;
    };
    let ValueKind::Local(_) = ir.value_kind(*target) else {
        return None;
    };
    let lock = ir.ref_var(*target)?;
    let node = ir.var(lock);
    if node.producers().len() != 1 || node.consumer_count() != 2 {
        return None;
    }

    let start = next_stmt(ir, enter)?;
    let StmtKind::TryStart { region: guarded } = ir.stmt_kind(start) else {
        return None;
    };
    let guarded = *guarded;
    let exit = find_after(ir, start, |ir, candidate| {
        is_exit(ir, candidate, lock) && next_stmt(ir, candidate).map_or(false, |next| is_end(ir, next, guarded))
    })?;
    let body = between(ir, start, exit);

    let guarded_end = next_stmt(ir, exit)?;
    let jump = next_stmt(ir, guarded_end)?;
    let StmtKind::Goto { target: after } = ir.stmt_kind(jump) else {
        return None;
    };
    let after = *after;
    let handler_start = next_stmt(ir, jump)?;
    let StmtKind::TryStart { region: handler } = ir.stmt_kind(handler_start) else {
        return None;
    };
    let handler = *handler;
    let catch = next_stmt(ir, handler_start)?;
    let StmtKind::Catch { regions, exception } = ir.stmt_kind(catch) else {
        return None;
    };
    if !regions.contains(&guarded) || regions.iter().any(|region| *region != guarded && *region != handler) {
        return None;
    }
    let ValueKind::Local(_) = ir.value_kind(*exception) else {
        return None;
    };
    let exception = ir.ref_var(*exception)?;
    let handler_exit = next_stmt(ir, catch)?;
    if !is_exit(ir, handler_exit, lock) {
        return None;
    }
    let handler_end = next_stmt(ir, handler_exit)?;
    if !is_end(ir, handler_end, handler) {
        return None;
    }
    let rethrow = next_stmt(ir, handler_end)?;
    let StmtKind::Throw { value } = ir.stmt_kind(rethrow) else {
        return None;
    };
    if ir.ref_var(*value) != Some(exception) || !matches!(ir.value_kind(*value), ValueKind::Local(_)) {
        return None;
    }
    if !continues_to(ir, rethrow, after) {
        return None;
    }

    Some(Skeleton {
        assign: *assign,
        body,
        rest: vec![
            start,
            exit,
            guarded_end,
            jump,
            handler_start,
            catch,
            handler_exit,
            handler_end,
            rethrow,
        ],
    })
}

fn is_exit(ir: &Ir, stmt: StmtId, lock: VarId) -> bool {
    match ir.stmt_kind(stmt) {
        StmtKind::MonitorExit { lock: value } => {
            matches!(ir.value_kind(*value), ValueKind::Local(_)) && ir.ref_var(*value) == Some(lock)
        }
        _ => false,
    }
}

fn is_end(ir: &Ir, stmt: StmtId, region: RegionId) -> bool {
    matches!(ir.stmt_kind(stmt), StmtKind::TryEnd { region: end } if *end == region)
}
