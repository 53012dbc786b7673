//! Full-traversal consistency checker.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{invariant, Result};
use crate::ir::{BlockId, Ir, LabelId, Owner, Slot, StmtId, ValueId, VarId};

#[derive(Default)]
struct Expected {
    producers: BTreeSet<ValueId>,
    expr_consumers: BTreeSet<ValueId>,
    stmt_consumers: BTreeSet<ValueId>,
}

/// Verifies list links, label integrity, slot parentage and identifier
/// producer/consumer sets for everything reachable from `root`.
pub fn check(ir: &Ir, root: BlockId) -> Result<()> {
    let mut expected: BTreeMap<VarId, Expected> = BTreeMap::new();
    let mut seen_labels: HashSet<LabelId> = HashSet::new();
    let mut live_stmts: HashSet<StmtId> = HashSet::new();
    check_block(ir, root, &mut expected, &mut seen_labels, &mut live_stmts)?;

    for index in 0..ir.label_count() {
        let label = LabelId(index as u32);
        let node = ir.label(label);
        if let Some(target) = node.target() {
            if !live_stmts.contains(&target) {
                return Err(invariant!("{} is placed on dead statement {}", label, target));
            }
            if !seen_labels.contains(&label) {
                return Err(invariant!("{} claims {} but the statement does not list it", label, target));
            }
        }
        for user in node.users() {
            if !live_stmts.contains(user) || !ir.stmt_kind(*user).jump_targets().contains(&label) {
                return Err(invariant!("{} lists {} as a user but it does not jump there", label, user));
            }
            if node.target().is_none() {
                return Err(invariant!("{} is jumped to by {} but not placed", label, user));
            }
        }
    }

    for index in 0..ir.var_count() {
        let var = VarId(index as u32);
        let root_var = ir.root_var(var);
        let node = &ir.vars[var.index()];
        if root_var != var {
            if !node.producers().is_empty() || node.consumer_count() != 0 {
                return Err(invariant!("merged identifier {} still holds references", var));
            }
            continue;
        }
        let want = expected.remove(&var).unwrap_or_default();
        if node.producers() != &want.producers {
            return Err(invariant!(
                "{} producers {:?} differ from the tree {:?}",
                var,
                node.producers(),
                want.producers
            ));
        }
        if node.expr_consumers() != &want.expr_consumers || node.stmt_consumers() != &want.stmt_consumers {
            return Err(invariant!(
                "{} consumers {:?}/{:?} differ from the tree {:?}/{:?}",
                var,
                node.stmt_consumers(),
                node.expr_consumers(),
                want.stmt_consumers,
                want.expr_consumers
            ));
        }
    }
    Ok(())
}

fn check_block(
    ir: &Ir,
    block: BlockId,
    expected: &mut BTreeMap<VarId, Expected>,
    seen_labels: &mut HashSet<LabelId>,
    live_stmts: &mut HashSet<StmtId>,
) -> Result<()> {
    let node = ir.block(block);
    let mut previous = node.begin();
    let mut current = ir.next(previous);
    loop {
        let stmt = current.ok_or_else(|| invariant!("{} is not terminated by its end sentinel", block))?;
        let stmt_node = ir.stmt(stmt);
        if ir.prev(stmt) != Some(previous) {
            return Err(invariant!("{} has a stale back link", stmt));
        }
        if !stmt_node.is_alive() || stmt_node.block() != block {
            return Err(invariant!("{} is dead or filed under the wrong block", stmt));
        }
        if stmt == node.end() {
            break;
        }
        if stmt_node.kind().is_sentinel() {
            return Err(invariant!("stray sentinel {} inside {}", stmt, block));
        }
        if !live_stmts.insert(stmt) {
            return Err(invariant!("{} is linked twice", stmt));
        }
        for label in stmt_node.labels() {
            if ir.label_target(*label) != Some(stmt) || !seen_labels.insert(*label) {
                return Err(invariant!("{} on {} is inconsistent", label, stmt));
            }
        }
        for label in stmt_node.kind().jump_targets() {
            if !ir.label(label).users().contains(&stmt) {
                return Err(invariant!("{} jumps to {} but is not a registered user", stmt, label));
            }
        }
        for (index, operand) in stmt_node.kind().operands().into_iter().enumerate() {
            check_value(ir, operand, Slot::of_stmt(stmt, index), expected)?;
        }
        for child in stmt_node.kind().child_blocks() {
            if ir.block(child).owner() != Some(stmt) {
                return Err(invariant!("{} does not record {} as its owner", child, stmt));
            }
            check_block(ir, child, expected, seen_labels, live_stmts)?;
        }
        previous = stmt;
        current = ir.next(stmt);
    }
    if ir.next(node.end()).is_some() {
        return Err(invariant!("{} continues past its end sentinel", block));
    }
    Ok(())
}

fn check_value(ir: &Ir, value: ValueId, slot: Slot, expected: &mut BTreeMap<VarId, Expected>) -> Result<()> {
    let node = ir.value(value);
    if !node.is_alive() {
        return Err(invariant!("dead value {} is reachable from {:?}", value, slot));
    }
    if node.parent() != Some(slot) {
        return Err(invariant!("{} sits in {:?} but records {:?}", value, slot, node.parent()));
    }
    if let Some(var) = ir.ref_var(value) {
        if node.kind().var() != Some(var) {
            return Err(invariant!("{} refers to a merged identifier", value));
        }
        let role = ir.slot_role(slot);
        let entry = expected.entry(var).or_default();
        if role.writes() {
            entry.producers.insert(value);
        }
        if role.reads() {
            if matches!(slot.owner, Owner::Stmt(_)) {
                entry.stmt_consumers.insert(value);
            } else {
                entry.expr_consumers.insert(value);
            }
        }
    }
    for (index, operand) in node.kind().operands().into_iter().enumerate() {
        check_value(ir, operand, Slot::of_value(value, index), expected)?;
    }
    Ok(())
}
