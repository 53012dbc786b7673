use crate::error::{invariant, Result};
use crate::ir::{Ir, Owner, Slot, SlotRole, StmtId, ValueId, ValueKind, ValueNode, VarId};

impl Ir {
    /// The value currently held by `slot`.
    pub fn slot_value(&self, slot: Slot) -> Option<ValueId> {
        match slot.owner {
            Owner::Stmt(stmt) => self.stmt_kind(stmt).operands().get(slot.index).copied(),
            Owner::Value(value) => self.value_kind(value).operands().get(slot.index).copied(),
        }
    }

    pub fn slot_role(&self, slot: Slot) -> SlotRole {
        match slot.owner {
            Owner::Stmt(stmt) => self.stmt_kind(stmt).role(slot.index),
            Owner::Value(value) => self.value_kind(value).role(slot.index),
        }
    }

    pub fn parent(&self, value: ValueId) -> Option<Slot> {
        self.value(value).parent()
    }

    /// The statement whose tree contains `value`, if any.
    pub fn root_stmt(&self, value: ValueId) -> Option<StmtId> {
        let mut current = value;
        loop {
            match self.value(current).parent()?.owner {
                Owner::Stmt(stmt) => return Some(stmt),
                Owner::Value(parent) => current = parent,
            }
        }
    }

    /// True when `value` hangs, directly or not, off a live statement.
    pub fn is_attached(&self, value: ValueId) -> bool {
        self.root_stmt(value)
            .map_or(false, |stmt| self.stmt(stmt).is_alive())
    }

    fn slot_attached(&self, slot: Slot) -> bool {
        match slot.owner {
            Owner::Stmt(stmt) => self.stmt(stmt).is_alive(),
            Owner::Value(value) => self.is_attached(value),
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> Option<&mut ValueId> {
        match slot.owner {
            Owner::Stmt(stmt) => self.stmts[stmt.index()]
                .kind
                .operands_mut()
                .into_iter()
                .nth(slot.index),
            Owner::Value(value) => self.values[value.index()]
                .kind
                .operands_mut()
                .into_iter()
                .nth(slot.index),
        }
    }

    /// Puts `value` into `slot` and returns the detached previous occupant.
    ///
    /// This is the only way a slot changes: both subtrees are re-registered
    /// with their identifiers when the slot belongs to a live statement.
    pub fn set_slot(&mut self, slot: Slot, value: ValueId) -> Result<ValueId> {
        let node = self.value(value);
        if !node.is_alive() || node.parent().is_some() {
            return Err(invariant!("{} is not a free value and cannot be stored in {:?}", value, slot));
        }
        let old = self
            .slot_value(slot)
            .ok_or_else(|| invariant!("slot {:?} does not exist", slot))?;
        let attached = self.slot_attached(slot);
        if attached {
            self.register_subtree(old, false);
        }
        self.values[old.index()].parent = None;
        if let Some(cell) = self.slot_mut(slot) {
            *cell = value;
        }
        self.values[value.index()].parent = Some(slot);
        if attached {
            self.register_subtree(value, true);
        }
        Ok(old)
    }

    /// Detaches the value in `slot`, leaving a placeholder behind.
    pub fn take(&mut self, slot: Slot) -> Result<ValueId> {
        let old = self
            .slot_value(slot)
            .ok_or_else(|| invariant!("slot {:?} does not exist", slot))?;
        let category = self.category(old);
        let placeholder = self.new_value(ValueKind::Placeholder, category)?;
        self.set_slot(slot, placeholder)
    }

    /// Takes the value out of operand `index` of `owner`.
    pub fn take_operand(&mut self, owner: ValueId, index: usize) -> Result<ValueId> {
        self.take(Slot::of_value(owner, index))
    }

    /// Substitutes `new` for `old` in `old`'s slot and discards `old`.
    pub fn replace_value(&mut self, old: ValueId, new: ValueId) -> Result<()> {
        let slot = self
            .parent(old)
            .ok_or_else(|| invariant!("{} has no slot to replace", old))?;
        let removed = self.set_slot(slot, new)?;
        self.discard(removed)
    }

    /// Marks a detached subtree dead.
    pub fn discard(&mut self, value: ValueId) -> Result<()> {
        if self.value(value).parent().is_some() {
            return Err(invariant!("{} is still held by a slot", value));
        }
        let mut pending = vec![value];
        while let Some(current) = pending.pop() {
            let node: &mut ValueNode = &mut self.values[current.index()];
            node.alive = false;
            pending.extend(node.kind.operands());
        }
        Ok(())
    }

    fn register_subtree(&mut self, root: ValueId, attach: bool) {
        let mut pending = vec![root];
        while let Some(current) = pending.pop() {
            if self.value_kind(current).is_var_ref() {
                self.register_ref(current, attach);
            }
            pending.extend(self.value_kind(current).operands());
        }
    }

    fn register_ref(&mut self, value: ValueId, attach: bool) {
        let (Some(var), Some(slot)) = (self.value_kind(value).var(), self.parent(value)) else {
            return;
        };
        let role = self.slot_role(slot);
        let in_stmt = matches!(slot.owner, Owner::Stmt(_));
        if role.writes() {
            if attach {
                self.insert_producer(var, value);
            } else {
                self.remove_producer(var, value);
            }
        }
        if role.reads() {
            if attach {
                self.insert_consumer(var, value, in_stmt);
            } else {
                self.remove_consumer(var, value);
            }
        }
    }

    pub(crate) fn retarget_ref(&mut self, value: ValueId, var: VarId) {
        match &mut self.values[value.index()].kind {
            ValueKind::Local(current) | ValueKind::Stack(current) => *current = var,
            _ => {}
        }
    }

    /// Adopts and registers the operands of a freshly linked statement.
    pub(crate) fn attach_stmt_operands(&mut self, stmt: StmtId) -> Result<()> {
        let operands = self.stmt_kind(stmt).operands();
        for operand in &operands {
            let node = self.value(*operand);
            if !node.is_alive() || node.parent().is_some() {
                return Err(invariant!("{} is not a free value and cannot be used by {}", operand, stmt));
            }
        }
        for (index, operand) in operands.into_iter().enumerate() {
            self.values[operand.index()].parent = Some(Slot::of_stmt(stmt, index));
            self.register_subtree(operand, true);
        }
        Ok(())
    }

    /// Unregisters and discards every operand of a statement being removed.
    pub(crate) fn detach_stmt_operands(&mut self, stmt: StmtId) -> Result<()> {
        for operand in self.stmt_kind(stmt).operands() {
            self.register_subtree(operand, false);
            self.values[operand.index()].parent = None;
            self.discard(operand)?;
        }
        Ok(())
    }

    /// Detaches operand `index` of a statement, leaving a placeholder.
    pub fn take_stmt_operand(&mut self, stmt: StmtId, index: usize) -> Result<ValueId> {
        self.take(Slot::of_stmt(stmt, index))
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Ir, Literal, Slot, StmtKind, ValueKind, VarKind};
    use crate::types::StackCategory;

    #[test]
    fn test_set_slot_transfers_consumers() {
        let mut ir = Ir::new();
        let body = ir.new_block();
        let end = ir.block(body).end();
        let a = ir.new_var(VarKind::Stack, StackCategory::Int, None);
        let b = ir.new_var(VarKind::Stack, StackCategory::Int, None);

        let read_a = ir.var_ref(a);
        let ret = ir
            .insert_before(end, StmtKind::ReturnValue { value: read_a }, None)
            .unwrap();
        assert_eq!(ir.var(a).stmt_consumers().len(), 1);

        let read_b = ir.var_ref(b);
        let old = ir.set_slot(Slot::of_stmt(ret, 0), read_b).unwrap();
        assert_eq!(old, read_a);
        assert_eq!(ir.var(a).consumer_count(), 0);
        assert_eq!(ir.var(b).stmt_consumers().len(), 1);
        assert!(ir.value(read_a).parent().is_none());
        ir.discard(read_a).unwrap();
        crate::ir::check(&ir, body).unwrap();
    }

    #[test]
    fn test_take_leaves_placeholder_and_roles() {
        let mut ir = Ir::new();
        let body = ir.new_block();
        let end = ir.block(body).end();
        let local = ir.new_var(VarKind::Local { slot: 0 }, StackCategory::Int, None);

        let target = ir.var_ref(local);
        let one = ir.constant(Literal::Int(1));
        let update = ir
            .new_value(
                ValueKind::CompoundAssign {
                    op: crate::ir::BinaryOp::Add,
                    target,
                    value: one,
                },
                Some(StackCategory::Int),
            )
            .unwrap();
        ir.insert_before(end, StmtKind::Expression { value: update }, None)
            .unwrap();
        assert_eq!(ir.var(local).producers().len(), 1);
        assert_eq!(ir.var(local).expr_consumers().len(), 1);

        let taken = ir.take_operand(update, 0).unwrap();
        assert_eq!(taken, target);
        assert!(matches!(
            ir.value_kind(ir.slot_value(Slot::of_value(update, 0)).unwrap()),
            ValueKind::Placeholder
        ));
        assert!(ir.var(local).producers().is_empty());
        assert_eq!(ir.var(local).consumer_count(), 0);
        assert!(ir.set_slot(Slot::of_value(update, 0), update).is_err());
    }
}
