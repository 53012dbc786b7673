use log::trace;

use crate::error::{invariant, DecompileError, Result};
use crate::ir::{Ir, LabelId, LabelNode, StmtId};

impl Ir {
    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(LabelNode::default());
        id
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn label_target(&self, label: LabelId) -> Option<StmtId> {
        self.label(label).target
    }

    /// Attaches `label` to `stmt`. A label sits on at most one statement.
    pub fn place_label(&mut self, label: LabelId, stmt: StmtId) -> Result<()> {
        if self.label(label).target.is_some() {
            return Err(DecompileError::LabelAlreadyPlaced(label.0));
        }
        if self.stmt_kind(stmt).is_sentinel() || !self.stmt(stmt).is_alive() {
            return Err(invariant!("{} cannot carry label {}", stmt, label));
        }
        self.labels[label.index()].target = Some(stmt);
        self.stmts[stmt.index()].labels.push(label);
        Ok(())
    }

    fn unplace_label(&mut self, label: LabelId) {
        if let Some(stmt) = self.labels[label.index()].target.take() {
            self.stmts[stmt.index()].labels.retain(|l| *l != label);
        }
    }

    /// Detaches a label nobody jumps to any more.
    pub fn drop_label(&mut self, label: LabelId) -> Result<()> {
        if !self.label(label).users.is_empty() {
            return Err(DecompileError::LabelInUse(label.0));
        }
        trace!("dropping unused label {}", label);
        self.unplace_label(label);
        Ok(())
    }

    /// True when some statement still jumps to `label`.
    pub fn label_in_use(&self, label: LabelId) -> bool {
        !self.label(label).users.is_empty()
    }

    /// Drops every label on `stmt` that has no users.
    pub fn drop_unused_labels(&mut self, stmt: StmtId) {
        let unused: Vec<LabelId> = self
            .stmt(stmt)
            .labels
            .iter()
            .copied()
            .filter(|label| self.label(*label).users.is_empty())
            .collect();
        for label in unused {
            self.unplace_label(label);
        }
    }

    /// True when `stmt` carries a label that is still jumped to.
    pub fn has_used_labels(&self, stmt: StmtId) -> bool {
        self.stmt(stmt)
            .labels
            .iter()
            .any(|label| self.label_in_use(*label))
    }

    /// Moves the labels of `from` that are still in use onto `to` and drops
    /// the rest.
    pub fn carry_labels(&mut self, from: StmtId, to: StmtId) -> Result<()> {
        if from == to {
            return Ok(());
        }
        self.drop_unused_labels(from);
        let labels = std::mem::take(&mut self.stmts[from.index()].labels);
        for label in labels {
            self.labels[label.index()].target = None;
            self.place_label(label, to)?;
        }
        Ok(())
    }

    /// Every user of `label` lies among `stmts` or inside their child blocks.
    pub fn users_within(&self, label: LabelId, stmts: &[StmtId]) -> bool {
        self.label(label)
            .users
            .iter()
            .all(|user| stmts.iter().any(|stmt| self.encloses(*stmt, *user)))
    }

    /// True when `inner` is `outer` or nested anywhere inside it.
    pub fn encloses(&self, outer: StmtId, inner: StmtId) -> bool {
        let mut current = inner;
        loop {
            if current == outer {
                return true;
            }
            match self.owner_of(self.stmt(current).block()) {
                Some(owner) => current = owner,
                None => return false,
            }
        }
    }

    /// Labels placed on `stmts` or on any statement nested inside them.
    pub fn labels_within(&self, stmts: &[StmtId]) -> Vec<LabelId> {
        let mut out = Vec::new();
        for stmt in stmts {
            out.extend(self.stmt(*stmt).labels.iter().copied());
            for child in self.stmt_kind(*stmt).child_blocks() {
                for inner in self.walk(child) {
                    out.extend(self.stmt(inner).labels.iter().copied());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::error::DecompileError;
    use crate::ir::{Ir, StmtKind};

    #[test]
    fn test_label_placement_rules() {
        let mut ir = Ir::new();
        let body = ir.new_block();
        let first = ir.push(body, StmtKind::ReturnVoid, None).unwrap();
        let label = ir.new_label();
        let jump = ir
            .insert_before(first, StmtKind::Goto { target: label }, None)
            .unwrap();
        ir.place_label(label, first).unwrap();
        assert!(matches!(
            ir.place_label(label, jump),
            Err(DecompileError::LabelAlreadyPlaced(_))
        ));
        assert!(matches!(ir.drop_label(label), Err(DecompileError::LabelInUse(_))));

        let second = ir.push(body, StmtKind::ReturnVoid, None).unwrap();
        ir.carry_labels(first, second).unwrap();
        assert_eq!(ir.label_target(label), Some(second));
        assert!(ir.stmt(first).labels().is_empty());

        ir.remove_stmt(jump).unwrap();
        assert!(!ir.label_in_use(label));
        ir.drop_label(label).unwrap();
        assert_eq!(ir.label_target(label), None);
        crate::ir::check(&ir, body).unwrap();
    }
}
