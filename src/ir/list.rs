use crate::error::{invariant, Result};
use crate::ir::{BlockId, BlockNode, Ir, StmtId, StmtKind, StmtNode};

impl Ir {
    /// Creates an empty block: a linked `BlockBegin`/`BlockEnd` pair.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let begin = StmtId(self.stmts.len() as u32);
        let end = StmtId(begin.0 + 1);
        self.stmts.push(StmtNode {
            kind: StmtKind::BlockBegin,
            block: id,
            prev: None,
            next: Some(end),
            labels: Vec::new(),
            line: None,
            alive: true,
        });
        self.stmts.push(StmtNode {
            kind: StmtKind::BlockEnd,
            block: id,
            prev: Some(begin),
            next: None,
            labels: Vec::new(),
            line: None,
            alive: true,
        });
        self.blocks.push(BlockNode {
            begin,
            end,
            owner: None,
        });
        id
    }

    pub fn next(&self, stmt: StmtId) -> Option<StmtId> {
        self.stmt(stmt).next
    }

    pub fn prev(&self, stmt: StmtId) -> Option<StmtId> {
        self.stmt(stmt).prev
    }

    /// Statements of `block` in order, sentinels excluded.
    pub fn block_stmts(&self, block: BlockId) -> Vec<StmtId> {
        let node = self.block(block);
        let mut out = Vec::new();
        let mut current = self.next(node.begin);
        while let Some(stmt) = current {
            if stmt == node.end {
                break;
            }
            out.push(stmt);
            current = self.next(stmt);
        }
        out
    }

    /// Every statement reachable from `block`, each structured statement
    /// before the contents of its child blocks.
    pub fn walk(&self, block: BlockId) -> Vec<StmtId> {
        let mut out = Vec::new();
        self.walk_into(block, &mut out);
        out
    }

    fn walk_into(&self, block: BlockId, out: &mut Vec<StmtId>) {
        for stmt in self.block_stmts(block) {
            out.push(stmt);
            for child in self.stmt_kind(stmt).child_blocks() {
                self.walk_into(child, out);
            }
        }
    }

    /// Links a new statement before `anchor` and adopts its operands and
    /// child blocks.
    pub fn insert_before(&mut self, anchor: StmtId, kind: StmtKind, line: Option<u32>) -> Result<StmtId> {
        if matches!(self.stmt_kind(anchor), StmtKind::BlockBegin) || !self.stmt(anchor).alive {
            return Err(invariant!("cannot insert before {}", anchor));
        }
        for child in kind.child_blocks() {
            if self.block(child).owner.is_some() {
                return Err(invariant!("{} already has an owner", child));
            }
        }
        let id = StmtId(self.stmts.len() as u32);
        let prev = self.prev(anchor);
        let block = self.stmt(anchor).block;
        let targets = kind.jump_targets();
        let children = kind.child_blocks();
        self.stmts.push(StmtNode {
            kind,
            block,
            prev,
            next: Some(anchor),
            labels: Vec::new(),
            line,
            alive: true,
        });
        if let Some(prev) = prev {
            self.stmts[prev.index()].next = Some(id);
        }
        self.stmts[anchor.index()].prev = Some(id);
        for target in targets {
            self.labels[target.index()].users.insert(id);
        }
        for child in children {
            self.blocks[child.index()].owner = Some(id);
        }
        if let Err(err) = self.attach_stmt_operands(id) {
            self.unlink(id);
            self.stmts[id.index()].alive = false;
            return Err(err);
        }
        Ok(id)
    }

    pub fn insert_after(&mut self, anchor: StmtId, kind: StmtKind, line: Option<u32>) -> Result<StmtId> {
        let next = self
            .next(anchor)
            .ok_or_else(|| invariant!("cannot insert after {}", anchor))?;
        self.insert_before(next, kind, line)
    }

    /// Appends at the end of `block`.
    pub fn push(&mut self, block: BlockId, kind: StmtKind, line: Option<u32>) -> Result<StmtId> {
        let end = self.block(block).end;
        self.insert_before(end, kind, line)
    }

    fn unlink(&mut self, stmt: StmtId) {
        let (prev, next) = (self.stmt(stmt).prev, self.stmt(stmt).next);
        if let Some(prev) = prev {
            self.stmts[prev.index()].next = next;
        }
        if let Some(next) = next {
            self.stmts[next.index()].prev = prev;
        }
        let node = &mut self.stmts[stmt.index()];
        node.prev = None;
        node.next = None;
    }

    /// Unlinks and destroys a statement and everything it owns.
    ///
    /// Labels placed on the statement must have been moved or dropped first.
    pub fn remove_stmt(&mut self, stmt: StmtId) -> Result<()> {
        let node = self.stmt(stmt);
        if node.kind.is_sentinel() || !node.alive {
            return Err(invariant!("cannot remove {}", stmt));
        }
        if !node.labels.is_empty() {
            return Err(invariant!("{} still carries labels {:?}", stmt, node.labels));
        }
        for child in self.stmt_kind(stmt).child_blocks() {
            for inner in self.block_stmts(child) {
                self.drop_unused_labels(inner);
                self.remove_stmt(inner)?;
            }
        }
        for target in self.stmt_kind(stmt).jump_targets() {
            self.labels[target.index()].users.remove(&stmt);
        }
        self.detach_stmt_operands(stmt)?;
        self.unlink(stmt);
        self.stmts[stmt.index()].alive = false;
        Ok(())
    }

    /// Statements from `first` to `last` inclusive; both must share a block.
    pub fn span(&self, first: StmtId, last: StmtId) -> Result<Vec<StmtId>> {
        let mut out = Vec::new();
        let mut current = Some(first);
        while let Some(stmt) = current {
            if self.stmt_kind(stmt).is_sentinel() {
                break;
            }
            out.push(stmt);
            if stmt == last {
                return Ok(out);
            }
            current = self.next(stmt);
        }
        Err(invariant!("{} does not follow {} in the same block", last, first))
    }

    /// Moves `first..=last` to the end of `dest`. Registration is unchanged
    /// since the statements stay live.
    pub fn move_span(&mut self, first: StmtId, last: StmtId, dest: BlockId) -> Result<()> {
        let stmts = self.span(first, last)?;
        let before = self.prev(first);
        let after = self.next(last);
        if let Some(before) = before {
            self.stmts[before.index()].next = after;
        }
        if let Some(after) = after {
            self.stmts[after.index()].prev = before;
        }

        let end = self.block(dest).end;
        let tail = self.prev(end);
        self.stmts[first.index()].prev = tail;
        if let Some(tail) = tail {
            self.stmts[tail.index()].next = Some(first);
        }
        self.stmts[last.index()].next = Some(end);
        self.stmts[end.index()].prev = Some(last);
        for stmt in stmts {
            self.stmts[stmt.index()].block = dest;
        }
        Ok(())
    }

    /// Replaces a statement's kind in place, keeping its position and labels.
    ///
    /// The old operands are discarded; the new ones must be free values.
    pub fn rewrite_stmt(&mut self, stmt: StmtId, kind: StmtKind) -> Result<()> {
        if self.stmt_kind(stmt).is_sentinel() || !self.stmt_kind(stmt).child_blocks().is_empty() {
            return Err(invariant!("{} cannot be rewritten in place", stmt));
        }
        if !kind.child_blocks().is_empty() {
            return Err(invariant!("in-place rewrite of {} cannot add blocks", stmt));
        }
        for target in self.stmt_kind(stmt).jump_targets() {
            self.labels[target.index()].users.remove(&stmt);
        }
        self.detach_stmt_operands(stmt)?;
        let targets = kind.jump_targets();
        self.stmts[stmt.index()].kind = kind;
        for target in targets {
            self.labels[target.index()].users.insert(stmt);
        }
        self.attach_stmt_operands(stmt)
    }

    /// The statement owning `block`, if it is nested.
    pub fn owner_of(&self, block: BlockId) -> Option<StmtId> {
        self.block(block).owner
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Ir, StmtKind};

    #[test]
    fn test_insert_and_remove_keep_links() {
        let mut ir = Ir::new();
        let body = ir.new_block();
        let a = ir.push(body, StmtKind::ReturnVoid, Some(1)).unwrap();
        let b = ir.insert_before(a, StmtKind::ReturnVoid, Some(2)).unwrap();
        let c = ir.insert_after(a, StmtKind::ReturnVoid, None).unwrap();
        assert_eq!(ir.block_stmts(body), vec![b, a, c]);

        ir.remove_stmt(a).unwrap();
        assert_eq!(ir.block_stmts(body), vec![b, c]);
        assert_eq!(ir.next(b), Some(c));
        assert_eq!(ir.prev(c), Some(b));
        assert!(ir.remove_stmt(ir.block(body).begin()).is_err());
        crate::ir::check(&ir, body).unwrap();
    }

    #[test]
    fn test_move_span_into_nested_block() {
        let mut ir = Ir::new();
        let body = ir.new_block();
        let stmts: Vec<_> = (0..4)
            .map(|line| ir.push(body, StmtKind::ReturnVoid, Some(line)).unwrap())
            .collect();
        let inner = ir.new_block();
        ir.move_span(stmts[1], stmts[2], inner).unwrap();
        assert_eq!(ir.block_stmts(body), vec![stmts[0], stmts[3]]);
        assert_eq!(ir.block_stmts(inner), vec![stmts[1], stmts[2]]);
        assert_eq!(ir.stmt(stmts[1]).block(), inner);
        assert!(ir.span(stmts[3], stmts[0]).is_err());
    }
}
