use crate::ir::{BlockId, LabelId, RegionId, SlotRole, ValueId};

/// Every statement form, flat and structured.
///
/// Field, array and local stores are `Expression` statements holding an
/// `Assign` value.
#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    BlockBegin,
    BlockEnd,
    Expression {
        value: ValueId,
    },
    Goto {
        target: LabelId,
    },
    IfGoto {
        cond: ValueId,
        target: LabelId,
    },
    /// Subroutine call; writes the return address to a stack variable.
    Jsr {
        target: LabelId,
        address: ValueId,
    },
    Ret {
        address: ValueId,
    },
    TableSwitch {
        key: ValueId,
        low: i32,
        default: LabelId,
        targets: Vec<LabelId>,
    },
    LookupSwitch {
        key: ValueId,
        default: LabelId,
        cases: Vec<(i32, LabelId)>,
    },
    ReturnValue {
        value: ValueId,
    },
    ReturnVoid,
    Throw {
        value: ValueId,
    },
    MonitorEnter {
        lock: ValueId,
    },
    MonitorExit {
        lock: ValueId,
    },
    TryStart {
        region: RegionId,
    },
    TryEnd {
        region: RegionId,
    },
    /// Handler entry for every listed region; writes the caught exception.
    Catch {
        regions: Vec<RegionId>,
        exception: ValueId,
    },
    If {
        cond: ValueId,
        then_block: BlockId,
        else_block: Option<BlockId>,
    },
    While {
        cond: ValueId,
        body: BlockId,
    },
    DoWhile {
        body: BlockId,
        cond: ValueId,
    },
    Synchronized {
        lock: ValueId,
        body: BlockId,
    },
}

impl StmtKind {
    /// Child values in slot order.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            StmtKind::BlockBegin
            | StmtKind::BlockEnd
            | StmtKind::Goto { .. }
            | StmtKind::ReturnVoid
            | StmtKind::TryStart { .. }
            | StmtKind::TryEnd { .. } => Vec::new(),
            StmtKind::Expression { value }
            | StmtKind::ReturnValue { value }
            | StmtKind::Throw { value } => vec![*value],
            StmtKind::IfGoto { cond, .. }
            | StmtKind::If { cond, .. }
            | StmtKind::While { cond, .. }
            | StmtKind::DoWhile { cond, .. } => vec![*cond],
            StmtKind::Jsr { address, .. } | StmtKind::Ret { address } => vec![*address],
            StmtKind::TableSwitch { key, .. } | StmtKind::LookupSwitch { key, .. } => vec![*key],
            StmtKind::MonitorEnter { lock }
            | StmtKind::MonitorExit { lock }
            | StmtKind::Synchronized { lock, .. } => vec![*lock],
            StmtKind::Catch { exception, .. } => vec![*exception],
        }
    }

    pub(crate) fn operands_mut(&mut self) -> Vec<&mut ValueId> {
        match self {
            StmtKind::BlockBegin
            | StmtKind::BlockEnd
            | StmtKind::Goto { .. }
            | StmtKind::ReturnVoid
            | StmtKind::TryStart { .. }
            | StmtKind::TryEnd { .. } => Vec::new(),
            StmtKind::Expression { value }
            | StmtKind::ReturnValue { value }
            | StmtKind::Throw { value } => vec![value],
            StmtKind::IfGoto { cond, .. }
            | StmtKind::If { cond, .. }
            | StmtKind::While { cond, .. }
            | StmtKind::DoWhile { cond, .. } => vec![cond],
            StmtKind::Jsr { address, .. } | StmtKind::Ret { address } => vec![address],
            StmtKind::TableSwitch { key, .. } | StmtKind::LookupSwitch { key, .. } => vec![key],
            StmtKind::MonitorEnter { lock }
            | StmtKind::MonitorExit { lock }
            | StmtKind::Synchronized { lock, .. } => vec![lock],
            StmtKind::Catch { exception, .. } => vec![exception],
        }
    }

    pub fn role(&self, index: usize) -> SlotRole {
        match (self, index) {
            (StmtKind::Jsr { .. }, 0) | (StmtKind::Catch { .. }, 0) => SlotRole::Write,
            _ => SlotRole::Read,
        }
    }

    /// Labels this statement may transfer control to.
    pub fn jump_targets(&self) -> Vec<LabelId> {
        match self {
            StmtKind::Goto { target } | StmtKind::IfGoto { target, .. } | StmtKind::Jsr { target, .. } => {
                vec![*target]
            }
            StmtKind::TableSwitch { default, targets, .. } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            StmtKind::LookupSwitch { default, cases, .. } => {
                let mut all = vec![*default];
                all.extend(cases.iter().map(|(_, label)| *label));
                all
            }
            _ => Vec::new(),
        }
    }

    /// Nested blocks owned by structured statements, in source order.
    pub fn child_blocks(&self) -> Vec<BlockId> {
        match self {
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                let mut blocks = vec![*then_block];
                blocks.extend(else_block.iter().copied());
                blocks
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::Synchronized { body, .. } => vec![*body],
            _ => Vec::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, StmtKind::BlockBegin | StmtKind::BlockEnd)
    }

    /// True when control never reaches the following statement.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StmtKind::Goto { .. }
                | StmtKind::Ret { .. }
                | StmtKind::TableSwitch { .. }
                | StmtKind::LookupSwitch { .. }
                | StmtKind::ReturnValue { .. }
                | StmtKind::ReturnVoid
                | StmtKind::Throw { .. }
        )
    }
}
