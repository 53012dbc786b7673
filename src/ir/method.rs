use crate::error::Result;
use crate::ir::{BlockId, Ir, StmtId, VarId};
use crate::types::MethodHeader;

/// One row of the method's local variable debug table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub slot: u16,
    /// Identifiers the entry was matched to.
    pub vars: Vec<VarId>,
}

/// The generator's output: a method body as one IR arena.
#[derive(Clone, Debug)]
pub struct StatementsMethod {
    pub header: MethodHeader,
    pub ir: Ir,
    pub body: BlockId,
    pub locals: Vec<LocalVariableEntry>,
    /// Identifiers of the entry locals, `this` first for instance methods.
    pub params: Vec<VarId>,
}

impl StatementsMethod {
    /// Top-level statements, sentinels excluded.
    pub fn statements(&self) -> Vec<StmtId> {
        self.ir.block_stmts(self.body)
    }

    /// Runs the consistency checker over the whole body.
    pub fn check(&self) -> Result<()> {
        super::check(&self.ir, self.body)
    }

    pub fn dump(&self) -> String {
        self.ir.dump(self.body)
    }

    /// The identifier of `this`, for instance methods.
    pub fn this_var(&self) -> Option<VarId> {
        if self.header.is_static() {
            None
        } else {
            self.params.first().copied()
        }
    }
}
