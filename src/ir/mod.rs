//! Arena-backed intermediate representation of one method body.
//!
//! Statements, values, labels, variable identifiers and blocks all live in
//! one [`Ir`] and are addressed by small copyable ids. Statements form
//! doubly-linked lists bounded by `BlockBegin`/`BlockEnd` sentinels; values
//! form trees hanging off numbered slots of statements and other values.
//! Slot contents change only through [`Ir::set_slot`] and [`Ir::take`], which
//! keep every identifier's producer and consumer sets in step with the tree.

mod check;
mod dump;
mod label;
mod list;
mod method;
mod slot;
mod statement;
mod value;
mod var;

use std::collections::BTreeSet;

use crate::error::{invariant, Result};
use crate::types::{JvmType, StackCategory};

pub use check::check;
pub use method::{LocalVariableEntry, StatementsMethod};
pub use statement::StmtKind;
pub use value::{BinaryOp, CompareOp, Fixity, InvokeKind, Literal, NanBias, ShiftOp, Step, ValueKind};
pub use var::{DebugLocal, VarKind, VarNode};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(StmtId, "#");
define_id!(ValueId, "%");
define_id!(
    /// A jump target.
    LabelId,
    "L"
);
define_id!(
    /// A variable identifier, shared by every reference to the same slot value.
    VarId,
    "v"
);
define_id!(BlockId, "B");
define_id!(
    /// A try/catch region shared by its start, end and handler markers.
    RegionId,
    "R"
);

/// The node that owns a slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    Stmt(StmtId),
    Value(ValueId),
}

/// One child position of a statement or value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pub owner: Owner,
    pub index: usize,
}

impl Slot {
    pub fn of_stmt(stmt: StmtId, index: usize) -> Slot {
        Slot {
            owner: Owner::Stmt(stmt),
            index,
        }
    }

    pub fn of_value(value: ValueId, index: usize) -> Slot {
        Slot {
            owner: Owner::Value(value),
            index,
        }
    }
}

/// Whether a slot reads, writes or updates the variable referenced in it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlotRole {
    Read,
    Write,
    ReadWrite,
}

impl SlotRole {
    pub fn reads(self) -> bool {
        matches!(self, SlotRole::Read | SlotRole::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, SlotRole::Write | SlotRole::ReadWrite)
    }
}

#[derive(Clone, Debug)]
pub struct StmtNode {
    kind: StmtKind,
    block: BlockId,
    prev: Option<StmtId>,
    next: Option<StmtId>,
    labels: Vec<LabelId>,
    line: Option<u32>,
    alive: bool,
}

impl StmtNode {
    pub fn kind(&self) -> &StmtKind {
        &self.kind
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Labels placed on this statement.
    pub fn labels(&self) -> &[LabelId] {
        &self.labels
    }

    /// Source line, `None` for synthetic statements.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

#[derive(Clone, Debug)]
pub struct ValueNode {
    kind: ValueKind,
    category: Option<StackCategory>,
    parent: Option<Slot>,
    alive: bool,
}

impl ValueNode {
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// Stack category of the result, `None` only for void invocations.
    pub fn category(&self) -> Option<StackCategory> {
        self.category
    }

    pub fn parent(&self) -> Option<Slot> {
        self.parent
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

#[derive(Clone, Debug, Default)]
pub struct LabelNode {
    target: Option<StmtId>,
    users: BTreeSet<StmtId>,
}

impl LabelNode {
    pub fn target(&self) -> Option<StmtId> {
        self.target
    }

    /// Statements that may jump to this label.
    pub fn users(&self) -> &BTreeSet<StmtId> {
        &self.users
    }
}

#[derive(Clone, Debug)]
pub struct BlockNode {
    begin: StmtId,
    end: StmtId,
    owner: Option<StmtId>,
}

impl BlockNode {
    pub fn begin(&self) -> StmtId {
        self.begin
    }

    pub fn end(&self) -> StmtId {
        self.end
    }

    /// The structured statement owning this block, `None` for a method body.
    pub fn owner(&self) -> Option<StmtId> {
        self.owner
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionInfo {
    /// Internal name of the caught class, `None` for catch-all.
    pub catch_type: Option<String>,
}

/// Owns every node of one method's IR. Id counters are local to the arena.
#[derive(Clone, Debug, Default)]
pub struct Ir {
    stmts: Vec<StmtNode>,
    values: Vec<ValueNode>,
    labels: Vec<LabelNode>,
    vars: Vec<VarNode>,
    blocks: Vec<BlockNode>,
    regions: Vec<RegionInfo>,
}

impl Ir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stmt(&self, id: StmtId) -> &StmtNode {
        &self.stmts[id.index()]
    }

    pub fn stmt_kind(&self, id: StmtId) -> &StmtKind {
        &self.stmts[id.index()].kind
    }

    pub fn value(&self, id: ValueId) -> &ValueNode {
        &self.values[id.index()]
    }

    pub fn value_kind(&self, id: ValueId) -> &ValueKind {
        &self.values[id.index()].kind
    }

    pub fn category(&self, id: ValueId) -> Option<StackCategory> {
        self.values[id.index()].category
    }

    pub fn label(&self, id: LabelId) -> &LabelNode {
        &self.labels[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &BlockNode {
        &self.blocks[id.index()]
    }

    pub fn region(&self, id: RegionId) -> &RegionInfo {
        &self.regions[id.index()]
    }

    pub fn new_region(&mut self, catch_type: Option<&str>) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(RegionInfo {
            catch_type: catch_type.map(str::to_string),
        });
        id
    }

    /// Number of live statements, sentinels excluded.
    pub fn live_stmt_count(&self) -> usize {
        self.stmts
            .iter()
            .filter(|s| s.alive && !s.kind.is_sentinel())
            .count()
    }

    /// Number of live value nodes, attached or not.
    pub fn live_value_count(&self) -> usize {
        self.values.iter().filter(|v| v.alive).count()
    }

    /// Creates a detached value that adopts `kind`'s operands.
    ///
    /// Every operand must be a live detached value.
    pub fn new_value(&mut self, kind: ValueKind, category: Option<StackCategory>) -> Result<ValueId> {
        let id = ValueId(self.values.len() as u32);
        let operands = kind.operands();
        for operand in &operands {
            let node = &self.values[operand.index()];
            if !node.alive || node.parent.is_some() {
                return Err(invariant!("{} is not a free value and cannot become a child of {}", operand, id));
            }
        }
        for (index, operand) in operands.into_iter().enumerate() {
            self.values[operand.index()].parent = Some(Slot::of_value(id, index));
        }
        self.values.push(ValueNode {
            kind,
            category,
            parent: None,
            alive: true,
        });
        Ok(id)
    }

    pub fn constant(&mut self, literal: Literal) -> ValueId {
        let category = literal.category();
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueNode {
            kind: ValueKind::Constant(literal),
            category: Some(category),
            parent: None,
            alive: true,
        });
        id
    }

    /// A fresh detached reference to `var`, local or stack by its kind.
    pub fn var_ref(&mut self, var: VarId) -> ValueId {
        let root = self.root_var(var);
        let node = self.var(root);
        let category = node.category();
        let kind = match node.kind() {
            VarKind::Local { .. } => ValueKind::Local(root),
            VarKind::Stack => ValueKind::Stack(root),
        };
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueNode {
            kind,
            category: Some(category),
            parent: None,
            alive: true,
        });
        id
    }

    /// The root identifier referenced by a local or stack value.
    pub fn ref_var(&self, value: ValueId) -> Option<VarId> {
        self.value_kind(value).var().map(|var| self.root_var(var))
    }

    /// Best-effort static type of a value.
    pub fn value_type(&self, value: ValueId) -> Option<JvmType> {
        match self.value_kind(value) {
            ValueKind::Constant(literal) => literal.literal_type(),
            ValueKind::Local(var) | ValueKind::Stack(var) => self.var(*var).declared_type().cloned(),
            ValueKind::ArrayElement { array, .. } => match self.value_type(*array) {
                Some(JvmType::Array(element)) => Some(*element),
                _ => None,
            },
            ValueKind::Binary { lhs, .. } | ValueKind::Shift { lhs, .. } => {
                match (self.value_type(*lhs), self.category(value)) {
                    (Some(JvmType::Boolean), Some(StackCategory::Int)) => Some(JvmType::Boolean),
                    (_, category) => category.and_then(category_type),
                }
            }
            ValueKind::Negate { operand } => self.category(*operand).and_then(category_type),
            ValueKind::Cast { target, .. } => Some(target.clone()),
            ValueKind::LongCompare { .. } | ValueKind::FloatCompare { .. } => Some(JvmType::Int),
            ValueKind::Condition { .. }
            | ValueKind::InstanceOf { .. }
            | ValueKind::Not { .. }
            | ValueKind::LogicalAnd { .. }
            | ValueKind::LogicalOr { .. } => Some(JvmType::Boolean),
            ValueKind::InstanceField { field, .. } | ValueKind::StaticField { field } => {
                field.field_type().ok()
            }
            ValueKind::Invoke { method, .. } => method.signature().ok().map(|sig| sig.ret),
            ValueKind::InvokeDynamic { call_site, .. } => crate::types::MethodDescriptor::parse(&call_site.descriptor)
                .ok()
                .map(|sig| sig.ret),
            ValueKind::New { class, .. } => Some(JvmType::Reference(class.clone())),
            ValueKind::NewArray { element, .. } => Some(JvmType::Array(Box::new(element.clone()))),
            ValueKind::NewMultiArray { array_type, .. } => Some(array_type.clone()),
            ValueKind::ArrayLength { .. } => Some(JvmType::Int),
            ValueKind::Assign { target, .. }
            | ValueKind::CompoundAssign { target, .. }
            | ValueKind::ShiftAssign { target, .. }
            | ValueKind::Increment { target, .. } => self.value_type(*target),
            ValueKind::Ternary {
                then_value,
                else_value,
                ..
            } => self
                .value_type(*then_value)
                .or_else(|| self.value_type(*else_value)),
            ValueKind::Concat { .. } => Some(JvmType::Reference("java/lang/String".into())),
            ValueKind::NullChecked { operand } => self.value_type(*operand),
            ValueKind::Placeholder => None,
        }
    }

    /// Whether two lvalues name the same storage without any evaluation
    /// that could differ between them.
    pub fn same_lvalue(&self, a: ValueId, b: ValueId) -> bool {
        match (self.value_kind(a), self.value_kind(b)) {
            (ValueKind::Local(_), ValueKind::Local(_)) | (ValueKind::Stack(_), ValueKind::Stack(_)) => {
                self.ref_var(a) == self.ref_var(b)
            }
            (ValueKind::StaticField { field: fa }, ValueKind::StaticField { field: fb }) => fa == fb,
            (
                ValueKind::InstanceField {
                    field: fa,
                    object: oa,
                },
                ValueKind::InstanceField {
                    field: fb,
                    object: ob,
                },
            ) => fa == fb && self.same_operand(*oa, *ob),
            (
                ValueKind::ArrayElement {
                    array: aa,
                    index: ia,
                },
                ValueKind::ArrayElement {
                    array: ab,
                    index: ib,
                },
            ) => self.same_operand(*aa, *ab) && self.same_operand(*ia, *ib),
            _ => false,
        }
    }

    /// Two operands that are the same variable or the same constant.
    fn same_operand(&self, a: ValueId, b: ValueId) -> bool {
        match (self.value_kind(a), self.value_kind(b)) {
            (ValueKind::Constant(la), ValueKind::Constant(lb)) => la == lb,
            (ValueKind::Local(_), ValueKind::Local(_)) | (ValueKind::Stack(_), ValueKind::Stack(_)) => {
                self.ref_var(a) == self.ref_var(b)
            }
            _ => false,
        }
    }

    /// True when evaluating `value` can neither run code nor observe memory
    /// other than the listed locals.
    pub fn is_stable(&self, value: ValueId) -> bool {
        let kind = self.value_kind(value);
        if kind.has_side_effect() || kind.reads_memory() {
            return false;
        }
        kind.operands().into_iter().all(|operand| self.is_stable(operand))
    }

    /// True when evaluating `value` has no side effect, reads included.
    pub fn is_pure(&self, value: ValueId) -> bool {
        let kind = self.value_kind(value);
        if kind.has_side_effect() {
            return false;
        }
        kind.operands().into_iter().all(|operand| self.is_pure(operand))
    }

    /// Root identifiers written anywhere inside `value`.
    pub fn written_vars(&self, value: ValueId) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        self.collect_written(value, &mut out);
        out
    }

    fn collect_written(&self, value: ValueId, out: &mut BTreeSet<VarId>) {
        let kind = self.value_kind(value);
        for (index, operand) in kind.operands().into_iter().enumerate() {
            if kind.role(index).writes() {
                if let Some(var) = self.ref_var(operand) {
                    out.insert(var);
                }
            }
            self.collect_written(operand, out);
        }
    }
}

fn category_type(category: StackCategory) -> Option<JvmType> {
    match category {
        StackCategory::Int => Some(JvmType::Int),
        StackCategory::Long => Some(JvmType::Long),
        StackCategory::Float => Some(JvmType::Float),
        StackCategory::Double => Some(JvmType::Double),
        StackCategory::Reference | StackCategory::ReturnAddress => None,
    }
}
