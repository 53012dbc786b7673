use crate::ir::{SlotRole, ValueId, VarId};
use crate::types::{JvmType, StackCategory};
use crate::visitor::{CallSite, ConstantDynamic, FieldRef, Handle, MethodRef};

/// Arithmetic and bitwise operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Shl,
    Shr,
    Ushr,
}

impl ShiftOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ShiftOp::Shl => "<<",
            ShiftOp::Shr => ">>",
            ShiftOp::Ushr => ">>>",
        }
    }
}

/// Relational operators, in the order of the `if<cond>` opcodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CompareOp {
    /// The logical negation, exact for integral and reference operands.
    pub fn negate(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
        }
    }
}

/// Result pushed by `fcmp<op>`/`dcmp<op>` when either operand is NaN.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NanBias {
    /// `fcmpl`/`dcmpl`: NaN compares as -1.
    Less,
    /// `fcmpg`/`dcmpg`: NaN compares as 1.
    Greater,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fixity {
    Prefix,
    Suffix,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    Increment,
    Decrement,
}

/// A constant value as it appears in the IR.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(u16),
    Byte(i8),
    Short(i16),
    Boolean(bool),
    String(String),
    /// A class literal, by internal name or array descriptor.
    Type(String),
    MethodType(String),
    Handle(Handle),
    Dynamic(Box<ConstantDynamic>),
}

impl Literal {
    pub fn category(&self) -> StackCategory {
        match self {
            Literal::Int(_)
            | Literal::Char(_)
            | Literal::Byte(_)
            | Literal::Short(_)
            | Literal::Boolean(_) => StackCategory::Int,
            Literal::Long(_) => StackCategory::Long,
            Literal::Float(_) => StackCategory::Float,
            Literal::Double(_) => StackCategory::Double,
            Literal::Dynamic(dynamic) => crate::types::parse_type_descriptor(&dynamic.descriptor)
                .ok()
                .and_then(|ty| ty.category())
                .unwrap_or(StackCategory::Reference),
            Literal::Null
            | Literal::String(_)
            | Literal::Type(_)
            | Literal::MethodType(_)
            | Literal::Handle(_) => {
                StackCategory::Reference
            }
        }
    }

    pub fn literal_type(&self) -> Option<JvmType> {
        match self {
            Literal::Null => None,
            Literal::Int(_) => Some(JvmType::Int),
            Literal::Long(_) => Some(JvmType::Long),
            Literal::Float(_) => Some(JvmType::Float),
            Literal::Double(_) => Some(JvmType::Double),
            Literal::Char(_) => Some(JvmType::Char),
            Literal::Byte(_) => Some(JvmType::Byte),
            Literal::Short(_) => Some(JvmType::Short),
            Literal::Boolean(_) => Some(JvmType::Boolean),
            Literal::String(_) => Some(JvmType::Reference("java/lang/String".into())),
            Literal::Type(_) => Some(JvmType::Reference("java/lang/Class".into())),
            Literal::MethodType(_) => Some(JvmType::Reference("java/lang/invoke/MethodType".into())),
            Literal::Handle(_) => Some(JvmType::Reference("java/lang/invoke/MethodHandle".into())),
            Literal::Dynamic(dynamic) => crate::types::parse_type_descriptor(&dynamic.descriptor).ok(),
        }
    }

    /// True for the numeric value one in any numeric category.
    pub fn is_one(&self) -> bool {
        match self {
            Literal::Int(v) => *v == 1,
            Literal::Long(v) => *v == 1,
            Literal::Float(v) => *v == 1.0,
            Literal::Double(v) => *v == 1.0,
            _ => false,
        }
    }

    pub fn is_minus_one(&self) -> bool {
        match self {
            Literal::Int(v) => *v == -1,
            Literal::Long(v) => *v == -1,
            Literal::Float(v) => *v == -1.0,
            Literal::Double(v) => *v == -1.0,
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Literal::Int(v) => Some(*v),
            Literal::Boolean(v) => Some(*v as i32),
            _ => None,
        }
    }
}

impl From<crate::visitor::Constant> for Literal {
    fn from(constant: crate::visitor::Constant) -> Self {
        use crate::visitor::Constant;
        match constant {
            Constant::Int(v) => Literal::Int(v),
            Constant::Long(v) => Literal::Long(v),
            Constant::Float(v) => Literal::Float(v),
            Constant::Double(v) => Literal::Double(v),
            Constant::String(v) => Literal::String(v),
            Constant::Type(v) => Literal::Type(v),
            Constant::MethodType(v) => Literal::MethodType(v),
            Constant::Handle(v) => Literal::Handle(v),
            Constant::Dynamic(v) => Literal::Dynamic(v),
        }
    }
}

/// Every expression form the IR can hold.
///
/// Child expressions are referenced by id and occupy numbered slots in the
/// order [`ValueKind::operands`] lists them. Field reads and invocations
/// whose receiver was computed once and reused (`dup`) hold a stack
/// reference with more than one consumer in their receiver slot.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Constant(Literal),
    Local(VarId),
    Stack(VarId),
    ArrayElement {
        array: ValueId,
        index: ValueId,
    },
    Binary {
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Shift {
        op: ShiftOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Negate {
        operand: ValueId,
    },
    /// Primitive conversion or reference `checkcast`.
    Cast {
        target: JvmType,
        operand: ValueId,
    },
    LongCompare {
        lhs: ValueId,
        rhs: ValueId,
    },
    /// `fcmp<op>`/`dcmp<op>`; the operand category tells float from double.
    FloatCompare {
        bias: NanBias,
        lhs: ValueId,
        rhs: ValueId,
    },
    Condition {
        op: CompareOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    InstanceField {
        field: FieldRef,
        object: ValueId,
    },
    StaticField {
        field: FieldRef,
    },
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
        receiver: Option<ValueId>,
        args: Vec<ValueId>,
    },
    InvokeDynamic {
        call_site: CallSite,
        args: Vec<ValueId>,
    },
    New {
        class: String,
        constructor: MethodRef,
        args: Vec<ValueId>,
    },
    NewArray {
        element: JvmType,
        length: ValueId,
    },
    NewMultiArray {
        array_type: JvmType,
        dimensions: Vec<ValueId>,
    },
    ArrayLength {
        array: ValueId,
    },
    InstanceOf {
        class: JvmType,
        operand: ValueId,
    },
    Assign {
        target: ValueId,
        value: ValueId,
    },
    CompoundAssign {
        op: BinaryOp,
        target: ValueId,
        value: ValueId,
    },
    ShiftAssign {
        op: ShiftOp,
        target: ValueId,
        value: ValueId,
    },
    Increment {
        fixity: Fixity,
        step: Step,
        target: ValueId,
    },
    Not {
        operand: ValueId,
    },
    LogicalAnd {
        lhs: ValueId,
        rhs: ValueId,
    },
    LogicalOr {
        lhs: ValueId,
        rhs: ValueId,
    },
    Ternary {
        cond: ValueId,
        then_value: ValueId,
        else_value: ValueId,
    },
    Concat {
        parts: Vec<ValueId>,
    },
    /// A value whose class was queried only to force a null check.
    NullChecked {
        operand: ValueId,
    },
    /// Stands in a slot whose value was taken out by a rewrite.
    Placeholder,
}

impl ValueKind {
    /// Child values in slot order.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            ValueKind::Constant(_)
            | ValueKind::Local(_)
            | ValueKind::Stack(_)
            | ValueKind::StaticField { .. }
            | ValueKind::Placeholder => Vec::new(),
            ValueKind::ArrayElement { array, index } => vec![*array, *index],
            ValueKind::Binary { lhs, rhs, .. }
            | ValueKind::Shift { lhs, rhs, .. }
            | ValueKind::LongCompare { lhs, rhs }
            | ValueKind::FloatCompare { lhs, rhs, .. }
            | ValueKind::Condition { lhs, rhs, .. }
            | ValueKind::LogicalAnd { lhs, rhs }
            | ValueKind::LogicalOr { lhs, rhs } => vec![*lhs, *rhs],
            ValueKind::Negate { operand }
            | ValueKind::Cast { operand, .. }
            | ValueKind::InstanceOf { operand, .. }
            | ValueKind::Not { operand }
            | ValueKind::NullChecked { operand } => vec![*operand],
            ValueKind::InstanceField { object, .. } => vec![*object],
            ValueKind::Invoke { receiver, args, .. } => {
                receiver.iter().chain(args.iter()).copied().collect()
            }
            ValueKind::InvokeDynamic { args, .. } | ValueKind::New { args, .. } => args.clone(),
            ValueKind::NewArray { length, .. } => vec![*length],
            ValueKind::NewMultiArray { dimensions, .. } => dimensions.clone(),
            ValueKind::ArrayLength { array } => vec![*array],
            ValueKind::Assign { target, value }
            | ValueKind::CompoundAssign { target, value, .. }
            | ValueKind::ShiftAssign { target, value, .. } => vec![*target, *value],
            ValueKind::Increment { target, .. } => vec![*target],
            ValueKind::Ternary {
                cond,
                then_value,
                else_value,
            } => vec![*cond, *then_value, *else_value],
            ValueKind::Concat { parts } => parts.clone(),
        }
    }

    pub(crate) fn operands_mut(&mut self) -> Vec<&mut ValueId> {
        match self {
            ValueKind::Constant(_)
            | ValueKind::Local(_)
            | ValueKind::Stack(_)
            | ValueKind::StaticField { .. }
            | ValueKind::Placeholder => Vec::new(),
            ValueKind::ArrayElement { array, index } => vec![array, index],
            ValueKind::Binary { lhs, rhs, .. }
            | ValueKind::Shift { lhs, rhs, .. }
            | ValueKind::LongCompare { lhs, rhs }
            | ValueKind::FloatCompare { lhs, rhs, .. }
            | ValueKind::Condition { lhs, rhs, .. }
            | ValueKind::LogicalAnd { lhs, rhs }
            | ValueKind::LogicalOr { lhs, rhs } => vec![lhs, rhs],
            ValueKind::Negate { operand }
            | ValueKind::Cast { operand, .. }
            | ValueKind::InstanceOf { operand, .. }
            | ValueKind::Not { operand }
            | ValueKind::NullChecked { operand } => vec![operand],
            ValueKind::InstanceField { object, .. } => vec![object],
            ValueKind::Invoke { receiver, args, .. } => {
                receiver.iter_mut().chain(args.iter_mut()).collect()
            }
            ValueKind::InvokeDynamic { args, .. } | ValueKind::New { args, .. } => {
                args.iter_mut().collect()
            }
            ValueKind::NewArray { length, .. } => vec![length],
            ValueKind::NewMultiArray { dimensions, .. } => dimensions.iter_mut().collect(),
            ValueKind::ArrayLength { array } => vec![array],
            ValueKind::Assign { target, value }
            | ValueKind::CompoundAssign { target, value, .. }
            | ValueKind::ShiftAssign { target, value, .. } => vec![target, value],
            ValueKind::Increment { target, .. } => vec![target],
            ValueKind::Ternary {
                cond,
                then_value,
                else_value,
            } => vec![cond, then_value, else_value],
            ValueKind::Concat { parts } => parts.iter_mut().collect(),
        }
    }

    /// How the value in slot `index` is used by this node.
    pub fn role(&self, index: usize) -> SlotRole {
        match (self, index) {
            (ValueKind::Assign { .. }, 0) => SlotRole::Write,
            (ValueKind::CompoundAssign { .. }, 0)
            | (ValueKind::ShiftAssign { .. }, 0)
            | (ValueKind::Increment { .. }, 0) => SlotRole::ReadWrite,
            _ => SlotRole::Read,
        }
    }

    pub fn is_var_ref(&self) -> bool {
        matches!(self, ValueKind::Local(_) | ValueKind::Stack(_))
    }

    /// The identifier behind a local or stack reference.
    pub fn var(&self) -> Option<VarId> {
        match self {
            ValueKind::Local(var) | ValueKind::Stack(var) => Some(*var),
            _ => None,
        }
    }

    /// True for nodes that may run code, write memory or allocate when
    /// evaluated on their own (operands excluded).
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            ValueKind::Invoke { .. }
                | ValueKind::InvokeDynamic { .. }
                | ValueKind::New { .. }
                | ValueKind::NewArray { .. }
                | ValueKind::NewMultiArray { .. }
                | ValueKind::Assign { .. }
                | ValueKind::CompoundAssign { .. }
                | ValueKind::ShiftAssign { .. }
                | ValueKind::Increment { .. }
                | ValueKind::NullChecked { .. }
        )
    }

    /// True for nodes whose result may change when memory changes.
    pub fn reads_memory(&self) -> bool {
        matches!(
            self,
            ValueKind::ArrayElement { .. }
                | ValueKind::InstanceField { .. }
                | ValueKind::StaticField { .. }
        )
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            ValueKind::Local(_)
                | ValueKind::Stack(_)
                | ValueKind::ArrayElement { .. }
                | ValueKind::InstanceField { .. }
                | ValueKind::StaticField { .. }
        )
    }

    pub fn literal(&self) -> Option<&Literal> {
        match self {
            ValueKind::Constant(literal) => Some(literal),
            _ => None,
        }
    }
}
