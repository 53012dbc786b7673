//! Instruction-level callback interface used to feed one method body into the
//! IR generator.
//!
//! The calling convention follows the classic tree-less classfile visitor:
//! all `visit_try_catch_block` calls come first, then the code in program
//! order (`visit_label`, then an optional `visit_line_number` and
//! `visit_frame` for that position, then the instruction), and finally the
//! `visit_local_variable` entries followed by `visit_end`.

use crate::error::Result;
use crate::types::{JvmType, MethodDescriptor};

/// An opaque position marker in the instruction stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

/// Raw JVM opcode value.
pub type Opcode = u8;

/// Opcode values from the JVM instruction set, named as in the JVM specification.
pub mod opcodes {
    use super::Opcode;

    pub const NOP: Opcode = 0x00;
    pub const ACONST_NULL: Opcode = 0x01;
    pub const ICONST_M1: Opcode = 0x02;
    pub const ICONST_0: Opcode = 0x03;
    pub const ICONST_1: Opcode = 0x04;
    pub const ICONST_2: Opcode = 0x05;
    pub const ICONST_3: Opcode = 0x06;
    pub const ICONST_4: Opcode = 0x07;
    pub const ICONST_5: Opcode = 0x08;
    pub const LCONST_0: Opcode = 0x09;
    pub const LCONST_1: Opcode = 0x0a;
    pub const FCONST_0: Opcode = 0x0b;
    pub const FCONST_1: Opcode = 0x0c;
    pub const FCONST_2: Opcode = 0x0d;
    pub const DCONST_0: Opcode = 0x0e;
    pub const DCONST_1: Opcode = 0x0f;
    pub const BIPUSH: Opcode = 0x10;
    pub const SIPUSH: Opcode = 0x11;
    pub const LDC: Opcode = 0x12;
    pub const LDC_W: Opcode = 0x13;
    pub const LDC2_W: Opcode = 0x14;
    pub const ILOAD: Opcode = 0x15;
    pub const LLOAD: Opcode = 0x16;
    pub const FLOAD: Opcode = 0x17;
    pub const DLOAD: Opcode = 0x18;
    pub const ALOAD: Opcode = 0x19;
    pub const IALOAD: Opcode = 0x2e;
    pub const LALOAD: Opcode = 0x2f;
    pub const FALOAD: Opcode = 0x30;
    pub const DALOAD: Opcode = 0x31;
    pub const AALOAD: Opcode = 0x32;
    pub const BALOAD: Opcode = 0x33;
    pub const CALOAD: Opcode = 0x34;
    pub const SALOAD: Opcode = 0x35;
    pub const ISTORE: Opcode = 0x36;
    pub const LSTORE: Opcode = 0x37;
    pub const FSTORE: Opcode = 0x38;
    pub const DSTORE: Opcode = 0x39;
    pub const ASTORE: Opcode = 0x3a;
    pub const IASTORE: Opcode = 0x4f;
    pub const LASTORE: Opcode = 0x50;
    pub const FASTORE: Opcode = 0x51;
    pub const DASTORE: Opcode = 0x52;
    pub const AASTORE: Opcode = 0x53;
    pub const BASTORE: Opcode = 0x54;
    pub const CASTORE: Opcode = 0x55;
    pub const SASTORE: Opcode = 0x56;
    pub const POP: Opcode = 0x57;
    pub const POP2: Opcode = 0x58;
    pub const DUP: Opcode = 0x59;
    pub const DUP_X1: Opcode = 0x5a;
    pub const DUP_X2: Opcode = 0x5b;
    pub const DUP2: Opcode = 0x5c;
    pub const DUP2_X1: Opcode = 0x5d;
    pub const DUP2_X2: Opcode = 0x5e;
    pub const SWAP: Opcode = 0x5f;
    pub const IADD: Opcode = 0x60;
    pub const LADD: Opcode = 0x61;
    pub const FADD: Opcode = 0x62;
    pub const DADD: Opcode = 0x63;
    pub const ISUB: Opcode = 0x64;
    pub const LSUB: Opcode = 0x65;
    pub const FSUB: Opcode = 0x66;
    pub const DSUB: Opcode = 0x67;
    pub const IMUL: Opcode = 0x68;
    pub const LMUL: Opcode = 0x69;
    pub const FMUL: Opcode = 0x6a;
    pub const DMUL: Opcode = 0x6b;
    pub const IDIV: Opcode = 0x6c;
    pub const LDIV: Opcode = 0x6d;
    pub const FDIV: Opcode = 0x6e;
    pub const DDIV: Opcode = 0x6f;
    pub const IREM: Opcode = 0x70;
    pub const LREM: Opcode = 0x71;
    pub const FREM: Opcode = 0x72;
    pub const DREM: Opcode = 0x73;
    pub const INEG: Opcode = 0x74;
    pub const LNEG: Opcode = 0x75;
    pub const FNEG: Opcode = 0x76;
    pub const DNEG: Opcode = 0x77;
    pub const ISHL: Opcode = 0x78;
    pub const LSHL: Opcode = 0x79;
    pub const ISHR: Opcode = 0x7a;
    pub const LSHR: Opcode = 0x7b;
    pub const IUSHR: Opcode = 0x7c;
    pub const LUSHR: Opcode = 0x7d;
    pub const IAND: Opcode = 0x7e;
    pub const LAND: Opcode = 0x7f;
    pub const IOR: Opcode = 0x80;
    pub const LOR: Opcode = 0x81;
    pub const IXOR: Opcode = 0x82;
    pub const LXOR: Opcode = 0x83;
    pub const IINC: Opcode = 0x84;
    pub const I2L: Opcode = 0x85;
    pub const I2F: Opcode = 0x86;
    pub const I2D: Opcode = 0x87;
    pub const L2I: Opcode = 0x88;
    pub const L2F: Opcode = 0x89;
    pub const L2D: Opcode = 0x8a;
    pub const F2I: Opcode = 0x8b;
    pub const F2L: Opcode = 0x8c;
    pub const F2D: Opcode = 0x8d;
    pub const D2I: Opcode = 0x8e;
    pub const D2L: Opcode = 0x8f;
    pub const D2F: Opcode = 0x90;
    pub const I2B: Opcode = 0x91;
    pub const I2C: Opcode = 0x92;
    pub const I2S: Opcode = 0x93;
    pub const LCMP: Opcode = 0x94;
    pub const FCMPL: Opcode = 0x95;
    pub const FCMPG: Opcode = 0x96;
    pub const DCMPL: Opcode = 0x97;
    pub const DCMPG: Opcode = 0x98;
    pub const IFEQ: Opcode = 0x99;
    pub const IFNE: Opcode = 0x9a;
    pub const IFLT: Opcode = 0x9b;
    pub const IFGE: Opcode = 0x9c;
    pub const IFGT: Opcode = 0x9d;
    pub const IFLE: Opcode = 0x9e;
    pub const IF_ICMPEQ: Opcode = 0x9f;
    pub const IF_ICMPNE: Opcode = 0xa0;
    pub const IF_ICMPLT: Opcode = 0xa1;
    pub const IF_ICMPGE: Opcode = 0xa2;
    pub const IF_ICMPGT: Opcode = 0xa3;
    pub const IF_ICMPLE: Opcode = 0xa4;
    pub const IF_ACMPEQ: Opcode = 0xa5;
    pub const IF_ACMPNE: Opcode = 0xa6;
    pub const GOTO: Opcode = 0xa7;
    pub const JSR: Opcode = 0xa8;
    pub const RET: Opcode = 0xa9;
    pub const TABLESWITCH: Opcode = 0xaa;
    pub const LOOKUPSWITCH: Opcode = 0xab;
    pub const IRETURN: Opcode = 0xac;
    pub const LRETURN: Opcode = 0xad;
    pub const FRETURN: Opcode = 0xae;
    pub const DRETURN: Opcode = 0xaf;
    pub const ARETURN: Opcode = 0xb0;
    pub const RETURN: Opcode = 0xb1;
    pub const GETSTATIC: Opcode = 0xb2;
    pub const PUTSTATIC: Opcode = 0xb3;
    pub const GETFIELD: Opcode = 0xb4;
    pub const PUTFIELD: Opcode = 0xb5;
    pub const INVOKEVIRTUAL: Opcode = 0xb6;
    pub const INVOKESPECIAL: Opcode = 0xb7;
    pub const INVOKESTATIC: Opcode = 0xb8;
    pub const INVOKEINTERFACE: Opcode = 0xb9;
    pub const INVOKEDYNAMIC: Opcode = 0xba;
    pub const NEW: Opcode = 0xbb;
    pub const NEWARRAY: Opcode = 0xbc;
    pub const ANEWARRAY: Opcode = 0xbd;
    pub const ARRAYLENGTH: Opcode = 0xbe;
    pub const ATHROW: Opcode = 0xbf;
    pub const CHECKCAST: Opcode = 0xc0;
    pub const INSTANCEOF: Opcode = 0xc1;
    pub const MONITORENTER: Opcode = 0xc2;
    pub const MONITOREXIT: Opcode = 0xc3;
    pub const WIDE: Opcode = 0xc4;
    pub const MULTIANEWARRAY: Opcode = 0xc5;
    pub const IFNULL: Opcode = 0xc6;
    pub const IFNONNULL: Opcode = 0xc7;
    pub const GOTO_W: Opcode = 0xc8;
    pub const JSR_W: Opcode = 0xc9;
}

/// One entry of a frame's locals or stack list.
///
/// Long and double values are a single entry, as in the `StackMapTable`
/// verification type list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameItem {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    /// Internal class name or array descriptor.
    Object(String),
    /// A value created by the `new` instruction at this label.
    Uninitialized(Label),
}

impl FrameItem {
    pub fn is_wide(&self) -> bool {
        matches!(self, FrameItem::Long | FrameItem::Double)
    }
}

/// A full (uncompressed) verifier frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub locals: Vec<FrameItem>,
    pub stack: Vec<FrameItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl FieldRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        FieldRef {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    pub fn field_type(&self) -> Result<JvmType> {
        crate::types::parse_type_descriptor(&self.descriptor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

impl MethodRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        MethodRef {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_interface: false,
        }
    }

    pub fn signature(&self) -> Result<MethodDescriptor> {
        MethodDescriptor::parse(&self.descriptor)
    }

    pub fn is(&self, owner: &str, name: &str) -> bool {
        self.owner == owner && self.name == name
    }
}

/// A `CONSTANT_MethodHandle` operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    /// The reference kind, 1 (`getField`) through 9 (`invokeInterface`).
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

/// A `CONSTANT_Dynamic` operand.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantDynamic {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: Handle,
    pub bootstrap_args: Vec<Constant>,
}

/// Operand of `ldc` and bootstrap method arguments.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Internal class name or array descriptor of a class literal.
    Type(String),
    /// A method descriptor loaded as `java.lang.invoke.MethodType`.
    MethodType(String),
    Handle(Handle),
    Dynamic(Box<ConstantDynamic>),
}

/// The operand of `invokedynamic`.
#[derive(Clone, Debug, PartialEq)]
pub struct CallSite {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: Handle,
    pub bootstrap_args: Vec<Constant>,
}

/// Receives one method body, one callback per instruction category.
///
/// Every callback is fallible so a consumer can abort on the first
/// inconsistency.
pub trait MethodVisitor {
    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()>;

    fn visit_label(&mut self, label: Label) -> Result<()>;

    fn visit_line_number(&mut self, line: u32, start: Label) -> Result<()>;

    fn visit_frame(&mut self, frame: &Frame) -> Result<()>;

    /// A zero-operand instruction.
    fn visit_insn(&mut self, opcode: Opcode) -> Result<()>;

    /// `bipush`, `sipush` or `newarray`.
    fn visit_int_insn(&mut self, opcode: Opcode, operand: i32) -> Result<()>;

    /// A load, a store or `ret`.
    fn visit_var_insn(&mut self, opcode: Opcode, slot: u16) -> Result<()>;

    /// `new`, `anewarray`, `checkcast` or `instanceof`.
    fn visit_type_insn(&mut self, opcode: Opcode, type_name: &str) -> Result<()>;

    fn visit_field_insn(&mut self, opcode: Opcode, field: &FieldRef) -> Result<()>;

    fn visit_method_insn(&mut self, opcode: Opcode, method: &MethodRef) -> Result<()>;

    fn visit_invoke_dynamic_insn(&mut self, call_site: &CallSite) -> Result<()>;

    fn visit_jump_insn(&mut self, opcode: Opcode, target: Label) -> Result<()>;

    fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<()>;

    fn visit_iinc_insn(&mut self, slot: u16, increment: i16) -> Result<()>;

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<()>;

    fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], targets: &[Label]) -> Result<()>;

    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<()>;

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        start: Label,
        end: Label,
        slot: u16,
    ) -> Result<()>;

    fn visit_end(&mut self) -> Result<()>;
}
