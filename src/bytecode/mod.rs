//! Decoding of raw `Code` attributes into [`MethodVisitor`] callbacks.
//!
//! The decoder reads the attribute body with binrw. Then it replays the
//! instructions in order. Symbolic operands are resolved through a
//! [`ConstantPool`].

mod instruction;
mod pool;
mod stack_map;

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use binrw::{binread, BinRead};
use log::trace;

use crate::error::{DecompileError, Result};
use crate::types::MethodHeader;
use crate::visitor::{opcodes::*, Frame, Label, MethodVisitor};

pub use instruction::Instruction;
pub use pool::{BootstrapMethod, ConstantPool, ConstantTable, PoolEntry};

use stack_map::{StackMapEntry, StackMapTable};

/// An `exception_table` entry of the `Code` attribute.
#[binread]
#[derive(Clone, Debug, PartialEq, Eq)]
#[br(big)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Index of the caught class, 0 for `finally` handlers.
    pub catch_type: u16,
}

#[binread]
#[derive(Clone, Debug, PartialEq, Eq)]
#[br(big)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

/// A `LocalVariableTable` entry with its names resolved and the matching
/// `LocalVariableTypeTable` signature attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub slot: u16,
}

#[binread]
#[br(big)]
struct LocalVariableItem {
    start_pc: u16,
    length: u16,
    name_index: u16,
    /// A descriptor in `LocalVariableTable`, a signature in `LocalVariableTypeTable`.
    type_index: u16,
    slot: u16,
}

#[binread]
#[br(big)]
struct LocalVariableItems {
    #[br(temp)]
    count: u16,
    #[br(count = count)]
    items: Vec<LocalVariableItem>,
}

#[binread]
#[br(big)]
struct LineNumberTable {
    #[br(temp)]
    count: u16,
    #[br(count = count)]
    entries: Vec<LineNumber>,
}

#[binread]
#[br(big)]
struct RawAttribute {
    name_index: u16,
    #[br(temp)]
    length: u32,
    #[br(count = length)]
    info: Vec<u8>,
}

#[binread]
#[br(big)]
struct RawCode {
    max_stack: u16,
    max_locals: u16,
    #[br(temp)]
    code_length: u32,
    #[br(count = code_length)]
    code: Vec<u8>,
    #[br(temp)]
    exception_table_length: u16,
    #[br(count = exception_table_length)]
    exception_table: Vec<ExceptionEntry>,
    #[br(temp)]
    attributes_count: u16,
    #[br(count = attributes_count)]
    attributes: Vec<RawAttribute>,
}

/// A decoded `Code` attribute.
#[derive(Clone, Debug, Default)]
pub struct CodeBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub line_numbers: Vec<LineNumber>,
    pub local_variables: Vec<LocalVariable>,
    stack_map: Vec<StackMapEntry>,
}

fn parse_info<T>(info: &[u8]) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = ()> + binrw::meta::ReadEndian,
{
    Ok(T::read(&mut Cursor::new(info))?)
}

impl CodeBody {
    /// Parses the body of a `Code` attribute, i.e. everything after its
    /// `attribute_length`. Unknown nested attributes are skipped.
    pub fn parse(info: &[u8], pool: &dyn ConstantPool) -> Result<Self> {
        let raw: RawCode = parse_info(info)?;
        let mut body = CodeBody {
            max_stack: raw.max_stack,
            max_locals: raw.max_locals,
            code: raw.code,
            exception_table: raw.exception_table,
            ..CodeBody::default()
        };

        let mut signatures = Vec::new();
        for attribute in &raw.attributes {
            match pool.utf8(attribute.name_index)? {
                "LineNumberTable" => {
                    let table: LineNumberTable = parse_info(&attribute.info)?;
                    body.line_numbers.extend(table.entries);
                }
                "LocalVariableTable" => {
                    let table: LocalVariableItems = parse_info(&attribute.info)?;
                    for item in table.items {
                        body.local_variables.push(LocalVariable {
                            start_pc: item.start_pc,
                            length: item.length,
                            name: pool.utf8(item.name_index)?.to_string(),
                            descriptor: pool.utf8(item.type_index)?.to_string(),
                            signature: None,
                            slot: item.slot,
                        });
                    }
                }
                "LocalVariableTypeTable" => {
                    let table: LocalVariableItems = parse_info(&attribute.info)?;
                    for item in table.items {
                        signatures.push((item.start_pc, item.slot, pool.utf8(item.type_index)?.to_string()));
                    }
                }
                "StackMapTable" => {
                    let table: StackMapTable = parse_info(&attribute.info)?;
                    body.stack_map = table.entries;
                }
                other => trace!("skipping code attribute {}", other),
            }
        }
        for (start_pc, slot, signature) in signatures {
            if let Some(variable) = body
                .local_variables
                .iter_mut()
                .find(|variable| variable.start_pc == start_pc && variable.slot == slot)
            {
                variable.signature = Some(signature);
            }
        }
        Ok(body)
    }

    /// Decodes the whole code array into `(address, instruction)` pairs.
    pub fn instructions(&self) -> Result<Vec<(u32, Instruction)>> {
        let mut cursor = Cursor::new(&self.code[..]);
        let mut instructions = Vec::new();
        while (cursor.position() as usize) < self.code.len() {
            let address = cursor.position() as u32;
            instructions.push((address, Instruction::read_at(&mut cursor, address)?));
        }
        Ok(instructions)
    }

    /// Replays this body into `visitor` in the order [`MethodVisitor`]
    /// documents.
    pub fn accept(&self, header: &MethodHeader, pool: &dyn ConstantPool, visitor: &mut dyn MethodVisitor) -> Result<()> {
        let instructions = self.instructions()?;
        let code_length = self.code.len() as u32;
        let frames: BTreeMap<u32, Frame> =
            stack_map::expand(&self.stack_map, stack_map::initial_locals(header), pool)?
                .into_iter()
                .collect();
        let lines: BTreeMap<u32, u32> = self
            .line_numbers
            .iter()
            .map(|line| (u32::from(line.start_pc), u32::from(line.line_number)))
            .collect();

        let mut labels = BTreeSet::new();
        let mut mark = |address: u32, target: i64| -> Result<()> {
            if target < 0 || target > i64::from(code_length) {
                return Err(DecompileError::CodeOffset { address, target });
            }
            labels.insert(target as u32);
            Ok(())
        };
        for (address, instruction) in &instructions {
            for offset in instruction.branch_offsets() {
                mark(*address, i64::from(*address) + i64::from(offset))?;
            }
        }
        for entry in &self.exception_table {
            mark(u32::from(entry.start_pc), i64::from(entry.start_pc))?;
            mark(u32::from(entry.start_pc), i64::from(entry.end_pc))?;
            mark(u32::from(entry.start_pc), i64::from(entry.handler_pc))?;
        }
        for (offset, frame) in &frames {
            mark(*offset, i64::from(*offset))?;
            for item in frame.locals.iter().chain(&frame.stack) {
                if let crate::visitor::FrameItem::Uninitialized(Label(site)) = item {
                    mark(*offset, i64::from(*site))?;
                }
            }
        }
        for start in lines.keys() {
            mark(*start, i64::from(*start))?;
        }
        for variable in &self.local_variables {
            let start = u32::from(variable.start_pc);
            mark(start, i64::from(start))?;
            mark(start, i64::from(start) + i64::from(variable.length))?;
        }

        for entry in &self.exception_table {
            let catch_type = match entry.catch_type {
                0 => None,
                index => Some(pool.class_name(index)?),
            };
            visitor.visit_try_catch_block(
                Label(u32::from(entry.start_pc)),
                Label(u32::from(entry.end_pc)),
                Label(u32::from(entry.handler_pc)),
                catch_type,
            )?;
        }

        for (address, instruction) in &instructions {
            let address = *address;
            if labels.contains(&address) {
                visitor.visit_label(Label(address))?;
            }
            if let Some(line) = lines.get(&address) {
                visitor.visit_line_number(*line, Label(address))?;
            }
            if let Some(frame) = frames.get(&address) {
                visitor.visit_frame(frame)?;
            }
            self.dispatch(address, instruction, pool, visitor)?;
        }
        if labels.contains(&code_length) {
            visitor.visit_label(Label(code_length))?;
        }

        for variable in &self.local_variables {
            let start = u32::from(variable.start_pc);
            visitor.visit_local_variable(
                &variable.name,
                &variable.descriptor,
                variable.signature.as_deref(),
                Label(start),
                Label(start + u32::from(variable.length)),
                variable.slot,
            )?;
        }
        visitor.visit_end()
    }

    fn dispatch(
        &self,
        address: u32,
        instruction: &Instruction,
        pool: &dyn ConstantPool,
        visitor: &mut dyn MethodVisitor,
    ) -> Result<()> {
        use Instruction as I;

        let at = address as usize;
        let opcode = self.code[at];
        let label = |offset: i32| Label((i64::from(address) + i64::from(offset)) as u32);
        match instruction {
            I::Bipush(value) => visitor.visit_int_insn(opcode, i32::from(*value)),
            I::Sipush(value) => visitor.visit_int_insn(opcode, i32::from(*value)),
            I::Newarray(atype) => visitor.visit_int_insn(opcode, i32::from(*atype)),
            I::Ldc(index) => visitor.visit_ldc_insn(&pool.constant(u16::from(*index))?),
            I::LdcW(index) | I::Ldc2W(index) => visitor.visit_ldc_insn(&pool.constant(*index)?),

            I::Iload(slot) | I::Lload(slot) | I::Fload(slot) | I::Dload(slot) | I::Aload(slot) | I::Istore(slot)
            | I::Lstore(slot) | I::Fstore(slot) | I::Dstore(slot) | I::Astore(slot) | I::Ret(slot) => {
                visitor.visit_var_insn(opcode, u16::from(*slot))
            }
            // the second byte of a wide instruction is the widened opcode
            I::IloadWide(slot) | I::LloadWide(slot) | I::FloadWide(slot) | I::DloadWide(slot) | I::AloadWide(slot)
            | I::IstoreWide(slot) | I::LstoreWide(slot) | I::FstoreWide(slot) | I::DstoreWide(slot)
            | I::AstoreWide(slot) | I::RetWide(slot) => visitor.visit_var_insn(self.code[at + 1], *slot),
            I::Iinc { index, value } => visitor.visit_iinc_insn(u16::from(*index), i16::from(*value)),
            I::IincWide { index, value } => visitor.visit_iinc_insn(*index, *value),

            I::Ifeq(offset) | I::Ifne(offset) | I::Iflt(offset) | I::Ifge(offset) | I::Ifgt(offset)
            | I::Ifle(offset) | I::IfIcmpeq(offset) | I::IfIcmpne(offset) | I::IfIcmplt(offset)
            | I::IfIcmpge(offset) | I::IfIcmpgt(offset) | I::IfIcmple(offset) | I::IfAcmpeq(offset)
            | I::IfAcmpne(offset) | I::Goto(offset) | I::Jsr(offset) | I::Ifnull(offset) | I::Ifnonnull(offset) => {
                visitor.visit_jump_insn(opcode, label(i32::from(*offset)))
            }
            I::GotoW(offset) | I::JsrW(offset) => visitor.visit_jump_insn(opcode, label(*offset)),
            I::Tableswitch {
                default,
                low,
                high,
                offsets,
            } => {
                let targets: Vec<Label> = offsets.iter().map(|offset| label(*offset)).collect();
                visitor.visit_table_switch_insn(*low, *high, label(*default), &targets)
            }
            I::Lookupswitch { default, pairs, .. } => {
                let keys: Vec<i32> = pairs.iter().map(|(key, _)| *key).collect();
                let targets: Vec<Label> = pairs.iter().map(|(_, offset)| label(*offset)).collect();
                visitor.visit_lookup_switch_insn(label(*default), &keys, &targets)
            }

            I::Getstatic(index) | I::Putstatic(index) | I::Getfield(index) | I::Putfield(index) => {
                visitor.visit_field_insn(opcode, &pool.field_ref(*index)?)
            }
            I::Invokevirtual(index) | I::Invokespecial(index) | I::Invokestatic(index) => {
                visitor.visit_method_insn(opcode, &pool.method_ref(*index)?)
            }
            I::Invokeinterface { index, .. } => visitor.visit_method_insn(opcode, &pool.method_ref(*index)?),
            I::Invokedynamic { index, .. } => visitor.visit_invoke_dynamic_insn(&pool.call_site(*index)?),
            I::New(index) | I::Anewarray(index) | I::Checkcast(index) | I::Instanceof(index) => {
                visitor.visit_type_insn(opcode, pool.class_name(*index)?)
            }
            I::Multianewarray { index, dimensions } => {
                visitor.visit_multi_anew_array_insn(pool.class_name(*index)?, *dimensions)
            }

            _ => match implicit_slot(opcode) {
                Some((base, slot)) => visitor.visit_var_insn(base, slot),
                None => visitor.visit_insn(opcode),
            },
        }
    }
}

/// Splits `iload_0` style opcodes into the generic opcode and its slot.
fn implicit_slot(opcode: u8) -> Option<(u8, u16)> {
    const LOAD_0: u8 = 0x1a;
    const STORE_0: u8 = 0x3b;
    match opcode {
        LOAD_0..=0x2d => Some((ILOAD + (opcode - LOAD_0) / 4, u16::from((opcode - LOAD_0) % 4))),
        STORE_0..=0x4e => Some((ISTORE + (opcode - STORE_0) / 4, u16::from((opcode - STORE_0) % 4))),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
