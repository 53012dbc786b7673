use super::*;
use crate::generator::{Generator, GeneratorOptions};
use crate::optimizer::{Pipeline, PipelineOptions};
use crate::types::MethodAccessFlags;
use crate::visitor::{CallSite, Constant, FieldRef, MethodRef, Opcode};

/// Logs every callback as one line.
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl Recorder {
    fn log(&mut self, event: String) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

impl MethodVisitor for Recorder {
    fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> Result<()> {
        self.log(format!("try L{} L{} L{} {:?}", start.0, end.0, handler.0, catch_type))
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        self.log(format!("L{}", label.0))
    }

    fn visit_line_number(&mut self, line: u32, start: Label) -> Result<()> {
        self.log(format!("line {} L{}", line, start.0))
    }

    fn visit_frame(&mut self, frame: &Frame) -> Result<()> {
        self.log(format!("frame {} {}", frame.locals.len(), frame.stack.len()))
    }

    fn visit_insn(&mut self, opcode: Opcode) -> Result<()> {
        self.log(format!("insn {:#04x}", opcode))
    }

    fn visit_int_insn(&mut self, opcode: Opcode, operand: i32) -> Result<()> {
        self.log(format!("int {:#04x} {}", opcode, operand))
    }

    fn visit_var_insn(&mut self, opcode: Opcode, slot: u16) -> Result<()> {
        self.log(format!("var {:#04x} {}", opcode, slot))
    }

    fn visit_type_insn(&mut self, opcode: Opcode, type_name: &str) -> Result<()> {
        self.log(format!("type {:#04x} {}", opcode, type_name))
    }

    fn visit_field_insn(&mut self, opcode: Opcode, field: &FieldRef) -> Result<()> {
        self.log(format!("field {:#04x} {}.{}", opcode, field.owner, field.name))
    }

    fn visit_method_insn(&mut self, opcode: Opcode, method: &MethodRef) -> Result<()> {
        self.log(format!("method {:#04x} {}.{}", opcode, method.owner, method.name))
    }

    fn visit_invoke_dynamic_insn(&mut self, call_site: &CallSite) -> Result<()> {
        self.log(format!("indy {}", call_site.name))
    }

    fn visit_jump_insn(&mut self, opcode: Opcode, target: Label) -> Result<()> {
        self.log(format!("jump {:#04x} L{}", opcode, target.0))
    }

    fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<()> {
        self.log(format!("ldc {:?}", constant))
    }

    fn visit_iinc_insn(&mut self, slot: u16, increment: i16) -> Result<()> {
        self.log(format!("iinc {} {}", slot, increment))
    }

    fn visit_table_switch_insn(&mut self, low: i32, high: i32, default: Label, targets: &[Label]) -> Result<()> {
        self.log(format!("tableswitch {}..{} L{} {:?}", low, high, default.0, targets))
    }

    fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], targets: &[Label]) -> Result<()> {
        self.log(format!("lookupswitch L{} {:?} {:?}", default.0, keys, targets))
    }

    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<()> {
        self.log(format!("multianewarray {} {}", descriptor, dimensions))
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        start: Label,
        end: Label,
        slot: u16,
    ) -> Result<()> {
        self.log(format!(
            "local {} {} {:?} L{} L{} {}",
            name, descriptor, signature, start.0, end.0, slot
        ))
    }

    fn visit_end(&mut self) -> Result<()> {
        self.log("end".to_string())
    }
}

fn u16_be(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Serializes a `Code` attribute body.
fn code_attribute(code: &[u8], exceptions: &[[u16; 4]], attributes: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    u16_be(&mut out, 4);
    u16_be(&mut out, 4);
    out.extend_from_slice(&(code.len() as u32).to_be_bytes());
    out.extend_from_slice(code);
    u16_be(&mut out, exceptions.len() as u16);
    for entry in exceptions {
        for value in entry {
            u16_be(&mut out, *value);
        }
    }
    u16_be(&mut out, attributes.len() as u16);
    for (name, info) in attributes {
        u16_be(&mut out, *name);
        out.extend_from_slice(&(info.len() as u32).to_be_bytes());
        out.extend_from_slice(info);
    }
    out
}

fn utf8(pool: &mut ConstantTable, text: &str) -> u16 {
    pool.push(PoolEntry::Utf8(text.to_string()))
}

/// `static boolean gt(int a, int b) { return a > b; }`
fn comparison() -> (ConstantTable, CodeBody) {
    let mut pool = ConstantTable::new();
    let stack_map = utf8(&mut pool, "StackMapTable");
    let lines = utf8(&mut pool, "LineNumberTable");
    let locals = utf8(&mut pool, "LocalVariableTable");
    let a = utf8(&mut pool, "a");
    let b = utf8(&mut pool, "b");
    let int = utf8(&mut pool, "I");

    let code = [
        0x1a, // iload_0
        0x1b, // iload_1
        0xa4, 0x00, 0x07, // if_icmple 9
        0x04, // iconst_1
        0xa7, 0x00, 0x04, // goto 10
        0x03, // iconst_0
        0xac, // ireturn
    ];
    let frames = vec![0x00, 0x02, 9, 64, 1];
    let line_table = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x03];
    let mut local_table = vec![0x00, 0x02];
    for (slot, name) in [(0u16, a), (1, b)] {
        for value in [0, 11, name, int, slot] {
            u16_be(&mut local_table, value);
        }
    }
    let info = code_attribute(
        &code,
        &[],
        &[(stack_map, frames), (lines, line_table), (locals, local_table)],
    );
    let body = CodeBody::parse(&info, &pool).unwrap();
    (pool, body)
}

fn static_header(descriptor: &str) -> MethodHeader {
    MethodHeader::new("pkg/Test", MethodAccessFlags::STATIC, "gt", descriptor).unwrap()
}

#[test]
fn test_parse_code_attribute() {
    let (_, body) = comparison();
    assert_eq!(body.code.len(), 11);
    assert_eq!(body.line_numbers, vec![LineNumber { start_pc: 0, line_number: 3 }]);
    assert_eq!(body.local_variables.len(), 2);
    assert_eq!(body.local_variables[1].name, "b");
    assert_eq!(body.local_variables[1].descriptor, "I");
    assert_eq!(body.stack_map.len(), 2);

    let addresses: Vec<u32> = body.instructions().unwrap().iter().map(|(at, _)| *at).collect();
    assert_eq!(addresses, vec![0, 1, 2, 5, 6, 9, 10]);
}

#[test]
fn test_accept_callback_order() {
    let (pool, body) = comparison();
    let mut recorder = Recorder::default();
    body.accept(&static_header("(II)Z"), &pool, &mut recorder).unwrap();
    assert_eq!(
        recorder.events,
        vec![
            "L0",
            "line 3 L0",
            "var 0x15 0",
            "var 0x15 1",
            "jump 0xa4 L9",
            "insn 0x04",
            "jump 0xa7 L10",
            "L9",
            "frame 2 0",
            "insn 0x03",
            "L10",
            "frame 2 1",
            "insn 0xac",
            "L11",
            "local a I None L0 L11 0",
            "local b I None L0 L11 1",
            "end",
        ]
    );
}

#[test]
fn test_accept_feeds_the_generator() {
    let (pool, body) = comparison();
    let header = static_header("(II)Z");
    let mut generator = Generator::new(header.clone(), GeneratorOptions::default());
    body.accept(&header, &pool, &mut generator).unwrap();
    let mut method = generator.finish().unwrap();
    Pipeline::new(PipelineOptions::default()).run(&mut method).unwrap();
    assert_eq!(method.dump(), "return a > b;\n");
}

#[test]
fn test_operands_are_resolved() {
    let mut pool = ConstantTable::new();
    let owner_name = utf8(&mut pool, "pkg/Box");
    let owner = pool.push(PoolEntry::Class { name_index: owner_name });
    let name = utf8(&mut pool, "value");
    let descriptor = utf8(&mut pool, "J");
    let nat = pool.push(PoolEntry::NameAndType {
        name_index: name,
        descriptor_index: descriptor,
    });
    let field = pool.push(PoolEntry::FieldRef {
        class_index: owner,
        name_and_type_index: nat,
    });
    let text = pool.push(PoolEntry::String { string_index: name });
    let signature_attribute = utf8(&mut pool, "LocalVariableTypeTable");
    let table_attribute = utf8(&mut pool, "LocalVariableTable");
    let list = utf8(&mut pool, "list");
    let list_descriptor = utf8(&mut pool, "Ljava/util/List;");
    let list_signature = utf8(&mut pool, "Ljava/util/List<Ljava/lang/String;>;");

    let code = [
        0xbb, 0x00, owner as u8, // new pkg/Box
        0xb2, 0x00, field as u8, // getstatic
        0x12, text as u8, // ldc "value"
        0xc4, 0x3a, 0x01, 0x00, // astore 256 (wide)
        0x10, 0xfe, // bipush -2
        0x84, 0x02, 0x05, // iinc 2 5
        0x2c, // aload_2
        0x4c, // astore_1
        0x00, // nop
        0xab, 0x00, 0x00, 0x00, // lookupswitch at 20, padded to 24
        0x00, 0x00, 0x00, 0x14, // default +20
        0x00, 0x00, 0x00, 0x01, // one pair
        0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0x14, // 7 -> +20
        0xb1, // return at 40
    ];
    let mut variables = vec![0x00, 0x01];
    let mut signatures = vec![0x00, 0x01];
    for value in [0, 41, list, list_descriptor, 1] {
        u16_be(&mut variables, value);
    }
    for value in [0, 41, list, list_signature, 1] {
        u16_be(&mut signatures, value);
    }
    let info = code_attribute(
        &code,
        &[[3, 8, 40, 0]],
        &[(signature_attribute, signatures), (table_attribute, variables)],
    );
    let body = CodeBody::parse(&info, &pool).unwrap();
    assert_eq!(
        body.local_variables[0].signature.as_deref(),
        Some("Ljava/util/List<Ljava/lang/String;>;")
    );

    let mut recorder = Recorder::default();
    body.accept(&static_header("()V"), &pool, &mut recorder).unwrap();
    assert_eq!(
        recorder.events,
        vec![
            "try L3 L8 L40 None",
            "L0",
            "type 0xbb pkg/Box",
            "L3",
            "field 0xb2 pkg/Box.value",
            "ldc String(\"value\")",
            "L8",
            "var 0x3a 256",
            "int 0x10 -2",
            "iinc 2 5",
            "var 0x19 2",
            "var 0x3a 1",
            "insn 0x00",
            "lookupswitch L40 [7] [Label(40)]",
            "L40",
            "insn 0xb1",
            "L41",
            "local list Ljava/util/List; Some(\"Ljava/util/List<Ljava/lang/String;>;\") L0 L41 1",
            "end",
        ]
    );
}

#[test]
fn test_branch_outside_code_is_rejected() {
    let pool = ConstantTable::new();
    let info = code_attribute(&[0xa7, 0x00, 0x10, 0xb1], &[], &[]);
    let body = CodeBody::parse(&info, &pool).unwrap();
    let mut recorder = Recorder::default();
    assert!(matches!(
        body.accept(&static_header("()V"), &pool, &mut recorder),
        Err(DecompileError::CodeOffset { address: 0, target: 16 })
    ));
    assert!(recorder.events.is_empty());
}

#[test]
fn test_implicit_slots() {
    assert_eq!(implicit_slot(0x1a), Some((ILOAD, 0)));
    assert_eq!(implicit_slot(0x21), Some((LLOAD, 3)));
    assert_eq!(implicit_slot(0x2d), Some((ALOAD, 3)));
    assert_eq!(implicit_slot(0x3b), Some((ISTORE, 0)));
    assert_eq!(implicit_slot(0x4c), Some((ASTORE, 1)));
    assert_eq!(implicit_slot(0x2e), None);
    assert_eq!(implicit_slot(0x15), None);
}
