#![cfg(feature = "bytecode")]

mod common;

use classfile_ir::bytecode::{ConstantTable, PoolEntry};
use classfile_ir::optimizer::PipelineOptions;
use classfile_ir::{decompile_code, DecompileError, MethodAccessFlags, MethodHeader};

use common::{checked, init_logging, OWNER};

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// A `Code` attribute body without exception handlers.
fn code_attribute(code: &[u8], attributes: &[(u16, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    push_u16(&mut out, 4);
    push_u16(&mut out, 4);
    out.extend_from_slice(&(code.len() as u32).to_be_bytes());
    out.extend_from_slice(code);
    push_u16(&mut out, 0);
    push_u16(&mut out, attributes.len() as u16);
    for (name, info) in attributes {
        push_u16(&mut out, *name);
        out.extend_from_slice(&(info.len() as u32).to_be_bytes());
        out.extend_from_slice(info);
    }
    out
}

fn header(descriptor: &str) -> MethodHeader {
    init_logging();
    MethodHeader::new(OWNER, MethodAccessFlags::STATIC, "run", descriptor).unwrap()
}

#[test]
fn test_decompile_counting_loop() {
    // int s = 0; for (int i = 0; i < n; i++) s += i; return s;
    let mut pool = ConstantTable::new();
    let stack_map = pool.push(PoolEntry::Utf8("StackMapTable".to_string()));
    let code = [
        0x03, // iconst_0
        0x3c, // istore_1
        0x03, // iconst_0
        0x3d, // istore_2
        0x1c, // 4: iload_2
        0x1a, // iload_0
        0xa2, 0x00, 0x0d, // if_icmpge 19
        0x1b, // iload_1
        0x1c, // iload_2
        0x60, // iadd
        0x3c, // istore_1
        0x84, 0x02, 0x01, // iinc 2 1
        0xa7, 0xff, 0xf4, // goto 4
        0x1b, // 19: iload_1
        0xac, // ireturn
    ];
    // append I I at 4, chop one local at 19
    let frames = [0x00, 0x02, 253, 0x00, 4, 1, 1, 250, 0x00, 14];
    let info = code_attribute(&code, &[(stack_map, &frames)]);

    let method = decompile_code(header("(I)I"), &info, &pool, &checked()).unwrap();
    method.check().unwrap();
    assert_eq!(
        method.dump(),
        "l1 = 0;\nl2 = 0;\nwhile (l2 < l0) {\n  l1 += l2;\n  l2++;\n}\nreturn l1;\n"
    );
}

#[test]
fn test_decompile_static_call() {
    let mut pool = ConstantTable::new();
    let owner = pool.push(PoolEntry::Utf8(OWNER.to_string()));
    let class = pool.push(PoolEntry::Class { name_index: owner });
    let name = pool.push(PoolEntry::Utf8("f".to_string()));
    let descriptor = pool.push(PoolEntry::Utf8("()V".to_string()));
    let name_and_type = pool.push(PoolEntry::NameAndType {
        name_index: name,
        descriptor_index: descriptor,
    });
    let method_ref = pool.push(PoolEntry::MethodRef {
        class_index: class,
        name_and_type_index: name_and_type,
    });
    let [high, low] = method_ref.to_be_bytes();
    let info = code_attribute(&[0xb8, high, low, 0xb1], &[]);

    let method = decompile_code(header("()V"), &info, &pool, &PipelineOptions::default()).unwrap();
    assert_eq!(method.dump(), "Test.f();\nreturn;\n");
}

#[test]
fn test_wrong_pool_entry_is_reported() {
    let mut pool = ConstantTable::new();
    let text = pool.push(PoolEntry::Utf8("f".to_string()));
    let [high, low] = text.to_be_bytes();
    let info = code_attribute(&[0xb8, high, low, 0xb1], &[]);

    let err = decompile_code(header("()V"), &info, &pool, &PipelineOptions::default()).unwrap_err();
    assert!(
        matches!(err, DecompileError::ConstantPool { index, .. } if index == text),
        "{:?}",
        err
    );
}

#[test]
fn test_truncated_code_attribute() {
    let info = code_attribute(&[0x1a, 0xac], &[]);
    let truncated = &info[..info.len() - 3];
    let err = decompile_code(header("(I)I"), truncated, &ConstantTable::new(), &PipelineOptions::default())
        .unwrap_err();
    assert!(matches!(err, DecompileError::Decode(_)), "{:?}", err);
}
