use super::{Generator, GeneratorOptions};
use crate::error::DecompileError;
use crate::ir::{StatementsMethod, StmtKind, ValueKind, VarId};
use crate::types::{MethodAccessFlags, MethodHeader};
use crate::visitor::{opcodes::*, Frame, FrameItem, Label, MethodRef, MethodVisitor};

fn generator(access: MethodAccessFlags, descriptor: &str) -> Generator {
    let header = MethodHeader::new("pkg/Test", access, "run", descriptor).unwrap();
    Generator::new(header, GeneratorOptions::default())
}

/// The identifier written by the `index`-th statement, an `x = ...` expression.
fn assigned_var(method: &StatementsMethod, index: usize) -> VarId {
    let stmt = method.statements()[index];
    let StmtKind::Expression { value } = method.ir.stmt_kind(stmt) else {
        panic!("{} is not an expression", stmt);
    };
    let ValueKind::Assign { target, .. } = method.ir.value_kind(*value) else {
        panic!("{} is not an assignment", value);
    };
    method.ir.ref_var(*target).unwrap()
}

#[test]
fn test_straight_line_arithmetic() {
    let mut g = generator(MethodAccessFlags::STATIC, "(II)I");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_insn(IADD).unwrap();
    g.visit_insn(IRETURN).unwrap();
    let method = g.finish().unwrap();

    assert_eq!(method.dump(), "s2 = l0;\ns3 = l1;\ns4 = s2 + s3;\nreturn s4;\n");
    method.check().unwrap();
    let sum = assigned_var(&method, 2);
    assert_eq!(method.ir.var(sum).stmt_consumers().len(), 1);
    assert_eq!(method.ir.var(sum).producers().len(), 1);
}

#[test]
fn test_constructor_call_assigns_new_value() {
    let mut g = generator(MethodAccessFlags::STATIC, "()Ljava/lang/Object;");
    g.visit_type_insn(NEW, "pkg/Foo").unwrap();
    g.visit_insn(DUP).unwrap();
    g.visit_insn(ICONST_1).unwrap();
    g.visit_method_insn(INVOKESPECIAL, &MethodRef::new("pkg/Foo", "<init>", "(I)V"))
        .unwrap();
    g.visit_insn(ARETURN).unwrap();
    let method = g.finish().unwrap();

    assert_eq!(method.dump(), "s1 = 1;\ns0 = new Foo(s1);\nreturn s0;\n");
    method.check().unwrap();
}

#[test]
fn test_dup2_of_wide_value_copies_one_identifier() {
    let mut g = generator(MethodAccessFlags::STATIC, "(J)J");
    g.visit_var_insn(LLOAD, 0).unwrap();
    g.visit_insn(DUP2).unwrap();
    g.visit_insn(LADD).unwrap();
    g.visit_insn(LRETURN).unwrap();
    let method = g.finish().unwrap();

    assert_eq!(method.dump(), "s1 = l0;\ns2 = s1 + s1;\nreturn s2;\n");
    let loaded = assigned_var(&method, 0);
    assert_eq!(method.ir.var(loaded).consumer_count(), 2);
}

#[test]
fn test_loop_frames_merge_local_identity() {
    // int i = 0; while (i < n) i++; return i;
    let (cond, end) = (Label(0), Label(1));
    let frame = Frame {
        locals: vec![FrameItem::Integer, FrameItem::Integer],
        stack: vec![],
    };
    let mut g = generator(MethodAccessFlags::STATIC, "(I)I");
    g.visit_insn(ICONST_0).unwrap();
    g.visit_var_insn(ISTORE, 1).unwrap();
    g.visit_label(cond).unwrap();
    g.visit_frame(&frame).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IF_ICMPGE, end).unwrap();
    g.visit_iinc_insn(1, 1).unwrap();
    g.visit_jump_insn(GOTO, cond).unwrap();
    g.visit_label(end).unwrap();
    g.visit_frame(&frame).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_insn(IRETURN).unwrap();
    let method = g.finish().unwrap();

    method.check().unwrap();
    let i = assigned_var(&method, 1);
    let node = method.ir.var(i);
    // the store and the increment write it, two loads and the increment read it
    assert_eq!(node.producers().len(), 2);
    assert_eq!(node.consumer_count(), 3);
    assert_eq!(method.ir.var(method.params[0]).consumer_count(), 1);
}

#[test]
fn test_debug_names_attach_to_matched_locals() {
    let (start, end) = (Label(0), Label(1));
    let mut g = generator(MethodAccessFlags::STATIC, "()I");
    g.visit_insn(ICONST_5).unwrap();
    g.visit_var_insn(ISTORE, 0).unwrap();
    g.visit_label(start).unwrap();
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_insn(IRETURN).unwrap();
    g.visit_label(end).unwrap();
    g.visit_local_variable("count", "I", None, start, end, 0).unwrap();
    let method = g.finish().unwrap();

    assert_eq!(method.dump(), "s0 = 5;\ncount = s0;\ns2 = count;\nreturn s2;\n");
    assert_eq!(method.locals.len(), 1);
    assert_eq!(method.locals[0].vars, vec![assigned_var(&method, 1)]);
}

#[test]
fn test_try_catch_markers() {
    let (start, end, handler, after) = (Label(0), Label(1), Label(2), Label(3));
    let mut g = generator(MethodAccessFlags::STATIC, "()V");
    g.visit_try_catch_block(start, end, handler, Some("java/lang/Exception"))
        .unwrap();
    g.visit_label(start).unwrap();
    g.visit_method_insn(INVOKESTATIC, &MethodRef::new("pkg/Test", "work", "()V"))
        .unwrap();
    g.visit_label(end).unwrap();
    g.visit_jump_insn(GOTO, after).unwrap();
    g.visit_label(handler).unwrap();
    g.visit_frame(&Frame {
        locals: vec![],
        stack: vec![FrameItem::Object("java/lang/Exception".to_string())],
    })
    .unwrap();
    g.visit_insn(POP).unwrap();
    g.visit_label(after).unwrap();
    g.visit_frame(&Frame::default()).unwrap();
    g.visit_insn(RETURN).unwrap();
    let method = g.finish().unwrap();

    let dump = method.dump();
    assert!(dump.contains("try_start R0;\nTest.work();\n"), "{}", dump);
    assert!(dump.contains("try_end R0;\ngoto L0;\n"), "{}", dump);
    assert!(dump.contains("catch R0 (s0);"), "{}", dump);
    assert!(dump.ends_with("L0: return;\n"), "{}", dump);
    assert_eq!(
        method.ir.region(crate::ir::RegionId(0)).catch_type.as_deref(),
        Some("java/lang/Exception")
    );
    method.check().unwrap();
}

#[test]
fn test_unreachable_code_needs_a_frame() {
    let after = Label(0);
    let mut g = generator(MethodAccessFlags::STATIC, "()V");
    g.visit_jump_insn(GOTO, after).unwrap();
    g.visit_label(after).unwrap();
    let err = g.visit_insn(RETURN).unwrap_err();
    assert!(matches!(err, DecompileError::MissingFrame { position: 1 }), "{:?}", err);
}

#[test]
fn test_category_mismatch_on_load() {
    let mut g = generator(MethodAccessFlags::STATIC, "(J)I");
    let err = g.visit_var_insn(ILOAD, 0).unwrap_err();
    assert!(matches!(err, DecompileError::CategoryMismatch { .. }), "{:?}", err);
}

#[test]
fn test_stack_underflow() {
    let mut g = generator(MethodAccessFlags::STATIC, "()V");
    let err = g.visit_insn(POP).unwrap_err();
    assert!(matches!(err, DecompileError::StackUnderflow { position: 0 }), "{:?}", err);
}

#[test]
fn test_jump_to_unvisited_label() {
    let mut g = generator(MethodAccessFlags::STATIC, "()V");
    g.visit_jump_insn(GOTO, Label(7)).unwrap();
    assert!(matches!(g.finish(), Err(DecompileError::UndefinedLabel(7))));
}
