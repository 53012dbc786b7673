mod common;

use classfile_ir::optimizer::{Pipeline, PipelineOptions};
use classfile_ir::visitor::{opcodes::*, CallSite, Constant, FieldRef, Frame, FrameItem, Handle, Label, MethodRef, MethodVisitor};
use classfile_ir::DecompileError;

use common::{checked, instance_method, ints, optimize, static_method, OWNER};

// ---- Expressions ----

#[test]
fn test_field_compound_assignment() {
    // this.count += n;
    let count = FieldRef::new(OWNER, "count", "I");
    let mut g = instance_method("(I)V");
    g.visit_var_insn(ALOAD, 0).unwrap();
    g.visit_insn(DUP).unwrap();
    g.visit_field_insn(GETFIELD, &count).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_insn(IADD).unwrap();
    g.visit_field_insn(PUTFIELD, &count).unwrap();
    g.visit_insn(RETURN).unwrap();

    let (method, stats) = optimize(g);
    assert_eq!(method.dump(), "l0.count += l1;\nreturn;\n");
    assert_eq!(stats.count("compound_assignment"), 1);
}

#[test]
fn test_static_suffix_increment() {
    // return counter++;
    let counter = FieldRef::new(OWNER, "counter", "I");
    let mut g = static_method("()I");
    g.visit_field_insn(GETSTATIC, &counter).unwrap();
    g.visit_insn(DUP).unwrap();
    g.visit_insn(ICONST_1).unwrap();
    g.visit_insn(IADD).unwrap();
    g.visit_field_insn(PUTSTATIC, &counter).unwrap();
    g.visit_insn(IRETURN).unwrap();

    let (method, stats) = optimize(g);
    assert_eq!(method.dump(), "return Test.counter++;\n");
    assert_eq!(stats.count("suffix_increment"), 1);
}

#[test]
fn test_indy_string_concat() {
    // return "x=" + n;
    let call_site = CallSite {
        name: "makeConcatWithConstants".to_string(),
        descriptor: "(I)Ljava/lang/String;".to_string(),
        bootstrap: Handle {
            kind: 6,
            owner: "java/lang/invoke/StringConcatFactory".to_string(),
            name: "makeConcatWithConstants".to_string(),
            descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;".to_string(),
            is_interface: false,
        },
        bootstrap_args: vec![Constant::String("x=\u{1}".to_string())],
    };
    let mut g = static_method("(I)Ljava/lang/String;");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_invoke_dynamic_insn(&call_site).unwrap();
    g.visit_insn(ARETURN).unwrap();

    let (method, _) = optimize(g);
    assert_eq!(method.dump(), "return concat(\"x=\", l0);\n");
}

#[test]
fn test_ternary_argument() {
    // f(b ? 1 : 2);
    let (otherwise, join) = (Label(0), Label(1));
    let mut g = static_method("(Z)V");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IFEQ, otherwise).unwrap();
    g.visit_insn(ICONST_1).unwrap();
    g.visit_jump_insn(GOTO, join).unwrap();
    g.visit_label(otherwise).unwrap();
    g.visit_frame(&ints(1)).unwrap();
    g.visit_insn(ICONST_2).unwrap();
    g.visit_label(join).unwrap();
    g.visit_frame(&Frame {
        locals: vec![FrameItem::Integer],
        stack: vec![FrameItem::Integer],
    })
    .unwrap();
    g.visit_method_insn(INVOKESTATIC, &MethodRef::new(OWNER, "f", "(I)V"))
        .unwrap();
    g.visit_insn(RETURN).unwrap();

    let (method, stats) = optimize(g);
    assert_eq!(method.dump(), "Test.f(l0 ? 1 : 2);\nreturn;\n");
    assert_eq!(stats.count("ternary_value"), 1);
}

#[test]
fn test_nested_ternary() {
    // return a ? (b ? 1 : 2) : 3;
    let (outer_else, inner_else, join) = (Label(0), Label(1), Label(2));
    let with_value = Frame {
        locals: vec![FrameItem::Integer; 2],
        stack: vec![FrameItem::Integer],
    };
    let mut g = static_method("(ZZ)I");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IFEQ, outer_else).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_jump_insn(IFEQ, inner_else).unwrap();
    g.visit_insn(ICONST_1).unwrap();
    g.visit_jump_insn(GOTO, join).unwrap();
    g.visit_label(inner_else).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_insn(ICONST_2).unwrap();
    g.visit_jump_insn(GOTO, join).unwrap();
    g.visit_label(outer_else).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_insn(ICONST_3).unwrap();
    g.visit_label(join).unwrap();
    g.visit_frame(&with_value).unwrap();
    g.visit_insn(IRETURN).unwrap();

    let (method, stats) = optimize(g);
    assert_eq!(method.dump(), "return l0 ? (l1 ? 1 : 2) : 3;\n");
    assert_eq!(stats.count("ternary_value"), 2);
    assert_eq!(stats.count("if_else"), 0);
}

// ---- Control flow ----

#[test]
fn test_counting_loop() {
    // int s = 0; for (int i = 0; i < n; i++) s += i; return s;
    let (cond, end) = (Label(0), Label(1));
    let mut g = static_method("(I)I");
    g.visit_insn(ICONST_0).unwrap();
    g.visit_var_insn(ISTORE, 1).unwrap();
    g.visit_insn(ICONST_0).unwrap();
    g.visit_var_insn(ISTORE, 2).unwrap();
    g.visit_label(cond).unwrap();
    g.visit_frame(&ints(3)).unwrap();
    g.visit_var_insn(ILOAD, 2).unwrap();
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IF_ICMPGE, end).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_var_insn(ILOAD, 2).unwrap();
    g.visit_insn(IADD).unwrap();
    g.visit_var_insn(ISTORE, 1).unwrap();
    g.visit_iinc_insn(2, 1).unwrap();
    g.visit_jump_insn(GOTO, cond).unwrap();
    g.visit_label(end).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_insn(IRETURN).unwrap();

    let (method, stats) = optimize(g);
    assert_eq!(
        method.dump(),
        "l1 = 0;\nl2 = 0;\nwhile (l2 < l0) {\n  l1 += l2;\n  l2++;\n}\nreturn l1;\n"
    );
    assert_eq!(stats.count("while_top_tested"), 1);
}

#[test]
fn test_try_catch_markers_survive() {
    // try { f(); } catch (Exception e) { g(e); }
    let (start, end, handler, after) = (Label(0), Label(1), Label(2), Label(3));
    let mut g = static_method("()V");
    g.visit_try_catch_block(start, end, handler, Some("java/lang/Exception"))
        .unwrap();
    g.visit_label(start).unwrap();
    g.visit_method_insn(INVOKESTATIC, &MethodRef::new(OWNER, "f", "()V"))
        .unwrap();
    g.visit_label(end).unwrap();
    g.visit_jump_insn(GOTO, after).unwrap();
    g.visit_label(handler).unwrap();
    g.visit_frame(&Frame {
        locals: vec![],
        stack: vec![FrameItem::Object("java/lang/Exception".to_string())],
    })
    .unwrap();
    g.visit_var_insn(ASTORE, 0).unwrap();
    g.visit_var_insn(ALOAD, 0).unwrap();
    g.visit_method_insn(
        INVOKESTATIC,
        &MethodRef::new(OWNER, "g", "(Ljava/lang/Exception;)V"),
    )
    .unwrap();
    g.visit_label(after).unwrap();
    g.visit_frame(&Frame::default()).unwrap();
    g.visit_insn(RETURN).unwrap();

    let (mut method, _) = optimize(g);
    let dump = method.dump();
    assert!(dump.contains("try_start"), "{}", dump);
    assert!(dump.contains("catch"), "{}", dump);
    assert!(dump.contains("Test.f();"), "{}", dump);
    assert!(dump.contains("Test.g(l0);"), "{}", dump);

    let stats = Pipeline::new(checked()).run(&mut method).unwrap();
    assert_eq!(stats.passes, 0);
    assert_eq!(method.dump(), dump);
}

// ---- Failures ----

#[test]
fn test_stack_underflow_is_fatal() {
    let mut g = static_method("()V");
    let err = g.visit_insn(POP).unwrap_err();
    assert!(matches!(err, DecompileError::StackUnderflow { position: 0 }), "{:?}", err);
}

#[test]
fn test_missing_frame_after_goto() {
    let target = Label(0);
    let mut g = static_method("()V");
    g.visit_jump_insn(GOTO, target).unwrap();
    let err = g.visit_insn(RETURN).unwrap_err();
    assert!(matches!(err, DecompileError::MissingFrame { .. }), "{:?}", err);
}

#[test]
fn test_statement_only_pipeline() {
    // return a + b; with only the statement family enabled
    let mut g = static_method("(II)I");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_insn(IADD).unwrap();
    g.visit_insn(IRETURN).unwrap();
    let mut method = g.finish().unwrap();
    let options = PipelineOptions {
        expressions: false,
        control_flow: false,
        ..checked()
    };
    let stats = Pipeline::new(options).run(&mut method).unwrap();
    assert_eq!(method.dump(), "return l0 + l1;\n");
    assert_eq!(stats.count("inline_stack_value"), 3);
    assert_eq!(stats.total_rewrites(), 3);
}
