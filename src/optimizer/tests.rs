use super::{Pipeline, PipelineOptions, ResolvedField};
use crate::error::DecompileError;
use crate::generator::{Generator, GeneratorOptions};
use crate::ir::{Literal, StatementsMethod};
use crate::types::{MethodAccessFlags, MethodHeader};
use crate::visitor::{opcodes::*, Frame, FrameItem, Label, FieldRef, MethodRef, MethodVisitor};

fn generator(descriptor: &str) -> Generator {
    let header = MethodHeader::new("pkg/Test", MethodAccessFlags::STATIC, "run", descriptor).unwrap();
    Generator::new(header, GeneratorOptions::default())
}

fn checked_options() -> PipelineOptions {
    PipelineOptions {
        validate_each_rewrite: true,
        ..PipelineOptions::default()
    }
}

fn optimize(g: Generator) -> StatementsMethod {
    let mut method = g.finish().unwrap();
    method.check().unwrap();
    Pipeline::new(checked_options()).run(&mut method).unwrap();
    method.check().unwrap();
    method
}

fn ints(count: usize) -> Frame {
    Frame {
        locals: vec![FrameItem::Integer; count],
        stack: vec![],
    }
}

/// `static int run(boolean b) { int x; if (b) x = 1; else x = 2; return x; }`
fn if_else_method() -> Generator {
    let (otherwise, join) = (Label(0), Label(1));
    let mut g = generator("(Z)I");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IFEQ, otherwise).unwrap();
    g.visit_insn(ICONST_1).unwrap();
    g.visit_var_insn(ISTORE, 1).unwrap();
    g.visit_jump_insn(GOTO, join).unwrap();
    g.visit_label(otherwise).unwrap();
    g.visit_frame(&ints(1)).unwrap();
    g.visit_insn(ICONST_2).unwrap();
    g.visit_var_insn(ISTORE, 1).unwrap();
    g.visit_label(join).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_insn(IRETURN).unwrap();
    g
}

#[test]
fn test_if_else_is_structured() {
    let method = optimize(if_else_method());
    assert_eq!(
        method.dump(),
        "if (l0) {\n  l1 = 1;\n} else {\n  l1 = 2;\n}\nreturn l1;\n"
    );
}

#[test]
fn test_if_else_with_empty_then_arm() {
    // if (!b) { } else { x = 2; } return x;
    let (otherwise, join) = (Label(0), Label(1));
    let mut g = generator("(ZI)I");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IFNE, otherwise).unwrap();
    g.visit_jump_insn(GOTO, join).unwrap();
    g.visit_label(otherwise).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_insn(ICONST_2).unwrap();
    g.visit_var_insn(ISTORE, 1).unwrap();
    g.visit_label(join).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_insn(IRETURN).unwrap();

    let method = optimize(g);
    assert_eq!(method.dump(), "if (l0) {\n  l1 = 2;\n}\nreturn l1;\n");
}

#[test]
fn test_if_then_closing_a_then_arm() {
    // if (a) { if (b) x = 1; } else { x = 2; } return x;
    let (skip, otherwise, join) = (Label(0), Label(1), Label(2));
    let mut g = generator("(ZZI)I");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IFEQ, otherwise).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_jump_insn(IFEQ, skip).unwrap();
    g.visit_insn(ICONST_1).unwrap();
    g.visit_var_insn(ISTORE, 2).unwrap();
    g.visit_label(skip).unwrap();
    g.visit_frame(&ints(3)).unwrap();
    g.visit_jump_insn(GOTO, join).unwrap();
    g.visit_label(otherwise).unwrap();
    g.visit_frame(&ints(3)).unwrap();
    g.visit_insn(ICONST_2).unwrap();
    g.visit_var_insn(ISTORE, 2).unwrap();
    g.visit_label(join).unwrap();
    g.visit_frame(&ints(3)).unwrap();
    g.visit_var_insn(ILOAD, 2).unwrap();
    g.visit_insn(IRETURN).unwrap();

    let method = optimize(g);
    assert_eq!(
        method.dump(),
        "if (l0) {\n  if (l1) {\n    l2 = 1;\n  }\n} else {\n  l2 = 2;\n}\nreturn l2;\n"
    );
}

#[test]
fn test_disabled_control_flow_keeps_gotos() {
    let mut method = if_else_method().finish().unwrap();
    let options = PipelineOptions {
        control_flow: false,
        ..checked_options()
    };
    let stats = Pipeline::new(options).run(&mut method).unwrap();
    assert_eq!(stats.count("if_else"), 0);
    assert!(stats.count("inline_stack_value") > 0);
    assert!(method.dump().contains("goto"), "{}", method.dump());
    method.check().unwrap();
}

#[test]
fn test_pass_limit() {
    let mut method = if_else_method().finish().unwrap();
    let options = PipelineOptions {
        max_passes: Some(1),
        ..PipelineOptions::default()
    };
    let err = Pipeline::new(options).run(&mut method).unwrap_err();
    assert!(matches!(err, DecompileError::PassLimit(1)), "{:?}", err);
}

#[test]
fn test_top_tested_loop() {
    // int i = 0; while (i < n) i++; return i;
    let (cond, end) = (Label(0), Label(1));
    let mut g = generator("(I)I");
    g.visit_insn(ICONST_0).unwrap();
    g.visit_var_insn(ISTORE, 1).unwrap();
    g.visit_label(cond).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IF_ICMPGE, end).unwrap();
    g.visit_iinc_insn(1, 1).unwrap();
    g.visit_jump_insn(GOTO, cond).unwrap();
    g.visit_label(end).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_insn(IRETURN).unwrap();

    let method = optimize(g);
    assert_eq!(method.dump(), "l1 = 0;\nwhile (l1 < l0) {\n  l1++;\n}\nreturn l1;\n");
}

#[test]
fn test_do_while_loop() {
    // do { n--; } while (n > 0); return n;
    let top = Label(0);
    let mut g = generator("(I)I");
    g.visit_label(top).unwrap();
    g.visit_frame(&ints(1)).unwrap();
    g.visit_iinc_insn(0, -1).unwrap();
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IFGT, top).unwrap();
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_insn(IRETURN).unwrap();

    let method = optimize(g);
    assert_eq!(method.dump(), "do {\n  l0--;\n} while (l0 > 0);\nreturn l0;\n");
}

#[test]
fn test_synchronized_block() {
    let (start, end, handler, handler_end, after) = (Label(0), Label(1), Label(2), Label(3), Label(4));
    let object = || FrameItem::Object("java/lang/Object".to_string());
    let mut g = generator("(Ljava/lang/Object;)V");
    g.visit_try_catch_block(start, end, handler, None).unwrap();
    g.visit_try_catch_block(handler, handler_end, handler, None).unwrap();
    g.visit_var_insn(ALOAD, 0).unwrap();
    g.visit_insn(DUP).unwrap();
    g.visit_var_insn(ASTORE, 1).unwrap();
    g.visit_insn(MONITORENTER).unwrap();
    g.visit_label(start).unwrap();
    g.visit_method_insn(INVOKESTATIC, &MethodRef::new("pkg/Test", "f", "()V"))
        .unwrap();
    g.visit_var_insn(ALOAD, 1).unwrap();
    g.visit_insn(MONITOREXIT).unwrap();
    g.visit_label(end).unwrap();
    g.visit_jump_insn(GOTO, after).unwrap();
    g.visit_label(handler).unwrap();
    g.visit_frame(&Frame {
        locals: vec![object(), object()],
        stack: vec![FrameItem::Object("java/lang/Throwable".to_string())],
    })
    .unwrap();
    g.visit_var_insn(ASTORE, 2).unwrap();
    g.visit_var_insn(ALOAD, 1).unwrap();
    g.visit_insn(MONITOREXIT).unwrap();
    g.visit_label(handler_end).unwrap();
    g.visit_var_insn(ALOAD, 2).unwrap();
    g.visit_insn(ATHROW).unwrap();
    g.visit_label(after).unwrap();
    g.visit_frame(&Frame {
        locals: vec![object(), object()],
        stack: vec![],
    })
    .unwrap();
    g.visit_insn(RETURN).unwrap();

    let method = optimize(g);
    assert_eq!(method.dump(), "synchronized (l0) {\n  Test.f();\n}\nreturn;\n");
}

#[test]
fn test_string_builder_chain() {
    let builder = "java/lang/StringBuilder";
    let append = MethodRef::new(builder, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;");
    let mut g = generator("(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;");
    g.visit_type_insn(NEW, builder).unwrap();
    g.visit_insn(DUP).unwrap();
    g.visit_method_insn(INVOKESPECIAL, &MethodRef::new(builder, "<init>", "()V"))
        .unwrap();
    g.visit_var_insn(ALOAD, 0).unwrap();
    g.visit_method_insn(INVOKEVIRTUAL, &append).unwrap();
    g.visit_var_insn(ALOAD, 1).unwrap();
    g.visit_method_insn(INVOKEVIRTUAL, &append).unwrap();
    g.visit_method_insn(
        INVOKEVIRTUAL,
        &MethodRef::new(builder, "toString", "()Ljava/lang/String;"),
    )
    .unwrap();
    g.visit_insn(ARETURN).unwrap();

    let method = optimize(g);
    assert_eq!(method.dump(), "return concat(l0, l1);\n");
}

#[test]
fn test_long_increment() {
    let mut g = generator("(J)V");
    g.visit_var_insn(LLOAD, 0).unwrap();
    g.visit_insn(LCONST_1).unwrap();
    g.visit_insn(LADD).unwrap();
    g.visit_var_insn(LSTORE, 0).unwrap();
    g.visit_insn(RETURN).unwrap();

    let method = optimize(g);
    assert_eq!(method.dump(), "l0++;\nreturn;\n");
}

#[test]
fn test_get_class_null_check() {
    let mut g = generator("(ILpkg/Foo;)V");
    g.visit_var_insn(ALOAD, 1).unwrap();
    g.visit_insn(DUP).unwrap();
    g.visit_method_insn(
        INVOKEVIRTUAL,
        &MethodRef::new("java/lang/Object", "getClass", "()Ljava/lang/Class;"),
    )
    .unwrap();
    g.visit_insn(POP).unwrap();
    g.visit_method_insn(INVOKEVIRTUAL, &MethodRef::new("pkg/Foo", "bar", "()V"))
        .unwrap();
    g.visit_insn(RETURN).unwrap();

    let method = optimize(g);
    assert_eq!(method.dump(), "nullcheck(l1).bar();\nreturn;\n");
}

#[test]
fn test_comparison_result_becomes_boolean() {
    // return a > b;
    let (no, join) = (Label(0), Label(1));
    let mut g = generator("(II)Z");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_jump_insn(IF_ICMPLE, no).unwrap();
    g.visit_insn(ICONST_1).unwrap();
    g.visit_jump_insn(GOTO, join).unwrap();
    g.visit_label(no).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_insn(ICONST_0).unwrap();
    g.visit_label(join).unwrap();
    g.visit_frame(&Frame {
        locals: vec![FrameItem::Integer; 2],
        stack: vec![FrameItem::Integer],
    })
    .unwrap();
    g.visit_insn(IRETURN).unwrap();

    let mut method = g.finish().unwrap();
    let stats = Pipeline::new(checked_options()).run(&mut method).unwrap();
    assert_eq!(method.dump(), "return l0 > l1;\n");
    assert_eq!(stats.count("ternary_value"), 1);
    assert_eq!(stats.count("boolean_ternary"), 1);
    assert_eq!(stats.passes, stats.total_rewrites());
}

#[test]
fn test_short_circuit_or() {
    // if (!a && !b) f();
    let skip = Label(0);
    let mut g = generator("(ZZ)V");
    g.visit_var_insn(ILOAD, 0).unwrap();
    g.visit_jump_insn(IFNE, skip).unwrap();
    g.visit_var_insn(ILOAD, 1).unwrap();
    g.visit_jump_insn(IFNE, skip).unwrap();
    g.visit_method_insn(INVOKESTATIC, &MethodRef::new("pkg/Test", "f", "()V"))
        .unwrap();
    g.visit_label(skip).unwrap();
    g.visit_frame(&ints(2)).unwrap();
    g.visit_insn(RETURN).unwrap();

    let method = optimize(g);
    assert_eq!(method.dump(), "if (!l0 && !l1) {\n  Test.f();\n}\nreturn;\n");
}

#[test]
fn test_constant_field_resolution() {
    let mut g = generator("()V");
    g.visit_int_insn(BIPUSH, 42).unwrap();
    g.visit_method_insn(INVOKESTATIC, &MethodRef::new("pkg/Other", "use", "(I)V"))
        .unwrap();
    g.visit_insn(RETURN).unwrap();
    let mut method = g.finish().unwrap();

    let resolver = |owner: &str, literal: &Literal| -> Option<ResolvedField> {
        (owner == "pkg/Other" && *literal == Literal::Int(42)).then(|| ResolvedField {
            field: FieldRef::new("pkg/Other", "ANSWER", "I"),
            is_static: true,
        })
    };
    let pipeline = Pipeline::new(checked_options()).with_resolver(&resolver);
    let stats = pipeline.run(&mut method).unwrap();
    assert_eq!(method.dump(), "Other.use(Other.ANSWER);\nreturn;\n");
    assert_eq!(stats.count("constant_field"), 1);

    // without the option the literal stays
    let mut g = generator("()V");
    g.visit_int_insn(BIPUSH, 42).unwrap();
    g.visit_method_insn(INVOKESTATIC, &MethodRef::new("pkg/Other", "use", "(I)V"))
        .unwrap();
    g.visit_insn(RETURN).unwrap();
    let mut method = g.finish().unwrap();
    let options = PipelineOptions {
        constant_fields: false,
        ..checked_options()
    };
    Pipeline::new(options).with_resolver(&resolver).run(&mut method).unwrap();
    assert_eq!(method.dump(), "Other.use(42);\nreturn;\n");
}

#[test]
fn test_second_run_is_a_no_op() {
    let mut method = if_else_method().finish().unwrap();
    let pipeline = Pipeline::new(checked_options());
    pipeline.run(&mut method).unwrap();
    let first = method.dump();
    let stats = pipeline.run(&mut method).unwrap();
    assert_eq!(stats.passes, 0);
    assert_eq!(method.dump(), first);
}
