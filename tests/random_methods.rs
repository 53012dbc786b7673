//! Randomly shaped integer methods, the way javac lays them out, pushed
//! through the generator and the pipeline.

mod common;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use classfile_ir::generator::Generator;
use classfile_ir::optimizer::Pipeline;
use classfile_ir::visitor::{opcodes::*, Label, MethodVisitor};

use common::{checked, ints, static_method};

/// Two parameters plus two scratch locals, all `int`.
const LOCALS: usize = 4;
const MAX_DEPTH: usize = 2;
/// Passes allowed per statement or value node of the generated IR.
const PASSES_PER_NODE: usize = 3;

struct Emitter {
    rng: SmallRng,
    g: Generator,
    next_label: u32,
}

impl Emitter {
    fn new(seed: u64) -> Self {
        Emitter {
            rng: SmallRng::seed_from_u64(seed),
            g: static_method("(II)I"),
            next_label: 0,
        }
    }

    fn label(&mut self) -> Label {
        self.next_label += 1;
        Label(self.next_label)
    }

    /// Places `label` and declares the all-int frame there.
    fn place(&mut self, label: Label) {
        self.g.visit_label(label).unwrap();
        self.g.visit_frame(&ints(LOCALS)).unwrap();
    }

    fn leaf(&mut self) {
        if self.rng.gen_bool(0.6) {
            let slot = self.rng.gen_range(0..LOCALS as u16);
            self.g.visit_var_insn(ILOAD, slot).unwrap();
        } else {
            let value = self.rng.gen_range(-3..=20);
            self.g.visit_int_insn(BIPUSH, value).unwrap();
        }
    }

    fn expression(&mut self, depth: usize) {
        if depth == 0 || self.rng.gen_bool(0.4) {
            self.leaf();
            return;
        }
        self.expression(depth - 1);
        self.expression(depth - 1);
        let ops = [IADD, ISUB, IMUL, IAND, IOR, IXOR];
        let op = ops[self.rng.gen_range(0..ops.len())];
        self.g.visit_insn(op).unwrap();
    }

    /// A conditional jump to `target`.
    fn branch(&mut self, target: Label) {
        if self.rng.gen_bool(0.5) {
            self.leaf();
            self.leaf();
            let ops = [IF_ICMPEQ, IF_ICMPNE, IF_ICMPLT, IF_ICMPGE, IF_ICMPGT, IF_ICMPLE];
            let op = ops[self.rng.gen_range(0..ops.len())];
            self.g.visit_jump_insn(op, target).unwrap();
        } else {
            self.expression(1);
            let ops = [IFEQ, IFNE, IFLT, IFGE, IFGT, IFLE];
            let op = ops[self.rng.gen_range(0..ops.len())];
            self.g.visit_jump_insn(op, target).unwrap();
        }
    }

    fn statements(&mut self, depth: usize) {
        let count = self.rng.gen_range(0..=3);
        for _ in 0..count {
            self.statement(depth);
        }
    }

    fn statement(&mut self, depth: usize) {
        let choice = if depth >= MAX_DEPTH {
            self.rng.gen_range(0..2)
        } else {
            self.rng.gen_range(0..5)
        };
        match choice {
            0 => {
                self.expression(2);
                let slot = self.rng.gen_range(2..LOCALS as u16);
                self.g.visit_var_insn(ISTORE, slot).unwrap();
            }
            1 => {
                let slot = self.rng.gen_range(2..LOCALS as u16);
                let step = self.rng.gen_range(-2..=2);
                self.g.visit_iinc_insn(slot, step).unwrap();
            }
            2 => {
                // if (c) { .. }
                let skip = self.label();
                self.branch(skip);
                self.statements(depth + 1);
                self.place(skip);
            }
            3 => {
                // if (c) { .. } else { .. }
                let (otherwise, join) = (self.label(), self.label());
                self.branch(otherwise);
                self.statements(depth + 1);
                self.g.visit_jump_insn(GOTO, join).unwrap();
                self.place(otherwise);
                self.statements(depth + 1);
                self.place(join);
            }
            _ => {
                // while (c) { .. }
                let (cond, end) = (self.label(), self.label());
                self.place(cond);
                self.branch(end);
                self.statements(depth + 1);
                self.g.visit_jump_insn(GOTO, cond).unwrap();
                self.place(end);
            }
        }
    }

    fn method(mut self) -> Generator {
        self.g.visit_insn(ICONST_0).unwrap();
        self.g.visit_var_insn(ISTORE, 2).unwrap();
        self.g.visit_insn(ICONST_0).unwrap();
        self.g.visit_var_insn(ISTORE, 3).unwrap();
        let count = self.rng.gen_range(1..=5);
        for _ in 0..count {
            self.statement(0);
        }
        self.g.visit_var_insn(ILOAD, 2).unwrap();
        self.g.visit_insn(IRETURN).unwrap();
        self.g
    }
}

#[test]
fn test_random_methods_reach_a_stable_fixed_point() {
    for seed in 0..200 {
        let generator = Emitter::new(seed).method();
        let mut method = generator.finish().unwrap_or_else(|err| panic!("seed {}: {}", seed, err));
        method.check().unwrap_or_else(|err| panic!("seed {}: {}", seed, err));
        let flat = method.dump();
        let nodes = method.ir.live_stmt_count() + method.ir.live_value_count();

        let pipeline = Pipeline::new(checked());
        let stats = pipeline
            .run(&mut method)
            .unwrap_or_else(|err| panic!("seed {}: {}\n{}", seed, err, flat));
        method.check().unwrap_or_else(|err| panic!("seed {}: {}", seed, err));
        assert_eq!(stats.passes, stats.total_rewrites());
        assert!(
            stats.passes <= PASSES_PER_NODE * nodes,
            "seed {}: {} passes over {} nodes",
            seed,
            stats.passes,
            nodes
        );

        // only structured shapes are emitted, so nothing may stay a jump
        let optimized = method.dump();
        assert!(!optimized.contains("goto"), "seed {}:\n{}", seed, optimized);
        let again = pipeline.run(&mut method).unwrap();
        assert_eq!(again.passes, 0, "seed {}:\n{}", seed, optimized);
        assert_eq!(method.dump(), optimized);
    }
}

#[test]
fn test_same_seed_same_result() {
    let dump = |seed| {
        let mut method = Emitter::new(seed).method().finish().unwrap();
        Pipeline::default().run(&mut method).unwrap();
        method.dump()
    };
    for seed in [3, 17, 99] {
        assert_eq!(dump(seed), dump(seed));
    }
}
