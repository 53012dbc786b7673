//! Replays a method's instruction stream over an abstract operand stack and
//! local table, emitting flat IR.
//!
//! Every value pushed on the operand stack gets its own stack identifier and
//! an `s = expr` statement. Loads copy a local into a fresh stack identifier;
//! `dup` and friends push the same identifier again, so a duplicated value
//! shows up as an identifier with several consumers.

mod frame;
mod locals;

use std::collections::HashMap;

use log::debug;

use crate::error::{invariant, DecompileError, Result};
use crate::ir::{
    BinaryOp, BlockId, CompareOp, InvokeKind, Ir, LabelId, Literal, LocalVariableEntry, NanBias, RegionId, ShiftOp,
    StatementsMethod, StmtId, StmtKind, ValueId, ValueKind, VarId, VarKind,
};
use crate::types::{newarray_type, parse_type_descriptor, JvmType, MethodDescriptor, MethodHeader, StackCategory};
use crate::visitor::{opcodes::*, CallSite, Constant, FieldRef, Frame, Label, MethodRef, MethodVisitor, Opcode};

use frame::State;
use locals::{LocalAccess, PendingLocal};

/// Options for [`Generator`].
#[derive(Clone, Debug)]
pub struct GeneratorOptions {
    /// Match `LocalVariableTable` entries to local identifiers.
    pub attach_debug_names: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            attach_debug_names: true,
        }
    }
}

#[derive(Clone, Debug)]
struct TryBlock {
    start: Label,
    end: Label,
    handler: Label,
    region: RegionId,
}

/// Builds a [`StatementsMethod`] from [`MethodVisitor`] callbacks.
pub struct Generator {
    header: MethodHeader,
    options: GeneratorOptions,
    ir: Ir,
    body: BlockId,
    params: Vec<VarId>,

    stack: Vec<VarId>,
    locals: Vec<Option<VarId>>,
    /// False right after goto/return/athrow/switch until a frame arrives.
    reachable: bool,
    /// Index of the next instruction.
    position: usize,
    line: Option<u32>,

    /// Labels visited since the last instruction.
    pending: Vec<Label>,
    /// Labels waiting for the first statement emitted after them.
    unplaced: Vec<Label>,
    ir_labels: HashMap<Label, LabelId>,
    stmt_at: HashMap<Label, StmtId>,
    label_pos: HashMap<Label, usize>,
    deferred: HashMap<Label, Vec<State>>,
    installed: HashMap<Label, State>,

    /// Results of `new` whose constructor has not run yet, with their class.
    uninitialized: Vec<(VarId, String)>,
    new_sites: HashMap<Label, String>,
    try_blocks: Vec<TryBlock>,

    local_accesses: Vec<LocalAccess>,
    debug_table: Vec<PendingLocal>,
    ended: bool,
}

impl Generator {
    pub fn new(header: MethodHeader, options: GeneratorOptions) -> Self {
        let mut ir = Ir::new();
        let body = ir.new_block();
        let mut generator = Generator {
            header,
            options,
            ir,
            body,
            params: Vec::new(),
            stack: Vec::new(),
            locals: Vec::new(),
            reachable: true,
            position: 0,
            line: None,
            pending: Vec::new(),
            unplaced: Vec::new(),
            ir_labels: HashMap::new(),
            stmt_at: HashMap::new(),
            label_pos: HashMap::new(),
            deferred: HashMap::new(),
            installed: HashMap::new(),
            uninitialized: Vec::new(),
            new_sites: HashMap::new(),
            try_blocks: Vec::new(),
            local_accesses: Vec::new(),
            debug_table: Vec::new(),
            ended: false,
        };
        for ty in generator.header.entry_locals() {
            let slot = generator.locals.len() as u16;
            let category = ty.category().unwrap_or(StackCategory::Reference);
            let var = generator
                .ir
                .new_var(VarKind::Local { slot }, category, Some(ty.clone()));
            generator.params.push(var);
            generator.locals.push(Some(var));
            if category.is_wide() {
                generator.locals.push(None);
            }
            generator.local_accesses.push(LocalAccess {
                slot,
                var,
                position: 0,
                store: true,
            });
        }
        generator
    }

    /// Completes the visit if needed and hands over the IR.
    pub fn finish(mut self) -> Result<StatementsMethod> {
        if !self.ended {
            self.visit_end()?;
        }
        debug!(
            "generated {} statements for {}.{}{}",
            self.ir.live_stmt_count(),
            self.header.owner,
            self.header.name,
            self.header.descriptor
        );
        let locals = self.matched_debug_locals();
        Ok(StatementsMethod {
            header: self.header,
            ir: self.ir,
            body: self.body,
            locals,
            params: self.params,
        })
    }

    // ============================================================
    // Bookkeeping
    // ============================================================

    /// Runs before every instruction: checks reachability, settles labels
    /// without frames and emits try/catch markers.
    fn begin_insn(&mut self) -> Result<Vec<Label>> {
        if !self.reachable {
            return Err(DecompileError::MissingFrame {
                position: self.position,
            });
        }
        if self.pending.iter().any(|label| !self.installed.contains_key(label)) {
            let current = State {
                stack: Some(self.stack.clone()),
                locals: self.locals.clone(),
                tolerant: false,
            };
            self.install(current)?;
        }
        self.emit_markers()?;
        let labels = std::mem::take(&mut self.pending);
        self.position += 1;
        Ok(labels)
    }

    /// Position of the instruction being processed.
    fn current(&self) -> usize {
        self.position.saturating_sub(1)
    }

    fn emit_markers(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let at = |label: Label| self.pending.contains(&label);
        let ending: Vec<TryBlock> = self.try_blocks.iter().filter(|b| at(b.end)).cloned().collect();
        let starting: Vec<TryBlock> = self.try_blocks.iter().filter(|b| at(b.start)).cloned().collect();
        let mut regions: Vec<RegionId> = self
            .try_blocks
            .iter()
            .filter(|b| at(b.handler))
            .map(|b| b.region)
            .collect();

        let markers = ending
            .iter()
            .map(|b| (StmtKind::TryEnd { region: b.region }, b.handler))
            .chain(starting.iter().map(|b| (StmtKind::TryStart { region: b.region }, b.handler)));
        for (kind, handler) in markers.collect::<Vec<_>>() {
            self.emit(kind)?;
            let record = self.snapshot(true);
            self.record_edge(handler, record)?;
        }
        if !regions.is_empty() {
            regions.sort();
            regions.dedup();
            let var = *self.stack.last().ok_or_else(|| DecompileError::FrameMismatch {
                position: self.position,
                message: "handler entry without an exception on the stack".to_string(),
            })?;
            let exception = self.ir.var_ref(var);
            self.emit(StmtKind::Catch { regions, exception })?;
        }
        Ok(())
    }

    fn emit(&mut self, kind: StmtKind) -> Result<StmtId> {
        let stmt = self.ir.push(self.body, kind, self.line)?;
        for label in std::mem::take(&mut self.unplaced) {
            self.stmt_at.insert(label, stmt);
            if let Some(id) = self.ir_labels.get(&label).copied() {
                self.ir.place_label(id, stmt)?;
            }
        }
        Ok(stmt)
    }

    /// The IR label for a visitor label, created on first reference.
    fn ir_label(&mut self, label: Label) -> Result<LabelId> {
        if let Some(id) = self.ir_labels.get(&label) {
            return Ok(*id);
        }
        let id = self.ir.new_label();
        self.ir_labels.insert(label, id);
        if let Some(stmt) = self.stmt_at.get(&label).copied() {
            self.ir.place_label(id, stmt)?;
        }
        Ok(id)
    }

    /// Records the jump-time state for `target` and returns its IR label.
    fn branch_to(&mut self, target: Label) -> Result<LabelId> {
        let record = self.snapshot(false);
        self.record_edge(target, record)?;
        self.ir_label(target)
    }

    // ============================================================
    // Operand stack
    // ============================================================

    fn pop(&mut self) -> Result<VarId> {
        self.stack.pop().ok_or(DecompileError::StackUnderflow {
            position: self.current(),
        })
    }

    fn pop_var(&mut self, expected: StackCategory) -> Result<VarId> {
        let var = self.pop()?;
        let found = self.ir.var(var).category();
        if found != expected {
            return Err(DecompileError::CategoryMismatch {
                position: self.current(),
                expected,
                found,
            });
        }
        Ok(var)
    }

    /// Pops a value and returns a fresh reading reference to it.
    fn pop_value(&mut self, expected: StackCategory) -> Result<ValueId> {
        let var = self.pop_var(expected)?;
        Ok(self.ir.var_ref(var))
    }

    fn pop_args(&mut self, signature: &MethodDescriptor) -> Result<Vec<ValueId>> {
        let mut args = Vec::with_capacity(signature.params.len());
        for param in signature.params.iter().rev() {
            let category = param.category().unwrap_or(StackCategory::Reference);
            args.push(self.pop_value(category)?);
        }
        args.reverse();
        Ok(args)
    }

    /// Materializes `value` into a new stack identifier.
    fn push_value(&mut self, value: ValueId) -> Result<VarId> {
        let category = self
            .ir
            .category(value)
            .ok_or_else(|| invariant!("cannot push void value {}", value))?;
        let ty = self.ir.value_type(value);
        let var = self.ir.new_var(VarKind::Stack, category, ty);
        let target = self.ir.var_ref(var);
        let assign = self
            .ir
            .new_value(ValueKind::Assign { target, value }, Some(category))?;
        self.emit(StmtKind::Expression { value: assign })?;
        self.stack.push(var);
        Ok(var)
    }

    fn push_constant(&mut self, literal: Literal) -> Result<()> {
        let value = self.ir.constant(literal);
        self.push_value(value).map(|_| ())
    }

    fn push_new(&mut self, kind: ValueKind, category: StackCategory) -> Result<()> {
        let value = self.ir.new_value(kind, Some(category))?;
        self.push_value(value).map(|_| ())
    }

    fn emit_value(&mut self, kind: ValueKind, category: Option<StackCategory>) -> Result<StmtId> {
        let value = self.ir.new_value(kind, category)?;
        self.emit(StmtKind::Expression { value })
    }

    fn word_size(&self, var: VarId) -> usize {
        self.ir.var(var).category().slot_size() as usize
    }

    /// Copies the top `copy` words and inserts them `skip` words deeper.
    fn dup_words(&mut self, copy: usize, skip: usize) -> Result<()> {
        let mut taken = Vec::new();
        let mut words = 0;
        while words < copy + skip {
            let var = self.pop()?;
            words += self.word_size(var);
            taken.push(var);
        }
        let mut copied = Vec::new();
        let mut copied_words = 0;
        for var in &taken {
            if copied_words == copy {
                break;
            }
            copied_words += self.word_size(*var);
            copied.push(*var);
        }
        if words != copy + skip || copied_words != copy {
            return Err(invariant!(
                "stack words do not split at instruction {}",
                self.current()
            ));
        }
        self.stack.extend(copied.iter().rev());
        self.stack.extend(taken.iter().rev());
        Ok(())
    }

    fn pop_words(&mut self, count: usize) -> Result<()> {
        let mut words = 0;
        while words < count {
            let var = self.pop()?;
            words += self.word_size(var);
        }
        if words != count {
            return Err(invariant!("pop splits a wide value at instruction {}", self.current()));
        }
        Ok(())
    }

    // ============================================================
    // Locals
    // ============================================================

    fn load_local(&mut self, slot: u16, category: StackCategory) -> Result<()> {
        let var = self
            .locals
            .get(slot as usize)
            .copied()
            .flatten()
            .ok_or(DecompileError::UnresolvedLocal {
                slot,
                position: self.current(),
            })?;
        let found = self.ir.var(var).category();
        if found != category {
            return Err(DecompileError::CategoryMismatch {
                position: self.current(),
                expected: category,
                found,
            });
        }
        self.note_access(slot, var, false);
        let value = self.ir.var_ref(var);
        self.push_value(value).map(|_| ())
    }

    /// The identifier a store to `slot` writes: the tracked one while its
    /// category holds, a new one otherwise.
    fn local_for_store(&mut self, slot: u16, category: StackCategory) -> VarId {
        let index = slot as usize;
        let width = category.slot_size() as usize;
        if self.locals.len() < index + width {
            self.locals.resize(index + width, None);
        }
        let var = match self.locals[index] {
            Some(var) if self.ir.var(var).category() == category => var,
            _ => self.ir.new_var(VarKind::Local { slot }, category, None),
        };
        self.locals[index] = Some(var);
        if width == 2 {
            self.locals[index + 1] = None;
        }
        if index > 0 {
            if let Some(previous) = self.locals[index - 1] {
                if self.ir.var(previous).category().is_wide() {
                    self.locals[index - 1] = None;
                }
            }
        }
        var
    }

    fn store_local(&mut self, slot: u16, category: StackCategory) -> Result<()> {
        let value = self.pop_value(category)?;
        let var = self.local_for_store(slot, category);
        self.note_access(slot, var, true);
        let target = self.ir.var_ref(var);
        self.emit_value(ValueKind::Assign { target, value }, Some(category))?;
        Ok(())
    }

    fn note_access(&mut self, slot: u16, var: VarId, store: bool) {
        self.local_accesses.push(LocalAccess {
            slot,
            var,
            position: self.current(),
            store,
        });
    }

    // ============================================================
    // Instruction groups
    // ============================================================

    fn binary(&mut self, op: BinaryOp, category: StackCategory) -> Result<()> {
        let rhs = self.pop_value(category)?;
        let lhs = self.pop_value(category)?;
        self.push_new(ValueKind::Binary { op, lhs, rhs }, category)
    }

    fn shift(&mut self, op: ShiftOp, category: StackCategory) -> Result<()> {
        let rhs = self.pop_value(StackCategory::Int)?;
        let lhs = self.pop_value(category)?;
        self.push_new(ValueKind::Shift { op, lhs, rhs }, category)
    }

    fn cast(&mut self, from: StackCategory, target: JvmType) -> Result<()> {
        let operand = self.pop_value(from)?;
        let category = target.category().unwrap_or(StackCategory::Reference);
        self.push_new(ValueKind::Cast { target, operand }, category)
    }

    fn float_compare(&mut self, bias: NanBias, category: StackCategory) -> Result<()> {
        let rhs = self.pop_value(category)?;
        let lhs = self.pop_value(category)?;
        self.push_new(ValueKind::FloatCompare { bias, lhs, rhs }, StackCategory::Int)
    }

    fn array_load(&mut self, category: StackCategory) -> Result<()> {
        let index = self.pop_value(StackCategory::Int)?;
        let array = self.pop_value(StackCategory::Reference)?;
        self.push_new(ValueKind::ArrayElement { array, index }, category)
    }

    fn array_store(&mut self, category: StackCategory) -> Result<()> {
        let value = self.pop_value(category)?;
        let index = self.pop_value(StackCategory::Int)?;
        let array = self.pop_value(StackCategory::Reference)?;
        let target = self
            .ir
            .new_value(ValueKind::ArrayElement { array, index }, Some(category))?;
        self.emit_value(ValueKind::Assign { target, value }, Some(category))?;
        Ok(())
    }

    fn return_value(&mut self, category: StackCategory) -> Result<()> {
        let value = self.pop_value(category)?;
        self.emit(StmtKind::ReturnValue { value })?;
        self.reachable = false;
        Ok(())
    }

    fn conditional(&mut self, op: CompareOp, lhs: ValueId, rhs: ValueId, target: Label) -> Result<()> {
        let cond = self
            .ir
            .new_value(ValueKind::Condition { op, lhs, rhs }, Some(StackCategory::Int))?;
        let target = self.branch_to(target)?;
        self.emit(StmtKind::IfGoto { cond, target })?;
        Ok(())
    }
}

fn invalid(opcode: Opcode, category: &'static str) -> DecompileError {
    DecompileError::InvalidOpcode { opcode, category }
}

fn compare_op(opcode: Opcode, base: Opcode) -> CompareOp {
    match opcode - base {
        0 => CompareOp::Eq,
        1 => CompareOp::Ne,
        2 => CompareOp::Lt,
        3 => CompareOp::Ge,
        4 => CompareOp::Gt,
        _ => CompareOp::Le,
    }
}

/// Stack category of the typed variants of load/store/return/array opcodes,
/// which all follow the int, long, float, double, reference order.
fn typed_category(offset: u8) -> StackCategory {
    match offset {
        0 => StackCategory::Int,
        1 => StackCategory::Long,
        2 => StackCategory::Float,
        3 => StackCategory::Double,
        _ => StackCategory::Reference,
    }
}

impl MethodVisitor for Generator {
    fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> Result<()> {
        let region = self.ir.new_region(catch_type);
        self.try_blocks.push(TryBlock {
            start,
            end,
            handler,
            region,
        });
        Ok(())
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        self.label_pos.insert(label, self.position);
        self.pending.push(label);
        self.unplaced.push(label);
        Ok(())
    }

    fn visit_line_number(&mut self, line: u32, _start: Label) -> Result<()> {
        self.line = Some(line);
        Ok(())
    }

    fn visit_frame(&mut self, frame: &Frame) -> Result<()> {
        self.install_frame(frame)
    }

    fn visit_insn(&mut self, opcode: Opcode) -> Result<()> {
        self.begin_insn()?;
        use StackCategory::*;
        match opcode {
            // ============================================================
            // Constants
            // ============================================================
            NOP => Ok(()),
            ACONST_NULL => self.push_constant(Literal::Null),
            ICONST_M1..=ICONST_5 => self.push_constant(Literal::Int(opcode as i32 - ICONST_0 as i32)),
            LCONST_0 | LCONST_1 => self.push_constant(Literal::Long((opcode - LCONST_0) as i64)),
            FCONST_0..=FCONST_2 => self.push_constant(Literal::Float((opcode - FCONST_0) as f32)),
            DCONST_0 | DCONST_1 => self.push_constant(Literal::Double((opcode - DCONST_0) as f64)),

            // ============================================================
            // Arrays
            // ============================================================
            IALOAD..=AALOAD => self.array_load(typed_category(opcode - IALOAD)),
            BALOAD | CALOAD | SALOAD => self.array_load(Int),
            IASTORE..=AASTORE => self.array_store(typed_category(opcode - IASTORE)),
            BASTORE | CASTORE | SASTORE => self.array_store(Int),
            ARRAYLENGTH => {
                let array = self.pop_value(Reference)?;
                self.push_new(ValueKind::ArrayLength { array }, Int)
            }

            // ============================================================
            // Stack manipulation
            // ============================================================
            POP => self.pop_words(1),
            POP2 => self.pop_words(2),
            DUP => self.dup_words(1, 0),
            DUP_X1 => self.dup_words(1, 1),
            DUP_X2 => self.dup_words(1, 2),
            DUP2 => self.dup_words(2, 0),
            DUP2_X1 => self.dup_words(2, 1),
            DUP2_X2 => self.dup_words(2, 2),
            SWAP => {
                let top = self.pop()?;
                let below = self.pop()?;
                if self.word_size(top) != 1 || self.word_size(below) != 1 {
                    return Err(invariant!("swap of a wide value at instruction {}", self.current()));
                }
                self.stack.push(top);
                self.stack.push(below);
                Ok(())
            }

            // ============================================================
            // Arithmetic
            // ============================================================
            IADD..=DREM => {
                let op = match (opcode - IADD) / 4 {
                    0 => BinaryOp::Add,
                    1 => BinaryOp::Sub,
                    2 => BinaryOp::Mul,
                    3 => BinaryOp::Div,
                    _ => BinaryOp::Rem,
                };
                self.binary(op, typed_category((opcode - IADD) % 4))
            }
            INEG..=DNEG => {
                let category = typed_category(opcode - INEG);
                let operand = self.pop_value(category)?;
                self.push_new(ValueKind::Negate { operand }, category)
            }
            ISHL..=LUSHR => {
                let op = match (opcode - ISHL) / 2 {
                    0 => ShiftOp::Shl,
                    1 => ShiftOp::Shr,
                    _ => ShiftOp::Ushr,
                };
                let category = if (opcode - ISHL) % 2 == 0 { Int } else { Long };
                self.shift(op, category)
            }
            IAND..=LXOR => {
                let op = match (opcode - IAND) / 2 {
                    0 => BinaryOp::And,
                    1 => BinaryOp::Or,
                    _ => BinaryOp::Xor,
                };
                let category = if (opcode - IAND) % 2 == 0 { Int } else { Long };
                self.binary(op, category)
            }

            // ============================================================
            // Conversions and comparisons
            // ============================================================
            I2L => self.cast(Int, JvmType::Long),
            I2F => self.cast(Int, JvmType::Float),
            I2D => self.cast(Int, JvmType::Double),
            L2I => self.cast(Long, JvmType::Int),
            L2F => self.cast(Long, JvmType::Float),
            L2D => self.cast(Long, JvmType::Double),
            F2I => self.cast(Float, JvmType::Int),
            F2L => self.cast(Float, JvmType::Long),
            F2D => self.cast(Float, JvmType::Double),
            D2I => self.cast(Double, JvmType::Int),
            D2L => self.cast(Double, JvmType::Long),
            D2F => self.cast(Double, JvmType::Float),
            I2B => self.cast(Int, JvmType::Byte),
            I2C => self.cast(Int, JvmType::Char),
            I2S => self.cast(Int, JvmType::Short),
            LCMP => {
                let rhs = self.pop_value(Long)?;
                let lhs = self.pop_value(Long)?;
                self.push_new(ValueKind::LongCompare { lhs, rhs }, Int)
            }
            FCMPL => self.float_compare(NanBias::Less, Float),
            FCMPG => self.float_compare(NanBias::Greater, Float),
            DCMPL => self.float_compare(NanBias::Less, Double),
            DCMPG => self.float_compare(NanBias::Greater, Double),

            // ============================================================
            // Control transfer
            // ============================================================
            IRETURN..=ARETURN => self.return_value(typed_category(opcode - IRETURN)),
            RETURN => {
                self.emit(StmtKind::ReturnVoid)?;
                self.reachable = false;
                Ok(())
            }
            ATHROW => {
                let value = self.pop_value(Reference)?;
                self.emit(StmtKind::Throw { value })?;
                self.reachable = false;
                Ok(())
            }
            MONITORENTER => {
                let lock = self.pop_value(Reference)?;
                self.emit(StmtKind::MonitorEnter { lock }).map(|_| ())
            }
            MONITOREXIT => {
                let lock = self.pop_value(Reference)?;
                self.emit(StmtKind::MonitorExit { lock }).map(|_| ())
            }
            _ => Err(invalid(opcode, "zero-operand")),
        }
    }

    fn visit_int_insn(&mut self, opcode: Opcode, operand: i32) -> Result<()> {
        self.begin_insn()?;
        match opcode {
            BIPUSH | SIPUSH => self.push_constant(Literal::Int(operand)),
            NEWARRAY => {
                let element = u8::try_from(operand)
                    .ok()
                    .and_then(newarray_type)
                    .ok_or_else(|| invariant!("bad newarray type {}", operand))?;
                let length = self.pop_value(StackCategory::Int)?;
                self.push_new(ValueKind::NewArray { element, length }, StackCategory::Reference)
            }
            _ => Err(invalid(opcode, "int-operand")),
        }
    }

    fn visit_var_insn(&mut self, opcode: Opcode, slot: u16) -> Result<()> {
        self.begin_insn()?;
        match opcode {
            ILOAD..=ALOAD => self.load_local(slot, typed_category(opcode - ILOAD)),
            ISTORE..=ASTORE => {
                // `astore` also spills `jsr` return addresses.
                let category = match (opcode, self.stack.last()) {
                    (ASTORE, Some(top)) if self.ir.var(*top).category() == StackCategory::ReturnAddress => {
                        StackCategory::ReturnAddress
                    }
                    _ => typed_category(opcode - ISTORE),
                };
                self.store_local(slot, category)
            }
            RET => {
                let var = self
                    .locals
                    .get(slot as usize)
                    .copied()
                    .flatten()
                    .ok_or(DecompileError::UnresolvedLocal {
                        slot,
                        position: self.current(),
                    })?;
                self.note_access(slot, var, false);
                let address = self.ir.var_ref(var);
                self.emit(StmtKind::Ret { address })?;
                self.reachable = false;
                Ok(())
            }
            _ => Err(invalid(opcode, "local variable")),
        }
    }

    fn visit_type_insn(&mut self, opcode: Opcode, type_name: &str) -> Result<()> {
        let labels = self.begin_insn()?;
        match opcode {
            NEW => {
                let var = self.ir.new_var(
                    VarKind::Stack,
                    StackCategory::Reference,
                    Some(JvmType::Reference(type_name.to_string())),
                );
                for label in labels {
                    self.new_sites.insert(label, type_name.to_string());
                }
                self.uninitialized.push((var, type_name.to_string()));
                self.stack.push(var);
                Ok(())
            }
            ANEWARRAY => {
                let element = JvmType::from_internal_name(type_name)?;
                let length = self.pop_value(StackCategory::Int)?;
                self.push_new(ValueKind::NewArray { element, length }, StackCategory::Reference)
            }
            CHECKCAST => {
                let target = JvmType::from_internal_name(type_name)?;
                let operand = self.pop_value(StackCategory::Reference)?;
                self.push_new(ValueKind::Cast { target, operand }, StackCategory::Reference)
            }
            INSTANCEOF => {
                let class = JvmType::from_internal_name(type_name)?;
                let operand = self.pop_value(StackCategory::Reference)?;
                self.push_new(ValueKind::InstanceOf { class, operand }, StackCategory::Int)
            }
            _ => Err(invalid(opcode, "type")),
        }
    }

    fn visit_field_insn(&mut self, opcode: Opcode, field: &FieldRef) -> Result<()> {
        self.begin_insn()?;
        let category = field
            .field_type()?
            .category()
            .ok_or_else(|| DecompileError::Descriptor(field.descriptor.clone()))?;
        match opcode {
            GETSTATIC => self.push_new(ValueKind::StaticField { field: field.clone() }, category),
            PUTSTATIC => {
                let value = self.pop_value(category)?;
                let target = self
                    .ir
                    .new_value(ValueKind::StaticField { field: field.clone() }, Some(category))?;
                self.emit_value(ValueKind::Assign { target, value }, Some(category))
                    .map(|_| ())
            }
            GETFIELD => {
                let object = self.pop_value(StackCategory::Reference)?;
                self.push_new(
                    ValueKind::InstanceField {
                        field: field.clone(),
                        object,
                    },
                    category,
                )
            }
            PUTFIELD => {
                let value = self.pop_value(category)?;
                let object = self.pop_value(StackCategory::Reference)?;
                let target = self.ir.new_value(
                    ValueKind::InstanceField {
                        field: field.clone(),
                        object,
                    },
                    Some(category),
                )?;
                self.emit_value(ValueKind::Assign { target, value }, Some(category))
                    .map(|_| ())
            }
            _ => Err(invalid(opcode, "field")),
        }
    }

    fn visit_method_insn(&mut self, opcode: Opcode, method: &MethodRef) -> Result<()> {
        self.begin_insn()?;
        let kind = match opcode {
            INVOKEVIRTUAL => InvokeKind::Virtual,
            INVOKESPECIAL => InvokeKind::Special,
            INVOKESTATIC => InvokeKind::Static,
            INVOKEINTERFACE => InvokeKind::Interface,
            _ => return Err(invalid(opcode, "method")),
        };
        let signature = method.signature()?;
        let args = self.pop_args(&signature)?;
        let receiver = match kind {
            InvokeKind::Static => None,
            _ => Some(self.pop_var(StackCategory::Reference)?),
        };

        if let (InvokeKind::Special, Some(receiver), true) = (kind, receiver, method.name == "<init>") {
            if let Some(class) = self.uninitialized_class(receiver) {
                let ir = &self.ir;
                self.uninitialized.retain(|(var, _)| !ir.same_var(*var, receiver));
                let value = self.ir.new_value(
                    ValueKind::New {
                        class,
                        constructor: method.clone(),
                        args,
                    },
                    Some(StackCategory::Reference),
                )?;
                let target = self.ir.var_ref(receiver);
                self.emit_value(ValueKind::Assign { target, value }, Some(StackCategory::Reference))?;
                return Ok(());
            }
        }

        let receiver = receiver.map(|var| self.ir.var_ref(var));
        let category = signature.ret.category();
        let value = self.ir.new_value(
            ValueKind::Invoke {
                kind,
                method: method.clone(),
                receiver,
                args,
            },
            category,
        )?;
        match category {
            Some(_) => self.push_value(value).map(|_| ()),
            None => self.emit(StmtKind::Expression { value }).map(|_| ()),
        }
    }

    fn visit_invoke_dynamic_insn(&mut self, call_site: &CallSite) -> Result<()> {
        self.begin_insn()?;
        let signature = MethodDescriptor::parse(&call_site.descriptor)?;
        let args = self.pop_args(&signature)?;
        let category = signature.ret.category();
        let value = self.ir.new_value(
            ValueKind::InvokeDynamic {
                call_site: call_site.clone(),
                args,
            },
            category,
        )?;
        match category {
            Some(_) => self.push_value(value).map(|_| ()),
            None => self.emit(StmtKind::Expression { value }).map(|_| ()),
        }
    }

    fn visit_jump_insn(&mut self, opcode: Opcode, target: Label) -> Result<()> {
        self.begin_insn()?;
        match opcode {
            IFEQ..=IFLE => {
                let lhs = self.pop_value(StackCategory::Int)?;
                let rhs = self.ir.constant(Literal::Int(0));
                self.conditional(compare_op(opcode, IFEQ), lhs, rhs, target)
            }
            IF_ICMPEQ..=IF_ICMPLE => {
                let rhs = self.pop_value(StackCategory::Int)?;
                let lhs = self.pop_value(StackCategory::Int)?;
                self.conditional(compare_op(opcode, IF_ICMPEQ), lhs, rhs, target)
            }
            IF_ACMPEQ | IF_ACMPNE => {
                let rhs = self.pop_value(StackCategory::Reference)?;
                let lhs = self.pop_value(StackCategory::Reference)?;
                self.conditional(compare_op(opcode, IF_ACMPEQ), lhs, rhs, target)
            }
            IFNULL | IFNONNULL => {
                let lhs = self.pop_value(StackCategory::Reference)?;
                let rhs = self.ir.constant(Literal::Null);
                let op = if opcode == IFNULL { CompareOp::Eq } else { CompareOp::Ne };
                self.conditional(op, lhs, rhs, target)
            }
            GOTO | GOTO_W => {
                let target = self.branch_to(target)?;
                self.emit(StmtKind::Goto { target })?;
                self.reachable = false;
                Ok(())
            }
            JSR | JSR_W => {
                let var = self.ir.new_var(VarKind::Stack, StackCategory::ReturnAddress, None);
                self.stack.push(var);
                let label = self.branch_to(target)?;
                self.stack.pop();
                let address = self.ir.var_ref(var);
                self.emit(StmtKind::Jsr { target: label, address })?;
                Ok(())
            }
            _ => Err(invalid(opcode, "jump")),
        }
    }

    fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<()> {
        self.begin_insn()?;
        self.push_constant(Literal::from(constant.clone()))
    }

    fn visit_iinc_insn(&mut self, slot: u16, increment: i16) -> Result<()> {
        self.begin_insn()?;
        let var = self
            .locals
            .get(slot as usize)
            .copied()
            .flatten()
            .ok_or(DecompileError::UnresolvedLocal {
                slot,
                position: self.current(),
            })?;
        self.note_access(slot, var, true);
        let target = self.ir.var_ref(var);
        let value = self.ir.constant(Literal::Int(increment as i32));
        self.emit_value(
            ValueKind::CompoundAssign {
                op: BinaryOp::Add,
                target,
                value,
            },
            Some(StackCategory::Int),
        )
        .map(|_| ())
    }

    fn visit_table_switch_insn(&mut self, low: i32, high: i32, default: Label, targets: &[Label]) -> Result<()> {
        self.begin_insn()?;
        if (high as i64 - low as i64 + 1) != targets.len() as i64 {
            return Err(invariant!(
                "tableswitch {}..={} lists {} targets",
                low,
                high,
                targets.len()
            ));
        }
        let key = self.pop_value(StackCategory::Int)?;
        let default = self.branch_to(default)?;
        let mut labels = Vec::with_capacity(targets.len());
        for target in targets {
            labels.push(self.branch_to(*target)?);
        }
        self.emit(StmtKind::TableSwitch {
            key,
            low,
            default,
            targets: labels,
        })?;
        self.reachable = false;
        Ok(())
    }

    fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], targets: &[Label]) -> Result<()> {
        self.begin_insn()?;
        if keys.len() != targets.len() {
            return Err(invariant!("lookupswitch has {} keys for {} targets", keys.len(), targets.len()));
        }
        let key = self.pop_value(StackCategory::Int)?;
        let default = self.branch_to(default)?;
        let mut cases = Vec::with_capacity(keys.len());
        for (value, target) in keys.iter().zip(targets) {
            cases.push((*value, self.branch_to(*target)?));
        }
        self.emit(StmtKind::LookupSwitch { key, default, cases })?;
        self.reachable = false;
        Ok(())
    }

    fn visit_multi_anew_array_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<()> {
        self.begin_insn()?;
        let array_type = parse_type_descriptor(descriptor)?;
        let mut counts = Vec::with_capacity(dimensions as usize);
        for _ in 0..dimensions {
            counts.push(self.pop_value(StackCategory::Int)?);
        }
        counts.reverse();
        self.push_new(
            ValueKind::NewMultiArray {
                array_type,
                dimensions: counts,
            },
            StackCategory::Reference,
        )
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
        self.debug_table.push(PendingLocal {
            entry: LocalVariableEntry {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                signature: signature.map(str::to_string),
                slot,
                vars: Vec::new(),
            },
            start,
            end,
        });
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        for (label, id) in &self.ir_labels {
            if self.ir.label_target(*id).is_none() {
                return Err(DecompileError::UndefinedLabel(label.0));
            }
        }
        if let Some(label) = self.deferred.keys().next() {
            return Err(DecompileError::UndefinedLabel(label.0));
        }
        if self.options.attach_debug_names {
            self.attach_debug_names()?;
        }
        self.ended = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
