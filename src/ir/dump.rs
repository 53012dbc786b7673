//! Compact Java-like rendering used for logging and test assertions.

use std::fmt::Write;

use crate::ir::{BlockId, Fixity, Ir, Literal, NanBias, Step, StmtId, StmtKind, ValueId, ValueKind, VarKind};
use crate::types::{simple_class_name, StackCategory};

impl Ir {
    /// Renders `block` one statement per line, nested blocks indented.
    pub fn dump(&self, block: BlockId) -> String {
        let mut out = String::new();
        self.dump_block(block, 0, &mut out);
        out
    }

    fn dump_block(&self, block: BlockId, depth: usize, out: &mut String) {
        for stmt in self.block_stmts(block) {
            self.dump_stmt(stmt, depth, out);
        }
    }

    fn dump_stmt(&self, stmt: StmtId, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let mut prefix = String::new();
        for label in self.stmt(stmt).labels() {
            let _ = write!(prefix, "{}: ", label);
        }
        let line = match self.stmt_kind(stmt) {
            StmtKind::BlockBegin | StmtKind::BlockEnd => return,
            StmtKind::Expression { value } => format!("{};", self.render(*value, true)),
            StmtKind::Goto { target } => format!("goto {};", target),
            StmtKind::IfGoto { cond, target } => format!("if ({}) goto {};", self.render(*cond, true), target),
            StmtKind::Jsr { target, address } => format!("jsr {} -> {};", target, self.render(*address, true)),
            StmtKind::Ret { address } => format!("ret {};", self.render(*address, true)),
            StmtKind::TableSwitch {
                key,
                low,
                default,
                targets,
            } => {
                let cases: Vec<String> = targets
                    .iter()
                    .enumerate()
                    .map(|(offset, label)| format!("{}: {}", *low as i64 + offset as i64, label))
                    .collect();
                format!(
                    "switch ({}) {{ {}, default: {} }}",
                    self.render(*key, true),
                    cases.join(", "),
                    default
                )
            }
            StmtKind::LookupSwitch { key, default, cases } => {
                let cases: Vec<String> = cases
                    .iter()
                    .map(|(value, label)| format!("{}: {}", value, label))
                    .collect();
                format!(
                    "switch ({}) {{ {}, default: {} }}",
                    self.render(*key, true),
                    cases.join(", "),
                    default
                )
            }
            StmtKind::ReturnValue { value } => format!("return {};", self.render(*value, true)),
            StmtKind::ReturnVoid => "return;".to_string(),
            StmtKind::Throw { value } => format!("throw {};", self.render(*value, true)),
            StmtKind::MonitorEnter { lock } => format!("monitorenter({});", self.render(*lock, true)),
            StmtKind::MonitorExit { lock } => format!("monitorexit({});", self.render(*lock, true)),
            StmtKind::TryStart { region } => format!("try_start {};", region),
            StmtKind::TryEnd { region } => format!("try_end {};", region),
            StmtKind::Catch { regions, exception } => {
                let regions: Vec<String> = regions.iter().map(|r| r.to_string()).collect();
                format!("catch {} ({});", regions.join(", "), self.render(*exception, true))
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let _ = writeln!(out, "{}{}if ({}) {{", indent, prefix, self.render(*cond, true));
                self.dump_block(*then_block, depth + 1, out);
                if let Some(else_block) = else_block {
                    let _ = writeln!(out, "{}}} else {{", indent);
                    self.dump_block(*else_block, depth + 1, out);
                }
                let _ = writeln!(out, "{}}}", indent);
                return;
            }
            StmtKind::While { cond, body } => {
                let _ = writeln!(out, "{}{}while ({}) {{", indent, prefix, self.render(*cond, true));
                self.dump_block(*body, depth + 1, out);
                let _ = writeln!(out, "{}}}", indent);
                return;
            }
            StmtKind::DoWhile { body, cond } => {
                let _ = writeln!(out, "{}{}do {{", indent, prefix);
                self.dump_block(*body, depth + 1, out);
                let _ = writeln!(out, "{}}} while ({});", indent, self.render(*cond, true));
                return;
            }
            StmtKind::Synchronized { lock, body } => {
                let _ = writeln!(out, "{}{}synchronized ({}) {{", indent, prefix, self.render(*lock, true));
                self.dump_block(*body, depth + 1, out);
                let _ = writeln!(out, "{}}}", indent);
                return;
            }
        };
        let _ = writeln!(out, "{}{}{}", indent, prefix, line);
    }

    /// Renders one value tree.
    pub fn render_value(&self, value: ValueId) -> String {
        self.render(value, true)
    }

    fn render(&self, value: ValueId, top: bool) -> String {
        let wrap = |text: String| if top { text } else { format!("({})", text) };
        let list = |values: &[ValueId]| {
            values
                .iter()
                .map(|v| self.render(*v, true))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self.value_kind(value) {
            ValueKind::Constant(literal) => render_literal(literal),
            ValueKind::Local(var) => {
                let node = self.var(*var);
                match (node.debug().first(), node.kind()) {
                    (Some(local), _) => local.name.clone(),
                    (None, VarKind::Local { slot }) => format!("l{}", slot),
                    (None, VarKind::Stack) => format!("s{}", self.root_var(*var).0),
                }
            }
            ValueKind::Stack(var) => format!("s{}", self.root_var(*var).0),
            ValueKind::ArrayElement { array, index } => {
                format!("{}[{}]", self.render(*array, false), self.render(*index, true))
            }
            ValueKind::Binary { op, lhs, rhs } => wrap(format!(
                "{} {} {}",
                self.render(*lhs, false),
                op.as_str(),
                self.render(*rhs, false)
            )),
            ValueKind::Shift { op, lhs, rhs } => wrap(format!(
                "{} {} {}",
                self.render(*lhs, false),
                op.as_str(),
                self.render(*rhs, false)
            )),
            ValueKind::Negate { operand } => format!("-{}", self.render(*operand, false)),
            ValueKind::Cast { target, operand } => wrap(format!("({}) {}", target, self.render(*operand, false))),
            ValueKind::LongCompare { lhs, rhs } => {
                format!("lcmp({}, {})", self.render(*lhs, true), self.render(*rhs, true))
            }
            ValueKind::FloatCompare { bias, lhs, rhs } => {
                let prefix = if self.category(*lhs) == Some(StackCategory::Double) {
                    "dcmp"
                } else {
                    "fcmp"
                };
                let suffix = match bias {
                    NanBias::Less => "l",
                    NanBias::Greater => "g",
                };
                format!(
                    "{}{}({}, {})",
                    prefix,
                    suffix,
                    self.render(*lhs, true),
                    self.render(*rhs, true)
                )
            }
            ValueKind::Condition { op, lhs, rhs } => wrap(format!(
                "{} {} {}",
                self.render(*lhs, false),
                op.as_str(),
                self.render(*rhs, false)
            )),
            ValueKind::InstanceField { field, object } => {
                format!("{}.{}", self.render(*object, false), field.name)
            }
            ValueKind::StaticField { field } => {
                format!("{}.{}", simple_class_name(&field.owner), field.name)
            }
            ValueKind::Invoke {
                method,
                receiver,
                args,
                ..
            } => {
                let owner = match receiver {
                    Some(receiver) => self.render(*receiver, false),
                    None => simple_class_name(&method.owner).to_string(),
                };
                format!("{}.{}({})", owner, method.name, list(args.as_slice()))
            }
            ValueKind::InvokeDynamic { call_site, args } => {
                format!("indy {}({})", call_site.name, list(args.as_slice()))
            }
            ValueKind::New { class, args, .. } => {
                format!("new {}({})", simple_class_name(class), list(args.as_slice()))
            }
            ValueKind::NewArray { element, length } => {
                format!("new {}[{}]", element, self.render(*length, true))
            }
            ValueKind::NewMultiArray {
                array_type,
                dimensions,
            } => {
                let dims: String = dimensions
                    .iter()
                    .map(|d| format!("[{}]", self.render(*d, true)))
                    .collect();
                format!("new {}{}", array_type, dims)
            }
            ValueKind::ArrayLength { array } => format!("{}.length", self.render(*array, false)),
            ValueKind::InstanceOf { class, operand } => {
                wrap(format!("{} instanceof {}", self.render(*operand, false), class))
            }
            ValueKind::Assign { target, value } => wrap(format!(
                "{} = {}",
                self.render(*target, true),
                self.render(*value, true)
            )),
            ValueKind::CompoundAssign { op, target, value } => wrap(format!(
                "{} {}= {}",
                self.render(*target, true),
                op.as_str(),
                self.render(*value, true)
            )),
            ValueKind::ShiftAssign { op, target, value } => wrap(format!(
                "{} {}= {}",
                self.render(*target, true),
                op.as_str(),
                self.render(*value, true)
            )),
            ValueKind::Increment { fixity, step, target } => {
                let op = match step {
                    Step::Increment => "++",
                    Step::Decrement => "--",
                };
                match fixity {
                    Fixity::Prefix => format!("{}{}", op, self.render(*target, false)),
                    Fixity::Suffix => format!("{}{}", self.render(*target, false), op),
                }
            }
            ValueKind::Not { operand } => format!("!{}", self.render(*operand, false)),
            ValueKind::LogicalAnd { lhs, rhs } => wrap(format!(
                "{} && {}",
                self.render(*lhs, false),
                self.render(*rhs, false)
            )),
            ValueKind::LogicalOr { lhs, rhs } => wrap(format!(
                "{} || {}",
                self.render(*lhs, false),
                self.render(*rhs, false)
            )),
            ValueKind::Ternary {
                cond,
                then_value,
                else_value,
            } => wrap(format!(
                "{} ? {} : {}",
                self.render(*cond, false),
                self.render(*then_value, false),
                self.render(*else_value, false)
            )),
            ValueKind::Concat { parts } => format!("concat({})", list(parts.as_slice())),
            ValueKind::NullChecked { operand } => format!("nullcheck({})", self.render(*operand, true)),
            ValueKind::Placeholder => "<?>".to_string(),
        }
    }
}

fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Null => "null".to_string(),
        Literal::Int(v) => v.to_string(),
        Literal::Long(v) => format!("{}L", v),
        Literal::Float(v) => format!("{:?}F", v),
        Literal::Double(v) => format!("{:?}D", v),
        Literal::Char(c) => match char::from_u32(*c as u32) {
            Some(ch) if ch.is_ascii_graphic() || ch == ' ' => format!("'{}'", ch),
            _ => format!("'\\u{:04x}'", c),
        },
        Literal::Byte(v) => format!("(byte) {}", v),
        Literal::Short(v) => format!("(short) {}", v),
        Literal::Boolean(v) => v.to_string(),
        Literal::String(s) => format!("\"{}\"", s.escape_debug()),
        Literal::Type(name) => format!("{}.class", name.replace('/', ".")),
        Literal::MethodType(descriptor) => format!("methodtype({})", descriptor),
        Literal::Handle(handle) => format!("handle({}.{})", simple_class_name(&handle.owner), handle.name),
        Literal::Dynamic(dynamic) => format!("dynamic {}", dynamic.name),
    }
}
