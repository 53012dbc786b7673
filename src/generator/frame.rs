//! Frame installation and deferred reconciliation of merge points.
//!
//! A jump to a label whose frame has not been seen yet records the jump-time
//! state; the record is merged into the declared state once the frame shows
//! up. Jumps to labels already installed merge immediately.

use log::trace;

use super::Generator;
use crate::error::{DecompileError, Result};
use crate::ir::{VarId, VarKind};
use crate::types::{JvmType, StackCategory};
use crate::visitor::{Frame, FrameItem, Label};

/// Locals and stack identifiers at one program point.
#[derive(Clone, Debug)]
pub(super) struct State {
    /// `None` for exception edges, whose stack is replaced by the exception.
    pub(super) stack: Option<Vec<VarId>>,
    pub(super) locals: Vec<Option<VarId>>,
    /// Exception edges skip locals that do not line up instead of failing.
    pub(super) tolerant: bool,
}

pub(super) fn item_category(item: &FrameItem) -> Option<StackCategory> {
    match item {
        FrameItem::Top => None,
        FrameItem::Integer => Some(StackCategory::Int),
        FrameItem::Float => Some(StackCategory::Float),
        FrameItem::Long => Some(StackCategory::Long),
        FrameItem::Double => Some(StackCategory::Double),
        FrameItem::Null
        | FrameItem::UninitializedThis
        | FrameItem::Object(_)
        | FrameItem::Uninitialized(_) => Some(StackCategory::Reference),
    }
}

impl Generator {
    fn item_type(&self, item: &FrameItem) -> Option<JvmType> {
        match item {
            FrameItem::Float => Some(JvmType::Float),
            FrameItem::Long => Some(JvmType::Long),
            FrameItem::Double => Some(JvmType::Double),
            FrameItem::Object(name) => JvmType::from_internal_name(name).ok(),
            FrameItem::UninitializedThis => Some(JvmType::Reference(self.header.owner.clone())),
            FrameItem::Uninitialized(label) => self.new_sites.get(label).cloned().map(JvmType::Reference),
            FrameItem::Top | FrameItem::Integer | FrameItem::Null => None,
        }
    }

    /// The current state as a jump record.
    pub(super) fn snapshot(&self, tolerant: bool) -> State {
        State {
            stack: if tolerant { None } else { Some(self.stack.clone()) },
            locals: self.locals.clone(),
            tolerant,
        }
    }

    /// Builds the state a frame declares, reusing tracked identifiers where
    /// control falls through into it.
    fn declare(&mut self, frame: &Frame) -> Result<State> {
        let mut locals = Vec::new();
        for item in &frame.locals {
            let slot = locals.len();
            let Some(category) = item_category(item) else {
                locals.push(None);
                continue;
            };
            let var = if self.reachable {
                let tracked = self
                    .locals
                    .get(slot)
                    .copied()
                    .flatten()
                    .ok_or(DecompileError::UnresolvedLocal {
                        slot: slot as u16,
                        position: self.position,
                    })?;
                let found = self.ir.var(tracked).category();
                if found != category {
                    return Err(DecompileError::CategoryMismatch {
                        position: self.position,
                        expected: category,
                        found,
                    });
                }
                tracked
            } else {
                let ty = self.item_type(item);
                self.ir.new_var(VarKind::Local { slot: slot as u16 }, category, ty)
            };
            locals.push(Some(var));
            if item.is_wide() {
                locals.push(None);
            }
        }

        if self.reachable && self.stack.len() != frame.stack.len() {
            return Err(DecompileError::FrameMismatch {
                position: self.position,
                message: format!(
                    "stack holds {} values but the frame declares {}",
                    self.stack.len(),
                    frame.stack.len()
                ),
            });
        }
        let mut stack = Vec::with_capacity(frame.stack.len());
        for (depth, item) in frame.stack.iter().enumerate() {
            let category = item_category(item).ok_or_else(|| DecompileError::FrameMismatch {
                position: self.position,
                message: "`top` on the operand stack".to_string(),
            })?;
            let var = if self.reachable {
                let tracked = self.stack[depth];
                let found = self.ir.var(tracked).category();
                if found != category {
                    return Err(DecompileError::CategoryMismatch {
                        position: self.position,
                        expected: category,
                        found,
                    });
                }
                tracked
            } else {
                let ty = self.item_type(item);
                let var = self.ir.new_var(VarKind::Stack, category, ty);
                if let FrameItem::Uninitialized(site) = item {
                    if let Some(class) = self.new_sites.get(site).cloned() {
                        self.uninitialized.push((var, class));
                    }
                }
                var
            };
            stack.push(var);
        }
        Ok(State {
            stack: Some(stack),
            locals,
            tolerant: false,
        })
    }

    /// Installs a declared frame at the current position.
    pub(super) fn install_frame(&mut self, frame: &Frame) -> Result<()> {
        let declared = self.declare(frame)?;
        trace!(
            "frame at {}: {} locals, {} stack",
            self.position,
            declared.locals.len(),
            frame.stack.len()
        );
        self.install(declared)
    }

    /// Makes `declared` the state of every label visited since the last
    /// instruction and applies their deferred records.
    pub(super) fn install(&mut self, declared: State) -> Result<()> {
        let labels = self.pending.clone();
        for label in labels {
            if self.installed.contains_key(&label) {
                continue;
            }
            self.installed.insert(label, declared.clone());
            if let Some(records) = self.deferred.remove(&label) {
                for record in records {
                    self.reconcile(&record, &declared)?;
                }
            }
        }
        self.stack = declared.stack.unwrap_or_default();
        self.locals = declared.locals;
        self.reachable = true;
        Ok(())
    }

    /// Records the state flowing into `target`, merging right away when the
    /// target is already installed.
    pub(super) fn record_edge(&mut self, target: Label, record: State) -> Result<()> {
        match self.installed.get(&target).cloned() {
            Some(declared) => self.reconcile(&record, &declared),
            None => {
                self.deferred.entry(target).or_default().push(record);
                Ok(())
            }
        }
    }

    fn reconcile(&mut self, record: &State, declared: &State) -> Result<()> {
        if let (Some(recorded), Some(expected)) = (&record.stack, &declared.stack) {
            if recorded.len() != expected.len() {
                return Err(DecompileError::FrameMismatch {
                    position: self.position,
                    message: format!(
                        "incoming edge carries {} stack values, target declares {}",
                        recorded.len(),
                        expected.len()
                    ),
                });
            }
            for (incoming, target) in recorded.iter().zip(expected) {
                self.merge_pending(*incoming, *target)?;
            }
        }
        for (slot, target) in declared.locals.iter().enumerate() {
            let Some(target) = *target else {
                continue;
            };
            let incoming = record.locals.get(slot).copied().flatten();
            match incoming {
                Some(incoming)
                    if self.ir.var(incoming).category() == self.ir.var(target).category() =>
                {
                    self.ir.merge_vars(incoming, target)?;
                }
                _ if record.tolerant => {}
                Some(incoming) => {
                    return Err(DecompileError::CategoryMismatch {
                        position: self.position,
                        expected: self.ir.var(target).category(),
                        found: self.ir.var(incoming).category(),
                    });
                }
                None => {
                    return Err(DecompileError::UnresolvedLocal {
                        slot: slot as u16,
                        position: self.position,
                    });
                }
            }
        }
        Ok(())
    }

    /// Merges two stack identifiers, keeping track of pending `new` results.
    fn merge_pending(&mut self, a: VarId, b: VarId) -> Result<()> {
        let class = self.uninitialized_class(a).or_else(|| self.uninitialized_class(b));
        let root = self.ir.merge_vars(a, b)?;
        if let Some(class) = class {
            let ir = &self.ir;
            self.uninitialized.retain(|(var, _)| !ir.same_var(*var, root));
            self.uninitialized.push((root, class));
        }
        Ok(())
    }

    pub(super) fn uninitialized_class(&self, var: VarId) -> Option<String> {
        self.uninitialized
            .iter()
            .find(|(pending, _)| self.ir.same_var(*pending, var))
            .map(|(_, class)| class.clone())
    }
}
