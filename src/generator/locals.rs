//! Matching `LocalVariableTable` entries to local identifiers.

use std::collections::BTreeSet;

use log::trace;

use super::Generator;
use crate::error::Result;
use crate::ir::{DebugLocal, LocalVariableEntry, VarId};
use crate::types::parse_type_descriptor;
use crate::visitor::Label;

/// One load, store or `iinc` of a local slot.
#[derive(Copy, Clone, Debug)]
pub(super) struct LocalAccess {
    pub(super) slot: u16,
    pub(super) var: VarId,
    pub(super) position: usize,
    pub(super) store: bool,
}

/// A debug table row waiting for the label positions to be known.
#[derive(Clone, Debug)]
pub(super) struct PendingLocal {
    pub(super) entry: LocalVariableEntry,
    pub(super) start: Label,
    pub(super) end: Label,
}

impl Generator {
    /// Attaches every debug table row to the identifiers accessed inside its
    /// range. The store that initializes a local sits right before the range
    /// starts and counts too.
    pub(super) fn attach_debug_names(&mut self) -> Result<()> {
        let mut rows = std::mem::take(&mut self.debug_table);
        for row in &mut rows {
            let (Some(start), Some(end)) = (self.label_pos.get(&row.start), self.label_pos.get(&row.end)) else {
                trace!("debug local {} has an unvisited label", row.entry.name);
                continue;
            };
            let (start, end) = (*start, *end);
            let mut matched = BTreeSet::new();
            for access in &self.local_accesses {
                if access.slot != row.entry.slot {
                    continue;
                }
                let inside = start <= access.position && access.position < end;
                let initializer = access.store && access.position + 1 == start;
                if inside || initializer {
                    matched.insert(self.ir.root_var(access.var));
                }
            }
            let declared = parse_type_descriptor(&row.entry.descriptor).ok();
            for var in &matched {
                self.ir.add_debug_local(
                    *var,
                    DebugLocal {
                        name: row.entry.name.clone(),
                        descriptor: row.entry.descriptor.clone(),
                        signature: row.entry.signature.clone(),
                    },
                );
                if let (None, Some(ty)) = (self.ir.var(*var).declared_type(), &declared) {
                    self.ir.set_declared_type(*var, ty.clone());
                }
            }
            row.entry.vars = matched.into_iter().collect();
        }
        self.debug_table = rows;
        Ok(())
    }

    /// Debug table rows with their matched identifiers, as roots.
    pub(super) fn matched_debug_locals(&self) -> Vec<LocalVariableEntry> {
        self.debug_table
            .iter()
            .map(|row| {
                let mut entry = row.entry.clone();
                let mut vars: Vec<VarId> = entry.vars.iter().map(|var| self.ir.root_var(*var)).collect();
                vars.sort();
                vars.dedup();
                entry.vars = vars;
                entry
            })
            .collect()
    }
}
