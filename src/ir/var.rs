use std::collections::BTreeSet;

use log::trace;

use crate::error::{invariant, DecompileError, Result};
use crate::ir::{Ir, ValueId, VarId};
use crate::types::{JvmType, StackCategory};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VarKind {
    Local { slot: u16 },
    Stack,
}

/// A `LocalVariableTable` entry matched to an identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugLocal {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
}

/// The identity behind every reference to one local or stack value.
///
/// Producers are references in writing slots; consumers are references in
/// reading slots, split by whether the slot belongs to a statement or to
/// another value.
#[derive(Clone, Debug)]
pub struct VarNode {
    kind: VarKind,
    category: StackCategory,
    declared_type: Option<JvmType>,
    debug: Vec<DebugLocal>,
    producers: BTreeSet<ValueId>,
    expr_consumers: BTreeSet<ValueId>,
    stmt_consumers: BTreeSet<ValueId>,
    merged_into: Option<VarId>,
}

impl VarNode {
    pub fn kind(&self) -> VarKind {
        self.kind
    }

    pub fn category(&self) -> StackCategory {
        self.category
    }

    pub fn declared_type(&self) -> Option<&JvmType> {
        self.declared_type.as_ref()
    }

    pub fn debug(&self) -> &[DebugLocal] {
        &self.debug
    }

    pub fn producers(&self) -> &BTreeSet<ValueId> {
        &self.producers
    }

    pub fn expr_consumers(&self) -> &BTreeSet<ValueId> {
        &self.expr_consumers
    }

    pub fn stmt_consumers(&self) -> &BTreeSet<ValueId> {
        &self.stmt_consumers
    }

    pub fn consumer_count(&self) -> usize {
        self.expr_consumers.len() + self.stmt_consumers.len()
    }

    /// Every consumer reference, statement position first.
    pub fn consumers(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.stmt_consumers
            .iter()
            .chain(self.expr_consumers.iter())
            .copied()
    }

    pub fn is_merged(&self) -> bool {
        self.merged_into.is_some()
    }

    fn reference_count(&self) -> usize {
        self.producers.len() + self.consumer_count()
    }
}

impl Ir {
    pub fn new_var(&mut self, kind: VarKind, category: StackCategory, declared_type: Option<JvmType>) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarNode {
            kind,
            category,
            declared_type,
            debug: Vec::new(),
            producers: BTreeSet::new(),
            expr_consumers: BTreeSet::new(),
            stmt_consumers: BTreeSet::new(),
            merged_into: None,
        });
        id
    }

    /// Follows merge links to the identifier that currently owns `var`.
    pub fn root_var(&self, var: VarId) -> VarId {
        let mut current = var;
        while let Some(next) = self.vars[current.index()].merged_into {
            current = next;
        }
        current
    }

    /// The node of `var`'s root identifier.
    pub fn var(&self, var: VarId) -> &VarNode {
        &self.vars[self.root_var(var).index()]
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn same_var(&self, a: VarId, b: VarId) -> bool {
        self.root_var(a) == self.root_var(b)
    }

    pub fn set_declared_type(&mut self, var: VarId, ty: JvmType) {
        let root = self.root_var(var);
        self.vars[root.index()].declared_type = Some(ty);
    }

    pub fn add_debug_local(&mut self, var: VarId, local: DebugLocal) {
        let root = self.root_var(var);
        let node = &mut self.vars[root.index()];
        if !node.debug.contains(&local) {
            node.debug.push(local);
        }
    }

    /// Unions two identifiers found to denote the same value.
    ///
    /// The identifier with fewer references is folded into the other one and
    /// left empty; every reference it had is rewritten to the survivor.
    /// Merging an identifier with itself is a no-op.
    pub fn merge_vars(&mut self, a: VarId, b: VarId) -> Result<VarId> {
        let ra = self.root_var(a);
        let rb = self.root_var(b);
        if ra == rb {
            return Ok(ra);
        }
        let (na, nb) = (&self.vars[ra.index()], &self.vars[rb.index()]);
        let same_kind = matches!(
            (na.kind, nb.kind),
            (VarKind::Stack, VarKind::Stack) | (VarKind::Local { .. }, VarKind::Local { .. })
        );
        if !same_kind {
            return Err(invariant!(
                "cannot merge {} ({:?}) with {} ({:?}): stack and local identifiers never alias",
                ra,
                na.kind,
                rb,
                nb.kind
            ));
        }
        if na.category != nb.category {
            return Err(DecompileError::MergeCategory {
                left: ra.0,
                right: rb.0,
                left_category: na.category,
                right_category: nb.category,
            });
        }
        let (winner, loser) = if na.reference_count() >= nb.reference_count() {
            (ra, rb)
        } else {
            (rb, ra)
        };
        trace!("merging {} into {}", loser, winner);

        let loser_node = &mut self.vars[loser.index()];
        loser_node.merged_into = Some(winner);
        let producers = std::mem::take(&mut loser_node.producers);
        let expr_consumers = std::mem::take(&mut loser_node.expr_consumers);
        let stmt_consumers = std::mem::take(&mut loser_node.stmt_consumers);
        let declared_type = loser_node.declared_type.take();
        let debug = std::mem::take(&mut loser_node.debug);

        for value in producers
            .iter()
            .chain(expr_consumers.iter())
            .chain(stmt_consumers.iter())
        {
            self.retarget_ref(*value, winner);
        }

        let survivor = &mut self.vars[winner.index()];
        survivor.producers.extend(producers);
        survivor.expr_consumers.extend(expr_consumers);
        survivor.stmt_consumers.extend(stmt_consumers);
        if survivor.declared_type.is_none() {
            survivor.declared_type = declared_type;
        }
        for local in debug {
            if !survivor.debug.contains(&local) {
                survivor.debug.push(local);
            }
        }
        Ok(winner)
    }

    pub(crate) fn var_sets_mut(&mut self, var: VarId) -> &mut VarNode {
        let root = self.root_var(var);
        &mut self.vars[root.index()]
    }

    pub(crate) fn insert_producer(&mut self, var: VarId, value: ValueId) {
        self.var_sets_mut(var).producers.insert(value);
    }

    pub(crate) fn remove_producer(&mut self, var: VarId, value: ValueId) {
        self.var_sets_mut(var).producers.remove(&value);
    }

    pub(crate) fn insert_consumer(&mut self, var: VarId, value: ValueId, in_stmt: bool) {
        let node = self.var_sets_mut(var);
        if in_stmt {
            node.stmt_consumers.insert(value);
        } else {
            node.expr_consumers.insert(value);
        }
    }

    pub(crate) fn remove_consumer(&mut self, var: VarId, value: ValueId) {
        let node = self.var_sets_mut(var);
        node.stmt_consumers.remove(&value);
        node.expr_consumers.remove(&value);
    }
}
