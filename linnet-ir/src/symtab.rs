//! The symbol table (component C): knowns, unknowns and constants, with the index
//! maps and name-clash detection spec.md §4.C describes.

use std::collections::HashMap;

use crate::errors::SymbolError;
use crate::model::{Circuit, DeviceId, DeviceKind, NodeId};
use crate::rational::Rational;
use crate::ring::MAX_CONSTANTS;

/// The reserved complex-frequency variable name; it may not be reused for anything.
pub const RESERVED_S: &str = "s";

#[derive(Debug, Clone)]
pub struct KnownEntry {
    pub name: String,
    pub device: DeviceId,
    pub les_col: usize,
}

#[derive(Debug, Clone)]
pub struct UnknownEntry {
    pub name: String,
    pub node: Option<NodeId>,
    pub subnet_id: Option<usize>,
    pub device: Option<DeviceId>,
    pub les_row: usize,
    pub les_col: usize,
    /// The column this unknown occupies in the LES matrix as `les::build` stamps it,
    /// fixed at [`finalize`](SymbolTableBuilder::finalize) and never touched again.
    /// [`SymbolTable::set_target_unknown_for_solver`] computes its swap pair from this
    /// field, not from `les_col`, because the solver driver re-clones that pristine
    /// matrix for every targeted unknown; a swap computed against a `les_col` mutated
    /// by an earlier call would be a swap pair for a matrix that no longer exists.
    original_col: usize,
}

#[derive(Debug, Clone)]
pub struct ConstantEntry {
    pub name: String,
    pub device: DeviceId,
    pub bit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameOwner {
    Device(DeviceId),
    Known(usize),
    Unknown(usize),
    Reserved,
}

/// Builds a [`SymbolTable`] incrementally, then [`finalize`](SymbolTableBuilder::finalize)s
/// it into its immutable, index-mapped form.
#[derive(Debug)]
pub struct SymbolTableBuilder {
    knowns: Vec<KnownEntry>,
    unknowns: Vec<UnknownEntry>,
    constants: Vec<ConstantEntry>,
    names: HashMap<String, NameOwner>,
}

impl SymbolTableBuilder {
    /// Starts a builder with every device name and the reserved token `s`
    /// pre-registered, so that later `add*` calls can detect cross-namespace clashes.
    pub fn new(circuit: &Circuit) -> Self {
        let mut names = HashMap::new();
        names.insert(RESERVED_S.to_string(), NameOwner::Reserved);
        for (idx, device) in circuit.devices.iter().enumerate() {
            names.insert(device.name.clone(), NameOwner::Device(DeviceId(idx)));
        }
        Self { knowns: Vec::new(), unknowns: Vec::new(), constants: Vec::new(), names }
    }

    /// Registers `name` as belonging to `owner`, which may coincide with an
    /// already-registered [`NameOwner::Device`] *only* when `self_device` is that same
    /// device (the source's own name used for its own known/unknown, per §4.C).
    fn register(
        &mut self,
        name: &str,
        owner: NameOwner,
        self_device: Option<DeviceId>,
    ) -> Result<(), SymbolError> {
        match self.names.get(name) {
            None => {
                self.names.insert(name.to_string(), owner);
                Ok(())
            }
            Some(NameOwner::Device(d)) if Some(*d) == self_device => Ok(()),
            Some(_) => Err(SymbolError::NameClash(name.to_string())),
        }
    }

    pub fn add_known(&mut self, name: &str, device: DeviceId) -> Result<(), SymbolError> {
        let idx = self.knowns.len();
        self.register(name, NameOwner::Known(idx), Some(device))?;
        self.knowns.push(KnownEntry { name: name.to_string(), device, les_col: 0 });
        Ok(())
    }

    pub fn add_unknown(
        &mut self,
        name: &str,
        node: Option<NodeId>,
        subnet_id: Option<usize>,
        device: Option<DeviceId>,
    ) -> Result<(), SymbolError> {
        let idx = self.unknowns.len();
        self.register(name, NameOwner::Unknown(idx), device)?;
        self.unknowns.push(UnknownEntry {
            name: name.to_string(),
            node,
            subnet_id,
            device,
            les_row: 0,
            les_col: 0,
            original_col: 0,
        });
        Ok(())
    }

    pub fn add_constant(&mut self, device: DeviceId, name: &str) {
        self.constants.push(ConstantEntry { name: name.to_string(), device, bit: 0 });
    }

    /// Fixes row/column assignments and sorts constants by `(kind, name)` (§3), which
    /// defines the bit each constant occupies in a product-of-constants bitmask.
    pub fn finalize(mut self, circuit: &Circuit) -> Result<SymbolTable, SymbolError> {
        if self.constants.len() > MAX_CONSTANTS {
            return Err(SymbolError::RelationChainTooLong(MAX_CONSTANTS));
        }
        self.constants.sort_by(|a, b| {
            let ka = circuit.device(a.device).kind.constant_sort_rank();
            let kb = circuit.device(b.device).kind.constant_sort_rank();
            ka.cmp(&kb).then_with(|| a.name.cmp(&b.name))
        });
        for (bit, c) in self.constants.iter_mut().enumerate() {
            c.bit = bit;
        }

        let m = self.unknowns.len();
        for (i, u) in self.unknowns.iter_mut().enumerate() {
            u.les_row = i;
            u.les_col = i;
            u.original_col = i;
        }
        for (i, k) in self.knowns.iter_mut().enumerate() {
            k.les_col = m + i;
        }

        let mut node_to_unknown = HashMap::new();
        let mut device_to_known = HashMap::new();
        let mut device_to_unknown = HashMap::new();
        let mut device_to_constant = HashMap::new();
        for (i, u) in self.unknowns.iter().enumerate() {
            if let Some(node) = u.node {
                node_to_unknown.insert(node, i);
            }
            if let Some(device) = u.device {
                device_to_unknown.insert(device, i);
            }
        }
        for (i, k) in self.knowns.iter().enumerate() {
            device_to_known.insert(k.device, i);
        }
        for (i, c) in self.constants.iter().enumerate() {
            device_to_constant.insert(c.device, i);
        }

        Ok(SymbolTable {
            knowns: self.knowns,
            unknowns: self.unknowns,
            constants: self.constants,
            node_to_unknown,
            device_to_known,
            device_to_unknown,
            device_to_constant,
            target_col: m.saturating_sub(1),
        })
    }
}

/// The finalized symbol table: dense tables of knowns, unknowns, constants, plus the
/// bidirectional index maps spec.md §4.C calls for.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    knowns: Vec<KnownEntry>,
    unknowns: Vec<UnknownEntry>,
    constants: Vec<ConstantEntry>,
    node_to_unknown: HashMap<NodeId, usize>,
    device_to_known: HashMap<DeviceId, usize>,
    device_to_unknown: HashMap<DeviceId, usize>,
    device_to_constant: HashMap<DeviceId, usize>,
    /// Column currently holding the unknown targeted for solving (rightmost column,
    /// `m - 1`, until [`SymbolTable::set_target_unknown_for_solver`] swaps another in).
    target_col: usize,
}

impl SymbolTable {
    pub fn num_unknowns(&self) -> usize {
        self.unknowns.len()
    }

    pub fn num_knowns(&self) -> usize {
        self.knowns.len()
    }

    pub fn num_constants(&self) -> usize {
        self.constants.len()
    }

    pub fn knowns(&self) -> &[KnownEntry] {
        &self.knowns
    }

    pub fn unknowns(&self) -> &[UnknownEntry] {
        &self.unknowns
    }

    pub fn constants(&self) -> &[ConstantEntry] {
        &self.constants
    }

    pub fn known_by_device(&self, device: DeviceId) -> Option<usize> {
        self.device_to_known.get(&device).copied()
    }

    /// Returns `None` if `node` is ground (ground nodes have no voltage unknown).
    pub fn unknown_by_node(&self, node: NodeId) -> Option<usize> {
        self.node_to_unknown.get(&node).copied()
    }

    pub fn unknown_by_device(&self, device: DeviceId) -> Option<usize> {
        self.device_to_unknown.get(&device).copied()
    }

    /// Returns a bitmask with a single bit set: the constant's position.
    pub fn constant_by_device(&self, device: DeviceId) -> Option<u64> {
        self.device_to_constant.get(&device).map(|&bit| 1u64 << bit)
    }

    pub fn device_by_bit_index(&self, bit: usize) -> Option<DeviceId> {
        self.constants.get(bit).map(|c| c.device)
    }

    pub fn find_unknown_by_name(&self, name: &str) -> Option<usize> {
        self.unknowns.iter().position(|u| u.name == name)
    }

    pub fn find_known_by_name(&self, name: &str) -> Option<usize> {
        self.knowns.iter().position(|k| k.name == name)
    }

    /// Walks the acyclic value-relation chain starting at `bit`, returning the
    /// accumulated rational factor and the final (unrelated) device/bit. Fails if the
    /// chain exceeds [`MAX_CONSTANTS`] steps (a cycle) or any multiplication overflows.
    pub fn resolve_referenced_device(
        &self,
        circuit: &Circuit,
        bit: usize,
    ) -> Result<(Rational, DeviceId, usize), SymbolError> {
        let mut factor = Rational::ONE;
        let mut device = self.constants[bit].device;
        let mut current_bit = bit;
        for _ in 0..MAX_CONSTANTS + 1 {
            let d = circuit.device(device);
            match &d.relation {
                None => return Ok((factor, device, current_bit)),
                Some(rel) => {
                    factor = factor.mul(&rel.factor).map_err(|_| SymbolError::RelationOverflow)?;
                    device = rel.other;
                    current_bit = self
                        .device_to_constant
                        .get(&device)
                        .copied()
                        .ok_or(SymbolError::RelationOverflow)?;
                }
            }
        }
        Err(SymbolError::RelationChainTooLong(MAX_CONSTANTS))
    }

    /// The column currently holding the unknown targeted for one solver run.
    pub fn target_col(&self) -> usize {
        self.target_col
    }

    /// Swaps the named unknown's column with the rightmost column, so the solver's
    /// next run targets it. Returns the two *pristine* columns to swap on a fresh copy
    /// of the matrix `les::build` produced — always computed from each unknown's fixed
    /// `original_col`, never from a previous call's effect on `les_col`, since the
    /// solver driver clones that pristine matrix anew for every target (see
    /// `original_col`'s doc comment).
    pub fn set_target_unknown_for_solver(&mut self, name: &str) -> Result<(usize, usize), SymbolError> {
        let idx = self
            .find_unknown_by_name(name)
            .ok_or_else(|| SymbolError::NotAnUnknown(name.to_string()))?;
        let holder_of_last_col = self
            .unknowns
            .iter()
            .position(|u| u.original_col == self.target_col)
            .expect("rightmost column always occupied");
        let old_col = self.unknowns[idx].original_col;
        let last_col = self.unknowns[holder_of_last_col].original_col;
        self.unknowns[idx].les_col = last_col;
        self.unknowns[holder_of_last_col].les_col = old_col;
        Ok((old_col, last_col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CircuitBuilder, Device};

    fn sample_circuit() -> Circuit {
        let mut b = CircuitBuilder::new("t");
        let n_in = b.node("in").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(Device {
            name: "R1".into(),
            kind: DeviceKind::Resistor,
            from: n_in,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(100.0),
            relation: None,
        })
        .unwrap();
        b.finish()
    }

    #[test]
    fn rejects_reserved_s() {
        let circuit = sample_circuit();
        let mut b = SymbolTableBuilder::new(&circuit);
        assert_eq!(
            b.add_known("s", DeviceId(0)),
            Err(SymbolError::NameClash("s".into()))
        );
    }

    #[test]
    fn allows_self_named_known() {
        let circuit = sample_circuit();
        let mut b = SymbolTableBuilder::new(&circuit);
        // The resistor's own constant may be named "R1" without clashing with itself.
        b.add_constant(DeviceId(0), "R1");
        let table = b.finalize(&circuit).unwrap();
        assert_eq!(table.num_constants(), 1);
    }

    #[test]
    fn rejects_cross_namespace_clash() {
        let circuit = sample_circuit();
        let mut b = SymbolTableBuilder::new(&circuit);
        // "R1" is already a device name; a *different* unknown may not reuse it.
        assert_eq!(
            b.add_unknown("R1", None, None, None),
            Err(SymbolError::NameClash("R1".into()))
        );
    }
}
