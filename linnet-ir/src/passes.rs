//! Wraps the early pipeline stages (topology, symbol table, LES) as [`linnet_pass::Pass`]
//! implementations, so they compose via [`linnet_pass::Pass::chain`] the same way the
//! rest of this codebase's multi-stage transforms do. The solver driver itself (§4.F,
//! a loop over unknowns rather than a single input/output transform) is not a pass;
//! see [`crate::engine`].

use linnet_pass::Pass;

use crate::errors::CoreError;
use crate::les::{self, LesMatrix};
use crate::model::Circuit;
use crate::symtab::{SymbolTable, SymbolTableBuilder};
use crate::topology::{self, Topology};

/// `&Circuit -> Topology`.
#[derive(Debug, Default)]
pub struct AnalyzeTopology;

impl Pass for AnalyzeTopology {
    type Input<'a> = &'a Circuit;
    type Output<'a> = (Topology, &'a Circuit);
    type Error = CoreError;

    fn run<'a>(&mut self, circuit: Self::Input<'a>) -> Result<Self::Output<'a>, Self::Error> {
        let topo = topology::analyze(circuit)?;
        Ok((topo, circuit))
    }
}

/// `(Topology, &Circuit) -> (SymbolTable, &Circuit)`. Topology is consulted only to
/// have already validated connectivity before symbols are registered; the symbol
/// table itself does not key off components.
#[derive(Debug, Default)]
pub struct BuildSymbolTable;

impl Pass for BuildSymbolTable {
    type Input<'a> = (Topology, &'a Circuit);
    type Output<'a> = (SymbolTable, &'a Circuit);
    type Error = CoreError;

    fn run<'a>(&mut self, (topo, circuit): Self::Input<'a>) -> Result<Self::Output<'a>, Self::Error> {
        let mut builder = SymbolTableBuilder::new(circuit);
        for (idx, node) in circuit.nodes.iter().enumerate() {
            let node_id = crate::model::NodeId(idx);
            if topo.is_ground(node_id) {
                continue;
            }
            let subnet_id = topo.component_of(node_id);
            builder.add_unknown(&node.name, Some(node_id), Some(subnet_id), None)?;
        }
        for (idx, device) in circuit.devices.iter().enumerate() {
            let device_id = crate::model::DeviceId(idx);
            if device.kind.introduces_extra_unknown() {
                builder.add_unknown(&format!("I_{}", device.name), None, None, Some(device_id))?;
            }
            if device.kind == crate::model::DeviceKind::IndependentVoltage
                || device.kind == crate::model::DeviceKind::IndependentCurrent
            {
                builder.add_known(&device.name, device_id)?;
            }
            if device.kind.has_constant() {
                // Every constant-bearing device gets its own bit, even one defined by
                // a value relation to another device — the relation is resolved later,
                // lazily, by `resolve_referenced_device` during the frequency
                // transform (§4.G), not here.
                builder.add_constant(device_id, &device.name);
            }
        }
        let symtab = builder.finalize(circuit)?;
        Ok((symtab, circuit))
    }
}

/// `(SymbolTable, &Circuit) -> (LesMatrix, SymbolTable)`.
#[derive(Debug, Default)]
pub struct BuildLes;

impl Pass for BuildLes {
    type Input<'a> = (SymbolTable, &'a Circuit);
    type Output<'a> = (LesMatrix, SymbolTable);
    type Error = CoreError;

    fn run<'a>(&mut self, (symtab, circuit): Self::Input<'a>) -> Result<Self::Output<'a>, Self::Error> {
        let matrix = les::build(circuit, &symtab)?;
        Ok((matrix, symtab))
    }
}

/// Runs topology analysis, symbol-table construction and LES stamping in sequence,
/// returning everything downstream stages need. Each stage is a [`Pass`]; they are
/// invoked directly rather than through [`Pass::chain`] here because the engine needs
/// `Topology` itself, not just the symbol table `BuildSymbolTable` threads onward
/// (`Chain` only carries the final stage's output).
pub fn run_to_les(circuit: &Circuit) -> Result<(Topology, SymbolTable, LesMatrix), CoreError> {
    let (topo, _) = AnalyzeTopology.run(circuit)?;
    let (symtab, _) = BuildSymbolTable.run((topo.clone(), circuit))?;
    let (matrix, symtab) = BuildLes.run((symtab, circuit))?;
    Ok((topo, symtab, matrix))
}
