//! The topology analyzer (component D): partitions nodes into connected components
//! under "device interconnects its primary terminals" and selects a ground node per
//! component.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;

use crate::errors::TopologyError;
use crate::model::{Circuit, DeviceKind, NodeId};

/// One connected component of the network, with its chosen ground node.
#[derive(Debug, Clone)]
pub struct Component {
    pub nodes: Vec<NodeId>,
    pub ground: NodeId,
    /// `true` if any controlled source has its sense pair, or any current-controlled
    /// source has its referenced probe, inside this component — downgrades the
    /// "multiple components" diagnostic from warning to informational (§4.D).
    pub has_logical_couplings: bool,
}

/// The result of topology analysis: every node's component index, plus the list of
/// components themselves.
#[derive(Debug, Clone)]
pub struct Topology {
    pub components: Vec<Component>,
    node_component: HashMap<NodeId, usize>,
}

impl Topology {
    pub fn component_of(&self, node: NodeId) -> usize {
        self.node_component[&node]
    }

    pub fn is_ground(&self, node: NodeId) -> bool {
        self.components[self.component_of(node)].ground == node
    }
}

fn contains_ground_substring(name: &str) -> bool {
    for needle in ["gnd", "Gnd", "GND", "ground", "Ground", "GROUND"] {
        if name.contains(needle) {
            return true;
        }
    }
    false
}

fn find_ground_candidates(circuit: &Circuit, nodes: &[NodeId]) -> Vec<NodeId> {
    nodes
        .iter()
        .copied()
        .filter(|&n| contains_ground_substring(&circuit.node(n).name))
        .collect()
}

/// Runs connectivity analysis and ground selection over the whole circuit.
pub fn analyze(circuit: &Circuit) -> Result<Topology, TopologyError> {
    let n = circuit.nodes.len();
    let mut uf = UnionFind::new(n.max(1));

    for device in &circuit.devices {
        // Only primary terminals induce connectivity; sense pairs and op-amp outputs
        // do not (§4.D).
        uf.union(device.from.0, device.to.0);
    }

    // Fatal connectivity checks that do not depend on component assignment yet.
    let mut op_amp_outputs: HashMap<NodeId, &str> = HashMap::new();
    for device in &circuit.devices {
        if device.kind == DeviceKind::OpAmp {
            let out = device.output.expect("op-amp always has an output terminal");
            if let Some(other) = op_amp_outputs.insert(out, &device.name) {
                return Err(TopologyError::DuplicateOpAmpOutput(
                    other.to_string(),
                    device.name.clone(),
                    circuit.node_name(out).to_string(),
                ));
            }
        }
    }

    // Group nodes by root.
    let mut groups: HashMap<usize, Vec<NodeId>> = HashMap::new();
    for idx in 0..n {
        groups.entry(uf.find(idx)).or_default().push(NodeId(idx));
    }

    let mut node_component = HashMap::new();
    let mut components = Vec::new();
    let mut roots: Vec<usize> = groups.keys().copied().collect();
    roots.sort();

    for root in roots {
        let nodes = groups.remove(&root).unwrap();
        let comp_idx = components.len();
        for &node in &nodes {
            node_component.insert(node, comp_idx);
        }

        let has_op_amp = circuit
            .devices
            .iter()
            .any(|d| d.kind == DeviceKind::OpAmp && uf.find(d.from.0) == root);

        // Op-amp three-terminal component check.
        for device in &circuit.devices {
            if device.kind != DeviceKind::OpAmp {
                continue;
            }
            let out = device.output.unwrap();
            if uf.find(device.from.0) != uf.find(device.to.0)
                || uf.find(device.from.0) != uf.find(out.0)
            {
                return Err(TopologyError::OpAmpSpansComponents(device.name.clone()));
            }
        }

        // Controlled-source sense pair / probe-reference straddling check.
        for device in &circuit.devices {
            if uf.find(device.from.0) != root {
                continue;
            }
            if let (Some(p), Some(m)) = (device.ctrl_plus, device.ctrl_minus) {
                if uf.find(p.0) != uf.find(m.0) {
                    return Err(TopologyError::ControlledSourceStraddlesComponents(device.name.clone()));
                }
            }
        }

        for uv in &circuit.user_voltages {
            if uf.find(uv.plus.0) == root && uf.find(uv.minus.0) != root {
                return Err(TopologyError::UserVoltageStraddlesComponents(uv.name.clone()));
            }
        }

        let candidates = find_ground_candidates(circuit, &nodes);
        let ground = match candidates.len() {
            1 => candidates[0],
            0 => {
                if has_op_amp {
                    return Err(TopologyError::MissingGroundWithOpAmp);
                }
                nodes[0]
            }
            _ => {
                return Err(TopologyError::AmbiguousGround(
                    candidates.iter().map(|&n| circuit.node_name(n).to_string()).collect(),
                ))
            }
        };

        if has_op_amp {
            let is_output = circuit
                .devices
                .iter()
                .any(|d| d.kind == DeviceKind::OpAmp && d.output == Some(ground));
            if is_output {
                return Err(TopologyError::GroundIsOpAmpOutput(circuit.node_name(ground).to_string()));
            }
        }

        let has_logical_couplings = circuit.devices.iter().any(|d| {
            d.kind.is_controlled_source() && uf.find(d.from.0) == root
        }) || circuit.devices.iter().any(|d| {
            d.ctrl_probe.is_some() && uf.find(d.from.0) == root
        });

        // §7: a component with no current path anywhere inside it can never carry
        // current, so none of its node voltages can depend on anything — an orphan
        // component. A lone ground-only component (the degenerate one-node case with
        // no devices at all) is not itself a fatal orphan; it simply contributes no
        // unknowns. A controlled source's or an op-amp's primary branch counts as a
        // current path too, even when its sense pair or referenced probe lives in a
        // different component (§9's open question: the existing behaviour stamps such
        // couplings without complaint, so a component driven only by one, e.g. a CCVS
        // whose sense current lives elsewhere, must not be rejected as orphaned).
        if nodes.len() > 1 {
            let has_source = circuit.devices.iter().any(|d| {
                uf.find(d.from.0) == root
                    && (matches!(d.kind, DeviceKind::IndependentVoltage | DeviceKind::IndependentCurrent)
                        || d.kind.is_controlled_source()
                        || d.kind == DeviceKind::OpAmp)
            });
            if !has_source {
                return Err(TopologyError::OrphanComponent(circuit.node_name(nodes[0]).to_string()));
            }
        }

        components.push(Component { nodes, ground, has_logical_couplings });
    }

    Ok(Topology { components, node_component })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CircuitBuilder, Device};

    fn rc_lowpass() -> Circuit {
        let mut b = CircuitBuilder::new("rc");
        let n_in = b.node("in").unwrap();
        let n_out = b.node("out").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(Device {
            name: "R1".into(),
            kind: DeviceKind::Resistor,
            from: n_in,
            to: n_out,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(100.0),
            relation: None,
        })
        .unwrap();
        b.add_device(Device {
            name: "C1".into(),
            kind: DeviceKind::Capacitor,
            from: n_out,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1e-6),
            relation: None,
        })
        .unwrap();
        b.add_device(Device {
            name: "U1".into(),
            kind: DeviceKind::IndependentVoltage,
            from: n_in,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1.0),
            relation: None,
        })
        .unwrap();
        b.finish()
    }

    #[test]
    fn single_component_ground_by_name() {
        let circuit = rc_lowpass();
        let topo = analyze(&circuit).unwrap();
        assert_eq!(topo.components.len(), 1);
        assert_eq!(circuit.node_name(topo.components[0].ground), "gnd");
    }

    #[test]
    fn component_with_no_source_is_orphan() {
        let mut b = CircuitBuilder::new("orphan");
        let n_a = b.node("a").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(Device {
            name: "R1".into(),
            kind: DeviceKind::Resistor,
            from: n_a,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(100.0),
            relation: None,
        })
        .unwrap();
        let circuit = b.finish();
        assert_eq!(analyze(&circuit), Err(TopologyError::OrphanComponent("a".to_string())));
    }

    /// Regression for the orphan-component check: a component driven only by a
    /// controlled source's primary branch (no independent source of its own) must not
    /// be rejected, even though its controlling probe lives in a different, otherwise
    /// unconnected component — spec.md §9's open question notes the original leaves
    /// this legal.
    #[test]
    fn component_driven_only_by_a_cross_component_controlled_source_is_not_orphan() {
        let mut b = CircuitBuilder::new("ccvs_cross_component");
        let n_in = b.node("in").unwrap();
        let n_base = b.node("base").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(Device {
            name: "Uin".into(),
            kind: DeviceKind::IndependentVoltage,
            from: n_in,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1.0),
            relation: None,
        })
        .unwrap();
        let probe = b
            .add_device(Device {
                name: "P".into(),
                kind: DeviceKind::CurrentProbe,
                from: n_in,
                to: n_base,
                output: None,
                ctrl_plus: None,
                ctrl_minus: None,
                ctrl_probe: None,
                value: None,
                relation: None,
            })
            .unwrap();
        b.add_device(Device {
            name: "Rbase".into(),
            kind: DeviceKind::Resistor,
            from: n_base,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1_000.0),
            relation: None,
        })
        .unwrap();

        // A second component, topologically disjoint from the one above (no node in
        // common), whose only device is a CCVS referencing the probe declared in the
        // first component.
        let n_z = b.node("z").unwrap();
        let n_out2 = b.node("out2").unwrap();
        b.add_device(Device {
            name: "F1".into(),
            kind: DeviceKind::CurrentControlledVoltage,
            from: n_z,
            to: n_out2,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: Some(probe),
            value: Some(50.0),
            relation: None,
        })
        .unwrap();

        let circuit = b.finish();
        let topo = analyze(&circuit).unwrap();
        assert_eq!(topo.components.len(), 2);
    }

    #[test]
    fn two_independent_subcircuits_share_ground_only() {
        let mut b = CircuitBuilder::new("two");
        let gnd = b.node("gnd").unwrap();
        for tag in ["a", "b"] {
            let n_in = b.node(&format!("in_{tag}")).unwrap();
            let n_out = b.node(&format!("out_{tag}")).unwrap();
            b.add_device(Device {
                name: format!("R_{tag}"),
                kind: DeviceKind::Resistor,
                from: n_in,
                to: n_out,
                output: None,
                ctrl_plus: None,
                ctrl_minus: None,
                ctrl_probe: None,
                value: Some(100.0),
                relation: None,
            })
            .unwrap();
            b.add_device(Device {
                name: format!("C_{tag}"),
                kind: DeviceKind::Capacitor,
                from: n_out,
                to: gnd,
                output: None,
                ctrl_plus: None,
                ctrl_minus: None,
                ctrl_probe: None,
                value: Some(1e-6),
                relation: None,
            })
            .unwrap();
            b.add_device(Device {
                name: format!("U_{tag}"),
                kind: DeviceKind::IndependentVoltage,
                from: n_in,
                to: gnd,
                output: None,
                ctrl_plus: None,
                ctrl_minus: None,
                ctrl_probe: None,
                value: Some(1.0),
                relation: None,
            })
            .unwrap();
        }
        let circuit = b.finish();
        let topo = analyze(&circuit).unwrap();
        // Every device touches the shared ground node, so union-find reports one
        // component; the "independently solvable" property is a solver-level
        // guarantee (no coupling terms), not a topological one.
        assert_eq!(topo.components.len(), 1);
    }
}
