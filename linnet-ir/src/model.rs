//! The network data model (§3): nodes, devices, user-defined voltages, result requests
//! and the circuit that ties them together. This is the "fully checked circuit object"
//! the netlist parser hands to the core (spec.md §1) — its referential integrity
//! (node/device indices in range, names unique) is an invariant of [`CircuitBuilder`],
//! not re-validated downstream.

use crate::rational::Rational;

/// Index of a [`Node`] within [`Circuit::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Index of a [`Device`] within [`Circuit::devices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
}

/// The variant over device kinds enumerated in spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Resistor,
    Conductance,
    Inductor,
    Capacitor,
    IndependentVoltage,
    IndependentCurrent,
    VoltageControlledVoltage,
    VoltageControlledCurrent,
    CurrentControlledVoltage,
    CurrentControlledCurrent,
    OpAmp,
    CurrentProbe,
}

impl DeviceKind {
    /// Whether this device kind contributes a symbol-table constant (a passive value
    /// or a controlled-source gain). Independent sources, op-amps and current probes
    /// never do (§4.G).
    pub fn has_constant(&self) -> bool {
        !matches!(
            self,
            DeviceKind::IndependentVoltage
                | DeviceKind::IndependentCurrent
                | DeviceKind::OpAmp
                | DeviceKind::CurrentProbe
        )
    }

    /// Whether this device kind introduces an extra unknown (a branch current) into
    /// the LES, per §4.E.
    pub fn introduces_extra_unknown(&self) -> bool {
        matches!(
            self,
            DeviceKind::IndependentVoltage
                | DeviceKind::VoltageControlledVoltage
                | DeviceKind::CurrentControlledVoltage
                | DeviceKind::OpAmp
                | DeviceKind::CurrentProbe
        )
    }

    /// Whether this device kind is a controlled source (stamped from a sense pair or
    /// a referenced probe current, never inducing topological connectivity through
    /// that sense path).
    pub fn is_controlled_source(&self) -> bool {
        matches!(
            self,
            DeviceKind::VoltageControlledVoltage
                | DeviceKind::VoltageControlledCurrent
                | DeviceKind::CurrentControlledVoltage
                | DeviceKind::CurrentControlledCurrent
        )
    }

    /// Stable sort key used by the symbol table's constant ordering (§3: "R before L
    /// before C"); devices with no constant sort last and never actually appear.
    pub fn constant_sort_rank(&self) -> u8 {
        match self {
            DeviceKind::Resistor => 0,
            DeviceKind::Conductance => 1,
            DeviceKind::Inductor => 2,
            DeviceKind::Capacitor => 3,
            DeviceKind::VoltageControlledVoltage => 4,
            DeviceKind::VoltageControlledCurrent => 5,
            DeviceKind::CurrentControlledVoltage => 6,
            DeviceKind::CurrentControlledCurrent => 7,
            _ => u8::MAX,
        }
    }
}

/// `value = factor * other.value`, an acyclic device-value relation (§3).
#[derive(Debug, Clone)]
pub struct ValueRelation {
    pub factor: Rational,
    pub other: DeviceId,
}

#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub kind: DeviceKind,
    pub from: NodeId,
    pub to: NodeId,
    /// Op-amp output terminal; `Some` only for [`DeviceKind::OpAmp`].
    pub output: Option<NodeId>,
    /// Sense pair for voltage-controlled sources.
    pub ctrl_plus: Option<NodeId>,
    pub ctrl_minus: Option<NodeId>,
    /// Referenced current probe for current-controlled sources.
    pub ctrl_probe: Option<DeviceId>,
    pub value: Option<f64>,
    pub relation: Option<ValueRelation>,
}

impl Device {
    /// The device's own numeric default, falling back to a kind-specific constant
    /// (§6 "Output — numeric script") when neither a value nor a relation was given.
    pub fn default_value(&self) -> f64 {
        match self.kind {
            DeviceKind::Resistor => 100.0,
            DeviceKind::Conductance => 1.0 / 100.0,
            DeviceKind::Inductor => 1.0e-3,
            DeviceKind::Capacitor => 10.0e-6,
            DeviceKind::VoltageControlledVoltage | DeviceKind::CurrentControlledVoltage => 1.0,
            DeviceKind::VoltageControlledCurrent => 5.0e-3,
            DeviceKind::CurrentControlledCurrent => 250.0,
            DeviceKind::IndependentVoltage
            | DeviceKind::IndependentCurrent
            | DeviceKind::OpAmp
            | DeviceKind::CurrentProbe => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserVoltage {
    pub name: String,
    pub plus: NodeId,
    pub minus: NodeId,
}

/// A request to solve for `dependents` (usually one; more than one only when the
/// request names several distinct quantities sharing one label is not supported —
/// spec.md's "one or more dependents" describes the *result set*, not an algebraic
/// sum, so this crate models it as a list of independently-solved dependents under a
/// shared request name).
#[derive(Debug, Clone)]
pub struct ResultRequest {
    pub name: String,
    pub dependents: Vec<DependentName>,
    /// `Some` turns this into a Bode request (exactly one dependent, one independent).
    pub independent: Option<String>,
}

/// A reference to a dependent quantity by name: either a non-ground node (its node
/// voltage is an LES unknown) or a user-defined voltage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependentName {
    Node(String),
    UserVoltage(String),
}

#[derive(Debug, Clone)]
pub struct Circuit {
    pub name: String,
    pub nodes: Vec<Node>,
    pub devices: Vec<Device>,
    pub user_voltages: Vec<UserVoltage>,
    pub requests: Vec<ResultRequest>,
}

impl Circuit {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn device(&self, id: DeviceId) -> &Device {
        &self.devices[id.0]
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }
}

/// Incrementally assembles a [`Circuit`], resolving node/device names to indices and
/// rejecting duplicates. This is the one piece of "parser" responsibility this crate
/// takes on directly, because every consumer (including tests) needs a safe way to
/// build a [`Circuit`] without hand-indexing vectors.
#[derive(Debug, Default)]
pub struct CircuitBuilder {
    name: String,
    nodes: Vec<Node>,
    devices: Vec<Device>,
    user_voltages: Vec<UserVoltage>,
    requests: Vec<ResultRequest>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("duplicate node name `{0}`")]
    DuplicateNode(String),
    #[error("duplicate device name `{0}`")]
    DuplicateDevice(String),
    #[error("reference to undefined node `{0}`")]
    UndefinedNode(String),
    #[error("reference to undefined device `{0}`")]
    UndefinedDevice(String),
}

impl CircuitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn node(&mut self, name: &str) -> Result<NodeId, BuilderError> {
        if let Some(id) = self.find_node(name) {
            return Ok(id);
        }
        self.nodes.push(Node { name: name.to_string() });
        Ok(NodeId(self.nodes.len() - 1))
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn find_device(&self, name: &str) -> Option<DeviceId> {
        self.devices.iter().position(|d| d.name == name).map(DeviceId)
    }

    pub fn add_device(&mut self, device: Device) -> Result<DeviceId, BuilderError> {
        if self.find_device(&device.name).is_some() {
            return Err(BuilderError::DuplicateDevice(device.name));
        }
        self.devices.push(device);
        Ok(DeviceId(self.devices.len() - 1))
    }

    pub fn add_user_voltage(&mut self, uv: UserVoltage) {
        self.user_voltages.push(uv);
    }

    pub fn add_request(&mut self, request: ResultRequest) {
        self.requests.push(request);
    }

    pub fn finish(self) -> Circuit {
        Circuit {
            name: self.name,
            nodes: self.nodes,
            devices: self.devices,
            user_voltages: self.user_voltages,
            requests: self.requests,
        }
    }
}
