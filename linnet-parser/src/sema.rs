//! Builds a checked [`linnet_ir::Circuit`] from a statement list: resolves every name
//! reference (nodes, devices, probes) to its index, converting syntax into the core's
//! indexed representation. Electrical well-formedness (orphan components, symbol-table
//! name clashes, bad result references) is left to `linnet-ir` itself — this module only
//! rejects malformed *syntax*, such as a relation naming a device that was never
//! declared or a second device reusing a name.

use std::collections::HashMap;

use linnet_ir::model::{
    Circuit, CircuitBuilder, Device, DependentName, DeviceId, DeviceKind, ResultRequest, UserVoltage, ValueRelation,
};
use linnet_ir::Rational;

use crate::ast::{DeviceKeyword, DeviceStmt, Statement, ValueExpr};
use crate::errors::ParseError;

fn device_kind(kw: DeviceKeyword) -> DeviceKind {
    match kw {
        DeviceKeyword::Resistor => DeviceKind::Resistor,
        DeviceKeyword::Conductance => DeviceKind::Conductance,
        DeviceKeyword::Inductor => DeviceKind::Inductor,
        DeviceKeyword::Capacitor => DeviceKind::Capacitor,
        DeviceKeyword::Vsource => DeviceKind::IndependentVoltage,
        DeviceKeyword::Isource => DeviceKind::IndependentCurrent,
        DeviceKeyword::OpAmp => DeviceKind::OpAmp,
        DeviceKeyword::Probe => DeviceKind::CurrentProbe,
        DeviceKeyword::Vcvs => DeviceKind::VoltageControlledVoltage,
        DeviceKeyword::Vccs => DeviceKind::VoltageControlledCurrent,
        DeviceKeyword::Ccvs => DeviceKind::CurrentControlledVoltage,
        DeviceKeyword::Cccs => DeviceKind::CurrentControlledCurrent,
    }
}

/// Approximates a decimal literal as an exact rational, trying successively finer
/// powers of ten (up to 1e-9) until the rounded numerator reproduces the input within
/// floating-point tolerance. Netlist relation factors are always short decimals
/// (`0.5`, `2`, `1.25`), never irrational, so this always finds an exact match in
/// practice.
fn decimal_to_rational(x: f64, line: usize) -> Result<Rational, ParseError> {
    let mut denom = 1i64;
    let mut scaled = x;
    for _ in 0..9 {
        if (scaled - scaled.round()).abs() < 1e-9 {
            break;
        }
        scaled *= 10.0;
        denom *= 10;
    }
    let numer = scaled.round() as i64;
    Rational::new(numer, denom).map_err(|_| ParseError::BadNumber(line, x.to_string()))
}

pub fn build_circuit(name: &str, statements: Vec<Statement>) -> Result<Circuit, ParseError> {
    let device_stmts: Vec<&DeviceStmt> =
        statements.iter().filter_map(|s| if let Statement::Device(d) = s { Some(d) } else { None }).collect();

    let mut name_to_id: HashMap<String, DeviceId> = HashMap::new();
    for (idx, stmt) in device_stmts.iter().enumerate() {
        if name_to_id.insert(stmt.name.clone(), DeviceId(idx)).is_some() {
            return Err(ParseError::DuplicateDevice(stmt.line, stmt.name.clone()));
        }
    }

    let mut builder = CircuitBuilder::new(name);

    for statement in &statements {
        match statement {
            Statement::Ground(g) => {
                builder.node(&g.node)?;
            }
            Statement::Device(d) => {
                let from = builder.node(&d.from)?;
                let to = builder.node(&d.to)?;
                let output = d.output.as_deref().map(|n| builder.node(n)).transpose()?;
                let ctrl_plus = d.ctrl_plus.as_deref().map(|n| builder.node(n)).transpose()?;
                let ctrl_minus = d.ctrl_minus.as_deref().map(|n| builder.node(n)).transpose()?;
                let ctrl_probe = d
                    .ctrl_probe
                    .as_deref()
                    .map(|n| {
                        name_to_id.get(n).copied().ok_or_else(|| ParseError::Expected(d.line, "a declared probe name", n.to_string()))
                    })
                    .transpose()?;

                let (value, relation) = match &d.value {
                    None => (None, None),
                    Some(ValueExpr::Literal(v)) => (Some(*v), None),
                    Some(ValueExpr::RelationTo { factor, other }) => {
                        let other_id = name_to_id
                            .get(other)
                            .copied()
                            .ok_or_else(|| ParseError::Expected(d.line, "a declared device name", other.clone()))?;
                        let rational = decimal_to_rational(*factor, d.line)?;
                        (None, Some(ValueRelation { factor: rational, other: other_id }))
                    }
                };

                builder.add_device(Device {
                    name: d.name.clone(),
                    kind: device_kind(d.kind),
                    from,
                    to,
                    output,
                    ctrl_plus,
                    ctrl_minus,
                    ctrl_probe,
                    value,
                    relation,
                })?;
            }
            Statement::Voltage(v) => {
                let plus = builder.node(&v.plus)?;
                let minus = builder.node(&v.minus)?;
                builder.add_user_voltage(UserVoltage { name: v.name.clone(), plus, minus });
            }
            Statement::Result(r) => {
                let dependents = r
                    .dependents
                    .iter()
                    .map(|d| if builder.find_node(d).is_some() { DependentName::Node(d.clone()) } else { DependentName::UserVoltage(d.clone()) })
                    .collect();
                builder.add_request(ResultRequest {
                    name: r.name.clone(),
                    dependents,
                    independent: r.independent.clone(),
                });
            }
        }
    }

    Ok(builder.finish())
}
