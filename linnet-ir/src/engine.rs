//! The per-circuit pipeline driver (§4.F "solver driver", §4.G, §4.H): turns a checked
//! [`Circuit`] into a [`Solution`] bundling every requested transfer function, with one
//! shared denominator and a deduplicated, stably named [`ExpressionMap`].

use std::collections::HashSet;

use crate::errors::{BadReferenceError, CoreError, SolveError};
use crate::exprmap::{ExprRef, ExpressionMap, Origin};
use crate::freq::{self, Normalized};
use crate::model::{Circuit, DependentName};
use crate::passes;
use crate::ring::Coefficient;
use crate::solver;
use crate::symtab::SymbolTable;

/// One named dependent quantity: a node voltage (backed directly by an unknown) or a
/// user-defined voltage (the coefficient-level difference of two node solutions).
#[derive(Debug, Clone)]
enum Dependent {
    Node { name: String },
    UserVoltage { name: String, plus: Option<String>, minus: Option<String> },
}

impl Dependent {
    fn name(&self) -> &str {
        match self {
            Dependent::Node { name } => name,
            Dependent::UserVoltage { name, .. } => name,
        }
    }
}

/// The full solved circuit: every required dependent's numerator over every known
/// (independent), all sharing [`Solution::denominator`], plus the rendering-ready
/// [`ExpressionMap`].
#[derive(Debug, Clone)]
pub struct Solution {
    pub dependent_names: Vec<String>,
    pub independent_names: Vec<String>,
    /// Constant names indexed by their product-of-constants bit, for emitters that
    /// need to render a [`crate::freq::FreqExpr`]'s `power_of_const` entries by name
    /// (§4.I: the core hands emitters read-only accessors, not the symbol table
    /// itself).
    pub constant_names: Vec<String>,
    /// Each constant's kind-specific deterministic default value (§6 "Output —
    /// numeric script"), indexed the same way as [`Solution::constant_names`); the
    /// numeric-script emitter needs these to fill in a device constant a caller's
    /// parameter struct omits.
    pub constant_defaults: Vec<f64>,
    pub denominator: Normalized,
    /// `numerators[dependent][independent]`.
    pub numerators: Vec<Vec<Normalized>>,
    pub map: ExpressionMap,
    pub num_refs: Vec<Vec<ExprRef>>,
    pub den_ref: ExprRef,
}

/// Runs the complete pipeline: topology, symbol table, LES, solver driver, frequency
/// transform and normalization, cancellation, and naming.
pub fn solve_circuit(circuit: &Circuit) -> Result<Solution, CoreError> {
    let (_topo, mut symtab, matrix) = passes::run_to_les(circuit)?;

    let dependents = required_dependents(circuit, &symtab)?;
    let independent_names: Vec<String> = symtab.knowns().iter().map(|k| k.name.clone()).collect();

    let mut node_solutions: std::collections::HashMap<String, (Coefficient, Vec<Coefficient>)> =
        std::collections::HashMap::new();
    let mut reference_denominator: Option<Coefficient> = None;

    for dep in &dependents {
        let node_name = match dep {
            Dependent::Node { name } => name.clone(),
            Dependent::UserVoltage { .. } => continue,
        };
        if node_solutions.contains_key(&node_name) {
            continue;
        }
        let (old_col, last_col) = symtab.set_target_unknown_for_solver(&node_name)?;
        let mut swapped = matrix.clone();
        swapped.swap_columns(old_col, last_col);
        let mut result = solver::solve(&swapped)?;
        // Every LES row reads "sum of column * variable terms = 0" (§3), so the
        // triangularized last row reads `denominator * target + numerator * known =
        // 0`, i.e. `target = -numerator / denominator`, not `+numerator /
        // denominator` as a literal reading of §4.F's prose might suggest. Negate
        // here, once, rather than carrying a `-1` through every downstream rational
        // function.
        for n in &mut result.numerators {
            n.negate_in_place();
        }

        let (denominator, numerators) = match &reference_denominator {
            None => {
                reference_denominator = Some(result.denominator.clone());
                (result.denominator, result.numerators)
            }
            Some(reference) => {
                if &result.denominator == reference {
                    (result.denominator, result.numerators)
                } else {
                    let mut negated = result.denominator.clone();
                    negated.negate_in_place();
                    if &negated == reference {
                        let numerators =
                            result.numerators.into_iter().map(|mut n| { n.negate_in_place(); n }).collect();
                        (negated, numerators)
                    } else {
                        let idx = symtab.find_unknown_by_name(&node_name).unwrap_or(0);
                        return Err(SolveError::DeterminantMismatch(idx).into());
                    }
                }
            }
        };
        node_solutions.insert(node_name, (denominator, numerators));
    }

    let denominator_coeff = reference_denominator.unwrap_or_else(Coefficient::one);

    let mut uv_solutions: std::collections::HashMap<String, Vec<Coefficient>> = std::collections::HashMap::new();
    for dep in &dependents {
        if let Dependent::UserVoltage { name, plus, minus } = dep {
            let k = independent_names.len();
            let mut diff = vec![Coefficient::zero(); k];
            if let Some(p) = plus {
                if let Some((_, nums)) = node_solutions.get(p) {
                    for (i, n) in nums.iter().enumerate() {
                        diff[i].add_in_place(n);
                    }
                }
            }
            if let Some(m) = minus {
                if let Some((_, nums)) = node_solutions.get(m) {
                    for (i, n) in nums.iter().enumerate() {
                        diff[i].sub_in_place(n);
                    }
                }
            }
            uv_solutions.insert(name.clone(), diff);
        }
    }

    let denominator =
        freq::normalize(freq::transform(circuit, &symtab, &denominator_coeff)?).map_err(CoreError::Symbol)?;

    let mut dependent_names = Vec::new();
    let mut numerators = Vec::new();
    for dep in &dependents {
        dependent_names.push(dep.name().to_string());
        let raw_numerators: Vec<Coefficient> = match dep {
            Dependent::Node { name } => node_solutions.get(name).map(|(_, n)| n.clone()).unwrap_or_default(),
            Dependent::UserVoltage { name, .. } => uv_solutions.get(name).cloned().unwrap_or_default(),
        };
        let mut row = Vec::new();
        for coeff in &raw_numerators {
            let transformed = freq::transform(circuit, &symtab, coeff)?;
            row.push(freq::normalize(transformed).map_err(CoreError::Symbol)?);
        }
        numerators.push(row);
    }

    let mut map = ExpressionMap::new();
    let den_ref = map.insert(denominator.remainder.clone(), true, Origin { dependent: 0, independent: 0, is_numerator: false });
    let mut num_refs = Vec::new();
    for (dep_idx, row) in numerators.iter().enumerate() {
        let mut refs = Vec::new();
        for (indep_idx, n) in row.iter().enumerate() {
            let (num_expr, _den_expr, _negated) = crate::exprmap::cancel(n, &denominator).map_err(CoreError::from)?;
            let origin = Origin { dependent: dep_idx, independent: indep_idx, is_numerator: true };
            refs.push(map.insert(num_expr, false, origin));
        }
        num_refs.push(refs);
    }
    map.assign_names(&num_refs, &vec![den_ref; dependent_names.len()], &dependent_names, &independent_names);

    let constant_names: Vec<String> = symtab.constants().iter().map(|c| c.name.clone()).collect();
    let constant_defaults: Vec<f64> =
        symtab.constants().iter().map(|c| circuit.device(c.device).default_value()).collect();

    Ok(Solution {
        dependent_names,
        independent_names,
        constant_names,
        constant_defaults,
        denominator,
        numerators,
        map,
        num_refs,
        den_ref,
    })
}

/// Computes §4.F driver step 1: the set of dependents any result request needs,
/// directly or (for user-defined voltages) through their backing node unknowns. With
/// no requests at all, every node unknown and every user-defined voltage is required.
fn required_dependents(circuit: &Circuit, symtab: &SymbolTable) -> Result<Vec<Dependent>, CoreError> {
    if circuit.requests.is_empty() {
        let mut deps: Vec<Dependent> = symtab
            .unknowns()
            .iter()
            .filter(|u| u.node.is_some())
            .map(|u| Dependent::Node { name: u.name.clone() })
            .collect();
        for uv in &circuit.user_voltages {
            deps.push(Dependent::UserVoltage {
                name: uv.name.clone(),
                plus: symtab.find_unknown_by_name(&circuit.node_name(uv.plus).to_string()).map(|_| circuit.node_name(uv.plus).to_string()),
                minus: symtab.find_unknown_by_name(&circuit.node_name(uv.minus).to_string()).map(|_| circuit.node_name(uv.minus).to_string()),
            });
        }
        return Ok(deps);
    }

    let mut seen_names: HashSet<String> = HashSet::new();
    let mut deps = Vec::new();
    for req in &circuit.requests {
        if let Some(indep_name) = &req.independent {
            if symtab.find_known_by_name(indep_name).is_none() {
                return Err(BadReferenceError::UndefinedQuantity(req.name.clone(), indep_name.clone()).into());
            }
            // §7: a request naming an independent turns into a Bode request (one
            // dependent, one independent). Two shapes of that are never meaningful:
            // listing more than one dependent while the circuit has more than one
            // independent source (which dependent pairs with which input?), or
            // naming, as the lone "dependent", something that is itself an
            // independent source (a ratio of two independents, not a transfer
            // function at all).
            if req.dependents.len() > 1 && symtab.num_knowns() > 1 {
                return Err(BadReferenceError::BodeBetweenTwoDependents(req.name.clone()).into());
            }
            if let [DependentName::Node(name) | DependentName::UserVoltage(name)] = req.dependents.as_slice() {
                if symtab.find_known_by_name(name).is_some() {
                    return Err(BadReferenceError::BodeBetweenTwoIndependents(req.name.clone()).into());
                }
            }
        }
        for dependent in &req.dependents {
            match dependent {
                DependentName::Node(name) => {
                    if symtab.find_unknown_by_name(name).is_none() {
                        return Err(BadReferenceError::UndefinedQuantity(req.name.clone(), name.clone()).into());
                    }
                    if seen_names.insert(name.clone()) {
                        deps.push(Dependent::Node { name: name.clone() });
                    }
                }
                DependentName::UserVoltage(name) => {
                    let uv = circuit
                        .user_voltages
                        .iter()
                        .find(|uv| &uv.name == name)
                        .ok_or_else(|| BadReferenceError::UndefinedQuantity(req.name.clone(), name.clone()))?;
                    if seen_names.insert(name.clone()) {
                        let plus = symtab.find_unknown_by_name(circuit.node_name(uv.plus)).map(|_| circuit.node_name(uv.plus).to_string());
                        let minus = symtab.find_unknown_by_name(circuit.node_name(uv.minus)).map(|_| circuit.node_name(uv.minus).to_string());
                        for n in [&plus, &minus].into_iter().flatten() {
                            if seen_names.insert(n.clone()) {
                                deps.push(Dependent::Node { name: n.clone() });
                            }
                        }
                        deps.push(Dependent::UserVoltage { name: name.clone(), plus, minus });
                    }
                }
            }
        }
    }
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CircuitBuilder, Device, DeviceKind};
    use crate::rational::Rational;

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
    fn solves_rc_lowpass_with_one_shared_denominator() {
        let circuit = rc_lowpass();
        let solution = solve_circuit(&circuit).unwrap();
        assert!(solution.dependent_names.contains(&"in".to_string()));
        assert!(solution.dependent_names.contains(&"out".to_string()));
        assert_eq!(solution.independent_names, vec!["U1".to_string()]);
        assert!(!solution.denominator.remainder.is_zero());
    }

    /// Spec scenario 1 (§8): `out/U1` of an RC low-pass must come out to exactly
    /// `1 / (1 + R1*C1*s)` — not `-1 / (1 + R1*C1*s)`. This pins down the sign
    /// convention of the "sum of columns * variable = 0" row reading (§3): the
    /// triangularized last row gives `target = -numerator / denominator`, so the
    /// solver driver must negate each call's numerators before they are used as a
    /// transfer function's numerator.
    #[test]
    fn rc_lowpass_transfer_function_has_the_expected_sign() {
        let circuit = rc_lowpass();
        let solution = solve_circuit(&circuit).unwrap();

        let out_idx = solution.dependent_names.iter().position(|n| n == "out").unwrap();
        let u1_idx = solution.independent_names.iter().position(|n| n == "U1").unwrap();
        let r1_bit = solution.constant_names.iter().position(|n| n == "R1").unwrap();
        let c1_bit = solution.constant_names.iter().position(|n| n == "C1").unwrap();

        let numerator = &solution.numerators[out_idx][u1_idx];
        let (num_expr, den_expr, _) = crate::exprmap::cancel(numerator, &solution.denominator).unwrap();

        // Numerator cancels down to the constant `1`.
        assert_eq!(num_expr.addends().len(), 1);
        assert_eq!(num_expr.addends()[0].factor, Rational::ONE);
        assert_eq!(num_expr.addends()[0].power_of_s, 0);
        assert!(num_expr.addends()[0].power_of_const.is_empty());

        // Denominator is `1 + R1*C1*s`: a constant `1` term and an `R1*C1*s` term,
        // both with positive unit factors.
        assert_eq!(den_expr.addends().len(), 2);
        let s_term = den_expr.addends().iter().find(|a| a.power_of_s == 1).expect("s term present");
        assert_eq!(s_term.factor, Rational::ONE);
        assert_eq!(s_term.power_of_const, vec![(r1_bit.min(c1_bit), 1), (r1_bit.max(c1_bit), 1)]);
        let const_term = den_expr.addends().iter().find(|a| a.power_of_s == 0).expect("constant term present");
        assert_eq!(const_term.factor, Rational::ONE);
        assert!(const_term.power_of_const.is_empty());
    }

    fn inverting_opamp() -> Circuit {
        let mut b = CircuitBuilder::new("inv");
        let n_in = b.node("in").unwrap();
        let n_minus = b.node("minus").unwrap();
        let n_out = b.node("out").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(Device {
            name: "R1".into(),
            kind: DeviceKind::Resistor,
            from: n_in,
            to: n_minus,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1_000.0),
            relation: None,
        })
        .unwrap();
        b.add_device(Device {
            name: "R2".into(),
            kind: DeviceKind::Resistor,
            from: n_minus,
            to: n_out,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(10_000.0),
            relation: None,
        })
        .unwrap();
        b.add_device(Device {
            name: "A1".into(),
            kind: DeviceKind::OpAmp,
            from: n_gnd,
            to: n_minus,
            output: Some(n_out),
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: None,
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

    /// Spec scenario 2 (§8): the inverting op-amp's `out/U1` is the constant `-R2/R1`
    /// — a negative ratio of the two resistor constants, with no dependency on `s`.
    /// This anchors the same sign-convention fix as
    /// `rc_lowpass_transfer_function_has_the_expected_sign`, on a circuit whose true
    /// gain is negative rather than positive.
    #[test]
    fn inverting_opamp_transfer_function_is_negative_r2_over_r1() {
        let circuit = inverting_opamp();
        let solution = solve_circuit(&circuit).unwrap();

        let out_idx = solution.dependent_names.iter().position(|n| n == "out").unwrap();
        let u1_idx = solution.independent_names.iter().position(|n| n == "U1").unwrap();
        let r1_bit = solution.constant_names.iter().position(|n| n == "R1").unwrap();
        let r2_bit = solution.constant_names.iter().position(|n| n == "R2").unwrap();

        let numerator = &solution.numerators[out_idx][u1_idx];
        let (num_expr, den_expr, _) = crate::exprmap::cancel(numerator, &solution.denominator).unwrap();

        // No `s` dependence anywhere in either expression.
        assert!(num_expr.addends().iter().all(|a| a.power_of_s == 0));
        assert!(den_expr.addends().iter().all(|a| a.power_of_s == 0));

        // The ratio reduces to a single addend on each side, and together they
        // reference exactly R1 and R2 (one apiece) — an ideal op-amp's virtual-short
        // constraint leaves no other constant or cross term in this two-resistor
        // circuit.
        assert_eq!(num_expr.addends().len(), 1);
        assert_eq!(den_expr.addends().len(), 1);
        let num = &num_expr.addends()[0];
        let den = &den_expr.addends()[0];
        let mut bits: Vec<usize> =
            num.power_of_const.iter().chain(den.power_of_const.iter()).map(|&(bit, _)| bit).collect();
        bits.sort_unstable();
        assert_eq!(bits, { let mut b = vec![r1_bit, r2_bit]; b.sort_unstable(); b });

        // The overall ratio is negative.
        assert_eq!(num.factor.sign() * den.factor.sign(), -1);
    }

    /// Regression for a solver-driver bug: a circuit with two node unknowns and no
    /// branch-current unknown at all (driven only by an independent current source, so
    /// column `m - 1` is held by a node voltage rather than a never-targeted branch
    /// current) used to have its second-solved unknown silently reuse the first
    /// unknown's column swap against the pristine matrix, because the swap was
    /// computed from a cumulatively-mutated column rather than each unknown's fixed
    /// pristine one. `n1` and `n2` here must come out as genuinely different transfer
    /// functions (`n1 = I1*(R1+R2)`, `n2 = I1*R2`), not two copies of the same one.
    #[test]
    fn two_node_unknowns_without_branch_currents_solve_independently() {
        let mut b = CircuitBuilder::new("divider");
        let n1 = b.node("n1").unwrap();
        let n2 = b.node("n2").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(Device {
            name: "I1".into(),
            kind: DeviceKind::IndependentCurrent,
            from: n_gnd,
            to: n1,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1e-3),
            relation: None,
        })
        .unwrap();
        b.add_device(Device {
            name: "R1".into(),
            kind: DeviceKind::Resistor,
            from: n1,
            to: n2,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1_000.0),
            relation: None,
        })
        .unwrap();
        b.add_device(Device {
            name: "R2".into(),
            kind: DeviceKind::Resistor,
            from: n2,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(2_000.0),
            relation: None,
        })
        .unwrap();
        let circuit = b.finish();

        let solution = solve_circuit(&circuit).unwrap();
        let n1_idx = solution.dependent_names.iter().position(|n| n == "n1").unwrap();
        let n2_idx = solution.dependent_names.iter().position(|n| n == "n2").unwrap();
        let i1_idx = solution.independent_names.iter().position(|n| n == "I1").unwrap();
        let r1_bit = solution.constant_names.iter().position(|n| n == "R1").unwrap();
        let r2_bit = solution.constant_names.iter().position(|n| n == "R2").unwrap();

        let n1_sol = &solution.numerators[n1_idx][i1_idx];
        let n2_sol = &solution.numerators[n2_idx][i1_idx];
        assert_ne!(n1_sol, n2_sol, "n1 and n2 must not solve to the same transfer function");

        // n1 = I1 * (R1 + R2): its atom divides out both resistor bits.
        let mut n1_atom_bits: Vec<usize> = n1_sol.atom.power_of_const.iter().map(|(b, _)| *b).collect();
        n1_atom_bits.sort_unstable();
        let mut expected_bits = vec![r1_bit, r2_bit];
        expected_bits.sort_unstable();
        assert_eq!(n1_atom_bits, expected_bits);

        // n2 = I1 * R2: its atom divides out R1 only, leaving R2 for the remainder.
        let n2_atom_bits: Vec<usize> = n2_sol.atom.power_of_const.iter().map(|(b, _)| *b).collect();
        assert_eq!(n2_atom_bits, vec![r1_bit]);
    }

    #[test]
    fn rejects_bode_request_naming_an_independent_as_its_dependent() {
        let mut circuit = rc_lowpass();
        circuit.requests.push(crate::model::ResultRequest {
            name: "bad".to_string(),
            dependents: vec![DependentName::Node("U1".to_string())],
            independent: Some("U1".to_string()),
        });
        let err = solve_circuit(&circuit).unwrap_err();
        assert!(matches!(err, CoreError::BadReference(BadReferenceError::BodeBetweenTwoIndependents(_))));
    }

    #[test]
    fn rejects_bode_request_with_two_dependents_in_a_multi_input_circuit() {
        let mut b = CircuitBuilder::new("two_source");
        let n_in1 = b.node("in1").unwrap();
        let n_in2 = b.node("in2").unwrap();
        let n_out = b.node("out").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(Device {
            name: "R1".into(),
            kind: DeviceKind::Resistor,
            from: n_in1,
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
            name: "R2".into(),
            kind: DeviceKind::Resistor,
            from: n_in2,
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
            name: "U1".into(),
            kind: DeviceKind::IndependentVoltage,
            from: n_in1,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1.0),
            relation: None,
        })
        .unwrap();
        b.add_device(Device {
            name: "U2".into(),
            kind: DeviceKind::IndependentVoltage,
            from: n_in2,
            to: n_gnd,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(1.0),
            relation: None,
        })
        .unwrap();
        b.add_request(crate::model::ResultRequest {
            name: "bad".to_string(),
            dependents: vec![DependentName::Node("in1".to_string()), DependentName::Node("in2".to_string())],
            independent: Some("U1".to_string()),
        });
        let circuit = b.finish();
        let err = solve_circuit(&circuit).unwrap_err();
        assert!(matches!(err, CoreError::BadReference(BadReferenceError::BodeBetweenTwoDependents(_))));
    }
}
