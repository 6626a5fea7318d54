//! Human-readable output (§6 "Output — human text"): one block per dependent, each a
//! sum of `N_<d>_<i>/D_<d>_<i> * <independentName>(s)` terms, followed by every
//! `N`/`D` polynomial declaration grouped by power of `s`.

use linnet_ir::engine::Solution;
use linnet_ir::exprmap::Entry;
use linnet_ir::freq::{FreqAddend, FreqExpr};
use linnet_ir::rational::Rational;

use crate::wrap;

const LINE_WIDTH: usize = 72;

pub fn render_text(solution: &Solution) -> String {
    let mut out = String::new();
    for (dep_idx, dep_name) in solution.dependent_names.iter().enumerate() {
        out.push_str(&format!("{dep_name}(s) =\n"));
        out.push_str(&wrap(&render_dependent_sum(solution, dep_idx), LINE_WIDTH));
        out.push_str("\n\n");
    }

    let mut declared = vec![false; solution.map.entries().len()];
    for dep_idx in 0..solution.dependent_names.len() {
        let den_ref = solution.den_ref;
        if !declared[den_ref.index] {
            declared[den_ref.index] = true;
            out.push_str(&render_declaration(&solution.map.entries()[den_ref.index], &solution.constant_names));
        }
        for num_ref in &solution.num_refs[dep_idx] {
            if !declared[num_ref.index] {
                declared[num_ref.index] = true;
                out.push_str(&render_declaration(&solution.map.entries()[num_ref.index], &solution.constant_names));
            }
        }
    }
    out
}

fn render_dependent_sum(solution: &Solution, dep_idx: usize) -> String {
    let mut terms = Vec::new();
    for (indep_idx, indep_name) in solution.independent_names.iter().enumerate() {
        let num_ref = solution.num_refs[dep_idx][indep_idx];
        let num_entry = &solution.map.entries()[num_ref.index];
        if num_entry.expr.is_zero() {
            continue;
        }
        let num_name = entry_display_name(num_entry, num_ref.negated);
        let den_name = solution.map.entries()[solution.den_ref.index]
            .name
            .clone()
            .unwrap_or_else(|| "D".to_string());
        terms.push(format!("{num_name}/{den_name} * {indep_name}(s)"));
    }
    if terms.is_empty() {
        return " 0".to_string();
    }
    terms.join(" + ")
}

fn entry_display_name(entry: &Entry, negated: bool) -> String {
    let name = entry.name.clone().unwrap_or_else(|| "N".to_string());
    if negated {
        format!("-{name}")
    } else {
        name
    }
}

fn render_declaration(entry: &Entry, constant_names: &[String]) -> String {
    let kind = if entry.used_as_denominator { "D" } else { "N" };
    let name = entry.name.clone().unwrap_or_else(|| kind.to_string());
    let body = render_polynomial(&entry.expr, constant_names);
    format!("{}(s) =\n{}\n\n", name, wrap(&body, LINE_WIDTH))
}

/// Renders a [`FreqExpr`] as a polynomial in `s`, grouping addends that share a power
/// of `s` and rendering each group's coefficient as a sum of constant-product terms.
fn render_polynomial(expr: &FreqExpr, constant_names: &[String]) -> String {
    if expr.is_zero() {
        return " 0".to_string();
    }
    let mut groups: Vec<(i32, Vec<&FreqAddend>)> = Vec::new();
    for addend in expr.addends() {
        match groups.last_mut() {
            Some((power, terms)) if *power == addend.power_of_s => terms.push(addend),
            _ => groups.push((addend.power_of_s, vec![addend])),
        }
    }

    let mut parts = Vec::new();
    for (power, terms) in &groups {
        let coeff = render_coefficient_sum(terms, constant_names);
        let coeff = if terms.len() > 1 && *power != 0 { format!("({coeff})") } else { coeff };
        let term = match power {
            0 => coeff,
            1 => format!("{coeff}*s"),
            p => format!("{coeff}*s^{p}"),
        };
        parts.push(term);
    }
    parts.join(" + ").replace("+ -", "- ")
}

fn render_coefficient_sum(terms: &[&FreqAddend], constant_names: &[String]) -> String {
    let rendered: Vec<String> = terms.iter().map(|t| render_term(t, constant_names)).collect();
    rendered.join(" + ").replace("+ -", "- ")
}

fn render_term(addend: &FreqAddend, constant_names: &[String]) -> String {
    let product: Vec<String> = addend
        .power_of_const
        .iter()
        .map(|&(bit, exp)| {
            let name = constant_names.get(bit).cloned().unwrap_or_else(|| format!("k{bit}"));
            if exp == 1 {
                name
            } else {
                format!("{name}^{exp}")
            }
        })
        .collect();

    let factor = addend.factor;
    if product.is_empty() {
        return render_rational(&factor);
    }
    if factor == Rational::ONE {
        product.join("*")
    } else if factor == Rational::ONE.neg().expect("negating one cannot overflow") {
        format!("-{}", product.join("*"))
    } else {
        format!("{}*{}", render_rational(&factor), product.join("*"))
    }
}

fn render_rational(r: &Rational) -> String {
    if r.is_integer() {
        r.numer().to_string()
    } else {
        format!("{}/{}", r.numer(), r.denom())
    }
}
