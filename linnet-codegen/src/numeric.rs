//! Numeric (Octave) script emission (§6 "Output — numeric script"): one function per
//! dependent, accepting an optional parameter struct of device constants (falling back
//! to the kind-specific deterministic defaults `linnet_ir` attaches to every
//! [`Solution`]), building row-vector polynomial coefficients highest-power-of-`s`
//! first, and instantiating an LTI object via `tf`. A function plots the Bode response
//! when the whole circuit has exactly one independent source (so every request is
//! necessarily single-input) and the step response otherwise, matching this project's
//! resolution of the Bode-request Open Question recorded in `DESIGN.md`.

use linnet_ir::engine::Solution;
use linnet_ir::exprmap::Entry;
use linnet_ir::freq::{FreqAddend, FreqExpr};
use linnet_ir::rational::Rational;

pub fn render_octave(solution: &Solution) -> String {
    let mut out = String::new();
    out.push_str("% Auto-generated by linnet. Each function below instantiates an LTI\n");
    out.push_str("% transfer-function object for one requested dependent; called with no output\n");
    out.push_str("% arguments it also plots the corresponding response.\n\n");

    let is_bode = solution.independent_names.len() == 1;

    for dep_idx in 0..solution.dependent_names.len() {
        out.push_str(&render_function(solution, dep_idx, is_bode));
        out.push('\n');
    }
    out
}

fn sanitize_ident(name: &str) -> String {
    let mut s: String = name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if s.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true) {
        s.insert(0, '_');
    }
    s
}

fn render_function(solution: &Solution, dep_idx: usize, is_bode: bool) -> String {
    let dep_name = &solution.dependent_names[dep_idx];
    let fn_name = format!("tf_{}", sanitize_ident(dep_name));
    let mut out = String::new();

    out.push_str(&format!("function sys = {fn_name}(params)\n"));
    out.push_str("  if nargin < 1\n    params = struct();\n  end\n");
    for (bit, name) in solution.constant_names.iter().enumerate() {
        let ident = sanitize_ident(name);
        let default = solution.constant_defaults[bit];
        out.push_str(&format!(
            "  if isfield(params, '{name}')\n    {ident} = params.{name};\n  else\n    {ident} = {default:e};\n  end\n"
        ));
    }
    out.push('\n');

    let den_entry = &solution.map.entries()[solution.den_ref.index];
    let den_vec_name = "D_common";
    out.push_str(&format!(
        "  {den_vec_name} = {};\n",
        render_octave_vector(&apply_sign(den_entry, solution.den_ref.negated), &solution.constant_names)
    ));

    let mut num_var_names = Vec::new();
    for indep_idx in 0..solution.independent_names.len() {
        let num_ref = solution.num_refs[dep_idx][indep_idx];
        let num_entry = &solution.map.entries()[num_ref.index];
        let var_name = format!("N_{indep_idx}");
        out.push_str(&format!(
            "  {var_name} = {};\n",
            render_octave_vector(&apply_sign(num_entry, num_ref.negated), &solution.constant_names)
        ));
        num_var_names.push(var_name);
    }
    out.push('\n');

    out.push_str(&format!(
        "  desc.num = {{{}}};\n",
        num_var_names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
    ));
    out.push_str(&format!(
        "  desc.den = {{{}}};\n",
        vec![den_vec_name; solution.independent_names.len()].join(", ")
    ));
    out.push_str(&format!(
        "  desc.inputNames = {{{}}};\n",
        solution.independent_names.iter().map(|n| format!("'{n}'")).collect::<Vec<_>>().join(", ")
    ));
    out.push_str(&format!("  desc.outputName = '{dep_name}';\n"));
    out.push_str(&format!("  desc.isBode = {};\n\n", if is_bode { "true" } else { "false" }));

    out.push_str("  sys = tf(desc.num, desc.den, 'InputName', desc.inputNames, 'OutputName', desc.outputName);\n");
    out.push_str("  if nargout == 0\n");
    out.push_str("    if desc.isBode\n      bode(sys);\n    else\n      step(sys);\n    end\n");
    out.push_str("    clear sys\n  end\n");
    out.push_str("endfunction\n");
    out
}

/// A normalized denormalized expression, flipped if its [`linnet_ir::exprmap::ExprRef`]
/// carries the negated bit.
fn apply_sign(entry: &Entry, negated: bool) -> FreqExpr {
    if !negated {
        return entry.expr.clone();
    }
    let flipped: Vec<FreqAddend> = entry
        .expr
        .addends()
        .iter()
        .map(|a| {
            let mut a = a.clone();
            a.factor = a.factor.neg().expect("negating an already-reduced factor cannot overflow");
            a
        })
        .collect();
    FreqExpr::from_addends(flipped)
}

/// Renders `expr` as an Octave row vector of coefficients, highest power of `s` first,
/// zero-filled for absent powers (§6).
fn render_octave_vector(expr: &FreqExpr, constant_names: &[String]) -> String {
    if expr.is_zero() {
        return "[0]".to_string();
    }
    let max_power = expr.addends().first().map(|a| a.power_of_s).unwrap_or(0);
    let mut cells = Vec::new();
    for power in (0..=max_power).rev() {
        let terms: Vec<&FreqAddend> = expr.addends().iter().filter(|a| a.power_of_s == power).collect();
        if terms.is_empty() {
            cells.push("0".to_string());
        } else {
            cells.push(render_coefficient_sum(&terms, constant_names));
        }
    }
    format!("[{}]", cells.join(", "))
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
            let name = constant_names.get(bit).map(|n| sanitize_ident(n)).unwrap_or_else(|| format!("k{bit}"));
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
        format!("({}/{})", r.numer(), r.denom())
    }
}
