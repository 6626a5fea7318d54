//! Cancellation, expression map, and rendering order (component H): turns a normalized
//! numerator/denominator pair per `(dependent, independent)` into a deduplicated,
//! stably named set of expressions with a forward-reference-free emission order.

use std::collections::HashMap;

use crate::freq::{Atom, FreqExpr, Normalized};
use crate::rational::Rational;

/// Where an entry was first named: the request that caused it, and whether it was
/// named as a numerator or a denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub dependent: usize,
    pub independent: usize,
    pub is_numerator: bool,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub expr: FreqExpr,
    pub name: Option<String>,
    pub used_as_denominator: bool,
    pub origin: Origin,
}

/// A reference into the [`ExpressionMap`]'s entry list, with a sign bit: `true` means
/// the cited entry equals minus the actual expression at this `(dependent,
/// independent)` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprRef {
    pub index: usize,
    pub negated: bool,
}

/// Cancels the common factor between a numerator and the shared denominator: both are
/// multiplied by an atom whose own factor and exponents undo the smaller of the two
/// atoms recorded during normalization, per §4.H. If, after cancellation, the
/// remaining lists compare equal up to sign, both become the single shared expression.
pub fn cancel(numerator: &Normalized, denominator: &Normalized) -> Result<(FreqExpr, FreqExpr, bool), crate::rational::RationalError> {
    let mut num = numerator.remainder.clone();
    let mut den = denominator.remainder.clone();

    let scale_atom = combine_cancelling_atom(&numerator.atom, &denominator.atom)?;
    scale(&mut num, &scale_atom.0)?;
    scale(&mut den, &scale_atom.1)?;

    let (equal, negated) = structurally_equal_modulo_sign(&num, &den);
    if equal {
        den = num.clone();
        if negated {
            negate(&mut den);
        }
    }
    Ok((num, den, negated))
}

/// Computes the pair of scale atoms (one per side) that removes the smaller exponent
/// of the two atoms from each variable, so both sides end up sharing the larger
/// exponent directly in their remainder lists.
fn combine_cancelling_atom(a: &Atom, b: &Atom) -> Result<(Atom, Atom), crate::rational::RationalError> {
    let factor_ratio = a.factor.div(&b.factor)?;
    let scale_num = Atom { factor: Rational::ONE, power_of_s: (b.power_of_s - a.power_of_s).max(0), power_of_const: diff_min(b, a) };
    let scale_den =
        Atom { factor: factor_ratio, power_of_s: (a.power_of_s - b.power_of_s).max(0), power_of_const: diff_min(a, b) };
    Ok((scale_num, scale_den))
}

fn diff_min(lhs: &Atom, rhs: &Atom) -> Vec<(usize, i32)> {
    let mut bits: Vec<usize> = lhs.power_of_const.iter().chain(rhs.power_of_const.iter()).map(|(b, _)| *b).collect();
    bits.sort_unstable();
    bits.dedup();
    bits.into_iter()
        .filter_map(|bit| {
            let l = lhs.power_of_const.iter().find(|(b, _)| *b == bit).map(|(_, p)| *p).unwrap_or(0);
            let r = rhs.power_of_const.iter().find(|(b, _)| *b == bit).map(|(_, p)| *p).unwrap_or(0);
            let d = (l - r).max(0);
            (d != 0).then_some((bit, d))
        })
        .collect()
}

fn scale(expr: &mut FreqExpr, atom: &Atom) -> Result<(), crate::rational::RationalError> {
    let addends: Vec<_> = expr
        .addends()
        .iter()
        .map(|a| {
            let mut a = a.clone();
            a.factor = a.factor.mul(&atom.factor)?;
            a.power_of_s += atom.power_of_s;
            for &(bit, p) in &atom.power_of_const {
                let cur = a.power_of_const.iter().find(|(b, _)| *b == bit).map(|(_, v)| *v).unwrap_or(0);
                let new = cur + p;
                if new == 0 {
                    a.power_of_const.retain(|(b, _)| *b != bit);
                } else if let Some(entry) = a.power_of_const.iter_mut().find(|(b, _)| *b == bit) {
                    entry.1 = new;
                } else {
                    a.power_of_const.push((bit, new));
                }
            }
            // `freq::FreqAddend::set_power` always keeps this vector sorted ascending
            // by bit; a pushed-but-unsorted entry here would make a numerically
            // identical addend compare unequal to one that went through `set_power`,
            // which is exactly what `structurally_equal_modulo_sign` below (and thus
            // the expression-map dedup and the `cancel` collapse-to-shared-expression
            // path) rely on.
            a.power_of_const.sort_by(|x, y| x.0.cmp(&y.0));
            Ok(a)
        })
        .collect::<Result<_, crate::rational::RationalError>>()?;
    *expr = FreqExpr::default();
    for a in addends {
        expr_merge_sorted(expr, a);
    }
    Ok(())
}

fn expr_merge_sorted(expr: &mut FreqExpr, addend: crate::freq::FreqAddend) {
    // FreqExpr's fields are private to its module; rebuild via the public merge path
    // by exploiting that `FreqExpr: Default` starts empty and `merge` keeps the §3
    // sort order. We can't call the private `merge` from here, so collect manually.
    let mut all: Vec<_> = expr.addends().to_vec();
    all.push(addend);
    all.sort_by(|a, b| {
        let ka = (a.power_of_s, {
            let mut v = a.power_of_const.clone();
            v.sort_by(|x, y| y.0.cmp(&x.0));
            v
        });
        let kb = (b.power_of_s, {
            let mut v = b.power_of_const.clone();
            v.sort_by(|x, y| y.0.cmp(&x.0));
            v
        });
        kb.cmp(&ka)
    });
    *expr = crate::freq::FreqExpr::from_addends(all);
}

fn negate(expr: &mut FreqExpr) {
    let negated: Vec<_> = expr
        .addends()
        .iter()
        .map(|a| {
            let mut a = a.clone();
            a.factor = a.factor.neg().expect("negation of an already-reduced factor cannot overflow");
            a
        })
        .collect();
    *expr = FreqExpr::from_addends(negated);
}

fn structurally_equal_modulo_sign(a: &FreqExpr, b: &FreqExpr) -> (bool, bool) {
    if a.addends().len() != b.addends().len() {
        return (false, false);
    }
    let same = a.addends().iter().zip(b.addends()).all(|(x, y)| {
        x.power_of_s == y.power_of_s && x.power_of_const == y.power_of_const && x.factor == y.factor
    });
    if same {
        return (true, false);
    }
    let mut neg_b = b.clone();
    negate(&mut neg_b);
    let opposite = a.addends().iter().zip(neg_b.addends()).all(|(x, y)| {
        x.power_of_s == y.power_of_s && x.power_of_const == y.power_of_const && x.factor == y.factor
    });
    (opposite, opposite)
}

/// The deduplicated, rendering-ready collection of expressions for one solution.
#[derive(Debug, Clone, Default)]
pub struct ExpressionMap {
    entries: Vec<Entry>,
}

impl ExpressionMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Inserts `expr`, deduplicating by structural comparison (including sign) against
    /// every existing entry. Returns a reference carrying the sign needed to recover
    /// the original expression from the stored one.
    pub fn insert(&mut self, expr: FreqExpr, is_denominator: bool, origin: Origin) -> ExprRef {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            let (equal, negated) = structurally_equal_modulo_sign(&entry.expr, &expr);
            if equal {
                if is_denominator {
                    entry.used_as_denominator = true;
                }
                return ExprRef { index: idx, negated };
            }
        }
        let index = self.entries.len();
        self.entries.push(Entry { expr, name: None, used_as_denominator: is_denominator, origin });
        ExprRef { index, negated: false }
    }

    fn name_for(origin: Origin, names: &(Vec<String>, Vec<String>), is_numerator: bool) -> String {
        let dep = &names.0[origin.dependent];
        let indep = &names.1[origin.independent];
        if is_numerator {
            format!("N_{dep}_{indep}")
        } else {
            format!("D_{dep}_{indep}")
        }
    }

    /// Assigns names in the forward-reference-free order of §4.H: repeatedly release
    /// the lowest-index dependent whose denominators are already named (or have no
    /// claimant yet), naming its denominators then its numerators in independent-index
    /// order; any dependent untouched by the progress loop is released in index order
    /// at the end.
    pub fn assign_names(
        &mut self,
        num_refs: &[Vec<ExprRef>],
        den_refs: &[ExprRef],
        dependent_names: &[String],
        independent_names: &[String],
    ) {
        let names = (dependent_names.to_vec(), independent_names.to_vec());
        let n_dep = num_refs.len();
        let mut released = vec![false; n_dep];
        let mut progressed = true;

        while progressed {
            progressed = false;
            for dep in 0..n_dep {
                if released[dep] {
                    continue;
                }
                let den_ref = den_refs[dep];
                let den_named_or_free =
                    self.entries[den_ref.index].name.is_some() || !self.entries[den_ref.index].used_as_denominator;
                if !den_named_or_free {
                    continue;
                }
                self.release(dep, num_refs, den_refs, &names);
                released[dep] = true;
                progressed = true;
            }
        }

        for dep in 0..n_dep {
            if !released[dep] {
                self.release(dep, num_refs, den_refs, &names);
            }
        }
    }

    fn release(&mut self, dep: usize, num_refs: &[Vec<ExprRef>], den_refs: &[ExprRef], names: &(Vec<String>, Vec<String>)) {
        let den_ref = den_refs[dep];
        if self.entries[den_ref.index].name.is_none() {
            // Naming happens at release time, using whichever dependent first released
            // this entry — not the insertion-time placeholder origin, since a shared
            // denominator is inserted once but may be named under any dependent's
            // context (independent index 0, by convention, since the denominator
            // doesn't vary per independent).
            let origin = Origin { dependent: dep, independent: 0, is_numerator: false };
            self.entries[den_ref.index].origin = origin;
            self.entries[den_ref.index].name = Some(Self::name_for(origin, names, false));
        }
        for (indep, r) in num_refs[dep].iter().enumerate() {
            if self.entries[r.index].name.is_none() {
                let origin = Origin { dependent: dep, independent: indep, is_numerator: true };
                self.entries[r.index].name = Some(Self::name_for(origin, names, true));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freq::FreqAddend;

    fn expr(factor: i64) -> FreqExpr {
        FreqExpr::from_addends(vec![FreqAddend { factor: Rational::from_int(factor), power_of_s: 0, power_of_const: vec![] }])
    }

    /// `scale` must leave every addend's `power_of_const` sorted ascending by bit, the
    /// same canonical order `freq::FreqAddend::set_power` produces — otherwise two
    /// numerically identical addends built by different code paths compare unequal
    /// under `structurally_equal_modulo_sign`'s plain `Vec` comparison, breaking
    /// `cancel`'s num-equals-den collapse and the expression map's dedup.
    #[test]
    fn scale_keeps_power_of_const_sorted_by_bit() {
        let mut e = FreqExpr::from_addends(vec![FreqAddend {
            factor: Rational::ONE,
            power_of_s: 0,
            power_of_const: vec![(1, 1)],
        }]);
        let atom =
            Atom { factor: Rational::ONE, power_of_s: 0, power_of_const: vec![(2, 1), (0, 1)] };
        scale(&mut e, &atom).unwrap();
        assert_eq!(e.addends()[0].power_of_const, vec![(0, 1), (1, 1), (2, 1)]);
    }

    /// Two expressions built through different call paths (one via `scale`, one
    /// hand-built in already-canonical order) but numerically identical must compare
    /// equal, since `cancel` and `ExpressionMap::insert` both rely on this to collapse
    /// matching numerators/denominators per §4.H.
    #[test]
    fn cancel_collapses_equal_expressions_regardless_of_scale_order() {
        let mut scaled = FreqExpr::from_addends(vec![FreqAddend {
            factor: Rational::ONE,
            power_of_s: 0,
            power_of_const: vec![(1, 1)],
        }]);
        let atom = Atom { factor: Rational::ONE, power_of_s: 0, power_of_const: vec![(2, 1), (0, 1)] };
        scale(&mut scaled, &atom).unwrap();

        let canonical = FreqExpr::from_addends(vec![FreqAddend {
            factor: Rational::ONE,
            power_of_s: 0,
            power_of_const: vec![(0, 1), (1, 1), (2, 1)],
        }]);
        let (equal, negated) = structurally_equal_modulo_sign(&scaled, &canonical);
        assert!(equal);
        assert!(!negated);
    }

    #[test]
    fn dedups_identical_and_negated_entries() {
        let mut map = ExpressionMap::new();
        let origin = Origin { dependent: 0, independent: 0, is_numerator: true };
        let r1 = map.insert(expr(5), false, origin);
        let r2 = map.insert(expr(5), false, origin);
        let r3 = map.insert(expr(-5), false, origin);
        assert_eq!(r1.index, r2.index);
        assert!(!r2.negated);
        assert_eq!(r1.index, r3.index);
        assert!(r3.negated);
        assert_eq!(map.entries().len(), 1);
    }
}
