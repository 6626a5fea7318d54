//! Frequency transform and normalization (component G): maps a solver-produced
//! [`Coefficient`] (sums of `±1 · product-of-constants`) into a normalized rational
//! function of `s` and the circuit's device constants.

use crate::errors::{CoreError, SymbolError};
use crate::model::{Circuit, DeviceKind};
use crate::rational::Rational;
use crate::ring::Coefficient;
use crate::symtab::SymbolTable;

/// One addend of a frequency-domain expression: `factor * s^power_of_s *
/// prod(const_i^power_of_const[i])`. Negative exponents are legal before
/// normalization; after normalization every variable's minimum exponent is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreqAddend {
    pub factor: Rational,
    pub power_of_s: i32,
    /// Sparse: absent entries have exponent zero. Keyed by final (non-relation)
    /// constant bit index.
    pub power_of_const: Vec<(usize, i32)>,
}

impl FreqAddend {
    fn power_of(&self, bit: usize) -> i32 {
        self.power_of_const.iter().find(|(b, _)| *b == bit).map(|(_, p)| *p).unwrap_or(0)
    }

    fn set_power(&mut self, bit: usize, power: i32) {
        if power == 0 {
            self.power_of_const.retain(|(b, _)| *b != bit);
            return;
        }
        match self.power_of_const.iter_mut().find(|(b, _)| *b == bit) {
            Some(entry) => entry.1 = power,
            None => self.power_of_const.push((bit, power)),
        }
        self.power_of_const.sort_by(|a, b| a.0.cmp(&b.0));
    }

    /// Ordering key: decreasing `power_of_s`, ties broken by decreasing lexicographic
    /// comparison of the power vector from high bit index to low (§3).
    fn sort_key(&self) -> (i32, Vec<(usize, i32)>) {
        let mut vec = self.power_of_const.clone();
        vec.sort_by(|a, b| b.0.cmp(&a.0));
        (self.power_of_s, vec)
    }
}

/// An unnormalized sum of [`FreqAddend`]s, kept in the §3 sort order. Zero is the
/// empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreqExpr {
    addends: Vec<FreqAddend>,
}

impl FreqExpr {
    pub fn zero() -> Self {
        Self { addends: Vec::new() }
    }

    pub fn one() -> Self {
        Self { addends: vec![FreqAddend { factor: Rational::ONE, power_of_s: 0, power_of_const: Vec::new() }] }
    }

    /// Builds an expression from an already-sorted addend list (e.g. rebuilt by a
    /// downstream pass such as [`crate::exprmap`]'s cancellation step).
    pub fn from_addends(addends: Vec<FreqAddend>) -> Self {
        Self { addends }
    }

    pub fn is_zero(&self) -> bool {
        self.addends.is_empty()
    }

    pub fn addends(&self) -> &[FreqAddend] {
        &self.addends
    }

    fn sort(&mut self) {
        self.addends.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    }

    /// Merges `addend` into this expression: like-exponent terms (same `power_of_s`
    /// and the same set of constant exponents) are combined by adding factors; a
    /// combined factor of zero drops the term.
    fn merge(&mut self, addend: FreqAddend) {
        if let Some(existing) = self.addends.iter_mut().find(|a| {
            a.power_of_s == addend.power_of_s && a.power_of_const == addend.power_of_const
        }) {
            let combined = existing.factor.add(&addend.factor).unwrap_or(existing.factor);
            if combined.is_zero() {
                let key = (addend.power_of_s, addend.power_of_const.clone());
                self.addends.retain(|a| (a.power_of_s, a.power_of_const.clone()) != key);
            } else {
                existing.factor = combined;
            }
        } else if !addend.factor.is_zero() {
            self.addends.push(addend);
            self.sort();
        }
    }
}

/// Per-final-device-kind exponent/factor update rule (§4.G's table). Independent
/// sources, op-amps and current probes never occur as resolved constants, so they
/// have no entry here.
fn apply_device_kind(kind: DeviceKind, addend: &mut FreqAddend, bit: usize, r: Rational) -> Result<(), CoreError> {
    let update = |a: &mut FreqAddend, op: fn(Rational, Rational) -> Result<Rational, crate::rational::RationalError>| -> Result<(), CoreError> {
        a.factor = op(a.factor, r).map_err(CoreError::from)?;
        Ok(())
    };
    match kind {
        DeviceKind::Conductance => {
            update(addend, |f, r| f.mul(&r))?;
            addend.set_power(bit, addend.power_of(bit) + 1);
        }
        DeviceKind::Resistor => {
            update(addend, |f, r| f.div(&r))?;
            addend.set_power(bit, addend.power_of(bit) - 1);
        }
        DeviceKind::Capacitor => {
            update(addend, |f, r| f.mul(&r))?;
            addend.set_power(bit, addend.power_of(bit) + 1);
            addend.power_of_s += 1;
        }
        DeviceKind::Inductor => {
            update(addend, |f, r| f.div(&r))?;
            addend.set_power(bit, addend.power_of(bit) - 1);
            addend.power_of_s -= 1;
        }
        DeviceKind::VoltageControlledVoltage
        | DeviceKind::VoltageControlledCurrent
        | DeviceKind::CurrentControlledVoltage
        | DeviceKind::CurrentControlledCurrent => {
            update(addend, |f, r| f.mul(&r))?;
            addend.set_power(bit, addend.power_of(bit) + 1);
        }
        DeviceKind::IndependentVoltage
        | DeviceKind::IndependentCurrent
        | DeviceKind::OpAmp
        | DeviceKind::CurrentProbe => {
            unreachable!("independent sources, op-amps and probes never resolve to a constant")
        }
    }
    Ok(())
}

/// Transforms a solver-produced [`Coefficient`] into an unnormalized [`FreqExpr`],
/// resolving each set bit through the relation chain and applying §4.G's table.
pub fn transform(circuit: &Circuit, symtab: &SymbolTable, coeff: &Coefficient) -> Result<FreqExpr, CoreError> {
    let mut expr = FreqExpr::zero();
    for raw in coeff.addends() {
        let mut addend = FreqAddend { factor: Rational::from_int(raw.factor), power_of_s: 0, power_of_const: Vec::new() };
        let mut mask = raw.mask;
        while mask != 0 {
            let bit = mask.trailing_zeros() as usize;
            mask &= mask - 1;
            let (factor, device, final_bit) = symtab
                .resolve_referenced_device(circuit, bit)
                .map_err(CoreError::from)?;
            let kind = circuit.device(device).kind;
            apply_device_kind(kind, &mut addend, final_bit, factor)?;
        }
        expr.merge(addend);
    }
    Ok(expr)
}

/// The common multiplicative atom extracted during normalization: a rational factor
/// and a per-variable exponent (negative of the per-variable minimum across addends).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub factor: Rational,
    pub power_of_s: i32,
    pub power_of_const: Vec<(usize, i32)>,
}

/// A normalized expression: common atom plus the remaining list, which has integer
/// factors, a positive leading addend, and every variable's minimum exponent at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub atom: Atom,
    pub remainder: FreqExpr,
}

fn all_bits(expr: &FreqExpr) -> Vec<usize> {
    let mut bits: Vec<usize> = expr.addends.iter().flat_map(|a| a.power_of_const.iter().map(|(b, _)| *b)).collect();
    bits.sort_unstable();
    bits.dedup();
    bits
}

/// Normalizes `expr` in place, per §4.G: the atom's factor is `gcd(numerators) /
/// lcm(denominators)` with a sign chosen so the remaining leading addend is positive,
/// and its exponents are the per-variable minima; dividing every addend by the atom
/// leaves integer factors and zero minimum exponents.
pub fn normalize(expr: FreqExpr) -> Result<Normalized, SymbolError> {
    if expr.is_zero() {
        return Ok(Normalized {
            atom: Atom { factor: Rational::ONE, power_of_s: 0, power_of_const: Vec::new() },
            remainder: FreqExpr::zero(),
        });
    }

    let min_power_of_s = expr.addends.iter().map(|a| a.power_of_s).min().unwrap();
    let bits = all_bits(&expr);
    let min_power_of_const: Vec<(usize, i32)> =
        bits.iter().map(|&b| (b, expr.addends.iter().map(|a| a.power_of(b)).min().unwrap())).collect();

    let mut g = 0i64;
    let mut l = 1i64;
    for a in &expr.addends {
        g = Rational::gcd(g, a.factor.numer());
        l = Rational::lcm(l, a.factor.denom()).unwrap_or(l);
    }
    if g == 0 {
        g = 1;
    }
    let atom_factor = Rational::new(g, l).map_err(|_| SymbolError::RelationOverflow)?;

    let mut remainder = FreqExpr::zero();
    for a in &expr.addends {
        let mut b = a.clone();
        b.factor = b.factor.div(&atom_factor).map_err(|_| SymbolError::RelationOverflow)?;
        b.power_of_s -= min_power_of_s;
        for &(bit, min_p) in &min_power_of_const {
            b.set_power(bit, b.power_of(bit) - min_p);
        }
        remainder.merge(b);
    }
    remainder.sort();

    let leading_negative = remainder.addends.first().map(|a| a.factor.sign() < 0).unwrap_or(false);
    let atom_factor = if leading_negative {
        for a in &mut remainder.addends {
            a.factor = a.factor.neg().map_err(|_| SymbolError::RelationOverflow)?;
        }
        atom_factor.neg().map_err(|_| SymbolError::RelationOverflow)?
    } else {
        atom_factor
    };

    Ok(Normalized {
        atom: Atom { factor: atom_factor, power_of_s: min_power_of_s, power_of_const: min_power_of_const },
        remainder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_like_exponents() {
        let mut e = FreqExpr::zero();
        e.merge(FreqAddend { factor: Rational::from_int(2), power_of_s: 1, power_of_const: vec![] });
        e.merge(FreqAddend { factor: Rational::from_int(3), power_of_s: 1, power_of_const: vec![] });
        assert_eq!(e.addends().len(), 1);
        assert_eq!(e.addends()[0].factor, Rational::from_int(5));
    }

    #[test]
    fn normalize_extracts_common_atom_and_clears_negative_exponents() {
        let mut e = FreqExpr::zero();
        e.merge(FreqAddend { factor: Rational::new(1, 2).unwrap(), power_of_s: 2, power_of_const: vec![(0, 1)] });
        e.merge(FreqAddend { factor: Rational::new(1, 2).unwrap(), power_of_s: 1, power_of_const: vec![(0, -1)] });
        let normalized = normalize(e).unwrap();
        assert_eq!(normalized.atom.power_of_s, 1);
        assert_eq!(normalized.atom.power_of_const, vec![(0, -1)]);
        for a in normalized.remainder.addends() {
            assert!(a.power_of_s >= 0);
            assert!(a.power_of(0) >= 0);
            assert_eq!(a.factor.denom(), 1);
        }
    }
}
