//! The fraction-free symbolic solver (component F): Bareiss elimination over the
//! coefficient ring, producing a transfer function as a numerator/denominator pair of
//! [`Coefficient`]s without ever introducing a division the ring itself can't perform.
//!
//! The product-of-constants bitmask (`u64`, one bit per constant, bit set meaning
//! power one) cannot represent a constant squared. A naive "multiply then divide"
//! elimination would produce exactly that whenever two operand addends share a bit, so
//! the pruning test and the pre-divided XOR accumulation below are not an optimization
//! over some simpler approach — they are the only way this representation stays valid
//! through an elimination step. Ported term-for-term from the reference solver; see
//! `resolve_referenced_device` in `symtab.rs` for the sibling case of the same
//! constraint (relation chains can't accumulate an exponent either).

use crate::errors::SolveError;
use crate::les::LesMatrix;
use crate::ring::{Coefficient, ProductOfConst};

/// `numerator = +A[row][col]*pivot - A[col_src][col]*A[row][step]`, divided in place by
/// `divisor`'s leading term, then long-divided by the rest of `divisor`'s addends.
///
/// `divisor` is the full coefficient occupying the pivot position of the current
/// elimination step; its leading addend (largest mask) is the one used to pre-divide
/// every product term as it is formed. `pivot` is `divisor` itself, passed separately
/// only because the two product terms read different operands.
fn elementary_step(
    a_row_col: &Coefficient,
    pivot: &Coefficient,
    a_step_col: &Coefficient,
    a_row_step: &Coefficient,
    divisor: &Coefficient,
) -> Coefficient {
    let divisor_head = divisor.leading().expect("pivot is never null during elimination");
    let prod_of_c_div: ProductOfConst = divisor_head.mask;

    let mut numerator = Coefficient::zero();
    for (first, second, outer_sign) in [(a_row_col, pivot, 1i64), (a_step_col, a_row_step, -1i64)] {
        for addend1 in first.addends() {
            let p1 = addend1.mask;
            for addend2 in second.addends() {
                let p2 = addend2.mask;
                // Bits the divisor needs but neither operand has, or bits both operands
                // have but the divisor doesn't: either way the term can't survive
                // division into the 0/1-exponent ring and is discarded now.
                let inconsistent = ((!p1 & !p2 & prod_of_c_div) | (p1 & p2 & !prod_of_c_div)) != 0;
                if inconsistent {
                    continue;
                }
                let factor = addend1.factor * if outer_sign > 0 { addend2.factor } else { -addend2.factor };
                numerator.add_addend(factor, p1 ^ p2 ^ prod_of_c_div);
            }
        }
    }

    let factor_div = divisor_head.factor;
    debug_assert!(factor_div == 1 || factor_div == -1);

    let mut result = Coefficient::zero();
    while !numerator.is_zero() {
        let lead = *numerator.leading().expect("loop guarded by is_zero");
        debug_assert!(lead.factor == 1 || lead.factor == -1);
        debug_assert_eq!(lead.factor % factor_div, 0);
        let factor_res = lead.factor / factor_div;
        let prod_of_c_res = lead.mask;
        result.add_addend(factor_res, prod_of_c_res);

        for addend_div in divisor.addends() {
            let p_div = addend_div.mask;
            let inconsistent =
                ((!p_div & !prod_of_c_res & prod_of_c_div) | (p_div & prod_of_c_res & !prod_of_c_div)) != 0;
            if inconsistent {
                continue;
            }
            numerator.add_addend(-addend_div.factor * factor_res, p_div ^ prod_of_c_res ^ prod_of_c_div);
        }
    }

    result
}

/// The outcome of a full Bareiss elimination run: the triangularized last row, split
/// into the coefficient of the solved unknown (the denominator, shared by every
/// unknown solved against the same matrix) and one coefficient per known column (the
/// numerators of the corresponding single-source transfer functions).
#[derive(Debug, Clone)]
pub struct EliminationResult {
    pub denominator: Coefficient,
    /// Parallel to the matrix's known columns, in symbol-table order.
    pub numerators: Vec<Coefficient>,
}

/// Runs fraction-free Gauss elimination on a clone of `matrix`, pivoting on
/// `matrix.cols == rows + knowns` and the unknown occupying the last unknown column (
/// `rows - 1`) ends up solved in terms of every known. Mirrors `solverLES`: downward
/// row search on a null pivot, with a running sign-inversion flag for the determinant's
/// sign, applied to the last row once elimination completes rather than per swap.
pub fn solve(matrix: &LesMatrix) -> Result<EliminationResult, SolveError> {
    let mut a = matrix.clone();
    let m = a.rows;
    let n = a.cols;

    if m == 0 {
        return Ok(EliminationResult { denominator: Coefficient::one(), numerators: Vec::new() });
    }

    let mut do_sign_inversion = false;
    // The ring's multiplicative identity stands in for "no divisor yet" ahead of the
    // first elimination step.
    let mut divisor = Coefficient::one();

    for step in 0..m.saturating_sub(1) {
        if a.get(step, step).is_zero() {
            let mut pivot_row = step;
            loop {
                pivot_row += 1;
                if pivot_row >= m {
                    return Err(SolveError::Singular(step));
                }
                if !a.get(pivot_row, step).is_zero() {
                    break;
                }
            }
            a.swap_rows(step, pivot_row);
            do_sign_inversion = !do_sign_inversion;
        }

        for row in (step + 1)..m {
            for col in (step + 1)..n {
                let updated = elementary_step(
                    a.get(row, col),
                    a.get(step, step),
                    a.get(step, col),
                    a.get(row, step),
                    &divisor,
                );
                a.set(row, col, updated);
            }
            a.set(row, step, Coefficient::zero());
        }

        divisor = a.get(step, step).clone();
    }

    if do_sign_inversion {
        for col in (m - 1)..n {
            let mut c = a.get(m - 1, col).clone();
            c.negate_in_place();
            a.set(m - 1, col, c);
        }
    }

    let denominator = a.get(m - 1, m - 1).clone();
    let numerators = (m..n).map(|col| a.get(m - 1, col).clone()).collect();
    Ok(EliminationResult { denominator, numerators })
}
