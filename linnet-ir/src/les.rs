//! The LES builder (component E): stamps an `m x (m+k)` coefficient matrix from the
//! circuit's devices, per the stamp rules tabulated in spec.md §4.E.

use crate::errors::CoreError;
use crate::model::{Circuit, DeviceId, DeviceKind, NodeId};
use crate::ring::Coefficient;
use crate::symtab::SymbolTable;

/// A rectangular `m x (m+k)` matrix of [`Coefficient`]s: columns `[0, m)` carry
/// unknowns' coefficients, columns `[m, m+k)` carry knowns' coefficients. Every row
/// reads "sum of all column * variable terms = 0" (§3).
#[derive(Debug, Clone)]
pub struct LesMatrix {
    pub rows: usize,
    pub cols: usize,
    data: Vec<Coefficient>,
}

impl LesMatrix {
    pub fn zero(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: (0..rows * cols).map(|_| Coefficient::zero()).collect() }
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }

    pub fn get(&self, row: usize, col: usize) -> &Coefficient {
        &self.data[self.index(row, col)]
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut Coefficient {
        let idx = self.index(row, col);
        &mut self.data[idx]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Coefficient) {
        let idx = self.index(row, col);
        self.data[idx] = value;
    }

    pub fn swap_columns(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for row in 0..self.rows {
            let ia = self.index(row, a);
            let ib = self.index(row, b);
            self.data.swap(ia, ib);
        }
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for col in 0..self.cols {
            let ia = self.index(a, col);
            let ib = self.index(b, col);
            self.data.swap(ia, ib);
        }
    }

    fn add(&mut self, row: usize, col: usize, factor: i64, mask: u64) {
        self.get_mut(row, col).add_addend(factor, mask);
    }
}

/// Thin wrapper over [`SymbolTable`] lookups used while stamping: resolves a node to
/// its row/column (`None` for ground) without repeating the "is ground" branch at
/// every call site.
struct Lookup<'a> {
    symtab: &'a SymbolTable,
}

impl<'a> Lookup<'a> {
    fn row_of_node(&self, node: NodeId) -> Option<usize> {
        self.symtab.unknown_by_node(node).map(|idx| self.symtab_unknown_row(idx))
    }
    fn col_of_node(&self, node: NodeId) -> Option<usize> {
        self.symtab.unknown_by_node(node).map(|idx| self.symtab_unknown_col(idx))
    }
    fn symtab_unknown_row(&self, idx: usize) -> usize {
        self.symtab.unknowns()[idx].les_row
    }
    fn symtab_unknown_col(&self, idx: usize) -> usize {
        self.symtab.unknowns()[idx].les_col
    }
    fn col_of_device_unknown(&self, device: DeviceId) -> usize {
        let idx = self
            .symtab
            .unknown_by_device(device)
            .expect("device introduces an extra unknown");
        self.symtab_unknown_col(idx)
    }
    fn col_of_known(&self, device: DeviceId) -> usize {
        let idx = self.symtab.known_by_device(device).expect("device is a known");
        self.symtab.knowns()[idx].les_col
    }
}

/// Stamps every device of `circuit` into a fresh coefficient matrix sized by `symtab`.
pub fn build(circuit: &Circuit, symtab: &SymbolTable) -> Result<LesMatrix, CoreError> {
    let m = symtab.num_unknowns();
    let k = symtab.num_knowns();
    let mut matrix = LesMatrix::zero(m, m + k);
    let lookup = Lookup { symtab };

    for (idx, device) in circuit.devices.iter().enumerate() {
        let device_id = DeviceId(idx);
        stamp_device(&mut matrix, &lookup, symtab, device_id, device)?;
    }

    Ok(matrix)
}

fn stamp_device(
    matrix: &mut LesMatrix,
    lk: &Lookup,
    symtab: &SymbolTable,
    device_id: DeviceId,
    device: &crate::model::Device,
) -> Result<(), CoreError> {
    use DeviceKind::*;

    match device.kind {
        Resistor | Conductance | Inductor | Capacitor => {
            let mask = symtab.constant_by_device(device_id).expect("passive has a constant");
            stamp_linear_two_terminal(matrix, lk, device.from, device.to, mask);
        }
        IndependentVoltage => {
            let i_col = lk.col_of_device_unknown(device_id);
            let i_row = lk.symtab_unknown_row(
                symtab.unknown_by_device(device_id).expect("independent V has an extra unknown"),
            );
            if let Some(row) = lk.row_of_node(device.from) {
                matrix.add(row, i_col, 1, 0);
            }
            if let Some(row) = lk.row_of_node(device.to) {
                matrix.add(row, i_col, -1, 0);
            }
            let known_col = lk.col_of_known(device_id);
            stamp_virtual_short(matrix, lk, i_row, device.from, device.to);
            matrix.add(i_row, known_col, -1, 0);
        }
        IndependentCurrent => {
            let known_col = lk.col_of_known(device_id);
            if let Some(row) = lk.row_of_node(device.from) {
                matrix.add(row, known_col, -1, 0);
            }
            if let Some(row) = lk.row_of_node(device.to) {
                matrix.add(row, known_col, 1, 0);
            }
        }
        OpAmp => {
            let out = device.output.expect("op-amp has an output terminal");
            let i_col = lk.col_of_device_unknown(device_id);
            let i_row = lk.symtab_unknown_row(
                symtab.unknown_by_device(device_id).expect("op-amp has an extra unknown"),
            );
            if let Some(row) = lk.row_of_node(out) {
                matrix.add(row, i_col, 1, 0);
            }
            stamp_virtual_short(matrix, lk, i_row, device.from, device.to);
        }
        CurrentProbe => {
            let i_col = lk.col_of_device_unknown(device_id);
            let i_row = lk.symtab_unknown_row(
                symtab.unknown_by_device(device_id).expect("current probe has an extra unknown"),
            );
            if let Some(row) = lk.row_of_node(device.from) {
                matrix.add(row, i_col, -1, 0);
            }
            if let Some(row) = lk.row_of_node(device.to) {
                matrix.add(row, i_col, 1, 0);
            }
            stamp_virtual_short(matrix, lk, i_row, device.from, device.to);
        }
        VoltageControlledVoltage => {
            let i_col = lk.col_of_device_unknown(device_id);
            let i_row = lk.symtab_unknown_row(
                symtab.unknown_by_device(device_id).expect("VCVS has an extra unknown"),
            );
            if let Some(row) = lk.row_of_node(device.from) {
                matrix.add(row, i_col, 1, 0);
            }
            if let Some(row) = lk.row_of_node(device.to) {
                matrix.add(row, i_col, -1, 0);
            }
            stamp_virtual_short(matrix, lk, i_row, device.from, device.to);
            let gain = symtab.constant_by_device(device_id).expect("VCVS has a gain constant");
            let plus = device.ctrl_plus.expect("VCVS has a sense pair");
            let minus = device.ctrl_minus.expect("VCVS has a sense pair");
            if let Some(col) = lk.col_of_node(plus) {
                matrix.add(i_row, col, -1, gain);
            }
            if let Some(col) = lk.col_of_node(minus) {
                matrix.add(i_row, col, 1, gain);
            }
        }
        CurrentControlledVoltage => {
            let i_col = lk.col_of_device_unknown(device_id);
            let i_row = lk.symtab_unknown_row(
                symtab.unknown_by_device(device_id).expect("CCVS has an extra unknown"),
            );
            if let Some(row) = lk.row_of_node(device.from) {
                matrix.add(row, i_col, 1, 0);
            }
            if let Some(row) = lk.row_of_node(device.to) {
                matrix.add(row, i_col, -1, 0);
            }
            stamp_virtual_short(matrix, lk, i_row, device.from, device.to);
            let gain = symtab.constant_by_device(device_id).expect("CCVS has a gain constant");
            let probe = device.ctrl_probe.expect("CCVS references a current probe");
            let probe_col = lk.col_of_device_unknown(probe);
            matrix.add(i_row, probe_col, -1, gain);
        }
        VoltageControlledCurrent => {
            let gain = symtab.constant_by_device(device_id).expect("VCCS has a gain constant");
            let plus = device.ctrl_plus.expect("VCCS has a sense pair");
            let minus = device.ctrl_minus.expect("VCCS has a sense pair");
            let (col_plus, col_minus) = (lk.col_of_node(plus), lk.col_of_node(minus));
            if let Some(row) = lk.row_of_node(device.from) {
                if let Some(c) = col_plus {
                    matrix.add(row, c, -1, gain);
                }
                if let Some(c) = col_minus {
                    matrix.add(row, c, 1, gain);
                }
            }
            if let Some(row) = lk.row_of_node(device.to) {
                if let Some(c) = col_plus {
                    matrix.add(row, c, 1, gain);
                }
                if let Some(c) = col_minus {
                    matrix.add(row, c, -1, gain);
                }
            }
        }
        CurrentControlledCurrent => {
            let gain = symtab.constant_by_device(device_id).expect("CCCS has a gain constant");
            let probe = device.ctrl_probe.expect("CCCS references a current probe");
            let probe_col = lk.col_of_device_unknown(probe);
            if let Some(row) = lk.row_of_node(device.from) {
                matrix.add(row, probe_col, -1, gain);
            }
            if let Some(row) = lk.row_of_node(device.to) {
                matrix.add(row, probe_col, 1, gain);
            }
        }
    }
    Ok(())
}

fn stamp_linear_two_terminal(matrix: &mut LesMatrix, lk: &Lookup, from: NodeId, to: NodeId, mask: u64) {
    if let Some(row_from) = lk.row_of_node(from) {
        let col_from = lk.col_of_node(from).unwrap();
        matrix.add(row_from, col_from, -1, mask);
        if let Some(col_to) = lk.col_of_node(to) {
            matrix.add(row_from, col_to, 1, mask);
        }
    }
    if let Some(row_to) = lk.row_of_node(to) {
        let col_to = lk.col_of_node(to).unwrap();
        matrix.add(row_to, col_to, -1, mask);
        if let Some(col_from) = lk.col_of_node(from) {
            matrix.add(row_to, col_from, 1, mask);
        }
    }
}

/// `+1` at `U(from)`, `-1` at `U(to)` — the virtual-short / equal-potential pattern
/// shared by independent V, op-amps, current probes, and the two controlled-V kinds.
fn stamp_virtual_short(matrix: &mut LesMatrix, lk: &Lookup, row: usize, from: NodeId, to: NodeId) {
    if let Some(col) = lk.col_of_node(from) {
        matrix.add(row, col, 1, 0);
    }
    if let Some(col) = lk.col_of_node(to) {
        matrix.add(row, col, -1, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CircuitBuilder, Device, DeviceKind};
    use crate::passes;

    fn device(name: &str, kind: DeviceKind, from: NodeId, to: NodeId, value: f64) -> Device {
        Device {
            name: name.into(),
            kind,
            from,
            to,
            output: None,
            ctrl_plus: None,
            ctrl_minus: None,
            ctrl_probe: None,
            value: Some(value),
            relation: None,
        }
    }

    /// R1 between `in`/`out`, C1 between `out`/`gnd`, U1 between `in`/`gnd`: three
    /// unknowns (`in`, `out`, `I_U1`) and one known (`U1`), so the matrix is 3x4.
    #[test]
    fn rc_lowpass_matrix_has_expected_shape_and_zero_rows_balance() {
        let mut b = CircuitBuilder::new("rc");
        let n_in = b.node("in").unwrap();
        let n_out = b.node("out").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(device("R1", DeviceKind::Resistor, n_in, n_out, 100.0)).unwrap();
        b.add_device(device("C1", DeviceKind::Capacitor, n_out, n_gnd, 1e-6)).unwrap();
        b.add_device(device("U1", DeviceKind::IndependentVoltage, n_in, n_gnd, 1.0)).unwrap();
        let circuit = b.finish();

        let (_topo, symtab, matrix) = passes::run_to_les(&circuit).unwrap();
        assert_eq!(symtab.num_unknowns(), 3);
        assert_eq!(symtab.num_knowns(), 1);
        assert_eq!(matrix.rows, 3);
        assert_eq!(matrix.cols, 4);
    }

    /// The `in` row should carry R1's stamp (from=in) and U1's branch-current stamp,
    /// so it must have a nonzero entry in every column that participates: `in`'s own
    /// column, `out`'s column (through R1) and `I_U1`'s column.
    #[test]
    fn resistor_stamps_symmetric_conductance_pattern() {
        let mut b = CircuitBuilder::new("r_only");
        let n_in = b.node("in").unwrap();
        let n_out = b.node("out").unwrap();
        b.add_device(device("R1", DeviceKind::Resistor, n_in, n_out, 100.0)).unwrap();
        b.add_device(device("U1", DeviceKind::IndependentVoltage, n_in, n_out, 1.0)).unwrap();
        let circuit = b.finish();

        let (_topo, symtab, matrix) = passes::run_to_les(&circuit).unwrap();
        let row_in = symtab.unknowns()[symtab.unknown_by_node(n_in).unwrap()].les_row;
        let col_in = symtab.unknowns()[symtab.unknown_by_node(n_in).unwrap()].les_col;
        let row_out = symtab.unknowns()[symtab.unknown_by_node(n_out).unwrap()].les_row;
        let col_out = symtab.unknowns()[symtab.unknown_by_node(n_out).unwrap()].les_col;

        assert!(!matrix.get(row_in, col_in).is_zero());
        assert!(!matrix.get(row_in, col_out).is_zero());
        assert!(!matrix.get(row_out, col_in).is_zero());
        assert!(!matrix.get(row_out, col_out).is_zero());
    }

    /// An independent current source stamps only the known column at its two
    /// terminals' rows, with opposite sign, and introduces no extra unknown.
    #[test]
    fn independent_current_source_stamps_only_known_column() {
        let mut b = CircuitBuilder::new("i_only");
        let n_in = b.node("in").unwrap();
        let n_gnd = b.node("gnd").unwrap();
        b.add_device(device("R1", DeviceKind::Resistor, n_in, n_gnd, 100.0)).unwrap();
        b.add_device(device("I1", DeviceKind::IndependentCurrent, n_in, n_gnd, 1e-3)).unwrap();
        let circuit = b.finish();

        let (_topo, symtab, matrix) = passes::run_to_les(&circuit).unwrap();
        assert_eq!(symtab.num_unknowns(), 1);
        assert_eq!(matrix.rows, 1);
        assert_eq!(matrix.cols, 2);
        assert!(!matrix.get(0, 1).is_zero());
    }

    #[test]
    fn swap_columns_exchanges_entries() {
        let mut m = LesMatrix::zero(2, 2);
        m.set(0, 0, Coefficient::one());
        m.set(0, 1, Coefficient::zero());
        m.swap_columns(0, 1);
        assert!(m.get(0, 0).is_zero());
        assert!(!m.get(0, 1).is_zero());
    }
}
