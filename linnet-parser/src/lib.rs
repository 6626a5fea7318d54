//! Netlist lexer, AST and semantic checks (§6, §4.I). Thin by explicit non-goal — the
//! concrete netlist grammar is this crate's own design, not dictated by the core — but
//! real: it tokenizes a netlist source, builds an AST, and hands `linnet-ir` a fully
//! populated [`linnet_ir::Circuit`] via its `CircuitBuilder`. Everything this crate
//! rejects is a syntax- or reference-level defect in the source text itself; whether
//! the resulting circuit is electrically well-formed (orphan components, name clashes
//! across knowns/unknowns, bad result references) is `linnet-ir`'s job, not this one's.

mod ast;
mod errors;
mod lexer;
mod parser;
mod sema;

pub use ast::*;
pub use errors::ParseError;
pub use lexer::{Lexer, Spanned, Token};
pub use parser::Parser;
pub use sema::build_circuit;

use linnet_ir::Circuit;

/// Parses and semantically checks one netlist source, producing a checked [`Circuit`].
pub fn parse_circuit(name: &str, source: &str) -> Result<Circuit, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let statements = Parser::new(tokens).parse_program()?;
    build_circuit(name, statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rc_lowpass() {
        let src = r#"
            # simple RC low-pass
            ground gnd

            resistor R1 in out = 100
            capacitor C1 out gnd = 1e-6
            vsource U1 in gnd = 1

            result H = out / U1
        "#;
        let circuit = parse_circuit("rc", src).unwrap();
        assert_eq!(circuit.devices.len(), 3);
        assert_eq!(circuit.nodes.len(), 3);
        assert_eq!(circuit.requests.len(), 1);
    }

    #[test]
    fn rejects_unknown_statement_keyword() {
        let src = "frobnicate R1 in out = 100";
        let err = parse_circuit("bad", src).unwrap_err();
        assert!(matches!(err, ParseError::UnknownStatement(_, _)));
    }
}
