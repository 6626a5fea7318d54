//! Emitter boundary (§6): human-readable text rendering and numeric (Octave-style)
//! script emission, consuming only the read-only accessors `linnet_ir::engine::Solution`
//! and `linnet_ir::symtab::SymbolTable` expose (§4.I).

mod numeric;
mod text;

pub use numeric::render_octave;
pub use text::render_text;

/// Greedy word-wrap at roughly `width` columns, never splitting a token. Shared by
/// both emitters since both produce long sums of `+`/`-`-separated terms.
fn wrap(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut col = 0;
    for (i, word) in text.split(' ').enumerate() {
        if i > 0 {
            if col + 1 + word.len() > width {
                out.push('\n');
                col = 0;
            } else {
                out.push(' ');
                col += 1;
            }
        }
        out.push_str(word);
        col += word.len();
    }
    out
}
