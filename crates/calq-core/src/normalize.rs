//! Glyph rewriting from calculator keypad symbols to evaluator syntax.

const REPLACEMENTS: [(char, &str); 4] = [('×', "*"), ('÷', "/"), ('π', "pi"), ('√', "sqrt")];

/// Rewrite `×`, `÷`, `π` and `√` into `*`, `/`, `pi` and `sqrt`.
///
/// Every other character passes through untouched, so the output never
/// contains one of the four glyphs and a second pass is a no-op.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match REPLACEMENTS.iter().find(|(glyph, _)| *glyph == c) {
            Some((_, canonical)) => out.push_str(canonical),
            None => out.push(c),
        }
    }
    out
}
