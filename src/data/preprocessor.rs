// ============================================================
// Layer 4 — Sentence Preprocessor
// ============================================================
// Normalises one raw sentence before it reaches the tokenizer,
// so that visually identical text maps to identical ids:
//
//   1. Typographic quotes → ASCII  (‘ ’ ‚ → '   “ ” „ → ")
//   2. Unicode spaces (NBSP, zero-width, BOM) and tabs → space
//   3. Other control characters → space
//   4. Runs of spaces collapsed, ends trimmed
//
// Reference: Rust Book §8 (Strings in Rust)

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn clean(&self, text: &str) -> String {
        // ── Step 1: Map characters ────────────────────────────────────────────
        let mapped = text.chars().map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\t' | '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
            c if c.is_control() => ' ',
            c => c,
        });

        // ── Step 2: Collapse whitespace runs ──────────────────────────────────
        let mut out        = String::with_capacity(text.len());
        let mut last_space = true;
        for c in mapped {
            if c.is_whitespace() {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }
        out.trim_end().to_string()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
