//! # Embedding Table - Binding the Seedlings into the Heartwood
//!
//! Generates the assembly that splices every built user program into the
//! kernel's data section, together with a table the kernel walks at boot.
//!
//! ## Output Format
//!
//! ```text
//!     .section .data
//!     .align 3
//!     .global _num_app
//! _num_app:
//!     .quad N
//!     .quad app_0_start
//!     ...
//!     .quad app_{N-1}_start
//!     .quad app_{N-1}_end
//! ```
//!
//! followed by one block per program:
//!
//! ```text
//!     .section .data
//!     .global app_i_start
//!     .global app_i_end
//! app_i_start:
//!     .incbin "zig-out/<name>"
//! app_i_end:
//! ```
//!
//! Boundaries are shared: the table holds `N + 1` markers, and program `i`
//! occupies `[marker[i], marker[i + 1])`. Program blocks are emitted back
//! to back with no padding, so `app_i_end` and `app_{i+1}_start` name the
//! same address. An empty program set produces `.quad 0` and nothing else.
//!
//! With names enabled, `_app_names` follows the marker table: one
//! NUL-terminated name per program, in table order.

use crate::config::BinderConfig;
use crate::program_set::ProgramSet;

/// Symbol holding the program count
pub const NUM_APP_SYMBOL: &str = "_num_app";

/// Symbol of the optional name table
pub const APP_NAMES_SYMBOL: &str = "_app_names";

/// Start marker label for program `index`
pub fn start_label(index: usize) -> String {
    format!("app_{}_start", index)
}

/// End marker label for program `index`
pub fn end_label(index: usize) -> String {
    format!("app_{}_end", index)
}

/// GNU assembler directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `.section <name>`
    Section(String),
    /// `.align <power of two>`
    Align(u32),
    /// `.global <symbol>`
    Global(String),
    /// `<label>:`
    Label(String),
    /// `.quad <value or symbol>`
    Quad(String),
    /// `.incbin "<path>"`
    Incbin(String),
    /// `.string "<text>"` (NUL-terminated)
    Str(String),
    /// Empty line between blocks
    Blank,
}

impl Directive {
    /// Convert directive to assembly source text
    pub fn to_asm(&self) -> String {
        match self {
            Directive::Section(name) => format!("    .section {}", name),
            Directive::Align(pow) => format!("    .align {}", pow),
            Directive::Global(sym) => format!("    .global {}", sym),
            Directive::Label(label) => format!("{}:", label),
            Directive::Quad(value) => format!("    .quad {}", value),
            Directive::Incbin(path) => format!("    .incbin \"{}\"", escape(path)),
            Directive::Str(text) => format!("    .string \"{}\"", escape(text)),
            Directive::Blank => String::new(),
        }
    }
}

/// Escape a string for use inside an assembler string literal
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// One program's slot in the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub index: usize,
    pub name: String,
    pub start: String,
    pub end: String,
    /// Path spliced in with `.incbin`
    pub include_path: String,
}

/// Table of every embedded program, in program set order
///
/// Pure metadata: labels and include paths, no program bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmbeddingTable {
    entries: Vec<TableEntry>,
}

impl EmbeddingTable {
    /// Lay out the table for a program set
    pub fn new(set: &ProgramSet, config: &BinderConfig) -> Self {
        let entries = set
            .iter()
            .map(|(index, name)| TableEntry {
                index,
                name: name.to_string(),
                start: start_label(index),
                end: end_label(index),
                include_path: config.artifact_include_path(name),
            })
            .collect();
        Self { entries }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Markers referenced by the header: every start, then the last end
    ///
    /// Empty for an empty table.
    pub fn boundary_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.entries.iter().map(|e| e.start.clone()).collect();
        if let Some(last) = self.entries.last() {
            labels.push(last.end.clone());
        }
        labels
    }

    /// Directives for the whole generated file
    pub fn directives(&self, emit_names: bool) -> Vec<Directive> {
        let mut out = vec![
            Directive::Section(".data".to_string()),
            Directive::Align(3),
            Directive::Global(NUM_APP_SYMBOL.to_string()),
            Directive::Label(NUM_APP_SYMBOL.to_string()),
            Directive::Quad(self.count().to_string()),
        ];
        out.extend(self.boundary_labels().into_iter().map(Directive::Quad));

        if emit_names {
            out.push(Directive::Blank);
            out.push(Directive::Global(APP_NAMES_SYMBOL.to_string()));
            out.push(Directive::Label(APP_NAMES_SYMBOL.to_string()));
            out.extend(self.entries.iter().map(|e| Directive::Str(e.name.clone())));
        }

        for entry in &self.entries {
            out.push(Directive::Blank);
            out.push(Directive::Section(".data".to_string()));
            out.push(Directive::Global(entry.start.clone()));
            out.push(Directive::Global(entry.end.clone()));
            out.push(Directive::Label(entry.start.clone()));
            out.push(Directive::Incbin(entry.include_path.clone()));
            out.push(Directive::Label(entry.end.clone()));
        }

        out
    }

    /// Generated assembly source
    pub fn to_assembly(&self, emit_names: bool) -> String {
        let mut asm = String::new();
        for directive in self.directives(emit_names) {
            asm.push_str(&directive.to_asm());
            asm.push('\n');
        }
        asm
    }
}
