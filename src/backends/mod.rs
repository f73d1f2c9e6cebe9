//! Shared contract for textual shader backends (spec §4.6): each backend
//! consumes the same analyzer output as the SPIR-V backend and renders a
//! vertex/fragment entry pair into one dialect's source text, plus the C
//! declarations a host links against for it (spec §6).
pub mod glsl;
pub mod hlsl;
pub mod msl;
pub mod wgsl;

use crate::context::Context;
use crate::error::Result;
use crate::func::{BinOp, FunctionId};

/// One compiled textual artefact: the generated source plus the identifier
/// a C integration layer declares `extern const char *` for (spec §6).
#[derive(Debug, Clone)]
pub struct TextualArtefact {
    pub source: String,
    pub var_name: String,
}

/// A backend that renders a single entry point into one dialect's source
/// text. Kept per-stage (rather than one `compile_pipeline(vertex,
/// fragment)` call) because a pipeline's two stages are independently
/// reachable-closed and a vertex shader can be paired with fragment shaders
/// from other pipelines (spec §4.3).
pub trait TextualBackend {
    fn compile_vertex(&self, ctx: &Context, entry: FunctionId) -> Result<TextualArtefact>;
    fn compile_fragment(&self, ctx: &Context, entry: FunctionId) -> Result<TextualArtefact>;
}

/// Escapes `text` as the body of a C string literal (spec §6): non-printable
/// bytes become `\NNN` octal, `"` and `\` are backslash-escaped.
pub fn escape_c_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for b in text.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}

/// Renders the `.h`/`.c` pair spec §6 describes for a textual artefact:
/// `extern const char *<name>;`/`extern size_t <name>_size;` in the header,
/// the escaped byte string and its length in the source.
pub fn write_source_pair(artefact: &TextualArtefact, header_name: &str) -> (String, String) {
    let header = format!(
        "#include <stddef.h>\n\nextern const char *{name};\nextern size_t {name}_size;\n",
        name = artefact.var_name
    );
    let source = format!(
        "#include \"{header_name}.h\"\n\nconst char *{name} = \"{escaped}\";\n\nsize_t {name}_size = {size};\n",
        header_name = header_name,
        name = artefact.var_name,
        escaped = escape_c_string(&artefact.source),
        size = artefact.source.len(),
    );
    (header, source)
}

/// Infix operator spelling shared by every C-family textual backend.
pub fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Multiply => "*",
        BinOp::Divide => "/",
        BinOp::Mod => "%",
        BinOp::Equals => "==",
        BinOp::NotEquals => "!=",
        BinOp::Greater => ">",
        BinOp::GreaterEqual => ">=",
        BinOp::Less => "<",
        BinOp::LessEqual => "<=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::BitwiseAnd => "&",
        BinOp::BitwiseOr => "|",
        BinOp::BitwiseXor => "^",
        BinOp::LeftShift => "<<",
        BinOp::RightShift => ">>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_c_string_handles_quotes_and_newlines() {
        let escaped = escape_c_string("a\"b\nc");
        assert_eq!(escaped, "a\\\"b\\012c");
    }
}
