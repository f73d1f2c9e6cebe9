//! Compilation-wide options threaded into the backends, replacing the
//! original's scattered `debug`-build flag and log-level global.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Run `spirv-val` against every emitted SPIR-V module. Defaults to
    /// `cfg!(debug_assertions)`, matching `sources/backends/spirv.c`'s
    /// `#ifndef NDEBUG` gate.
    pub validate: bool,
    /// The SPIR-V header's `generator` field.
    pub generator_id: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            validate: cfg!(debug_assertions),
            generator_id: 44,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_generator_id_matches_original() {
        assert_eq!(CompileOptions::default().generator_id, 44);
    }
}
