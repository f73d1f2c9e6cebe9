//! WGSL textual backend. Contract stub; see [`super::hlsl`] for why only
//! GLSL is implemented in full.
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::func::FunctionId;

use super::{TextualArtefact, TextualBackend};

pub struct WgslBackend;

impl TextualBackend for WgslBackend {
    fn compile_vertex(&self, _ctx: &Context, _entry: FunctionId) -> Result<TextualArtefact> {
        Err(Error::UnsupportedType { what: "WGSL backend", ctx: DebugContext::default() })
    }

    fn compile_fragment(&self, _ctx: &Context, _entry: FunctionId) -> Result<TextualArtefact> {
        Err(Error::UnsupportedType { what: "WGSL backend", ctx: DebugContext::default() })
    }
}
