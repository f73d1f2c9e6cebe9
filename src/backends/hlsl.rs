//! HLSL textual backend. Not implemented: the size budget allocates a full
//! textual backend to GLSL only (see [`super::glsl`]); this is a `contract`
//! stub so `TextualBackend` has every dialect the front end may request, per
//! spec §4.6.
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::func::FunctionId;

use super::{TextualArtefact, TextualBackend};

pub struct HlslBackend;

impl TextualBackend for HlslBackend {
    fn compile_vertex(&self, _ctx: &Context, _entry: FunctionId) -> Result<TextualArtefact> {
        Err(Error::UnsupportedType { what: "HLSL backend", ctx: DebugContext::default() })
    }

    fn compile_fragment(&self, _ctx: &Context, _entry: FunctionId) -> Result<TextualArtefact> {
        Err(Error::UnsupportedType { what: "HLSL backend", ctx: DebugContext::default() })
    }
}
