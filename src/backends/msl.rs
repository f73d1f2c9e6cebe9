//! Metal Shading Language textual backend. Contract stub; see [`super::hlsl`]
//! for why only GLSL is implemented in full.
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::func::FunctionId;

use super::{TextualArtefact, TextualBackend};

pub struct MslBackend;

impl TextualBackend for MslBackend {
    fn compile_vertex(&self, _ctx: &Context, _entry: FunctionId) -> Result<TextualArtefact> {
        Err(Error::UnsupportedType { what: "MSL backend", ctx: DebugContext::default() })
    }

    fn compile_fragment(&self, _ctx: &Context, _entry: FunctionId) -> Result<TextualArtefact> {
        Err(Error::UnsupportedType { what: "MSL backend", ctx: DebugContext::default() })
    }
}
