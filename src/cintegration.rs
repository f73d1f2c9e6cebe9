//! C host-integration contract (spec §6): "C integration headers exposing
//! `kong_init(...)`, per-pipeline pipeline objects, per-uniform-struct
//! `*_buffer_{init,destroy,lock,unlock,set}` functions, and per-vertex-input
//! `*_structure` descriptors." Grounded on
//! `examples/original_source/Sources/integrations/c.c` for the pipeline/
//! vertex-structure walk (the plainest of the three integration backends
//! retrieved) and on `examples/original_source/Sources/integrations/kinc.c`
//! for the uniform-buffer accessor family c.c itself omits but the spec
//! requires. Targets a small abstract `kong_*` runtime contract rather than
//! either engine binding: kinc/kope-specific integrations are out of scope
//! (spec.md §1 names only "C integration stubs" generically).
use crate::context::Context;
use crate::error::Result;
use crate::global::{Global, GlobalId};
use crate::pipeline::{self, RenderPipeline};
use crate::sets;
use crate::ty::TypeId;

/// Renders the C host-integration contract for a compiled module into one
/// `.h`/`.c` pair.
pub trait CIntegration {
    fn emit(&self, ctx: &Context) -> Result<(String, String)>;
}

pub struct HeaderEmitter;

impl CIntegration for HeaderEmitter {
    fn emit(&self, ctx: &Context) -> Result<(String, String)> {
        let pipelines = pipeline::find_render_pipelines(ctx)?;
        let root_constant = sets::root_constant_global(ctx)?;
        Ok((emit_header(ctx, &pipelines, root_constant), emit_source(ctx, &pipelines, root_constant)))
    }
}

fn type_string(ctx: &Context, ty: TypeId) -> String {
    let t = &ctx.types;
    if ty == t.float_id {
        "float".to_owned()
    } else if ty == t.float2_id {
        "kong_vector2_t".to_owned()
    } else if ty == t.float3_id {
        "kong_vector3_t".to_owned()
    } else if ty == t.float4_id {
        "kong_vector4_t".to_owned()
    } else if ty == t.float4x4_id {
        "kong_matrix4x4_t".to_owned()
    } else if ty == t.int_id {
        "int32_t".to_owned()
    } else if ty == t.uint_id {
        "uint32_t".to_owned()
    } else {
        t.type_name(&ctx.names, ty)
    }
}

/// The `kong_vertex_format` tag for a vertex-input member's scalar/vector
/// type, mirroring `structure_type` in `c.c`.
fn vertex_format(ctx: &Context, ty: TypeId) -> &'static str {
    let t = &ctx.types;
    if ty == t.float_id {
        "KONG_VERTEX_FORMAT_F32_1X"
    } else if ty == t.float2_id {
        "KONG_VERTEX_FORMAT_F32_2X"
    } else if ty == t.float3_id {
        "KONG_VERTEX_FORMAT_F32_3X"
    } else if ty == t.float4_id {
        "KONG_VERTEX_FORMAT_F32_4X"
    } else {
        "KONG_VERTEX_FORMAT_F32_4X"
    }
}

fn name_str<'a>(ctx: &'a Context, id: crate::name::NameId) -> &'a str {
    ctx.names.get(id).unwrap_or("<unknown>")
}

/// Whether `gid` gets a typedef'd struct plus the `_buffer_*` accessor
/// family. Excludes opaque handles and the one global (if any) drawn from
/// the `root_constants` set, since the host pushes that one directly
/// instead of binding it through a buffer.
fn is_uniform_struct_global(ctx: &Context, gid: GlobalId, g: &Global, root_constant: Option<GlobalId>) -> bool {
    if root_constant == Some(gid) || g.ty == ctx.types.sampler_id {
        return false;
    }
    if ctx.types.get(g.ty).map(|t| t.texture_kind.is_some()).unwrap_or(false) {
        return false;
    }
    true
}

fn vertex_input_type(ctx: &Context, pipeline: &RenderPipeline) -> Option<TypeId> {
    let vs = pipeline.vertex_shader?;
    let func = ctx.functions.get(vs)?;
    func.params.first().map(|p| p.ty.ty)
}

fn emit_header(ctx: &Context, pipelines: &[RenderPipeline], root_constant: Option<GlobalId>) -> String {
    let mut out = String::new();
    out.push_str("#include <stddef.h>\n#include <stdint.h>\n#include \"kong_runtime.h\"\n\n");

    for (gid, g) in ctx.globals.iter() {
        if !is_uniform_struct_global(ctx, gid, g, root_constant) {
            continue;
        }
        let name = type_or_global_name(ctx, g);
        out.push_str(&format!("typedef struct {} {{\n", name));
        for m in real_fields(ctx, g.ty) {
            out.push_str(&format!("\t{} {};\n", type_string(ctx, m.ty.ty), name_str(ctx, m.name)));
        }
        out.push_str(&format!("}} {};\n\n", name));

        out.push_str(&format!("typedef struct {}_buffer {{\n\tkong_buffer_t buffer;\n\t{} *data;\n}} {}_buffer;\n\n", name, name, name));
        out.push_str(&format!("void {name}_buffer_init({name}_buffer *buffer);\n", name = name));
        out.push_str(&format!("void {name}_buffer_destroy({name}_buffer *buffer);\n", name = name));
        out.push_str(&format!("{name} *{name}_buffer_lock({name}_buffer *buffer);\n", name = name));
        out.push_str(&format!("void {name}_buffer_unlock({name}_buffer *buffer);\n", name = name));
        out.push_str(&format!("void {name}_buffer_set({name}_buffer *buffer);\n\n", name = name));
    }

    let mut seen_inputs: Vec<TypeId> = Vec::new();
    for p in pipelines {
        if let Some(input_ty) = vertex_input_type(ctx, p) {
            if seen_inputs.contains(&input_ty) {
                continue;
            }
            seen_inputs.push(input_ty);
            let name = ctx.types.type_name(&ctx.names, input_ty);
            out.push_str(&format!("typedef struct {} {{\n", name));
            for m in real_fields(ctx, input_ty) {
                out.push_str(&format!("\t{} {};\n", type_string(ctx, m.ty.ty), name_str(ctx, m.name)));
            }
            out.push_str(&format!("}} {};\n\n", name));
            out.push_str(&format!("extern kong_vertex_structure_t {}_structure;\n\n", name));
        }
    }

    out.push_str("void kong_init(void);\n\n");

    for p in pipelines {
        out.push_str(&format!("extern kong_pipeline_t {};\n\n", ctx.types.type_name(&ctx.names, p.ty)));
    }

    out
}

fn emit_source(ctx: &Context, pipelines: &[RenderPipeline], root_constant: Option<GlobalId>) -> String {
    let mut out = String::new();
    out.push_str("#include \"kong.h\"\n\n");

    for p in pipelines {
        if let Some(vs) = p.vertex_shader {
            out.push_str(&format!("#include \"kong_{}.h\"\n", name_str(ctx, ctx.functions.get(vs).unwrap().name)));
        }
        if let Some(fs) = p.fragment_shader {
            out.push_str(&format!("#include \"kong_{}.h\"\n", name_str(ctx, ctx.functions.get(fs).unwrap().name)));
        }
    }
    out.push('\n');

    for p in pipelines {
        out.push_str(&format!("kong_pipeline_t {};\n\n", ctx.types.type_name(&ctx.names, p.ty)));
    }

    let mut seen_inputs: Vec<TypeId> = Vec::new();
    for p in pipelines {
        if let Some(input_ty) = vertex_input_type(ctx, p) {
            if seen_inputs.contains(&input_ty) {
                continue;
            }
            seen_inputs.push(input_ty);
            out.push_str(&format!("kong_vertex_structure_t {}_structure;\n", ctx.types.type_name(&ctx.names, input_ty)));
        }
    }
    out.push('\n');

    for (i, (gid, g)) in ctx.globals.iter().enumerate() {
        if !is_uniform_struct_global(ctx, gid, g, root_constant) {
            continue;
        }
        let name = type_or_global_name(ctx, g);
        out.push_str(&format!("\nvoid {name}_buffer_init({name}_buffer *buffer) {{\n", name = name));
        out.push_str("\tbuffer->data = NULL;\n");
        out.push_str(&format!("\tkong_buffer_init(&buffer->buffer, sizeof({}));\n", name));
        out.push_str("}\n\n");

        out.push_str(&format!("void {name}_buffer_destroy({name}_buffer *buffer) {{\n", name = name));
        out.push_str("\tbuffer->data = NULL;\n");
        out.push_str("\tkong_buffer_destroy(&buffer->buffer);\n");
        out.push_str("}\n\n");

        out.push_str(&format!("{name} *{name}_buffer_lock({name}_buffer *buffer) {{\n", name = name));
        out.push_str(&format!("\tbuffer->data = ({} *)kong_buffer_lock_all(&buffer->buffer);\n", name));
        out.push_str("\treturn buffer->data;\n}\n\n");

        out.push_str(&format!("void {name}_buffer_unlock({name}_buffer *buffer) {{\n", name = name));
        out.push_str("\tbuffer->data = NULL;\n\tkong_buffer_unlock_all(&buffer->buffer);\n}\n\n");

        out.push_str(&format!("void {name}_buffer_set({name}_buffer *buffer) {{\n", name = name));
        out.push_str(&format!("\tkong_buffer_bind({}, &buffer->buffer);\n}}\n\n", i));
    }

    for p in pipelines {
        if let (Some(vs), Some(fs)) = (p.vertex_shader, p.fragment_shader) {
            out.push_str(&format!("static kong_shader_t {};\n", name_str(ctx, ctx.functions.get(vs).unwrap().name)));
            out.push_str(&format!("static kong_shader_t {};\n", name_str(ctx, ctx.functions.get(fs).unwrap().name)));
        }
    }

    out.push_str("\nvoid kong_init(void) {\n");
    for p in pipelines {
        let pipeline_name = ctx.types.type_name(&ctx.names, p.ty);
        out.push_str(&format!("\tkong_pipeline_init(&{});\n\n", pipeline_name));

        if let Some(vs) = p.vertex_shader {
            let n = name_str(ctx, ctx.functions.get(vs).unwrap().name).to_owned();
            out.push_str(&format!(
                "\tkong_shader_init(&{n}, {n}_code, {n}_code_size, KONG_SHADER_STAGE_VERTEX);\n\t{pipeline}.vertex_shader = &{n};\n\n",
                n = n,
                pipeline = pipeline_name
            ));
        }
        if let Some(fs) = p.fragment_shader {
            let n = name_str(ctx, ctx.functions.get(fs).unwrap().name).to_owned();
            out.push_str(&format!(
                "\tkong_shader_init(&{n}, {n}_code, {n}_code_size, KONG_SHADER_STAGE_FRAGMENT);\n\t{pipeline}.fragment_shader = &{n};\n\n",
                n = n,
                pipeline = pipeline_name
            ));
        }

        if let Some(input_ty) = vertex_input_type(ctx, p) {
            let input_name = ctx.types.type_name(&ctx.names, input_ty);
            out.push_str(&format!("\tkong_vertex_structure_init(&{}_structure);\n", input_name));
            for m in real_fields(ctx, input_ty) {
                out.push_str(&format!(
                    "\tkong_vertex_structure_add(&{}_structure, \"{}\", {});\n",
                    input_name,
                    name_str(ctx, m.name),
                    vertex_format(ctx, m.ty.ty)
                ));
            }
            out.push('\n');
            out.push_str(&format!("\t{}.input_layout[0] = &{}_structure;\n", pipeline_name, input_name));
            out.push_str(&format!("\t{}.input_layout[1] = NULL;\n\n", pipeline_name));
        }

        out.push_str(&format!("\tkong_pipeline_compile(&{});\n\n", pipeline_name));
    }
    out.push_str("}\n");

    out
}

fn type_or_global_name(ctx: &Context, g: &Global) -> String {
    match ctx.types.get(g.ty).and_then(|t| t.name) {
        Some(n) => name_str(ctx, n).to_owned(),
        None => format!("{}_type", name_str(ctx, g.name)),
    }
}

fn real_fields<'a>(ctx: &'a Context, ty: TypeId) -> Vec<&'a crate::ty::Member> {
    match ctx.types.get(ty) {
        Some(t) => t.members.iter().filter(|m| m.swizzle.is_none()).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeRef;
    use crate::var::VariableKind;

    #[test]
    fn uniform_struct_global_gets_full_buffer_api() {
        let mut ctx = Context::new();
        let ty_name = ctx.names.intern("FrameConstants");
        let ty = ctx.types.add_type(Some(ty_name));
        ctx.types.add_struct_member(ty, ctx.names.intern("mvp"), TypeRef::scalar(ctx.types.float4x4_id));

        let g_name = ctx.names.intern("frame");
        let var = ctx.vars.alloc(TypeRef::scalar(ty), VariableKind::Global).id;
        ctx.globals.add_global(g_name, ty, var);

        let (header, source) = HeaderEmitter.emit(&ctx).unwrap();
        assert!(header.contains("FrameConstants_buffer_lock"));
        assert!(source.contains("FrameConstants_buffer_init"));
        assert!(source.contains("kong_buffer_init(&buffer->buffer, sizeof(FrameConstants))"));
    }

    #[test]
    fn root_constants_global_is_excluded_but_other_globals_still_emit() {
        let mut ctx = Context::new();

        let push_ty = ctx.types.add_type(Some(ctx.names.intern("PushConstants")));
        ctx.types.add_struct_member(push_ty, ctx.names.intern("tint"), TypeRef::scalar(ctx.types.float4_id));
        let push_var = ctx.vars.alloc(TypeRef::scalar(push_ty), VariableKind::Global).id;
        let push_gid = ctx.globals.add_global(ctx.names.intern("push"), push_ty, push_var);
        let set_id = ctx.sets.add_set(ctx.names.intern(crate::sets::ROOT_CONSTANTS)).unwrap();
        ctx.sets.add_member(set_id, push_gid, false);

        let frame_ty = ctx.types.add_type(Some(ctx.names.intern("FrameConstants")));
        ctx.types.add_struct_member(frame_ty, ctx.names.intern("mvp"), TypeRef::scalar(ctx.types.float4x4_id));
        let frame_var = ctx.vars.alloc(TypeRef::scalar(frame_ty), VariableKind::Global).id;
        ctx.globals.add_global(ctx.names.intern("frame"), frame_ty, frame_var);

        let (header, source) = HeaderEmitter.emit(&ctx).unwrap();
        assert!(!header.contains("PushConstants_buffer"), "root constants must not get a buffer API");
        assert!(!source.contains("PushConstants_buffer"));
        assert!(header.contains("FrameConstants_buffer_lock"));
        assert!(source.contains("FrameConstants_buffer_init"));
    }

    #[test]
    fn pipeline_wires_vertex_structure_and_shaders() {
        let mut ctx = Context::new();
        let pipe_name = ctx.names.intern("pipe");
        ctx.names.intern(crate::pipeline::PIPE_ATTRIBUTE);

        let in_name = ctx.names.intern("VertexIn");
        let in_ty = ctx.types.add_type(Some(in_name));
        ctx.types.add_struct_member(in_ty, ctx.names.intern("pos"), TypeRef::scalar(ctx.types.float3_id));

        let vs_name = ctx.names.intern("vs_main");
        let vs = ctx.functions.add_function(vs_name, TypeRef::scalar(ctx.types.float4_id));
        ctx.functions.add_param(vs, crate::func::Param { name: ctx.names.intern("in"), ty: TypeRef::scalar(in_ty), attributes: Vec::new() }).unwrap();

        let fs_name = ctx.names.intern("fs_main");
        ctx.functions.add_function(fs_name, TypeRef::scalar(ctx.types.float4_id));

        let pipeline_ty = ctx.types.add_type(Some(ctx.names.intern("Triangle")));
        ctx.types.get_mut(pipeline_ty).unwrap().attributes.push(pipe_name);
        ctx.types.add_struct_member_with_value(pipeline_ty, ctx.names.intern("vertex"), TypeRef::scalar(crate::ty::NO_TYPE), crate::ty::Literal::Name(vs_name));
        ctx.types.add_struct_member_with_value(pipeline_ty, ctx.names.intern("fragment"), TypeRef::scalar(crate::ty::NO_TYPE), crate::ty::Literal::Name(fs_name));

        let (header, source) = HeaderEmitter.emit(&ctx).unwrap();
        assert!(header.contains("extern kong_pipeline_t Triangle;"));
        assert!(source.contains("kong_pipeline_init(&Triangle);"));
        assert!(source.contains("VertexIn_structure"));
    }
}
