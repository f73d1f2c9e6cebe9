//! GLSL 330 textual backend, grounded on
//! `examples/original_source/Sources/backends/glsl.c` and the shared opcode
//! writer in `examples/original_source/Sources/backends/cstyle.c`: the same
//! three-phase emission (referenced types, referenced globals, referenced
//! functions) and the same D3D-to-GL depth remap on a vertex's `gl_Position`
//! store.
use std::fmt::Write as _;

use crate::analysis;
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::func::{AccessStep, FunctionId, Opcode};
use crate::name::NameId;
use crate::ty::TypeId;
use crate::var::VariableId;

use super::{bin_op_str, TextualArtefact, TextualBackend};

pub struct GlslBackend;

impl TextualBackend for GlslBackend {
    fn compile_vertex(&self, ctx: &Context, entry: FunctionId) -> Result<TextualArtefact> {
        compile_stage(ctx, entry, true)
    }

    fn compile_fragment(&self, ctx: &Context, entry: FunctionId) -> Result<TextualArtefact> {
        compile_stage(ctx, entry, false)
    }
}

fn type_string(ctx: &Context, ty: TypeId) -> String {
    let t = &ctx.types;
    if ty == t.float_id {
        "float".to_owned()
    } else if ty == t.float2_id {
        "vec2".to_owned()
    } else if ty == t.float3_id {
        "vec3".to_owned()
    } else if ty == t.float4_id {
        "vec4".to_owned()
    } else if ty == t.int_id {
        "int".to_owned()
    } else if ty == t.int2_id {
        "ivec2".to_owned()
    } else if ty == t.int3_id {
        "ivec3".to_owned()
    } else if ty == t.int4_id {
        "ivec4".to_owned()
    } else if ty == t.uint_id {
        "uint".to_owned()
    } else if ty == t.uint2_id {
        "uvec2".to_owned()
    } else if ty == t.uint3_id {
        "uvec3".to_owned()
    } else if ty == t.uint4_id {
        "uvec4".to_owned()
    } else if ty == t.bool_id {
        "bool".to_owned()
    } else if ty == t.float2x2_id {
        "mat2".to_owned()
    } else if ty == t.float3x3_id {
        "mat3".to_owned()
    } else if ty == t.float4x4_id {
        "mat4".to_owned()
    } else if ty == t.tex2d_id {
        "sampler2D".to_owned()
    } else if ty == t.tex2d_array_id {
        "sampler2DArray".to_owned()
    } else if ty == t.texcube_id {
        "samplerCube".to_owned()
    } else {
        t.type_name(&ctx.names, ty)
    }
}

fn var_name(var: VariableId) -> String {
    format!("_{}", var.raw())
}

fn member_name(ctx: &Context, name: NameId) -> String {
    ctx.names.get(name).unwrap_or("<unknown>").to_owned()
}

/// Real (non-swizzle) fields of a struct type, in declaration order.
fn real_fields<'a>(ctx: &'a Context, ty: TypeId) -> Vec<&'a crate::ty::Member> {
    match ctx.types.get(ty) {
        Some(t) => t.members.iter().filter(|m| m.swizzle.is_none()).collect(),
        None => Vec::new(),
    }
}

fn is_pipe_type(ctx: &Context, ty: TypeId) -> bool {
    let pipe = match ctx.names.find("pipe") {
        Some(n) => n,
        None => return false,
    };
    ctx.types.has_attribute(ty, pipe)
}

struct Emitter {
    buf: String,
    indent: u32,
}
impl Emitter {
    fn new() -> Self {
        Emitter { buf: String::new(), indent: 0 }
    }
    fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.buf.push('\t');
        }
        self.buf.push_str(s);
        self.buf.push('\n');
    }
    fn line_fmt(&mut self, args: std::fmt::Arguments) {
        for _ in 0..self.indent {
            self.buf.push('\t');
        }
        let _ = self.buf.write_fmt(args);
        self.buf.push('\n');
    }
}

/// Renders an access path (member/element/swizzle steps) onto `base`, the
/// already-rendered GLSL expression for the path's root variable.
fn render_access_path(ctx: &Context, mut base: String, path: &[AccessStep]) -> String {
    for step in path {
        match step {
            AccessStep::Member { name, .. } => {
                let _ = write!(base, ".{}", member_name(ctx, *name));
            }
            AccessStep::Element { index, .. } => {
                let _ = write!(base, "[{}]", var_name(*index));
            }
            AccessStep::Swizzle(indices) => {
                const LETTERS: [char; 4] = ['x', 'y', 'z', 'w'];
                base.push('.');
                for i in indices {
                    base.push(LETTERS[*i as usize]);
                }
            }
        }
    }
    base
}

fn glsl_builtin_name(name: &str) -> &str {
    match name {
        "float2" => "vec2",
        "float3" => "vec3",
        "float4" => "vec4",
        "int2" => "ivec2",
        "int3" => "ivec3",
        "int4" => "ivec4",
        "uint2" => "uvec2",
        "uint3" => "uvec3",
        "uint4" => "uvec4",
        "group_id" => "gl_WorkGroupID",
        "group_thread_id" => "gl_LocalInvocationID",
        "dispatch_thread_id" => "gl_GlobalInvocationID",
        "group_index" => "gl_LocalInvocationIndex",
        other => other,
    }
}

fn compile_stage(ctx: &Context, entry: FunctionId, is_vertex: bool) -> Result<TextualArtefact> {
    let func = ctx
        .functions
        .get(entry)
        .ok_or_else(|| Error::UnknownName { name: "<entry>".to_owned(), ctx: DebugContext::default() })?;
    if !func.block_present {
        return Err(Error::MissingStage { pipeline: ctx.names.get(func.name).unwrap_or("<unknown>").to_owned(), ctx: DebugContext::default() });
    }
    let input_ty = func
        .params
        .first()
        .map(|p| p.ty.ty)
        .ok_or_else(|| Error::MissingParameterType { ctx: DebugContext::default() })?;
    let output_ty = func.return_type.ty;

    let mut e = Emitter::new();
    e.line("#version 330");
    e.line("");

    write_types(ctx, &mut e, entry, is_vertex, input_ty, output_ty)?;
    write_globals(ctx, &mut e, entry)?;
    write_functions(ctx, &mut e, entry, is_vertex, input_ty)?;

    let name = ctx.names.get(func.name).unwrap_or("main");
    Ok(TextualArtefact { source: e.buf, var_name: format!("{}_code", name) })
}

fn write_types(ctx: &Context, e: &mut Emitter, entry: FunctionId, is_vertex: bool, input_ty: TypeId, output_ty: TypeId) -> Result<()> {
    let types = analysis::find_referenced_types(ctx, entry)?;

    for &ty in &types {
        let t = match ctx.types.get(ty) {
            Some(t) => t,
            None => continue,
        };
        if t.built_in || is_pipe_type(ctx, ty) {
            continue;
        }
        if is_vertex && ty == input_ty {
            for (j, m) in real_fields(ctx, ty).iter().enumerate() {
                e.line_fmt(format_args!("layout(location = {}) in {} {}_{};", j, type_string(ctx, m.ty.ty), t.name.map(|n| member_name(ctx, n)).unwrap_or_default(), member_name(ctx, m.name)));
            }
        } else if is_vertex && ty == output_ty {
            for (j, m) in real_fields(ctx, ty).iter().enumerate().skip(1) {
                e.line_fmt(format_args!("layout(location = {}) out {} {}_{};", j - 1, type_string(ctx, m.ty.ty), t.name.map(|n| member_name(ctx, n)).unwrap_or_default(), member_name(ctx, m.name)));
            }
        } else if !is_vertex && ty == input_ty {
            for (j, m) in real_fields(ctx, ty).iter().enumerate().skip(1) {
                e.line_fmt(format_args!("layout(location = {}) in {} {};", j - 1, type_string(ctx, m.ty.ty), member_name(ctx, m.name)));
            }
        }
    }

    if !is_vertex {
        e.line("out vec4 FragColor;");
    }
    e.line("");

    for &ty in &types {
        let t = match ctx.types.get(ty) {
            Some(t) => t,
            None => continue,
        };
        if t.built_in || is_pipe_type(ctx, ty) {
            continue;
        }
        if ty == input_ty || (is_vertex && ty == output_ty) {
            continue;
        }
        e.line_fmt(format_args!("struct {} {{", t.name.map(|n| member_name(ctx, n)).unwrap_or_default()));
        e.indent += 1;
        for m in real_fields(ctx, ty) {
            e.line_fmt(format_args!("{} {};", type_string(ctx, m.ty.ty), member_name(ctx, m.name)));
        }
        e.indent -= 1;
        e.line("};");
        e.line("");
    }
    Ok(())
}

fn write_globals(ctx: &Context, e: &mut Emitter, entry: FunctionId) -> Result<()> {
    let mut cbuffer_index = 0u32;
    let mut texture_index = 0u32;
    let root_constant = crate::sets::root_constant_global(ctx)?;

    let globals = analysis::find_referenced_globals(ctx, entry);
    for gid in globals {
        let g = ctx.globals.get(gid).unwrap();
        if g.ty == ctx.types.sampler_id {
            continue;
        } else if ctx.types.get(g.ty).map(|t| t.texture_kind.is_some()).unwrap_or(false) {
            e.line_fmt(format_args!("layout(binding = {}) uniform {} {};", texture_index, type_string(ctx, g.ty), var_name(g.var)));
            texture_index += 1;
        } else if root_constant == Some(gid) {
            // root constants are pushed by the host, not declared here.
        } else {
            e.line_fmt(format_args!("layout(binding = {}) uniform Block{} {{", cbuffer_index, var_name(g.var)));
            e.indent += 1;
            for m in real_fields(ctx, g.ty) {
                e.line_fmt(format_args!("{} {};", type_string(ctx, m.ty.ty), member_name(ctx, m.name)));
            }
            e.indent -= 1;
            e.line_fmt(format_args!("}} {};", var_name(g.var)));
            cbuffer_index += 1;
        }
    }
    e.line("");
    Ok(())
}

fn write_functions(ctx: &Context, e: &mut Emitter, entry: FunctionId, is_vertex: bool, input_ty: TypeId) -> Result<()> {
    let mut functions = vec![entry];
    functions.extend(analysis::find_referenced_functions(ctx, entry));

    for f in functions {
        let func = ctx.functions.get(f).unwrap();
        let is_main = f == entry;

        if is_main {
            e.line("void main() {");
        } else {
            let params: Vec<String> = func
                .params
                .iter()
                .zip(&func.param_vars)
                .map(|(p, v)| format!("{} {}", type_string(ctx, p.ty.ty), var_name(*v)))
                .collect();
            e.line_fmt(format_args!("{} {}({}) {{", type_string(ctx, func.return_type.ty), ctx.names.get(func.name).unwrap_or("fn"), params.join(", ")));
        }
        e.indent += 1;

        if is_main && is_vertex {
            write_vertex_input_composite(ctx, e, func, input_ty);
        } else if is_main && !is_vertex {
            write_fragment_input_composite(ctx, e, func, input_ty);
        }

        for op in &func.code {
            write_opcode(ctx, e, op, is_main, is_vertex)?;
        }

        e.indent -= 1;
        e.line("}");
        e.line("");
    }
    Ok(())
}

/// Reassembles the entry's flattened `in` variables into the single local
/// aggregate the body's access paths expect (mirrors the SPIR-V backend's
/// `OpCompositeConstruct` flattening in `spirv::bind_inputs`).
fn write_vertex_input_composite(ctx: &Context, e: &mut Emitter, func: &crate::func::Function, input_ty: TypeId) {
    let struct_name = ctx.types.get(input_ty).and_then(|t| t.name).map(|n| member_name(ctx, n)).unwrap_or_default();
    let fields = real_fields(ctx, input_ty);
    let args: Vec<String> = fields.iter().map(|m| format!("{}_{}", struct_name, member_name(ctx, m.name))).collect();
    if let Some(&var) = func.param_vars.first() {
        e.line_fmt(format_args!("{} {} = {}({});", type_string(ctx, input_ty), var_name(var), struct_name, args.join(", ")));
    }
}

fn write_fragment_input_composite(ctx: &Context, e: &mut Emitter, func: &crate::func::Function, input_ty: TypeId) {
    let fields = real_fields(ctx, input_ty);
    let args: Vec<String> = fields.iter().skip(1).map(|m| member_name(ctx, m.name)).collect();
    if let Some(&var) = func.param_vars.first() {
        e.line_fmt(format_args!("{} {} = {}({});", type_string(ctx, input_ty), var_name(var), ctx.types.get(input_ty).and_then(|t| t.name).map(|n| member_name(ctx, n)).unwrap_or_default(), args.join(", ")));
    }
}

fn write_opcode(ctx: &Context, e: &mut Emitter, op: &Opcode, is_main: bool, is_vertex: bool) -> Result<()> {
    match op {
        Opcode::Var { var, ty } => {
            e.line_fmt(format_args!("{} {};", type_string(ctx, *ty), var_name(*var)));
        }
        Opcode::LoadFloatConstant { to, value } => {
            e.line_fmt(format_args!("float {} = {:?};", var_name(*to), value));
        }
        Opcode::LoadIntConstant { to, value } => {
            e.line_fmt(format_args!("int {} = {};", var_name(*to), value));
        }
        Opcode::LoadBoolConstant { to, value } => {
            e.line_fmt(format_args!("bool {} = {};", var_name(*to), value));
        }
        Opcode::LoadAccessList { to, from, path } => {
            let result_ty = path_result_type(ctx, *from, path);
            let expr = render_access_path(ctx, var_name(*from), path);
            e.line_fmt(format_args!("{} {} = {};", type_string(ctx, result_ty), var_name(*to), expr));
        }
        Opcode::StoreVariable { to, from } => {
            e.line_fmt(format_args!("{} = {};", var_name(*to), var_name(*from)));
        }
        Opcode::StoreAccessList { to, from, path } => {
            let target = render_access_path(ctx, var_name(*to), path);
            e.line_fmt(format_args!("{} = {};", target, var_name(*from)));
        }
        Opcode::CompoundStoreAccessList { op, to, from, path } => {
            let target = render_access_path(ctx, var_name(*to), path);
            e.line_fmt(format_args!("{} {}= {};", target, bin_op_str(*op), var_name(*from)));
        }
        Opcode::Binary { op, result, result_ty, left, right } => {
            e.line_fmt(format_args!("{} {} = {} {} {};", type_string(ctx, *result_ty), var_name(*result), var_name(*left), bin_op_str(*op), var_name(*right)));
        }
        Opcode::Not { result, result_ty, operand } => {
            e.line_fmt(format_args!("{} {} = !{};", type_string(ctx, *result_ty), var_name(*result), var_name(*operand)));
        }
        Opcode::Call { to, result_ty, func, params } => {
            let name = ctx.names.get(*func).unwrap_or("<fn>");
            let args: Vec<String> = params.iter().map(|p| var_name(*p)).collect();
            // GLSL combines texture+sampler state into one object: the
            // middle parameter (a separate `sampler`) has no GLSL counterpart
            // and is dropped, matching a combined `sampler2D`/etc. binding.
            let call = match name {
                "sample" if args.len() == 3 => format!("texture({}, {})", args[0], args[2]),
                "sample_lod" if args.len() == 4 => format!("textureLod({}, {}, {})", args[0], args[2], args[3]),
                _ => format!("{}({})", glsl_builtin_name(name), args.join(", ")),
            };
            match to {
                Some(to) => e.line_fmt(format_args!("{} {} = {};", type_string(ctx, *result_ty), var_name(*to), call)),
                None => e.line_fmt(format_args!("{};", call)),
            }
        }
        Opcode::Return { value } => write_return(e, *value, is_main, is_vertex),
        Opcode::If { condition, .. } => {
            e.line_fmt(format_args!("if ({})", var_name(*condition)));
        }
        Opcode::WhileStart { .. } => {
            e.line("while (true) {");
            e.indent += 1;
        }
        Opcode::WhileCondition { condition, .. } => {
            e.line_fmt(format_args!("if (!{}) break;", var_name(*condition)));
        }
        Opcode::WhileEnd { .. } => {
            e.indent -= 1;
            e.line("}");
        }
        Opcode::BlockStart { .. } => {
            e.line("{");
            e.indent += 1;
        }
        Opcode::BlockEnd { .. } => {
            e.indent -= 1;
            e.line("}");
        }
    }
    Ok(())
}

/// A vertex's return scatters its output struct (member 0 into `gl_Position`,
/// with the D3D-to-GL depth remap `z' = z*2 - w`; members 1..N into their
/// `out` interpolants); a fragment's return value is the color itself, stored
/// straight into `FragColor` (mirrors `spirv::EntryOutputs`).
fn write_return(e: &mut Emitter, value: Option<VariableId>, is_main: bool, is_vertex: bool) {
    let value = match value {
        Some(v) => v,
        None => {
            e.line("return;");
            return;
        }
    };
    if is_main && is_vertex {
        let v = var_name(value);
        e.line_fmt(format_args!("gl_Position.x = {}.position.x;", v));
        e.line_fmt(format_args!("gl_Position.y = {}.position.y;", v));
        e.line_fmt(format_args!("gl_Position.z = ({}.position.z * 2.0) - {}.position.w;", v, v));
        e.line_fmt(format_args!("gl_Position.w = {}.position.w;", v));
        e.line("return;");
    } else if is_main && !is_vertex {
        e.line_fmt(format_args!("FragColor = {};", var_name(value)));
        e.line("return;");
    } else {
        e.line_fmt(format_args!("return {};", var_name(value)));
    }
}

/// Recovers the type an access path resolves to, walking `Member` steps'
/// `ty_after` field (the only step kind that changes scalar vs. aggregate
/// shape for GLSL's purposes).
fn path_result_type(ctx: &Context, _from: VariableId, path: &[AccessStep]) -> TypeId {
    match path.last() {
        Some(AccessStep::Member { ty_after, .. }) => *ty_after,
        Some(AccessStep::Element { ty_after, .. }) => *ty_after,
        Some(AccessStep::Swizzle(indices)) if indices.len() == 1 => ctx.types.float_id,
        Some(AccessStep::Swizzle(indices)) => match indices.len() {
            2 => ctx.types.float2_id,
            3 => ctx.types.float3_id,
            _ => ctx.types.float4_id,
        },
        None => crate::ty::NO_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::Param;
    use crate::ty::TypeRef;

    #[test]
    fn fragment_main_stores_constant_into_frag_color() {
        let mut ctx = Context::new();
        let in_name = ctx.names.intern("PixelIn");
        let in_ty = ctx.types.add_type(Some(in_name));
        ctx.types.add_struct_member(in_ty, ctx.names.intern("position"), TypeRef::scalar(ctx.types.float4_id));
        ctx.types.add_struct_member(in_ty, ctx.names.intern("uv"), TypeRef::scalar(ctx.types.float2_id));

        let fs_name = ctx.names.intern("fs_main");
        let fs = ctx.functions.add_function(fs_name, TypeRef::scalar(ctx.types.float4_id));
        ctx.functions
            .add_param(fs, Param { name: ctx.names.intern("in"), ty: TypeRef::scalar(in_ty), attributes: Vec::new() })
            .unwrap();
        ctx.functions.get_mut(fs).unwrap().param_vars = vec![ctx.vars.alloc(TypeRef::scalar(in_ty), crate::var::VariableKind::Local).id];

        let color = ctx.vars.alloc(TypeRef::scalar(ctx.types.float4_id), crate::var::VariableKind::Internal).id;
        ctx.functions.get_mut(fs).unwrap().code.push(Opcode::LoadFloatConstant { to: color, value: 1.0 });
        ctx.functions.get_mut(fs).unwrap().code.push(Opcode::Return { value: Some(color) });

        let backend = GlslBackend;
        let artefact = backend.compile_fragment(&ctx, fs).unwrap();
        assert!(artefact.source.contains("FragColor = "));
        assert!(artefact.source.contains("out vec4 FragColor;"));
    }

    #[test]
    fn vertex_main_scatters_position_with_depth_remap() {
        let mut ctx = Context::new();
        let in_name = ctx.names.intern("VertexIn");
        let in_ty = ctx.types.add_type(Some(in_name));
        ctx.types.add_struct_member(in_ty, ctx.names.intern("pos"), TypeRef::scalar(ctx.types.float3_id));

        let out_name = ctx.names.intern("VertexOut");
        let out_ty = ctx.types.add_type(Some(out_name));
        ctx.types.add_struct_member(out_ty, ctx.names.intern("position"), TypeRef::scalar(ctx.types.float4_id));

        let vs_name = ctx.names.intern("vs_main");
        let vs = ctx.functions.add_function(vs_name, TypeRef::scalar(out_ty));
        ctx.functions
            .add_param(vs, Param { name: ctx.names.intern("in"), ty: TypeRef::scalar(in_ty), attributes: Vec::new() })
            .unwrap();
        ctx.functions.get_mut(vs).unwrap().param_vars = vec![ctx.vars.alloc(TypeRef::scalar(in_ty), crate::var::VariableKind::Local).id];

        let value = ctx.vars.alloc(TypeRef::scalar(out_ty), crate::var::VariableKind::Internal).id;
        ctx.functions.get_mut(vs).unwrap().code.push(Opcode::Var { var: value, ty: out_ty });
        ctx.functions.get_mut(vs).unwrap().code.push(Opcode::Return { value: Some(value) });

        let backend = GlslBackend;
        let artefact = backend.compile_vertex(&ctx, vs).unwrap();
        assert!(artefact.source.contains("gl_Position.z = "));
        assert!(artefact.source.contains("* 2.0) -"));
    }
}
