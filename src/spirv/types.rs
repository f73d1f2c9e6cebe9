//! Source type → SPIR-V type lowering (spec §4.4's type-lowering table),
//! with uniform-struct member decoration for matrices.
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::ty::{Literal, ScalarKind, TypeId};

use super::builder::{Builder, Id};
use super::raw::{decoration, dim, image_format, storage_class};

/// Lower `ty` to its value-type SPIR-V id (never a pointer). `as_uniform`
/// decorates struct members with `ColMajor`/`MatrixStride`/`Offset` the way
/// a uniform-block member needs (spec §4.4); pass `false` for plain value
/// types (function locals, stage I/O members).
pub fn lower_type(ctx: &Context, b: &mut Builder, ty: TypeId, as_uniform: bool) -> Result<Id> {
    if let Some(id) = b.peek_type(ty, false, 0) {
        return Ok(id);
    }

    let t = ctx
        .types
        .get(ty)
        .ok_or_else(|| Error::UnknownType { name: "<unknown>".to_owned(), ctx: DebugContext::default() })?;

    let id = if t.is_scalar() {
        lower_scalar(ctx, b, t.scalar_kind().unwrap())?
    } else if t.is_vector() {
        let component = lower_scalar(ctx, b, t.scalar_kind().unwrap())?;
        b.emit_type_vector(component, t.vector_len())
    } else if t.is_matrix() {
        let column_ty = column_type_of(ctx, t.vector_len()).ok_or_else(|| Error::UnsupportedType {
            what: "matrix column",
            ctx: DebugContext::default(),
        })?;
        let column = lower_type(ctx, b, column_ty, false)?;
        b.emit_type_matrix(column, t.matrix_cols())
    } else if ty == ctx.types.sampler_id {
        b.emit_type_sampler()
    } else if ty == ctx.types.tex2d_id || ty == ctx.types.tex2d_array_id || ty == ctx.types.texcube_id {
        let sampled_type = lower_scalar(ctx, b, ScalarKind::Float)?;
        let arrayed = if ty == ctx.types.tex2d_array_id { 1 } else { 0 };
        b.emit_type_image(sampled_type, dim::TWO_D, 0, arrayed, 0, 1, image_format::UNKNOWN)
    } else if t.is_array_type() {
        let element = lower_type(ctx, b, t.base_type, as_uniform)?;
        let length_ty = lower_scalar(ctx, b, ScalarKind::Uint)?;
        let length = b.get_or_create_scalar_constant(ScalarKind::Uint, Literal::Uint(t.array_size), length_ty, |b, id| {
            b.emit_constant_preallocated(id, length_ty, &[t.array_size]);
        });
        b.emit_type_array(element, length)
    } else {
        let fields: Vec<_> = t.members.iter().filter(|m| m.swizzle.is_none()).collect();
        let mut member_ids = Vec::with_capacity(fields.len());
        for m in &fields {
            member_ids.push(lower_type(ctx, b, m.ty.ty, as_uniform)?);
        }
        let struct_id = b.emit_type_struct(&member_ids);
        if as_uniform {
            decorate_uniform_block(ctx, b, struct_id, &fields);
        }
        struct_id
    };

    b.remember_type(ty, false, 0, id);
    Ok(id)
}

fn decorate_uniform_block(ctx: &Context, b: &mut Builder, struct_id: Id, fields: &[&crate::ty::Member]) {
    b.emit_decorate(struct_id, decoration::BLOCK, &[]);
    let mut offset = 0u32;
    for (i, m) in fields.iter().enumerate() {
        let mt = match ctx.types.get(m.ty.ty) {
            Some(mt) => mt,
            None => continue,
        };
        if mt.is_matrix() {
            let stride = if mt.matrix_cols() == 3 { 12 } else { 16 };
            b.emit_member_decorate(struct_id, i as u32, decoration::COL_MAJOR, &[]);
            b.emit_member_decorate(struct_id, i as u32, decoration::MATRIX_STRIDE, &[stride]);
            b.emit_member_decorate(struct_id, i as u32, decoration::OFFSET, &[offset]);
            offset += stride * mt.matrix_cols();
        } else {
            b.emit_member_decorate(struct_id, i as u32, decoration::OFFSET, &[offset]);
            offset += natural_size(mt);
        }
    }
}

/// Lowers a scalar kind by routing through `lower_type` on its canonical
/// `TypeId`, so a vector's component type, a matrix's column scalar, and an
/// array's length type all dedup against the same cache entry that a
/// top-level reference to e.g. `ctx.types.float_id` would hit.
fn lower_scalar(ctx: &Context, b: &mut Builder, kind: ScalarKind) -> Result<Id> {
    let ty = match kind {
        ScalarKind::Float => ctx.types.float_id,
        ScalarKind::Int => ctx.types.int_id,
        ScalarKind::Uint => ctx.types.uint_id,
        ScalarKind::Bool => ctx.types.bool_id,
    };
    lower_type(ctx, b, ty, false)
}

fn column_type_of(ctx: &Context, rows: u32) -> Option<TypeId> {
    match rows {
        2 => Some(ctx.types.float2_id),
        3 => Some(ctx.types.float3_id),
        4 => Some(ctx.types.float4_id),
        _ => None,
    }
}

fn natural_size(t: &crate::ty::Type) -> u32 {
    if t.is_vector() {
        4 * t.vector_len()
    } else {
        4
    }
}

/// The pointer type to `ty` in `storage`, deduplicated by `(ty, storage)`.
/// Uniform-struct member decoration only applies when `storage` is
/// `UNIFORM`, matching how a struct can be both a plain value type and a
/// uniform block depending on where it's referenced from.
pub fn lower_pointer_type(ctx: &Context, b: &mut Builder, ty: TypeId, storage: u32) -> Result<Id> {
    if let Some(id) = b.peek_type(ty, true, storage) {
        return Ok(id);
    }
    let value = lower_type(ctx, b, ty, storage == storage_class::UNIFORM)?;
    let id = b.emit_type_pointer(storage, value);
    b.remember_type(ty, true, storage, id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeRef;
    use crate::spirv::raw::op;

    /// A uniform block `{mvp: float4x4}`: `OpTypeStruct` decorated `Block`;
    /// member 0 decorated `ColMajor`, `MatrixStride 16`, `Offset 0`.
    #[test]
    fn uniform_struct_with_matrix_member_gets_std140_style_decorations() {
        let mut ctx = Context::new();
        let name = ctx.names.intern("FrameConstants");
        let struct_ty = ctx.types.add_type(Some(name));
        let member_name = ctx.names.intern("mvp");
        ctx.types.add_struct_member(struct_ty, member_name, TypeRef::scalar(ctx.types.float4x4_id));

        let mut b = Builder::new();
        lower_type(&ctx, &mut b, struct_ty, true).unwrap();

        let decs = decoded_decorations(&b.decorations);
        assert!(
            decs.iter().any(|d| d.opcode == op::DECORATE && d.operands[1] == decoration::BLOCK),
            "struct should be decorated Block"
        );
        let member_decs: Vec<_> = decs.iter().filter(|d| d.opcode == op::MEMBER_DECORATE && d.operands[1] == 0).collect();
        assert!(member_decs.iter().any(|d| d.operands[2] == decoration::COL_MAJOR));
        assert!(member_decs.iter().any(|d| d.operands[2] == decoration::MATRIX_STRIDE && d.operands[3] == 16));
        assert!(member_decs.iter().any(|d| d.operands[2] == decoration::OFFSET && d.operands[3] == 0));
    }

    struct DecodedInstr {
        opcode: u16,
        operands: Vec<u32>,
    }

    fn decoded_decorations(stream: &[u32]) -> Vec<DecodedInstr> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < stream.len() {
            let word = stream[i];
            let count_words = (word >> 16) as usize;
            let opcode = (word & 0xffff) as u16;
            let operands = stream[i + 1..i + count_words.max(1)].to_vec();
            out.push(DecodedInstr { opcode, operands });
            i += count_words.max(1);
        }
        out
    }
}
