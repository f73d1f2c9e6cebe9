//! Translates one function's opcode buffer into the `instructions` stream,
//! grounded on `examples/original_source/sources/backends/spirv.c`'s giant
//! opcode switch (§4.5). Scoped to a single entry function's body; a `CALL`
//! to anything but a built-in is rejected (see DESIGN.md).
use fnv::FnvHashMap as HashMap;

use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::func::{AccessStep, BinOp, Function, Opcode};
use crate::ty::TypeId;
use crate::var::VariableId;

use super::builder::{Builder, Id};
use super::raw::{op, storage_class};
use super::types::lower_pointer_type;

/// A variable backed by a real `OpVariable` pointer: function locals,
/// parameters, and globals. Everything else (constants, binary/call/load
/// results) is an "internal" SSA value already bound in `Builder::value_ids`
/// the moment its producing opcode runs — mirroring the source's
/// `VARIABLE_INTERNAL` kind (`examples/original_source/sources/analyzer.c`'s
/// sibling `var.rs::VariableKind`).
struct Pointer {
    id: Id,
    ty: TypeId,
    storage: u32,
}

/// How a function's `RETURN` lowers. An ordinary function returns a value
/// normally; a vertex entry scatters its output struct's members into their
/// own `Output` variables; a fragment entry (whose return type is the color
/// value itself, not a struct) stores it into a single `Output` variable
/// directly (spec §4.4).
#[derive(Clone)]
pub enum EntryOutputs {
    None,
    Scatter(Vec<(TypeId, Id)>),
    Direct(TypeId, Id),
}

pub struct FunctionLowering<'a> {
    ctx: &'a Context,
    pointers: HashMap<u64, Pointer>,
    block_labels: HashMap<u32, Id>,
    outputs: EntryOutputs,
}

impl<'a> FunctionLowering<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        FunctionLowering { ctx, pointers: HashMap::default(), block_labels: HashMap::default(), outputs: EntryOutputs::None }
    }

    /// Register a pointer created by the caller (e.g. the vertex/fragment
    /// entry's marshalled parameter-struct variable) before lowering starts.
    pub fn bind_pointer(&mut self, var: VariableId, id: Id, ty: TypeId, storage: u32) {
        self.pointers.insert(var.raw(), Pointer { id, ty, storage });
    }

    /// Register an already-materialized SSA value (e.g. the composite built
    /// from an entry's flattened `Input` parameters) under `var`.
    pub fn bind_value(&mut self, b: &mut Builder, var: VariableId, id: Id) {
        self.bind(b, var, id);
    }

    pub fn set_outputs(&mut self, outputs: EntryOutputs) {
        self.outputs = outputs;
    }

    fn label_for(&mut self, b: &mut Builder, block: u32) -> Id {
        *self.block_labels.entry(block).or_insert_with(|| b.allocate_id())
    }

    /// First pass: emit an `OpVariable` for every `VAR` opcode not already
    /// bound by the caller, so every local declaration appears before any
    /// other instruction in the function's entry block (spec §4.5).
    fn declare_locals(&mut self, b: &mut Builder, func: &Function) -> Result<()> {
        for opc in &func.code {
            if let Opcode::Var { var, ty } = opc {
                if self.pointers.contains_key(&var.raw()) {
                    continue;
                }
                let pointer_ty = lower_pointer_type(self.ctx, b, *ty, storage_class::FUNCTION)?;
                let id = b.emit_variable(true, pointer_ty, storage_class::FUNCTION);
                self.pointers.insert(var.raw(), Pointer { id, ty: *ty, storage: storage_class::FUNCTION });
            }
        }
        Ok(())
    }

    /// The SSA value of `var`: a load through its pointer if it's a real
    /// variable, otherwise the value an earlier opcode already bound.
    fn value_of(&mut self, b: &mut Builder, var: VariableId) -> Result<Id> {
        if let Some(p) = self.pointers.get(&var.raw()) {
            let (ptr_id, ty) = (p.id, p.ty);
            let value_ty = super::types::lower_type(self.ctx, b, ty, false)?;
            return Ok(b.emit_load(value_ty, ptr_id));
        }
        b.lookup(var.raw()).ok_or_else(|| Error::MalformedAccessChain { ctx: DebugContext::default() })
    }

    fn bind(&mut self, b: &mut Builder, var: VariableId, id: Id) {
        b.bind(var.raw(), id);
    }

    /// Resolve `from`'s access path to a pointer usable by `OpAccessChain`,
    /// stopping short of a trailing swizzle step (the caller special-cases
    /// that one, since SPIR-V access chains can't address a multi-component
    /// swizzle). Returns the chain pointer, the type it points to, and the
    /// trailing swizzle if the path ends with one.
    fn resolve_chain(
        &mut self,
        b: &mut Builder,
        from: VariableId,
        path: &[AccessStep],
    ) -> Result<(Id, TypeId, u32, Option<Vec<u8>>)> {
        let base = self
            .pointers
            .get(&from.raw())
            .ok_or_else(|| Error::MalformedAccessChain { ctx: DebugContext::default() })?;
        let (mut pointer, mut ty, storage) = (base.id, base.ty, base.storage);

        let mut indices = Vec::new();
        let mut trailing_swizzle = None;
        for (i, step) in path.iter().enumerate() {
            match step {
                AccessStep::Member { name, ty_after } => {
                    let index = self
                        .ctx
                        .types
                        .struct_member_index(ty, *name)
                        .ok_or_else(|| Error::MalformedAccessChain { ctx: DebugContext::default() })?;
                    let index_ty = super::types::lower_type(self.ctx, b, self.ctx.types.uint_id, false)?;
                    let index_id = b.get_or_create_scalar_constant(
                        crate::ty::ScalarKind::Uint,
                        crate::ty::Literal::Uint(index),
                        index_ty,
                        |b, id| {
                            b.emit_constant_preallocated(id, index_ty, &[index]);
                        },
                    );
                    indices.push(index_id);
                    ty = *ty_after;
                }
                AccessStep::Element { index, ty_after } => {
                    let index_id = self.value_of(b, *index)?;
                    indices.push(index_id);
                    ty = *ty_after;
                }
                AccessStep::Swizzle(components) => {
                    if i != path.len() - 1 {
                        return Err(Error::UnsupportedType { what: "swizzle followed by further access", ctx: DebugContext::default() });
                    }
                    trailing_swizzle = Some(components.clone());
                }
            }
        }

        if !indices.is_empty() {
            let pointer_ty = lower_pointer_type(self.ctx, b, ty, storage)?;
            pointer = b.emit_access_chain(pointer_ty, pointer, &indices);
        }
        Ok((pointer, ty, storage, trailing_swizzle))
    }

    /// `LOAD_ACCESS_LIST`: read through `path` starting at `from`.
    fn load_access_list(&mut self, b: &mut Builder, func: &Function, from: VariableId, path: &[crate::func::AccessStep], result_ty: TypeId) -> Result<Id> {
        if !self.pointers.contains_key(&from.raw()) {
            // An access into an internal (already-materialized) value: only
            // struct/swizzle member selection is expressible without a
            // pointer, via `OpCompositeExtract` (spec §4.5).
            let base = self.value_of(b, from)?;
            let current_ty = self.operand_type(func, from);
            return self.extract_from_value(b, base, current_ty, path, result_ty);
        }

        let (pointer, ty, _storage, swizzle) = self.resolve_chain(b, from, path)?;
        match swizzle {
            None => {
                let value_ty = super::types::lower_type(self.ctx, b, ty, false)?;
                Ok(b.emit_load(value_ty, pointer))
            }
            Some(components) => {
                let vector_ty = super::types::lower_type(self.ctx, b, ty, false)?;
                let vector = b.emit_load(vector_ty, pointer);
                let result_spirv_ty = super::types::lower_type(self.ctx, b, result_ty, false)?;
                let words: Vec<u32> = components.iter().map(|&c| c as u32).collect();
                if words.len() == 1 {
                    Ok(b.emit_composite_extract(result_spirv_ty, vector, &words))
                } else {
                    Ok(b.emit_vector_shuffle(result_spirv_ty, vector, vector, &words))
                }
            }
        }
    }

    fn extract_from_value(&mut self, b: &mut Builder, base: Id, mut current_ty: TypeId, path: &[AccessStep], result_ty: TypeId) -> Result<Id> {
        let mut current = base;
        for step in path {
            match step {
                AccessStep::Member { name, ty_after } => {
                    let index = self
                        .ctx
                        .types
                        .struct_member_index(current_ty, *name)
                        .ok_or_else(|| Error::MalformedAccessChain { ctx: DebugContext::default() })?;
                    let member_spirv_ty = super::types::lower_type(self.ctx, b, *ty_after, false)?;
                    current = b.emit_composite_extract(member_spirv_ty, current, &[index]);
                    current_ty = *ty_after;
                }
                AccessStep::Element { .. } => {
                    return Err(Error::UnsupportedType { what: "dynamic index into a non-pointer value", ctx: DebugContext::default() });
                }
                AccessStep::Swizzle(components) => {
                    let words: Vec<u32> = components.iter().map(|&c| c as u32).collect();
                    let result_spirv_ty = super::types::lower_type(self.ctx, b, result_ty, false)?;
                    current = if words.len() == 1 {
                        b.emit_composite_extract(result_spirv_ty, current, &words)
                    } else {
                        b.emit_vector_shuffle(result_spirv_ty, current, current, &words)
                    };
                }
            }
        }
        Ok(current)
    }

    /// `STORE_ACCESS_LIST` / the store half of a compound assignment: write
    /// `value` through `path` starting at `to`.
    fn store_access_list(&mut self, b: &mut Builder, to: VariableId, path: &[AccessStep], value: Id) -> Result<()> {
        let (pointer, ty, storage, swizzle) = self.resolve_chain(b, to, path)?;
        let _ = storage;
        match swizzle {
            None => {
                let _ = ty;
                b.emit_store(pointer, value);
                Ok(())
            }
            Some(components) => {
                // Read-modify-write: load the full vector, shuffle the new
                // value's components into the swizzled positions, store back.
                let vector_ty = super::types::lower_type(self.ctx, b, ty, false)?;
                let old = b.emit_load(vector_ty, pointer);
                let width = self.ctx.types.get(ty).map(|t| t.vector_len()).unwrap_or(components.len() as u32);
                let mut shuffle = vec![0u32; width as usize];
                for i in 0..width {
                    shuffle[i as usize] = i;
                }
                for (src_component, &dest) in components.iter().enumerate() {
                    shuffle[dest as usize] = width + src_component as u32;
                }
                let merged = b.emit_vector_shuffle(vector_ty, old, value, &shuffle);
                b.emit_store(pointer, merged);
                Ok(())
            }
        }
    }

    fn binary_opcode(&self, op: BinOp, left_ty: TypeId, right_ty: TypeId) -> Result<u16> {
        use crate::ty::ScalarKind;
        let left = self.ctx.types.get(left_ty);
        let right = self.ctx.types.get(right_ty);
        if op.is_comparison() {
            let kind = left.and_then(|t| t.scalar_kind()).unwrap_or(ScalarKind::Float);
            return Ok(match (op, kind) {
                (BinOp::Equals, ScalarKind::Float) => super::raw::op::F_ORD_EQUAL,
                (BinOp::Equals, _) => super::raw::op::I_EQUAL,
                (BinOp::NotEquals, ScalarKind::Float) => super::raw::op::F_ORD_NOT_EQUAL,
                (BinOp::NotEquals, _) => super::raw::op::I_NOT_EQUAL,
                (BinOp::Less, ScalarKind::Float) => super::raw::op::F_ORD_LESS_THAN,
                (BinOp::Less, _) => super::raw::op::S_LESS_THAN,
                (BinOp::Greater, ScalarKind::Float) => super::raw::op::F_ORD_GREATER_THAN,
                (BinOp::Greater, _) => super::raw::op::S_GREATER_THAN,
                (BinOp::LessEqual, ScalarKind::Float) => super::raw::op::F_ORD_LESS_THAN_EQUAL,
                (BinOp::GreaterEqual, ScalarKind::Float) => super::raw::op::F_ORD_GREATER_THAN_EQUAL,
                _ => return Err(Error::UnsupportedType { what: "integer ordered comparison", ctx: DebugContext::default() }),
            });
        }
        if op == BinOp::Multiply {
            let left_is_matrix = left.map(|t| t.is_matrix()).unwrap_or(false);
            let right_is_matrix = right.map(|t| t.is_matrix()).unwrap_or(false);
            return Ok(if left_is_matrix && right_is_matrix {
                op::MATRIX_TIMES_MATRIX
            } else if left_is_matrix {
                op::MATRIX_TIMES_VECTOR
            } else if right_is_matrix {
                op::VECTOR_TIMES_MATRIX
            } else {
                op::F_MUL
            });
        }
        let kind = left.and_then(|t| t.scalar_kind()).unwrap_or(ScalarKind::Float);
        Ok(match (op, kind) {
            (BinOp::Add, ScalarKind::Float) => op::F_ADD,
            (BinOp::Add, _) => op::I_ADD,
            (BinOp::Sub, ScalarKind::Float) => op::F_SUB,
            (BinOp::Sub, _) => op::I_SUB,
            (BinOp::Divide, _) => op::F_DIV,
            (BinOp::Mod, _) => op::F_MOD,
            (BinOp::And, _) => op::LOGICAL_AND,
            (BinOp::Or, _) => op::LOGICAL_OR,
            (BinOp::BitwiseAnd, _) => op::BITWISE_AND,
            (BinOp::BitwiseOr, _) => op::BITWISE_OR,
            (BinOp::BitwiseXor, _) => op::BITWISE_XOR,
            (BinOp::LeftShift, _) => op::SHIFT_LEFT_LOGICAL,
            (BinOp::RightShift, _) => op::SHIFT_RIGHT_ARITHMETIC,
            _ => return Err(Error::UnsupportedType { what: "binary operator", ctx: DebugContext::default() }),
        })
    }

    fn call_builtin(&mut self, b: &mut Builder, name: &str, params: &[VariableId], result_ty: TypeId) -> Result<Option<Id>> {
        match name {
            "sample" => {
                let image_ty = super::types::lower_type(self.ctx, b, self.ctx.types.tex2d_id, false)?;
                let sampler_ty = super::types::lower_type(self.ctx, b, self.ctx.types.sampler_id, false)?;
                let image_ptr = self.pointers.get(&params[0].raw()).map(|p| p.id).ok_or_else(|| Error::MalformedAccessChain { ctx: DebugContext::default() })?;
                let sampler_ptr = self.pointers.get(&params[1].raw()).map(|p| p.id).ok_or_else(|| Error::MalformedAccessChain { ctx: DebugContext::default() })?;
                let image = b.emit_load(image_ty, image_ptr);
                let sampler = b.emit_load(sampler_ty, sampler_ptr);
                let coordinate = self.value_of(b, params[2])?;
                let sampled_image_ty = b.emit_type_sampled_image(image_ty);
                let sampled_image = b.emit_sampled_image(sampled_image_ty, image, sampler);
                let result_spirv_ty = super::types::lower_type(self.ctx, b, result_ty, false)?;
                Ok(Some(b.emit_image_sample_implicit_lod(result_spirv_ty, sampled_image, coordinate)))
            }
            "float2" | "float3" | "float4" => {
                let mut constituents = Vec::with_capacity(params.len());
                for p in params {
                    constituents.push(self.value_of(b, *p)?);
                }
                let result_spirv_ty = super::types::lower_type(self.ctx, b, result_ty, false)?;
                Ok(Some(b.emit_composite_construct(result_spirv_ty, &constituents)))
            }
            _ => Err(Error::UnsupportedType { what: "call to a non-built-in function", ctx: DebugContext::default() }),
        }
    }

    /// Translate every opcode of `func` in order, after the up-front local
    /// declarations pass. Caller must already have emitted an `OpLabel` for
    /// the entry block.
    pub fn lower_body(&mut self, b: &mut Builder, func: &Function) -> Result<()> {
        self.declare_locals(b, func)?;

        for opc in &func.code {
            match opc {
                Opcode::Var { .. } => {} // handled up-front
                Opcode::LoadFloatConstant { to, value } => {
                    let ty = super::types::lower_type(self.ctx, b, self.ctx.types.float_id, false)?;
                    let id = b.get_or_create_scalar_constant(crate::ty::ScalarKind::Float, crate::ty::Literal::Float(*value), ty, |b, id| {
                        b.emit_constant_preallocated(id, ty, &[value.to_bits()]);
                    });
                    self.bind(b, *to, id);
                }
                Opcode::LoadIntConstant { to, value } => {
                    let ty = super::types::lower_type(self.ctx, b, self.ctx.types.int_id, false)?;
                    let id = b.get_or_create_scalar_constant(crate::ty::ScalarKind::Int, crate::ty::Literal::Int(*value), ty, |b, id| {
                        b.emit_constant_preallocated(id, ty, &[*value as u32]);
                    });
                    self.bind(b, *to, id);
                }
                Opcode::LoadBoolConstant { to, value } => {
                    let ty = super::types::lower_type(self.ctx, b, self.ctx.types.bool_id, false)?;
                    let id = b.get_or_create_scalar_constant(crate::ty::ScalarKind::Bool, crate::ty::Literal::Bool(*value), ty, |b, id| {
                        b.emit_constant_bool_preallocated(id, ty, *value);
                    });
                    self.bind(b, *to, id);
                }
                Opcode::LoadAccessList { to, from, path } => {
                    let result_ty = self.path_result_type(func, path);
                    let id = self.load_access_list(b, func, *from, path, result_ty)?;
                    self.bind(b, *to, id);
                }
                Opcode::StoreVariable { to, from } => {
                    let value = self.value_of(b, *from)?;
                    let ptr = self.pointers.get(&to.raw()).map(|p| p.id).ok_or_else(|| Error::MalformedAccessChain { ctx: DebugContext::default() })?;
                    b.emit_store(ptr, value);
                }
                Opcode::StoreAccessList { to, from, path } => {
                    let value = self.value_of(b, *from)?;
                    self.store_access_list(b, *to, path, value)?;
                }
                Opcode::CompoundStoreAccessList { op: binop, to, from, path } => {
                    let result_ty = self.path_result_type(func, path);
                    let current = self.load_access_list(b, func, *to, path, result_ty)?;
                    let rhs = self.value_of(b, *from)?;
                    let opcode = self.binary_opcode(*binop, result_ty, result_ty)?;
                    let result_spirv_ty = super::types::lower_type(self.ctx, b, result_ty, false)?;
                    let merged = b.emit_binary_op(opcode, result_spirv_ty, current, rhs);
                    self.store_access_list(b, *to, path, merged)?;
                }
                Opcode::Binary { op: binop, result, result_ty, left, right } => {
                    let lv = self.value_of(b, *left)?;
                    let rv = self.value_of(b, *right)?;
                    let left_ty = self.operand_type(func, *left);
                    let opcode = self.binary_opcode(*binop, left_ty, left_ty)?;
                    let result_spirv_ty = super::types::lower_type(self.ctx, b, *result_ty, false)?;
                    let id = b.emit_binary_op(opcode, result_spirv_ty, lv, rv);
                    self.bind(b, *result, id);
                }
                Opcode::Not { result, result_ty, operand } => {
                    let v = self.value_of(b, *operand)?;
                    let result_spirv_ty = super::types::lower_type(self.ctx, b, *result_ty, false)?;
                    let opcode = if self.ctx.types.get(*result_ty).map(|t| t.scalar_kind() == Some(crate::ty::ScalarKind::Bool)).unwrap_or(true) {
                        op::LOGICAL_NOT
                    } else {
                        op::F_NEGATE
                    };
                    let id = b.emit_unary_op(opcode, result_spirv_ty, v);
                    self.bind(b, *result, id);
                }
                Opcode::Call { to, result_ty, func: callee, params } => {
                    let name = self.ctx.names.get(*callee).unwrap_or("");
                    let result = self.call_builtin(b, name, params, *result_ty)?;
                    if let (Some(to), Some(id)) = (to, result) {
                        self.bind(b, *to, id);
                    }
                }
                Opcode::Return { value } => match (&self.outputs, value) {
                    (EntryOutputs::Scatter(members), Some(v)) => {
                        let val_id = self.value_of(b, *v)?;
                        let members = members.clone();
                        for (i, (member_ty, out_id)) in members.into_iter().enumerate() {
                            let member_spirv_ty = super::types::lower_type(self.ctx, b, member_ty, false)?;
                            let extracted = b.emit_composite_extract(member_spirv_ty, val_id, &[i as u32]);
                            b.emit_store(out_id, extracted);
                        }
                        b.emit_return();
                    }
                    (EntryOutputs::Direct(_, out_id), Some(v)) => {
                        let val_id = self.value_of(b, *v)?;
                        b.emit_store(*out_id, val_id);
                        b.emit_return();
                    }
                    (EntryOutputs::None, Some(v)) => {
                        let val_id = self.value_of(b, *v)?;
                        b.emit_return_value(val_id);
                    }
                    (_, None) => b.emit_return(),
                },
                Opcode::If { condition, start, end } => {
                    let cond = self.value_of(b, *condition)?;
                    let start_label = self.label_for(b, start.raw());
                    let end_label = self.label_for(b, end.raw());
                    b.emit_selection_merge(end_label, super::raw::selection_control::NONE);
                    b.emit_branch_conditional(cond, start_label, end_label);
                }
                Opcode::WhileStart { start, continue_, end } => {
                    let start_label = self.label_for(b, start.raw());
                    let continue_label = self.label_for(b, continue_.raw());
                    let end_label = self.label_for(b, end.raw());
                    b.emit_branch(start_label);
                    b.emit_label(start_label);
                    b.emit_loop_merge(end_label, continue_label, super::raw::loop_control::NONE);
                    let body_label = b.allocate_id();
                    b.emit_branch(body_label);
                    b.emit_label(body_label);
                }
                Opcode::WhileCondition { condition, end } => {
                    let cond = self.value_of(b, *condition)?;
                    let end_label = self.label_for(b, end.raw());
                    let pass_label = b.allocate_id();
                    b.emit_branch_conditional(cond, pass_label, end_label);
                    b.emit_label(pass_label);
                }
                Opcode::WhileEnd { start, continue_, end } => {
                    let start_label = self.label_for(b, start.raw());
                    let continue_label = self.label_for(b, continue_.raw());
                    let end_label = self.label_for(b, end.raw());
                    b.emit_branch(continue_label);
                    b.emit_label(continue_label);
                    b.emit_branch(start_label);
                    b.emit_label(end_label);
                }
                Opcode::BlockStart { id } => {
                    let label = self.label_for(b, id.raw());
                    b.emit_branch(label);
                    b.emit_label(label);
                }
                Opcode::BlockEnd { id } => {
                    let _ = id;
                }
            }
        }
        Ok(())
    }

    fn path_result_type(&self, func: &Function, path: &[AccessStep]) -> TypeId {
        match path.last() {
            Some(AccessStep::Member { ty_after, .. }) => *ty_after,
            Some(AccessStep::Element { ty_after, .. }) => *ty_after,
            Some(AccessStep::Swizzle(components)) => {
                let _ = func;
                match components.len() {
                    1 => self.ctx.types.float_id,
                    2 => self.ctx.types.float2_id,
                    3 => self.ctx.types.float3_id,
                    _ => self.ctx.types.float4_id,
                }
            }
            None => crate::ty::NO_TYPE,
        }
    }

    fn operand_type(&self, func: &Function, var: VariableId) -> TypeId {
        if let Some(p) = self.pointers.get(&var.raw()) {
            return p.ty;
        }
        if let Some(i) = func.param_vars.iter().position(|p| *p == var) {
            return func.params[i].ty.ty;
        }
        for opc in &func.code {
            match opc {
                Opcode::Binary { result, result_ty, .. } if *result == var => return *result_ty,
                Opcode::Not { result, result_ty, .. } if *result == var => return *result_ty,
                Opcode::Call { to: Some(to), result_ty, .. } if *to == var => return *result_ty,
                Opcode::LoadAccessList { to, path, .. } if *to == var => return self.path_result_type(func, path),
                Opcode::LoadFloatConstant { to, .. } if *to == var => return self.ctx.types.float_id,
                Opcode::LoadIntConstant { to, .. } if *to == var => return self.ctx.types.int_id,
                Opcode::LoadBoolConstant { to, .. } if *to == var => return self.ctx.types.bool_id,
                _ => {}
            }
        }
        crate::ty::NO_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::func::Opcode;
    use crate::ty::TypeRef;
    use crate::var::VariableKind;

    #[test]
    fn float_constants_dedup_across_a_function() {
        let mut ctx = Context::new();
        let name = ctx.names.intern("main");
        let fid = ctx.functions.add_function(name, TypeRef::scalar(crate::ty::NO_TYPE));
        let a = ctx.vars.alloc(TypeRef::scalar(ctx.types.float_id), VariableKind::Internal).id;
        let c = ctx.vars.alloc(TypeRef::scalar(ctx.types.float_id), VariableKind::Internal).id;
        {
            let f = ctx.functions.get_mut(fid).unwrap();
            f.code.push(Opcode::LoadFloatConstant { to: a, value: 1.0 });
            f.code.push(Opcode::LoadFloatConstant { to: c, value: 1.0 });
            f.code.push(Opcode::Return { value: None });
        }

        let mut b = Builder::new();
        let func = ctx.functions.get(fid).unwrap();
        let mut lowering = FunctionLowering::new(&ctx);
        lowering.lower_body(&mut b, func).unwrap();

        assert_eq!(b.lookup(a.raw()), b.lookup(c.raw()));
    }

    #[test]
    fn binary_add_on_locals_loads_each_operand() {
        let mut ctx = Context::new();
        let name = ctx.names.intern("main");
        let fid = ctx.functions.add_function(name, TypeRef::scalar(crate::ty::NO_TYPE));
        let x = ctx.vars.alloc(TypeRef::scalar(ctx.types.float_id), VariableKind::Local).id;
        let y = ctx.vars.alloc(TypeRef::scalar(ctx.types.float_id), VariableKind::Local).id;
        let sum = ctx.vars.alloc(TypeRef::scalar(ctx.types.float_id), VariableKind::Internal).id;
        {
            let f = ctx.functions.get_mut(fid).unwrap();
            f.code.push(Opcode::Var { var: x, ty: ctx.types.float_id });
            f.code.push(Opcode::Var { var: y, ty: ctx.types.float_id });
            f.code.push(Opcode::Binary {
                op: BinOp::Add,
                result: sum,
                result_ty: ctx.types.float_id,
                left: x,
                right: y,
            });
            f.code.push(Opcode::Return { value: None });
        }

        let mut b = Builder::new();
        let func = ctx.functions.get(fid).unwrap();
        let mut lowering = FunctionLowering::new(&ctx);
        lowering.lower_body(&mut b, func).unwrap();

        assert!(b.lookup(sum.raw()).is_some());
        assert!(!b.instructions.is_empty());
    }
}
