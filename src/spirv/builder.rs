//! Id allocation, the four concatenated instruction streams, and
//! type/constant deduplication, mirroring `allocate_index`,
//! `instructions_buffer`, and the per-kind constant maps of
//! `examples/original_source/sources/backends/spirv.c`.
use fnv::FnvHashMap as HashMap;

use super::raw::{self, op, storage_class};
use crate::ty::{Literal, ScalarKind, TypeId};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub u32);

/// Dedup key for `OpType*`/`OpTypePointer` entries: a non-pointer entry uses
/// storage class 0 by convention, matching the source's `(type_id, storage
/// class)` tuple with `is_pointer` folded into "storage class present".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TypeKey {
    ty: TypeId,
    is_pointer: bool,
    storage_class: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstantKey {
    Float(u32),
    Int(i32),
    Uint(u32),
    Bool(bool),
}

pub struct Builder {
    next_id: u32,
    pub header: Vec<u32>,
    pub decorations: Vec<u32>,
    pub constants: Vec<u32>,
    pub instructions: Vec<u32>,

    types: HashMap<TypeKey, Id>,
    constant_ids: HashMap<ConstantKey, Id>,
    /// IR variable id -> SPIR-V id, populated while lowering a function body.
    pub value_ids: HashMap<u64, Id>,
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            next_id: 1,
            header: Vec::new(),
            decorations: Vec::new(),
            constants: Vec::new(),
            instructions: Vec::new(),
            types: HashMap::default(),
            constant_ids: HashMap::default(),
            value_ids: HashMap::default(),
        }
    }

    pub fn allocate_id(&mut self) -> Id {
        let id = Id(self.next_id);
        self.next_id += 1;
        log::trace!("spirv: allocated id {}", id.0);
        id
    }

    /// The `Bound` field of the final header: the next unused id.
    pub fn bound(&self) -> u32 {
        self.next_id
    }

    pub fn get_or_create_type<F: FnOnce(&mut Self) -> Id>(&mut self, ty: TypeId, is_pointer: bool, storage_class: u32, emit: F) -> Id {
        let key = TypeKey { ty, is_pointer, storage_class: if is_pointer { storage_class } else { 0 } };
        if let Some(id) = self.types.get(&key) {
            log::debug!("spirv: type dedup hit for {:?}", key);
            return *id;
        }
        let id = emit(self);
        self.types.insert(key, id);
        id
    }

    pub fn get_or_create_scalar_constant(&mut self, kind: ScalarKind, value: Literal, ty_id: Id, emit_instructions: impl FnOnce(&mut Self, Id)) -> Id {
        let key = match (kind, value) {
            (ScalarKind::Float, Literal::Float(f)) => ConstantKey::Float(f.to_bits()),
            (ScalarKind::Int, Literal::Int(i)) => ConstantKey::Int(i),
            (ScalarKind::Uint, Literal::Uint(u)) => ConstantKey::Uint(u),
            (ScalarKind::Bool, Literal::Bool(b)) => ConstantKey::Bool(b),
            _ => {
                let id = self.allocate_id();
                emit_instructions(self, id);
                return id;
            }
        };
        if let Some(id) = self.constant_ids.get(&key) {
            log::debug!("spirv: constant dedup hit for {:?}", key);
            return *id;
        }
        let id = self.allocate_id();
        emit_instructions(self, id);
        self.constant_ids.insert(key, id);
        id
    }

    /// Check the type/pointer dedup table without emitting on a miss.
    pub fn peek_type(&self, ty: TypeId, is_pointer: bool, storage_class: u32) -> Option<Id> {
        let key = TypeKey { ty, is_pointer, storage_class: if is_pointer { storage_class } else { 0 } };
        self.types.get(&key).copied()
    }

    /// Record an id obtained outside `get_or_create_type` (e.g. a struct or
    /// image type built across several emit calls) in the dedup table.
    pub fn remember_type(&mut self, ty: TypeId, is_pointer: bool, storage_class: u32, id: Id) {
        let key = TypeKey { ty, is_pointer, storage_class: if is_pointer { storage_class } else { 0 } };
        self.types.insert(key, id);
    }

    pub fn bind(&mut self, var: u64, id: Id) {
        self.value_ids.insert(var, id);
    }

    pub fn lookup(&self, var: u64) -> Option<Id> {
        self.value_ids.get(&var).copied()
    }

    pub fn emit_capability(&mut self, capability: u32) {
        raw::write_instruction(&mut self.header, op::CAPABILITY, &[capability]);
    }

    pub fn emit_ext_inst_import(&mut self, name: &str) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![id.0];
        operands.extend(raw::pack_string(name));
        raw::write_instruction(&mut self.header, op::EXT_INST_IMPORT, &operands);
        id
    }

    pub fn emit_memory_model(&mut self, addressing: u32, memory: u32) {
        raw::write_instruction(&mut self.header, op::MEMORY_MODEL, &[addressing, memory]);
    }

    pub fn emit_entry_point(&mut self, execution_model: u32, entry_point: Id, name: &str, interfaces: &[Id]) {
        let mut operands = vec![execution_model, entry_point.0];
        operands.extend(raw::pack_string(name));
        operands.extend(interfaces.iter().map(|i| i.0));
        raw::write_instruction(&mut self.header, op::ENTRY_POINT, &operands);
    }

    pub fn emit_execution_mode(&mut self, entry_point: Id, mode: u32) {
        raw::write_instruction(&mut self.header, op::EXECUTION_MODE, &[entry_point.0, mode]);
    }

    pub fn emit_type_void(&mut self) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_VOID, &[id.0]);
        id
    }

    pub fn emit_type_bool(&mut self) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_BOOL, &[id.0]);
        id
    }

    pub fn emit_type_float(&mut self, width: u32) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_FLOAT, &[id.0, width]);
        id
    }

    pub fn emit_type_int(&mut self, width: u32, signed: bool) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_INT, &[id.0, width, if signed { 1 } else { 0 }]);
        id
    }

    pub fn emit_type_vector(&mut self, component: Id, count: u32) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_VECTOR, &[id.0, component.0, count]);
        id
    }

    pub fn emit_type_matrix(&mut self, column: Id, count: u32) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_MATRIX, &[id.0, column.0, count]);
        id
    }

    pub fn emit_type_array(&mut self, element: Id, length: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_ARRAY, &[id.0, element.0, length.0]);
        id
    }

    pub fn emit_type_struct(&mut self, members: &[Id]) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![id.0];
        operands.extend(members.iter().map(|m| m.0));
        raw::write_instruction(&mut self.constants, op::TYPE_STRUCT, &operands);
        id
    }

    pub fn emit_type_pointer(&mut self, storage: u32, pointee: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_POINTER, &[id.0, storage, pointee.0]);
        id
    }

    pub fn emit_type_function(&mut self, return_type: Id, params: &[Id]) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![id.0, return_type.0];
        operands.extend(params.iter().map(|p| p.0));
        raw::write_instruction(&mut self.constants, op::TYPE_FUNCTION, &operands);
        id
    }

    pub fn emit_constant(&mut self, ty: Id, value_words: &[u32]) -> Id {
        let id = self.allocate_id();
        self.emit_constant_preallocated(id, ty, value_words);
        id
    }

    /// Writes an `OpConstant` for an id already allocated by the caller (the
    /// dedup path through `get_or_create_scalar_constant`, which must know
    /// the id before the instruction itself is emitted).
    pub fn emit_constant_preallocated(&mut self, id: Id, ty: Id, value_words: &[u32]) {
        let mut operands = vec![id.0, ty.0];
        operands.extend_from_slice(value_words);
        raw::write_instruction(&mut self.constants, op::CONSTANT, &operands);
    }

    pub fn emit_constant_bool(&mut self, ty: Id, value: bool) -> Id {
        let id = self.allocate_id();
        self.emit_constant_bool_preallocated(id, ty, value);
        id
    }

    pub fn emit_constant_bool_preallocated(&mut self, id: Id, ty: Id, value: bool) {
        let opcode = if value { op::CONSTANT_TRUE } else { op::CONSTANT_FALSE };
        raw::write_instruction(&mut self.constants, opcode, &[ty.0, id.0]);
    }

    pub fn emit_variable(&mut self, stream_is_instructions: bool, ty: Id, storage: u32) -> Id {
        let id = self.allocate_id();
        let target = if stream_is_instructions { &mut self.instructions } else { &mut self.constants };
        raw::write_instruction(target, op::VARIABLE, &[ty.0, id.0, storage]);
        id
    }

    pub fn emit_type_sampler(&mut self) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_SAMPLER, &[id.0]);
        id
    }

    pub fn emit_type_image(&mut self, sampled_type: Id, dim: u32, depth: u32, arrayed: u32, ms: u32, sampled: u32, format: u32) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_IMAGE, &[id.0, sampled_type.0, dim, depth, arrayed, ms, sampled, format]);
        id
    }

    pub fn emit_type_sampled_image(&mut self, image_type: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.constants, op::TYPE_SAMPLED_IMAGE, &[id.0, image_type.0]);
        id
    }

    pub fn emit_sampled_image(&mut self, result_type: Id, image: Id, sampler: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.instructions, op::SAMPLED_IMAGE, &[result_type.0, id.0, image.0, sampler.0]);
        id
    }

    pub fn emit_image_sample_implicit_lod(&mut self, result_type: Id, sampled_image: Id, coordinate: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.instructions, op::IMAGE_SAMPLE_IMPLICIT_LOD, &[result_type.0, id.0, sampled_image.0, coordinate.0]);
        id
    }

    pub fn emit_access_chain(&mut self, result_type: Id, base: Id, indices: &[Id]) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![result_type.0, id.0, base.0];
        operands.extend(indices.iter().map(|i| i.0));
        raw::write_instruction(&mut self.instructions, op::ACCESS_CHAIN, &operands);
        id
    }

    pub fn emit_load(&mut self, result_type: Id, pointer: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.instructions, op::LOAD, &[result_type.0, id.0, pointer.0]);
        id
    }

    pub fn emit_store(&mut self, pointer: Id, object: Id) {
        raw::write_instruction(&mut self.instructions, op::STORE, &[pointer.0, object.0]);
    }

    pub fn emit_vector_shuffle(&mut self, result_type: Id, vector1: Id, vector2: Id, components: &[u32]) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![result_type.0, id.0, vector1.0, vector2.0];
        operands.extend_from_slice(components);
        raw::write_instruction(&mut self.instructions, op::VECTOR_SHUFFLE, &operands);
        id
    }

    pub fn emit_composite_construct(&mut self, result_type: Id, constituents: &[Id]) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![result_type.0, id.0];
        operands.extend(constituents.iter().map(|c| c.0));
        raw::write_instruction(&mut self.instructions, op::COMPOSITE_CONSTRUCT, &operands);
        id
    }

    pub fn emit_composite_extract(&mut self, result_type: Id, composite: Id, indices: &[u32]) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![result_type.0, id.0, composite.0];
        operands.extend_from_slice(indices);
        raw::write_instruction(&mut self.instructions, op::COMPOSITE_EXTRACT, &operands);
        id
    }

    pub fn emit_binary_op(&mut self, opcode: u16, result_type: Id, a: Id, b_operand: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.instructions, opcode, &[result_type.0, id.0, a.0, b_operand.0]);
        id
    }

    pub fn emit_unary_op(&mut self, opcode: u16, result_type: Id, operand: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.instructions, opcode, &[result_type.0, id.0, operand.0]);
        id
    }

    pub fn emit_function(&mut self, result_type: Id, control: u32, function_type: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.instructions, op::FUNCTION, &[result_type.0, id.0, control, function_type.0]);
        id
    }

    pub fn emit_function_parameter(&mut self, result_type: Id) -> Id {
        let id = self.allocate_id();
        raw::write_instruction(&mut self.instructions, op::FUNCTION_PARAMETER, &[result_type.0, id.0]);
        id
    }

    pub fn emit_function_end(&mut self) {
        raw::write_instruction(&mut self.instructions, op::FUNCTION_END, &[]);
    }

    pub fn emit_function_call(&mut self, result_type: Id, function: Id, args: &[Id]) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![result_type.0, id.0, function.0];
        operands.extend(args.iter().map(|a| a.0));
        raw::write_instruction(&mut self.instructions, op::FUNCTION_CALL, &operands);
        id
    }

    pub fn emit_branch(&mut self, target: Id) {
        raw::write_instruction(&mut self.instructions, op::BRANCH, &[target.0]);
    }

    pub fn emit_branch_conditional(&mut self, condition: Id, true_label: Id, false_label: Id) {
        raw::write_instruction(&mut self.instructions, op::BRANCH_CONDITIONAL, &[condition.0, true_label.0, false_label.0]);
    }

    pub fn emit_selection_merge(&mut self, merge_block: Id, control: u32) {
        raw::write_instruction(&mut self.instructions, op::SELECTION_MERGE, &[merge_block.0, control]);
    }

    pub fn emit_loop_merge(&mut self, merge_block: Id, continue_target: Id, control: u32) {
        raw::write_instruction(&mut self.instructions, op::LOOP_MERGE, &[merge_block.0, continue_target.0, control]);
    }

    pub fn emit_decorate(&mut self, target: Id, decoration: u32, extra: &[u32]) {
        let mut operands = vec![target.0, decoration];
        operands.extend_from_slice(extra);
        raw::write_instruction(&mut self.decorations, op::DECORATE, &operands);
    }

    pub fn emit_member_decorate(&mut self, structure_type: Id, member: u32, decoration: u32, extra: &[u32]) {
        let mut operands = vec![structure_type.0, member, decoration];
        operands.extend_from_slice(extra);
        raw::write_instruction(&mut self.decorations, op::MEMBER_DECORATE, &operands);
    }

    pub fn emit_label(&mut self, id: Id) {
        raw::write_instruction(&mut self.instructions, op::LABEL, &[id.0]);
    }

    pub fn emit_return(&mut self) {
        raw::write_instruction(&mut self.instructions, op::RETURN, &[]);
    }

    pub fn emit_return_value(&mut self, value: Id) {
        raw::write_instruction(&mut self.instructions, op::RETURN_VALUE, &[value.0]);
    }

    /// Concatenate the four streams into the final module, prefixed by the
    /// magic/version/generator/bound/schema header words.
    pub fn finish(mut self, generator_id: u32) -> Vec<u32> {
        let mut module = Vec::with_capacity(
            5 + self.header.len() + self.decorations.len() + self.constants.len() + self.instructions.len(),
        );
        module.push(raw::MAGIC_NUMBER);
        module.push(raw::VERSION);
        module.push(generator_id);
        module.push(self.bound());
        module.push(0);
        module.append(&mut self.header);
        module.append(&mut self.decorations);
        module.append(&mut self.constants);
        module.append(&mut self.instructions);
        module
    }
}

pub fn output_storage_for(is_fragment: bool) -> u32 {
    let _ = is_fragment;
    storage_class::OUTPUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_dedup_reuses_ids() {
        let mut b = Builder::new();
        let float_ty = TypeId::default();
        let a = b.get_or_create_type(float_ty, false, 0, |b| b.emit_type_float(32));
        let c = b.get_or_create_type(float_ty, false, 0, |b| b.emit_type_float(32));
        assert_eq!(a, c);
    }

    #[test]
    fn pointer_and_value_type_are_distinct_entries() {
        let mut b = Builder::new();
        let ty = TypeId::default();
        let value = b.get_or_create_type(ty, false, 0, |b| b.emit_type_float(32));
        let pointer = b.get_or_create_type(ty, true, storage_class::FUNCTION, |b| {
            b.emit_type_pointer(storage_class::FUNCTION, value)
        });
        assert_ne!(value, pointer);
    }

    #[test]
    fn bound_is_next_unused_id() {
        let mut b = Builder::new();
        b.allocate_id();
        b.allocate_id();
        assert_eq!(b.bound(), 3);
    }

    #[test]
    fn finish_concatenates_streams_after_header() {
        let mut b = Builder::new();
        b.emit_capability(raw::capability::SHADER);
        let words = b.finish(44);
        assert_eq!(words[0], raw::MAGIC_NUMBER);
        assert_eq!(words[2], 44);
    }
}
