//! Structured representation of the source language's types: the fixed
//! built-in set plus user structs, arrays, and the synthetic swizzle members
//! every vector type carries.
use fnv::FnvHashMap as HashMap;

use crate::name::{NameId, NameTable, NO_NAME};

pub const NO_TYPE: TypeId = TypeId(u32::MAX);
/// Array size meaning "not an array".
pub const NOT_ARRAY: u32 = 0;
/// Array size meaning "unbounded" (e.g. the trailing array of a storage
/// buffer struct).
pub const UNBOUNDED_ARRAY: u32 = u32::MAX;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);
impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Float(f32),
    Int(i32),
    Uint(u32),
    Bool(bool),
    /// An identifier-valued member, e.g. a pipeline block's `vertex: vs_main`
    /// field, which names a function rather than holding a scalar.
    Name(NameId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Int,
    Uint,
    Bool,
}

/// A texture-kind tag, carried by the `texN`-family built-ins. Plain
/// `sampler` objects carry no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Tex2D,
    Tex2DArray,
    TexCube,
}

/// A type reference as used inside a member or a variable: which type, and
/// whether (and how many times) it is arrayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef {
    pub ty: TypeId,
    pub array_size: u32,
}
impl TypeRef {
    pub fn scalar(ty: TypeId) -> Self {
        TypeRef { ty, array_size: NOT_ARRAY }
    }
    pub fn is_array(&self) -> bool {
        self.array_size != NOT_ARRAY
    }
}

/// A single field of a struct type, or a synthesized swizzle accessor of a
/// vector type.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: NameId,
    pub ty: TypeRef,
    /// Decoration/pipeline-block literal value, when this member carries one.
    pub value: Option<Literal>,
    /// Present only for synthesized swizzle members: the ordered component
    /// indices into the parent vector (0-based over `xyzw`/`rgba`).
    pub swizzle: Option<Vec<u8>>,
}
impl Member {
    fn field(name: NameId, ty: TypeRef) -> Self {
        Member { name, ty, value: None, swizzle: None }
    }
    fn synth_swizzle(name: NameId, ty: TypeId, indices: Vec<u8>) -> Self {
        Member {
            name,
            ty: TypeRef::scalar(ty),
            value: None,
            swizzle: Some(indices),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Type {
    pub name: Option<NameId>,
    pub attributes: Vec<NameId>,
    pub members: Vec<Member>,
    pub built_in: bool,
    /// 0 = not an array, `UNBOUNDED_ARRAY` = unbounded; meaningful together
    /// with `base_type`.
    pub array_size: u32,
    /// Element type when `array_size != NOT_ARRAY`, else `NO_TYPE`.
    pub base_type: TypeId,
    pub texture_kind: Option<TextureKind>,
    pub writable: bool,
    scalar: Option<ScalarKind>,
    vector_len: u32,
    matrix_cols: u32,
}
impl Type {
    fn new(name: Option<NameId>) -> Self {
        Type {
            name,
            attributes: Vec::new(),
            members: Vec::new(),
            built_in: false,
            array_size: NOT_ARRAY,
            base_type: NO_TYPE,
            texture_kind: None,
            writable: false,
            scalar: None,
            vector_len: 0,
            matrix_cols: 0,
        }
    }
    pub fn is_scalar(&self) -> bool {
        self.scalar.is_some() && self.vector_len == 0
    }
    pub fn is_vector(&self) -> bool {
        self.vector_len > 0 && self.matrix_cols == 0
    }
    pub fn is_matrix(&self) -> bool {
        self.matrix_cols > 0
    }
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        self.scalar
    }
    /// Number of scalar components in a vector, or row count in a matrix.
    pub fn vector_len(&self) -> u32 {
        self.vector_len
    }
    pub fn matrix_cols(&self) -> u32 {
        self.matrix_cols
    }
    pub fn is_array_type(&self) -> bool {
        self.array_size != NOT_ARRAY
    }
}

/// Interns types, including every built-in, and derives swizzle members for
/// the three vector built-ins. Built-ins must be installed (`TypeTable::new`
/// does this) before user code can reference them.
pub struct TypeTable {
    types: Vec<Type>,
    by_name: HashMap<NameId, TypeId>,

    pub float_id: TypeId,
    pub float2_id: TypeId,
    pub float3_id: TypeId,
    pub float4_id: TypeId,
    pub float2x2_id: TypeId,
    pub float3x3_id: TypeId,
    pub float4x4_id: TypeId,
    pub int_id: TypeId,
    pub int2_id: TypeId,
    pub int3_id: TypeId,
    pub int4_id: TypeId,
    pub uint_id: TypeId,
    pub uint2_id: TypeId,
    pub uint3_id: TypeId,
    pub uint4_id: TypeId,
    pub bool_id: TypeId,
    pub sampler_id: TypeId,
    pub tex2d_id: TypeId,
    pub tex2d_array_id: TypeId,
    pub texcube_id: TypeId,
    pub bvh_id: TypeId,
    pub ray_id: TypeId,
}

impl TypeTable {
    pub fn new(names: &mut NameTable) -> Self {
        let mut t = TypeTable {
            types: Vec::new(),
            by_name: HashMap::default(),
            float_id: NO_TYPE,
            float2_id: NO_TYPE,
            float3_id: NO_TYPE,
            float4_id: NO_TYPE,
            float2x2_id: NO_TYPE,
            float3x3_id: NO_TYPE,
            float4x4_id: NO_TYPE,
            int_id: NO_TYPE,
            int2_id: NO_TYPE,
            int3_id: NO_TYPE,
            int4_id: NO_TYPE,
            uint_id: NO_TYPE,
            uint2_id: NO_TYPE,
            uint3_id: NO_TYPE,
            uint4_id: NO_TYPE,
            bool_id: NO_TYPE,
            sampler_id: NO_TYPE,
            tex2d_id: NO_TYPE,
            tex2d_array_id: NO_TYPE,
            texcube_id: NO_TYPE,
            bvh_id: NO_TYPE,
            ray_id: NO_TYPE,
        };
        t.install_builtins(names);
        t
    }

    fn add_builtin(&mut self, names: &mut NameTable, name: &str) -> TypeId {
        let id = self.add_type(Some(names.intern(name)));
        self.get_mut(id).unwrap().built_in = true;
        id
    }

    fn add_scalar(&mut self, names: &mut NameTable, name: &str, kind: ScalarKind) -> TypeId {
        let id = self.add_builtin(names, name);
        self.get_mut(id).unwrap().scalar = Some(kind);
        id
    }

    fn add_vector(&mut self, names: &mut NameTable, name: &str, kind: ScalarKind, len: u32) -> TypeId {
        let id = self.add_builtin(names, name);
        let t = self.get_mut(id).unwrap();
        t.scalar = Some(kind);
        t.vector_len = len;
        id
    }

    fn add_matrix(&mut self, names: &mut NameTable, name: &str, rows: u32, cols: u32) -> TypeId {
        let id = self.add_builtin(names, name);
        let t = self.get_mut(id).unwrap();
        t.scalar = Some(ScalarKind::Float);
        t.vector_len = rows;
        t.matrix_cols = cols;
        id
    }

    fn install_builtins(&mut self, names: &mut NameTable) {
        self.bool_id = self.add_scalar(names, "bool", ScalarKind::Bool);
        self.float_id = self.add_scalar(names, "float", ScalarKind::Float);
        self.int_id = self.add_scalar(names, "int", ScalarKind::Int);
        self.uint_id = self.add_scalar(names, "uint", ScalarKind::Uint);

        self.float2_id = self.add_vector(names, "float2", ScalarKind::Float, 2);
        self.float3_id = self.add_vector(names, "float3", ScalarKind::Float, 3);
        self.float4_id = self.add_vector(names, "float4", ScalarKind::Float, 4);

        let component_ids = [self.float_id, self.float2_id, self.float3_id, self.float4_id];
        synthesize_swizzles(self, names, self.float2_id, 2, &component_ids);
        synthesize_swizzles(self, names, self.float3_id, 3, &component_ids);
        synthesize_swizzles(self, names, self.float4_id, 4, &component_ids);

        self.int2_id = self.add_vector(names, "int2", ScalarKind::Int, 2);
        self.int3_id = self.add_vector(names, "int3", ScalarKind::Int, 3);
        self.int4_id = self.add_vector(names, "int4", ScalarKind::Int, 4);
        self.uint2_id = self.add_vector(names, "uint2", ScalarKind::Uint, 2);
        self.uint3_id = self.add_vector(names, "uint3", ScalarKind::Uint, 3);
        self.uint4_id = self.add_vector(names, "uint4", ScalarKind::Uint, 4);

        self.float2x2_id = self.add_matrix(names, "float2x2", 2, 2);
        self.float3x3_id = self.add_matrix(names, "float3x3", 3, 3);
        self.float4x4_id = self.add_matrix(names, "float4x4", 4, 4);

        self.sampler_id = self.add_builtin(names, "sampler");
        self.tex2d_id = self.add_builtin(names, "tex2d");
        self.get_mut(self.tex2d_id).unwrap().texture_kind = Some(TextureKind::Tex2D);
        self.tex2d_array_id = self.add_builtin(names, "tex2d_array");
        self.get_mut(self.tex2d_array_id).unwrap().texture_kind = Some(TextureKind::Tex2DArray);
        self.texcube_id = self.add_builtin(names, "texcube");
        self.get_mut(self.texcube_id).unwrap().texture_kind = Some(TextureKind::TexCube);

        self.bvh_id = self.add_builtin(names, "bvh");
        self.ray_id = self.add_builtin(names, "ray");
    }

    /// Intern a fresh type (struct, array-of-T, or any other user type).
    /// Always returns a new id; use `find_type_by_name` to check for an
    /// existing type first if that's the intent.
    pub fn add_type(&mut self, name: Option<NameId>) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(Type::new(name));
        if let Some(n) = name {
            if n != NO_NAME {
                self.by_name.entry(n).or_insert(id);
            }
        }
        id
    }

    /// Intern an opaque array-of-T type. `array_size` follows the `NOT_ARRAY`
    /// / `UNBOUNDED_ARRAY` convention of `TypeRef`.
    pub fn add_array_type(&mut self, base: TypeId, array_size: u32) -> TypeId {
        let id = self.add_type(None);
        let t = self.get_mut(id).unwrap();
        t.array_size = array_size;
        t.base_type = base;
        id
    }

    pub fn add_struct_member(&mut self, ty: TypeId, name: NameId, member_ty: TypeRef) {
        if let Some(t) = self.get_mut(ty) {
            t.members.push(Member::field(name, member_ty));
        }
    }

    /// Add a member carrying a literal value, e.g. a `pipe`-attributed type's
    /// `vertex: vs_main` field, where `value` names the stage function.
    pub fn add_struct_member_with_value(&mut self, ty: TypeId, name: NameId, member_ty: TypeRef, value: Literal) {
        if let Some(t) = self.get_mut(ty) {
            let mut m = Member::field(name, member_ty);
            m.value = Some(value);
            t.members.push(m);
        }
    }

    /// Whether `ty` carries `attribute` in its attribute list (e.g. `pipe`).
    pub fn has_attribute(&self, ty: TypeId, attribute: NameId) -> bool {
        self.get(ty).map(|t| t.attributes.contains(&attribute)).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i as u32), t))
    }

    /// The SPIR-V struct-field index of `name` within `ty`, counting only
    /// real fields (synthesized swizzle members never become SPIR-V struct
    /// fields, so they're skipped when numbering).
    pub fn struct_member_index(&self, ty: TypeId, name: NameId) -> Option<u32> {
        let t = self.get(ty)?;
        t.members.iter().filter(|m| m.swizzle.is_none()).position(|m| m.name == name).map(|i| i as u32)
    }

    pub fn find_type_by_name(&self, name: NameId) -> TypeId {
        self.by_name.get(&name).copied().unwrap_or(NO_TYPE)
    }

    /// The scalar built-in matching `kind`, used when a vector is indexed
    /// dynamically and the backend needs the resulting component's type.
    pub fn scalar_type_id(&self, kind: ScalarKind) -> TypeId {
        match kind {
            ScalarKind::Float => self.float_id,
            ScalarKind::Int => self.int_id,
            ScalarKind::Uint => self.uint_id,
            ScalarKind::Bool => self.bool_id,
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&Type> {
        if id == NO_TYPE {
            return None;
        }
        self.types.get(id.index())
    }

    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut Type> {
        if id == NO_TYPE {
            return None;
        }
        self.types.get_mut(id.index())
    }

    /// Resolve a member (field or synthesized swizzle) of `ty` by name.
    pub fn find_member<'a>(&'a self, ty: TypeId, member_name: NameId) -> Option<&'a Member> {
        self.get(ty)?.members.iter().find(|m| m.name == member_name)
    }

    pub fn type_name(&self, names: &NameTable, id: TypeId) -> String {
        self.get(id)
            .and_then(|t| t.name)
            .and_then(|n| names.get(n))
            .map(|s| s.to_owned())
            .unwrap_or_else(|| "<anonymous>".to_owned())
    }
}

/// Mirrors `types.c`'s `permute`/`vecN_found_*` family: for a vector type of
/// `arity` components, every permutation of length 1..=arity over `xyzw`
/// (then again over `rgba`) is added as a synthetic member, shorter lengths
/// first, letter sets in that fixed order. Permutations allow repeated
/// indices (`vec.xx` is valid); within a length, enumeration order matches
/// the source's nested recursion: the first index varies slowest.
fn synthesize_swizzles(
    t: &mut TypeTable,
    names: &mut NameTable,
    vector_ty: TypeId,
    arity: u32,
    component_ids: &[TypeId; 4],
) {
    const LETTER_SETS: [[char; 4]; 2] = [['x', 'y', 'z', 'w'], ['r', 'g', 'b', 'a']];
    for letters in &LETTER_SETS {
        for len in 1..=arity as usize {
            let mut out = Vec::new();
            permute(&letters[..arity as usize], len, &mut Vec::new(), &mut out);
            let component_ty = component_ids[len - 1];
            for indices in out {
                let name: String = indices.iter().map(|&i| letters[i as usize]).collect();
                let name_id = names.intern(&name);
                let member = Member::synth_swizzle(name_id, component_ty, indices);
                t.get_mut(vector_ty).unwrap().members.push(member);
            }
        }
    }
}

/// Enumerate every length-`k` sequence of indices into `set` (repetition
/// allowed), in the same order as the source's recursive `permute_for_real`:
/// the first chosen index is the slowest-varying.
fn permute(set: &[char], k: usize, prefix: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
    if k == 0 {
        out.push(prefix.clone());
        return;
    }
    for i in 0..set.len() {
        prefix.push(i as u8);
        permute(set, k - 1, prefix, out);
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float2_gets_xy_and_rg_swizzles() {
        let mut names = NameTable::new();
        let types = TypeTable::new(&mut names);
        let t = types.get(types.float2_id).unwrap();
        // 2 (len1) + 4 (len2) per letter set, times two letter sets.
        assert_eq!(t.members.len(), 12);
        let xy = names.find("xy").unwrap();
        let m = t.members.iter().find(|m| m.name == xy).unwrap();
        assert_eq!(m.swizzle.as_deref(), Some(&[0u8, 1][..]));
        assert_eq!(m.ty.ty, types.float2_id);
    }

    #[test]
    fn float4_xyz_then_yx_is_s3_scenario() {
        let mut names = NameTable::new();
        let types = TypeTable::new(&mut names);
        let t = types.get(types.float4_id).unwrap();
        let xyz = names.find("xyz").unwrap();
        let m = t.members.iter().find(|m| m.name == xyz).unwrap();
        assert_eq!(m.swizzle.as_deref(), Some(&[0u8, 1, 2][..]));
        assert_eq!(m.ty.ty, types.float3_id);

        let t2 = types.get(types.float3_id).unwrap();
        let yx = names.find("yx").unwrap();
        let m2 = t2.members.iter().find(|m| m.name == yx).unwrap();
        assert_eq!(m2.swizzle.as_deref(), Some(&[1u8, 0][..]));
        assert_eq!(m2.ty.ty, types.float2_id);
    }

    #[test]
    fn builtins_installed_before_any_user_type() {
        let mut names = NameTable::new();
        let mut types = TypeTable::new(&mut names);
        assert_ne!(types.float4_id, NO_TYPE);
        let user_name = names.intern("Scene");
        let user = types.add_type(Some(user_name));
        assert_ne!(user, types.float4_id);
    }
}
