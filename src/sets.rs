//! Descriptor sets: named groups of globals, with per-global writability,
//! and descriptor-set groups referenced by functions.
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::global::GlobalId;
use crate::name::NameId;

pub const MAX_SETS: usize = 256;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetId(u32);
impl SetId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetMember {
    pub global: GlobalId,
    pub writable: bool,
}

#[derive(Debug, Clone)]
pub struct DescriptorSet {
    pub name: NameId,
    pub members: Vec<SetMember>,
}

/// The special set name that receives binding 0 exclusively, per spec §4.4.
pub const ROOT_CONSTANTS: &str = "root_constants";

#[derive(Default)]
pub struct SetsTable {
    sets: Vec<DescriptorSet>,
}

impl SetsTable {
    pub fn new() -> Self {
        SetsTable::default()
    }

    /// Find-or-add the named set, capacity-checked like the original
    /// `add_set` in `sets.c`.
    pub fn add_set(&mut self, name: NameId) -> Result<SetId> {
        if let Some(i) = self.sets.iter().position(|s| s.name == name) {
            return Ok(SetId(i as u32));
        }
        if self.sets.len() >= MAX_SETS {
            return Err(Error::CapacityExceeded {
                what: "set",
                limit: MAX_SETS,
                ctx: DebugContext::default(),
            });
        }
        let id = SetId(self.sets.len() as u32);
        self.sets.push(DescriptorSet { name, members: Vec::new() });
        Ok(id)
    }

    /// Add `global` to `set` unless already present; records the set on the
    /// global's own reverse list so `find_referenced_sets` can ask a global
    /// directly how many sets it belongs to.
    pub fn add_member(&mut self, set: SetId, global: GlobalId, writable: bool) {
        let s = &mut self.sets[set.index()];
        if s.members.iter().any(|m| m.global == global) {
            return;
        }
        s.members.push(SetMember { global, writable });
    }

    pub fn get(&self, id: SetId) -> Option<&DescriptorSet> {
        self.sets.get(id.index())
    }

    /// Read-only lookup by name, unlike `add_set` which creates the set on a
    /// miss.
    pub fn find_set(&self, name: NameId) -> Option<SetId> {
        self.sets.iter().position(|s| s.name == name).map(|i| SetId(i as u32))
    }

    /// Ordered list of globals belonging to `set`.
    pub fn members(&self, id: SetId) -> &[SetMember] {
        self.sets.get(id.index()).map(|s| s.members.as_slice()).unwrap_or(&[])
    }
}

/// An ordered list of descriptor sets a function draws its bindings from.
pub type SetGroup = Vec<SetId>;

/// The lone global belonging to the `root_constants` set, if that set is
/// declared at all. Validates spec §4.4's "must contain exactly one struct
/// global" invariant along the way, so a malformed `root_constants` set (0,
/// 2+, or a non-struct member) errors here instead of silently falling
/// through to the textual/C-integration backends.
pub fn root_constant_global(ctx: &Context) -> Result<Option<GlobalId>> {
    let name = match ctx.names.find(ROOT_CONSTANTS) {
        Some(n) => n,
        None => return Ok(None),
    };
    let set_id = match ctx.sets.find_set(name) {
        Some(s) => s,
        None => return Ok(None),
    };
    let members = ctx.sets.members(set_id);
    if members.len() != 1 {
        return Err(Error::InvalidRootConstants { ctx: DebugContext::default() });
    }
    let gid = members[0].global;
    let global = ctx.globals.get(gid).ok_or(Error::InvalidRootConstants { ctx: DebugContext::default() })?;
    let is_struct = ctx
        .types
        .get(global.ty)
        .map(|t| !t.is_scalar() && !t.is_vector() && !t.is_matrix() && !t.is_array_type() && t.texture_kind.is_none())
        .unwrap_or(false)
        && global.ty != ctx.types.sampler_id;
    if !is_struct {
        return Err(Error::InvalidRootConstants { ctx: DebugContext::default() });
    }
    Ok(Some(gid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::NameTable;
    use crate::var::VariableKind;

    #[test]
    fn add_set_is_idempotent_by_name() {
        let mut names = NameTable::new();
        let mut sets = SetsTable::new();
        let n = names.intern("frame");
        let a = sets.add_set(n).unwrap();
        let b = sets.add_set(n).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn no_root_constants_set_is_not_an_error() {
        let ctx = Context::new();
        assert_eq!(root_constant_global(&ctx).unwrap(), None);
    }

    #[test]
    fn single_struct_member_is_the_root_constant() {
        let mut ctx = Context::new();
        let struct_name = ctx.names.intern("PushConstants");
        let struct_ty = ctx.types.add_type(Some(struct_name));
        ctx.types.add_struct_member(struct_ty, ctx.names.intern("tint"), crate::ty::TypeRef::scalar(ctx.types.float4_id));

        let g_name = ctx.names.intern("push");
        let var = ctx.vars.alloc(crate::ty::TypeRef::scalar(struct_ty), VariableKind::Global).id;
        let gid = ctx.globals.add_global(g_name, struct_ty, var);

        let set_name = ctx.names.intern(ROOT_CONSTANTS);
        let set_id = ctx.sets.add_set(set_name).unwrap();
        ctx.sets.add_member(set_id, gid, false);

        assert_eq!(root_constant_global(&ctx).unwrap(), Some(gid));
    }

    #[test]
    fn two_members_in_root_constants_is_rejected() {
        let mut ctx = Context::new();
        let set_name = ctx.names.intern(ROOT_CONSTANTS);
        let set_id = ctx.sets.add_set(set_name).unwrap();

        for n in ["a", "b"] {
            let struct_name = ctx.names.intern(&format!("S{}", n));
            let struct_ty = ctx.types.add_type(Some(struct_name));
            ctx.types.add_struct_member(struct_ty, ctx.names.intern("v"), crate::ty::TypeRef::scalar(ctx.types.float_id));
            let var = ctx.vars.alloc(crate::ty::TypeRef::scalar(struct_ty), VariableKind::Global).id;
            let gid = ctx.globals.add_global(ctx.names.intern(n), struct_ty, var);
            ctx.sets.add_member(set_id, gid, false);
        }

        assert!(matches!(root_constant_global(&ctx), Err(Error::InvalidRootConstants { .. })));
    }

    #[test]
    fn non_struct_root_constants_member_is_rejected() {
        let mut ctx = Context::new();
        let g_name = ctx.names.intern("bad");
        let var = ctx.vars.alloc(crate::ty::TypeRef::scalar(ctx.types.float_id), VariableKind::Global).id;
        let gid = ctx.globals.add_global(g_name, ctx.types.float_id, var);

        let set_name = ctx.names.intern(ROOT_CONSTANTS);
        let set_id = ctx.sets.add_set(set_name).unwrap();
        ctx.sets.add_member(set_id, gid, false);

        assert!(matches!(root_constant_global(&ctx), Err(Error::InvalidRootConstants { .. })));
    }
}
