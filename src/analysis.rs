//! Reachability and descriptor-set analysis over a function's lowered code.
//! Every routine here walks from a single entry function; none of them
//! mutate the `Context`, grounded on
//! `examples/original_source/sources/analyzer.c`.
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::func::{FunctionId, Opcode};
use crate::global::GlobalId;
use crate::sets::SetId;
use crate::ty::TypeId;
use crate::var::VariableId;

/// DFS closure of every function reachable from `entry` through `CALL`,
/// built-ins excluded, `entry` itself excluded from the result.
pub fn find_referenced_functions(ctx: &Context, entry: FunctionId) -> Vec<FunctionId> {
    let mut found = Vec::new();
    visit_calls(ctx, entry, &mut found);
    found
}

fn visit_calls(ctx: &Context, f: FunctionId, found: &mut Vec<FunctionId>) {
    let func = match ctx.functions.get(f) {
        Some(func) if func.block_present => func,
        _ => return,
    };
    for op in &func.code {
        if let Opcode::Call { func: name, .. } = op {
            if let Some(callee_id) = ctx.functions.find_function(*name) {
                let callee = ctx.functions.get(callee_id).unwrap();
                if !callee.block_present {
                    continue;
                }
                if found.contains(&callee_id) {
                    continue;
                }
                found.push(callee_id);
                visit_calls(ctx, callee_id, found);
            }
        }
    }
}

/// Every type mentioned by `entry` or anything it transitively calls:
/// parameter types, return type, and the type of every local (`VAR`).
pub fn find_referenced_types(ctx: &Context, entry: FunctionId) -> Result<Vec<TypeId>> {
    let mut functions = vec![entry];
    functions.extend(find_referenced_functions(ctx, entry));

    let mut types = Vec::new();
    let mut add = |t: TypeId, types: &mut Vec<TypeId>| {
        if !types.contains(&t) {
            types.push(t);
        }
    };

    for f in functions {
        let func = ctx.functions.get(f).unwrap();
        for p in &func.params {
            if p.ty.ty == crate::ty::NO_TYPE {
                return Err(Error::MissingParameterType { ctx: DebugContext::default() });
            }
            add(p.ty.ty, &mut types);
        }
        if func.return_type.ty == crate::ty::NO_TYPE {
            return Err(Error::MissingReturnType { ctx: DebugContext::default() });
        }
        add(func.return_type.ty, &mut types);

        for op in &func.code {
            if let Opcode::Var { ty, .. } = op {
                add(*ty, &mut types);
            }
        }
    }
    Ok(types)
}

/// The global, if any, that owns IR variable `var`.
fn global_for_var(ctx: &Context, var: VariableId, found: &mut Vec<GlobalId>) {
    if let Some(gid) = ctx.globals.find_by_var(var) {
        if !found.contains(&gid) {
            found.push(gid);
        }
    }
}

/// Every global touched by `entry` or anything it transitively calls, found
/// by matching opcode operands against the globals table's variable ids.
pub fn find_referenced_globals(ctx: &Context, entry: FunctionId) -> Vec<GlobalId> {
    let mut functions = vec![entry];
    functions.extend(find_referenced_functions(ctx, entry));

    let mut globals = Vec::new();
    for f in functions {
        let func = ctx.functions.get(f).unwrap();
        for op in &func.code {
            match op {
                Opcode::Binary { left, right, .. } => {
                    global_for_var(ctx, *left, &mut globals);
                    global_for_var(ctx, *right, &mut globals);
                }
                Opcode::LoadAccessList { from, .. } => {
                    global_for_var(ctx, *from, &mut globals);
                }
                Opcode::StoreAccessList { to, from, .. } | Opcode::CompoundStoreAccessList { to, from, .. } => {
                    global_for_var(ctx, *to, &mut globals);
                    global_for_var(ctx, *from, &mut globals);
                }
                Opcode::StoreVariable { to, from } => {
                    global_for_var(ctx, *to, &mut globals);
                    global_for_var(ctx, *from, &mut globals);
                }
                Opcode::Call { params, .. } => {
                    for p in params {
                        global_for_var(ctx, *p, &mut globals);
                    }
                }
                Opcode::Return { value: Some(value) } => {
                    global_for_var(ctx, *value, &mut globals);
                }
                Opcode::If { condition, .. } => {
                    global_for_var(ctx, *condition, &mut globals);
                }
                Opcode::WhileCondition { condition, .. } => {
                    global_for_var(ctx, *condition, &mut globals);
                }
                Opcode::Not { operand, .. } => {
                    global_for_var(ctx, *operand, &mut globals);
                }
                _ => {}
            }
        }
    }
    globals
}

/// Descriptor sets `entry` draws bindings from. A global belonging to
/// exactly one set contributes it unconditionally; a global belonging to
/// several sets only contributes if at least one of them is already present
/// from an unambiguous global, else the set is genuinely ambiguous for this
/// function and compilation fails (spec §4.3).
pub fn find_referenced_sets(ctx: &Context, entry: FunctionId) -> Result<Vec<SetId>> {
    let globals = find_referenced_globals(ctx, entry);

    let mut sets: Vec<SetId> = Vec::new();
    let add_set = |sets: &mut Vec<SetId>, s: SetId| {
        if !sets.contains(&s) {
            sets.push(s);
        }
    };

    for &gid in &globals {
        let g = ctx.globals.get(gid).unwrap();
        if g.sets.len() == 1 {
            add_set(&mut sets, g.sets[0]);
        }
    }

    for &gid in &globals {
        let g = ctx.globals.get(gid).unwrap();
        if g.sets.len() < 2 {
            continue;
        }
        let found = g.sets.iter().any(|s| sets.contains(s));
        if !found {
            let name = ctx.names.get(g.name).unwrap_or("<unknown>").to_owned();
            return Err(Error::AmbiguousDescriptorSet { global: name, ctx: DebugContext::default() });
        }
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::Param;
    use crate::ty::{TypeRef, NO_TYPE};

    #[test]
    fn find_referenced_functions_follows_transitive_calls() {
        let mut ctx = Context::new();
        let helper_name = ctx.names.intern("helper");
        let helper = ctx.functions.add_function(helper_name, TypeRef::scalar(ctx.types.float_id));

        let main_name = ctx.names.intern("main");
        let main = ctx.functions.add_function(main_name, TypeRef::scalar(ctx.types.float_id));
        ctx.functions.get_mut(main).unwrap().code.push(Opcode::Call {
            to: None,
            result_ty: crate::ty::NO_TYPE,
            func: helper_name,
            params: Vec::new(),
        });

        let refs = find_referenced_functions(&ctx, main);
        assert_eq!(refs, vec![helper]);
    }

    #[test]
    fn builtin_callees_are_excluded() {
        let mut ctx = Context::new();
        let sample_name = ctx.names.intern("sample");
        ctx.functions.add_builtin(sample_name, TypeRef::scalar(ctx.types.float4_id));

        let main_name = ctx.names.intern("main");
        let main = ctx.functions.add_function(main_name, TypeRef::scalar(ctx.types.float4_id));
        ctx.functions.get_mut(main).unwrap().code.push(Opcode::Call {
            to: None,
            result_ty: crate::ty::NO_TYPE,
            func: sample_name,
            params: Vec::new(),
        });

        let refs = find_referenced_functions(&ctx, main);
        assert!(refs.is_empty());
    }

    #[test]
    fn ambiguous_global_without_prior_set_errors() {
        let mut ctx = Context::new();
        let g_name = ctx.names.intern("tex");
        let var = ctx.vars.alloc(TypeRef::scalar(ctx.types.tex2d_id), crate::var::VariableKind::Global).id;
        let gid = ctx.globals.add_global(g_name, ctx.types.tex2d_id, var);

        let set_a = ctx.sets.add_set(ctx.names.intern("a")).unwrap();
        let set_b = ctx.sets.add_set(ctx.names.intern("b")).unwrap();
        ctx.sets.add_member(set_a, gid, false);
        ctx.sets.add_member(set_b, gid, false);
        ctx.globals.get_mut(gid).unwrap().sets = vec![set_a, set_b];

        let main_name = ctx.names.intern("main");
        let main = ctx.functions.add_function(main_name, TypeRef::scalar(NO_TYPE));
        ctx.functions.get_mut(main).unwrap().params.push(Param {
            name: ctx.names.intern("unused"),
            ty: TypeRef::scalar(ctx.types.float_id),
            attributes: Vec::new(),
        });
        ctx.functions.get_mut(main).unwrap().return_type = TypeRef::scalar(ctx.types.float_id);
        ctx.functions.get_mut(main).unwrap().code.push(Opcode::StoreVariable { to: var, from: var });

        let err = find_referenced_sets(&ctx, main);
        assert!(matches!(err, Err(Error::AmbiguousDescriptorSet { .. })));
    }

    #[test]
    fn global_referenced_only_as_return_value_is_found() {
        let mut ctx = Context::new();
        let g_name = ctx.names.intern("tint");
        let var = ctx.vars.alloc(TypeRef::scalar(ctx.types.float_id), crate::var::VariableKind::Global).id;
        let gid = ctx.globals.add_global(g_name, ctx.types.float_id, var);

        let main_name = ctx.names.intern("main");
        let main = ctx.functions.add_function(main_name, TypeRef::scalar(ctx.types.float_id));
        ctx.functions.get_mut(main).unwrap().code.push(Opcode::Return { value: Some(var) });

        let globals = find_referenced_globals(&ctx, main);
        assert_eq!(globals, vec![gid]);
    }

    #[test]
    fn global_referenced_only_as_if_condition_is_found() {
        let mut ctx = Context::new();
        let g_name = ctx.names.intern("flag");
        let var = ctx.vars.alloc(TypeRef::scalar(ctx.types.bool_id), crate::var::VariableKind::Global).id;
        let gid = ctx.globals.add_global(g_name, ctx.types.bool_id, var);

        let main_name = ctx.names.intern("main");
        let main = ctx.functions.add_function(main_name, TypeRef::scalar(NO_TYPE));
        let blocks = &mut ctx.blocks;
        let start = blocks.alloc();
        let end = blocks.alloc();
        ctx.functions.get_mut(main).unwrap().code.push(Opcode::If { condition: var, start, end });

        let globals = find_referenced_globals(&ctx, main);
        assert_eq!(globals, vec![gid]);
    }

    #[test]
    fn global_referenced_only_as_compound_store_source_is_found() {
        let mut ctx = Context::new();
        let src_name = ctx.names.intern("tmp_global");
        let src_var = ctx.vars.alloc(TypeRef::scalar(ctx.types.float_id), crate::var::VariableKind::Global).id;
        let gid = ctx.globals.add_global(src_name, ctx.types.float_id, src_var);

        let dst_var = ctx.vars.alloc(TypeRef::scalar(ctx.types.float_id), crate::var::VariableKind::Local).id;

        let main_name = ctx.names.intern("main");
        let main = ctx.functions.add_function(main_name, TypeRef::scalar(NO_TYPE));
        ctx.functions.get_mut(main).unwrap().code.push(Opcode::CompoundStoreAccessList {
            op: crate::func::BinOp::Add,
            to: dst_var,
            from: src_var,
            path: Vec::new(),
        });

        let globals = find_referenced_globals(&ctx, main);
        assert_eq!(globals, vec![gid]);
    }

    #[test]
    fn unambiguous_single_set_global_resolves() {
        let mut ctx = Context::new();
        let g_name = ctx.names.intern("frame_cb");
        let var = ctx.vars.alloc(TypeRef::scalar(ctx.types.float4x4_id), crate::var::VariableKind::Global).id;
        let gid = ctx.globals.add_global(g_name, ctx.types.float4x4_id, var);
        let set_a = ctx.sets.add_set(ctx.names.intern("frame")).unwrap();
        ctx.sets.add_member(set_a, gid, false);
        ctx.globals.get_mut(gid).unwrap().sets = vec![set_a];

        let main_name = ctx.names.intern("main");
        let main = ctx.functions.add_function(main_name, TypeRef::scalar(NO_TYPE));
        ctx.functions.get_mut(main).unwrap().code.push(Opcode::StoreVariable { to: var, from: var });

        let sets = find_referenced_sets(&ctx, main).unwrap();
        assert_eq!(sets, vec![set_a]);
    }
}
