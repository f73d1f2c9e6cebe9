//! AST → IR lowering. Walks an already-parsed, already-typed function block
//! and appends opcodes to that function's code buffer (spec §4.2).
use fnv::FnvHashMap as HashMap;

use crate::ast::{Block, Expr, ExprKind, Stmt};
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::func::{AccessPath, AccessStep, BinOp, FunctionId, Opcode};
use crate::ty::{TypeRef, NO_TYPE};
use crate::var::{VariableId, VariableKind, NO_VARIABLE};

type Scope = HashMap<String, (VariableId, TypeRef)>;

struct Lowerer<'a> {
    ctx: &'a mut Context,
    scopes: Vec<Scope>,
    code: Vec<Opcode>,
}

impl<'a> Lowerer<'a> {
    fn new(ctx: &'a mut Context) -> Self {
        Lowerer { ctx, scopes: vec![Scope::default()], code: Vec::new() }
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }
    fn pop_scope(&mut self) {
        self.scopes.pop();
    }
    fn declare(&mut self, name: &str, var: VariableId, ty: TypeRef) {
        self.scopes.last_mut().unwrap().insert(name.to_owned(), (var, ty));
    }

    /// Resolve `name` by walking the enclosing block chain outward, then
    /// falling back to the globals table (spec §4.2).
    fn resolve(&mut self, name: &str, ctx: DebugContext) -> Result<(VariableId, TypeRef)> {
        for scope in self.scopes.iter().rev() {
            if let Some(found) = scope.get(name) {
                return Ok(*found);
            }
        }
        let name_id = self.ctx.names.intern(name);
        if let Some(gid) = self.ctx.globals.find_by_name(name_id) {
            let g = self.ctx.globals.get(gid).unwrap();
            return Ok((g.var, TypeRef::scalar(g.ty)));
        }
        Err(Error::UnknownName { name: name.to_owned(), ctx })
    }

    fn alloc(&mut self, ty: TypeRef) -> VariableId {
        self.ctx.vars.alloc(ty, VariableKind::Internal).id
    }

    /// Walk a chain of `Member`/`Index` nodes down to its `Name` root,
    /// building one combined access path. Every binary-tree of accesses
    /// collapses to exactly one opcode at the call site (spec §4.2).
    fn lower_access_path(&mut self, expr: &Expr) -> Result<(VariableId, AccessPath, TypeRef)> {
        match &expr.kind {
            ExprKind::Name(name) => {
                let (var, ty) = self.resolve(name, expr.ctx)?;
                Ok((var, Vec::new(), ty))
            }
            ExprKind::Member { base, member } => {
                let (root, mut path, base_ty) = self.lower_access_path(base)?;
                let member_name_id = self.ctx.names.intern(member);
                let m = self
                    .ctx
                    .types
                    .find_member(base_ty.ty, member_name_id)
                    .ok_or_else(|| Error::NoSuchMember {
                        ty: self.ctx.types.type_name(&self.ctx.names, base_ty.ty),
                        member: member.clone(),
                        ctx: expr.ctx,
                    })?
                    .clone();
                let ty_after = m.ty;
                if let Some(indices) = m.swizzle {
                    path.push(AccessStep::Swizzle(indices));
                } else {
                    path.push(AccessStep::Member { name: member_name_id, ty_after: ty_after.ty });
                }
                Ok((root, path, ty_after))
            }
            ExprKind::Index { base, index } => {
                let (root, mut path, base_ty) = self.lower_access_path(base)?;
                let (index_var, _) = self.lower_expr(index)?;
                let base_t = self.ctx.types.get(base_ty.ty);
                let ty_after = match base_t {
                    Some(t) if t.is_array_type() => TypeRef::scalar(t.base_type),
                    Some(t) if t.is_vector() => {
                        let kind = t.scalar_kind().expect("vector carries a scalar kind");
                        TypeRef::scalar(self.ctx.types.scalar_type_id(kind))
                    }
                    _ => return Err(Error::MalformedAccessChain { ctx: expr.ctx }),
                };
                path.push(AccessStep::Element { index: index_var, ty_after: ty_after.ty });
                Ok((root, path, ty_after))
            }
            _ => Err(Error::MalformedAccessChain { ctx: expr.ctx }),
        }
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<(VariableId, TypeRef)> {
        match &expr.kind {
            ExprKind::FloatLiteral(v) => {
                let to = self.alloc(TypeRef::scalar(self.ctx.types.float_id));
                self.code.push(Opcode::LoadFloatConstant { to, value: *v });
                Ok((to, TypeRef::scalar(self.ctx.types.float_id)))
            }
            ExprKind::IntLiteral(v) => {
                let to = self.alloc(TypeRef::scalar(self.ctx.types.int_id));
                self.code.push(Opcode::LoadIntConstant { to, value: *v });
                Ok((to, TypeRef::scalar(self.ctx.types.int_id)))
            }
            ExprKind::BoolLiteral(v) => {
                let to = self.alloc(TypeRef::scalar(self.ctx.types.bool_id));
                self.code.push(Opcode::LoadBoolConstant { to, value: *v });
                Ok((to, TypeRef::scalar(self.ctx.types.bool_id)))
            }
            ExprKind::Name(_) => {
                let (root, path, ty) = self.lower_access_path(expr)?;
                debug_assert!(path.is_empty());
                Ok((root, ty))
            }
            ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let (root, path, ty) = self.lower_access_path(expr)?;
                if path.is_empty() {
                    return Ok((root, ty));
                }
                let to = self.alloc(ty);
                self.code.push(Opcode::LoadAccessList { to, from: root, path });
                Ok((to, ty))
            }
            ExprKind::Not(operand) => {
                let (v, ty) = self.lower_expr(operand)?;
                let to = self.alloc(ty);
                self.code.push(Opcode::Not { result: to, result_ty: ty.ty, operand: v });
                Ok((to, ty))
            }
            ExprKind::Binary { op, left, right } => {
                let (lv, lty) = self.lower_expr(left)?;
                let (rv, rty) = self.lower_expr(right)?;
                let result_ty = self.binary_result_type(*op, lty, rty);
                let to = self.alloc(result_ty);
                self.code.push(Opcode::Binary { op: *op, result: to, result_ty: result_ty.ty, left: lv, right: rv });
                Ok((to, result_ty))
            }
            ExprKind::Call { func, args } => {
                let mut params = Vec::with_capacity(args.len());
                for a in args {
                    params.push(self.lower_expr(a)?.0);
                }
                let func_name_id = self.ctx.names.intern(func);
                let fid = self
                    .ctx
                    .functions
                    .find_function(func_name_id)
                    .ok_or_else(|| Error::UnknownName { name: func.clone(), ctx: expr.ctx })?;
                let return_ty = self.ctx.functions.get(fid).unwrap().return_type;
                let to = if return_ty.ty != NO_TYPE { Some(self.alloc(return_ty)) } else { None };
                self.code.push(Opcode::Call { to, result_ty: return_ty.ty, func: func_name_id, params });
                Ok((to.unwrap_or(NO_VARIABLE), return_ty))
            }
        }
    }

    /// Static selection among matrix/vector/scalar combinations for
    /// `MULTIPLY`, made at lowering time so every backend reproduces the
    /// same choice (spec §4.2). Other binary ops keep the left operand's
    /// type, except comparisons, which always yield `bool`.
    fn binary_result_type(&self, op: BinOp, lty: TypeRef, rty: TypeRef) -> TypeRef {
        if op.is_comparison() {
            return TypeRef::scalar(self.ctx.types.bool_id);
        }
        if op == BinOp::Multiply {
            let l = self.ctx.types.get(lty.ty);
            let r = self.ctx.types.get(rty.ty);
            match (l, r) {
                (Some(l), Some(_r)) if l.is_matrix() => {
                    if self.ctx.types.get(rty.ty).map(|t| t.is_matrix()).unwrap_or(false) {
                        lty // matrix * matrix
                    } else {
                        rty // matrix * vector
                    }
                }
                (Some(l), _) if l.is_vector() => lty, // vector * matrix or elementwise
                _ => rty,
            }
        } else {
            rty
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr(e) => {
                self.lower_expr(e)?;
                Ok(())
            }
            Stmt::VarDecl { name, ty, init, ctx } => {
                let var = self.ctx.vars.alloc(*ty, VariableKind::Local).id;
                self.code.push(Opcode::Var { var, ty: ty.ty });
                self.declare(name, var, *ty);
                if let Some(init) = init {
                    let (v, _) = self.lower_expr(init)?;
                    self.code.push(Opcode::StoreVariable { to: var, from: v });
                }
                let _ = ctx;
                Ok(())
            }
            Stmt::Assign { target, value } => {
                let (root, path, _ty) = self.lower_access_path(target)?;
                let (v, _) = self.lower_expr(value)?;
                if path.is_empty() {
                    self.code.push(Opcode::StoreVariable { to: root, from: v });
                } else {
                    self.code.push(Opcode::StoreAccessList { to: root, from: v, path });
                }
                Ok(())
            }
            Stmt::CompoundAssign { op, target, value } => {
                let (root, path, ty_after) = self.lower_access_path(target)?;
                let (v, _) = self.lower_expr(value)?;
                if path.is_empty() {
                    let to = self.alloc(ty_after);
                    self.code.push(Opcode::Binary { op: *op, result: to, result_ty: ty_after.ty, left: root, right: v });
                    self.code.push(Opcode::StoreVariable { to: root, from: to });
                } else {
                    self.code.push(Opcode::CompoundStoreAccessList { op: *op, to: root, from: v, path });
                }
                Ok(())
            }
            Stmt::If { cond, then_block } => {
                let (condv, _) = self.lower_expr(cond)?;
                let start = self.ctx.blocks.alloc();
                let end = self.ctx.blocks.alloc();
                self.code.push(Opcode::If { condition: condv, start, end });
                self.code.push(Opcode::BlockStart { id: start });
                self.push_scope();
                self.lower_block(then_block)?;
                self.pop_scope();
                self.code.push(Opcode::BlockEnd { id: start });
                Ok(())
            }
            Stmt::While { cond, body } => {
                let start = self.ctx.blocks.alloc();
                let continue_ = self.ctx.blocks.alloc();
                let end = self.ctx.blocks.alloc();
                self.code.push(Opcode::WhileStart { start, continue_, end });
                self.code.push(Opcode::BlockStart { id: start });
                let (condv, _) = self.lower_expr(cond)?;
                self.code.push(Opcode::WhileCondition { condition: condv, end });
                self.push_scope();
                self.lower_block(body)?;
                self.pop_scope();
                self.code.push(Opcode::WhileEnd { start, continue_, end });
                Ok(())
            }
            Stmt::DoWhile { body, cond } => {
                let start = self.ctx.blocks.alloc();
                let continue_ = self.ctx.blocks.alloc();
                let end = self.ctx.blocks.alloc();
                self.code.push(Opcode::WhileStart { start, continue_, end });
                self.code.push(Opcode::BlockStart { id: start });
                self.push_scope();
                self.lower_block(body)?;
                self.pop_scope();
                let (condv, _) = self.lower_expr(cond)?;
                self.code.push(Opcode::WhileCondition { condition: condv, end });
                self.code.push(Opcode::WhileEnd { start, continue_, end });
                Ok(())
            }
            Stmt::Return { value, ctx } => {
                let v = match value {
                    Some(e) => Some(self.lower_expr(e)?.0),
                    None => None,
                };
                let _ = ctx;
                self.code.push(Opcode::Return { value: v });
                Ok(())
            }
            Stmt::Block(b) => {
                let id = self.ctx.blocks.alloc();
                self.code.push(Opcode::BlockStart { id });
                self.push_scope();
                self.lower_block(b)?;
                self.pop_scope();
                self.code.push(Opcode::BlockEnd { id });
                Ok(())
            }
        }
    }

    fn lower_block(&mut self, block: &Block) -> Result<()> {
        for stmt in block {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }
}

/// Lower `block` into `function`'s code buffer. Parameters are pre-declared
/// in the outermost scope so the body can reference them by name.
pub fn lower_function(ctx: &mut Context, function: FunctionId, block: &Block) -> Result<()> {
    let params: Vec<(String, VariableId, TypeRef)> = {
        let f = ctx.functions.get(function).ok_or_else(|| Error::UnknownName {
            name: "<function>".to_owned(),
            ctx: DebugContext::default(),
        })?;
        f.params
            .iter()
            .map(|p| {
                let name = ctx.names.get(p.name).unwrap_or("").to_owned();
                (name, VariableId::default(), p.ty)
            })
            .collect()
    };

    let mut lowerer = Lowerer::new(ctx);
    let mut param_vars = Vec::with_capacity(params.len());
    for (name, _, ty) in &params {
        let var = lowerer.ctx.vars.alloc(*ty, VariableKind::Local).id;
        lowerer.declare(name, var, *ty);
        param_vars.push(var);
    }
    lowerer.lower_block(block)?;
    let code = lowerer.code;
    let f = ctx.functions.get_mut(function).unwrap();
    f.code = code;
    f.param_vars = param_vars;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DebugContext;
    use crate::ty::TypeRef;

    fn ctx_with_fn(ret: TypeRef) -> (Context, FunctionId) {
        let mut ctx = Context::new();
        let name = ctx.names.intern("main");
        let fid = ctx.functions.add_function(name, ret);
        (ctx, fid)
    }

    #[test]
    fn float_literal_allocates_strictly_increasing_ids() {
        let (mut ctx, fid) = ctx_with_fn(TypeRef::scalar(NO_TYPE));
        let block: Block = vec![
            Stmt::VarDecl {
                name: "a".into(),
                ty: TypeRef::scalar(ctx.types.float_id),
                init: Some(Expr::new(ExprKind::FloatLiteral(1.0), TypeRef::scalar(ctx.types.float_id), DebugContext::default())),
                ctx: DebugContext::default(),
            },
            Stmt::VarDecl {
                name: "b".into(),
                ty: TypeRef::scalar(ctx.types.float_id),
                init: Some(Expr::new(ExprKind::FloatLiteral(2.0), TypeRef::scalar(ctx.types.float_id), DebugContext::default())),
                ctx: DebugContext::default(),
            },
        ];
        lower_function(&mut ctx, fid, &block).unwrap();
        let code = &ctx.functions.get(fid).unwrap().code;
        let mut defined = Vec::new();
        for op in code {
            if let Opcode::Var { var, .. } = op {
                defined.push(*var);
            }
        }
        assert_eq!(defined.len(), 2);
    }

    /// Non-`MULTIPLY` arithmetic takes its result type from the right
    /// operand, matching the original's uniform `right_var.type` allocation
    /// for `ADD`/`SUB`/`DIVIDE`/`MULTIPLY`.
    #[test]
    fn add_result_type_follows_right_operand() {
        let mut ctx = Context::new();
        let float3 = ctx.types.float3_id;
        let float_ty = ctx.types.float_id;
        let name = ctx.names.intern("main");
        let fid = ctx.functions.add_function(name, TypeRef::scalar(float_ty));
        ctx.functions
            .add_param(fid, crate::func::Param { name: ctx.names.intern("v"), ty: TypeRef::scalar(float3), attributes: Vec::new() })
            .unwrap();
        ctx.functions
            .add_param(fid, crate::func::Param { name: ctx.names.intern("f"), ty: TypeRef::scalar(float_ty), attributes: Vec::new() })
            .unwrap();

        let block: Block = vec![Stmt::Return {
            value: Some(Expr::new(
                ExprKind::Binary {
                    op: BinOp::Add,
                    left: Box::new(Expr::new(ExprKind::Name("v".into()), TypeRef::scalar(float3), DebugContext::default())),
                    right: Box::new(Expr::new(ExprKind::Name("f".into()), TypeRef::scalar(float_ty), DebugContext::default())),
                },
                TypeRef::scalar(float_ty),
                DebugContext::default(),
            )),
            ctx: DebugContext::default(),
        }];
        lower_function(&mut ctx, fid, &block).unwrap();

        let code = &ctx.functions.get(fid).unwrap().code;
        let binary = code.iter().find_map(|op| match op {
            Opcode::Binary { result_ty, .. } => Some(*result_ty),
            _ => None,
        });
        assert_eq!(binary, Some(float_ty));
    }

    #[test]
    fn unknown_name_fails_with_context() {
        let (mut ctx, fid) = ctx_with_fn(TypeRef::scalar(NO_TYPE));
        let block: Block = vec![Stmt::Return {
            value: Some(Expr::new(ExprKind::Name("nope".into()), TypeRef::scalar(NO_TYPE), DebugContext::new(3, 5))),
            ctx: DebugContext::default(),
        }];
        let err = lower_function(&mut ctx, fid, &block).unwrap_err();
        match err {
            Error::UnknownName { name, .. } => assert_eq!(name, "nope"),
            _ => panic!("expected UnknownName"),
        }
    }

    #[test]
    fn compound_access_list_store_fuses_into_one_opcode() {
        let (mut ctx, fid) = ctx_with_fn(TypeRef::scalar(NO_TYPE));
        let float3 = ctx.types.float3_id;
        ctx.functions.add_param(
            fid,
            crate::func::Param { name: ctx.names.intern("tmp"), ty: TypeRef::scalar(float3), attributes: Vec::new() },
        )
        .unwrap();
        let out_ty = {
            let struct_name = ctx.names.intern("VOut");
            let s = ctx.types.add_type(Some(struct_name));
            let color_name = ctx.names.intern("color");
            ctx.types.add_struct_member(s, color_name, TypeRef::scalar(ctx.types.float4_id));
            s
        };
        ctx.functions.add_param(
            fid,
            crate::func::Param { name: ctx.names.intern("out"), ty: TypeRef::scalar(out_ty), attributes: Vec::new() },
        )
        .unwrap();

        let block: Block = vec![Stmt::CompoundAssign {
            op: BinOp::Add,
            target: Expr::new(
                ExprKind::Member {
                    base: Box::new(Expr::new(
                        ExprKind::Member {
                            base: Box::new(Expr::new(ExprKind::Name("out".into()), TypeRef::scalar(out_ty), DebugContext::default())),
                            member: "color".into(),
                        },
                        TypeRef::scalar(ctx.types.float4_id),
                        DebugContext::default(),
                    )),
                    member: "rgb".into(),
                },
                TypeRef::scalar(ctx.types.float3_id),
                DebugContext::default(),
            ),
            value: Expr::new(ExprKind::Name("tmp".into()), TypeRef::scalar(float3), DebugContext::default()),
        }];
        lower_function(&mut ctx, fid, &block).unwrap();
        let code = &ctx.functions.get(fid).unwrap().code;
        assert_eq!(code.len(), 1);
        match &code[0] {
            Opcode::CompoundStoreAccessList { path, .. } => assert_eq!(path.len(), 2),
            other => panic!("expected CompoundStoreAccessList, got {:?}", other),
        }
    }
}
