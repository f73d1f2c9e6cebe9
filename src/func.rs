//! The IR opcode set and the functions table that owns each function's code
//! buffer.
use crate::error::{DebugContext, Error, Result};
use crate::name::NameId;
use crate::sets::SetGroup;
use crate::ty::{TypeId, TypeRef};
use crate::var::{BlockId, VariableId};

pub const MAX_PARAMETERS: usize = 256;

/// One step of an access path: member-by-name, dynamic element, or swizzle.
#[derive(Debug, Clone)]
pub enum AccessStep {
    Member { name: NameId, ty_after: TypeId },
    /// Array subscript; the index is itself an IR value, not a literal.
    Element { index: VariableId, ty_after: TypeId },
    /// 1-4 component indices over `xyzw`.
    Swizzle(Vec<u8>),
}

pub type AccessPath = Vec<AccessStep>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Multiply,
    Divide,
    Mod,
    Equals,
    NotEquals,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    And,
    Or,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    RightShift,
}
impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Equals
                | BinOp::NotEquals
                | BinOp::Greater
                | BinOp::GreaterEqual
                | BinOp::Less
                | BinOp::LessEqual
        )
    }
}

#[derive(Debug, Clone)]
pub enum Opcode {
    /// Declares a local. Carries its own type, mirroring the source's
    /// `op_var` embedding a full `variable` (id + type) rather than just an
    /// id, so the analyzer can recover every local's type from the code
    /// buffer alone.
    Var {
        var: VariableId,
        ty: TypeId,
    },
    LoadFloatConstant {
        to: VariableId,
        value: f32,
    },
    LoadIntConstant {
        to: VariableId,
        value: i32,
    },
    LoadBoolConstant {
        to: VariableId,
        value: bool,
    },
    LoadAccessList {
        to: VariableId,
        from: VariableId,
        path: AccessPath,
    },
    StoreVariable {
        to: VariableId,
        from: VariableId,
    },
    StoreAccessList {
        to: VariableId,
        from: VariableId,
        path: AccessPath,
    },
    /// Fused compound assignment: `{op}_AND_STORE_ACCESS_LIST`.
    CompoundStoreAccessList {
        op: BinOp,
        to: VariableId,
        from: VariableId,
        path: AccessPath,
    },
    Binary {
        op: BinOp,
        result: VariableId,
        /// The statically-selected result type (spec §4.2's matrix/vector
        /// `MULTIPLY` selection happens at lowering time; backends must not
        /// re-derive it from `left`/`right` alone).
        result_ty: TypeId,
        left: VariableId,
        right: VariableId,
    },
    Not {
        result: VariableId,
        result_ty: TypeId,
        operand: VariableId,
    },
    Call {
        to: Option<VariableId>,
        /// `NO_TYPE` when `to` is `None`.
        result_ty: TypeId,
        func: NameId,
        params: Vec<VariableId>,
    },
    Return {
        value: Option<VariableId>,
    },
    If {
        condition: VariableId,
        start: BlockId,
        end: BlockId,
    },
    WhileStart {
        start: BlockId,
        continue_: BlockId,
        end: BlockId,
    },
    WhileCondition {
        condition: VariableId,
        end: BlockId,
    },
    WhileEnd {
        start: BlockId,
        continue_: BlockId,
        end: BlockId,
    },
    BlockStart {
        id: BlockId,
    },
    BlockEnd {
        id: BlockId,
    },
}

impl Opcode {
    /// The variable this opcode allocates a fresh value into, if any.
    /// Testable property #1 (spec §8): this id must be strictly greater
    /// than every previously allocated variable id.
    pub fn defines(&self) -> Option<VariableId> {
        use Opcode::*;
        match self {
            LoadFloatConstant { to, .. }
            | LoadIntConstant { to, .. }
            | LoadBoolConstant { to, .. }
            | LoadAccessList { to, .. } => Some(*to),
            Binary { result, .. } | Not { result, .. } => Some(*result),
            Call { to: Some(to), .. } => Some(*to),
            _ => None,
        }
    }

    /// Logical step size for code-buffer iteration. Every opcode here is a
    /// single tagged-sum entry in a `Vec<Opcode>`, the Rust-native restatement
    /// of the source's "iterate by `size` bytes" contract (spec §9): stepping
    /// by 1 through the vector always consumes it exactly.
    pub fn size(&self) -> usize {
        1
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: NameId,
    pub ty: TypeRef,
    pub attributes: Vec<NameId>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);
impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: NameId,
    pub attributes: Vec<NameId>,
    pub return_type: TypeRef,
    pub params: Vec<Param>,
    /// `None` marks a built-in (`sample`, `float2`, `group_id`, ...): it has
    /// no block and no code, and is never itself part of a reachable-closure
    /// result (spec §4.3).
    pub block_present: bool,
    pub code: Vec<Opcode>,
    pub set_group: SetGroup,
    /// The IR variable id bound to each parameter, in declaration order,
    /// populated by `compiler::lower_function`. Needed by backends, which
    /// otherwise have no way to recover a parameter's IR variable id from
    /// the code buffer alone (parameters, unlike locals, emit no `VAR`
    /// opcode).
    pub param_vars: Vec<VariableId>,
}
impl Function {
    pub fn is_builtin(&self) -> bool {
        !self.block_present
    }
}

#[derive(Default)]
pub struct FunctionsTable {
    functions: Vec<Function>,
}

impl FunctionsTable {
    pub fn new() -> Self {
        FunctionsTable::default()
    }

    pub fn add_function(&mut self, name: NameId, return_type: TypeRef) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function {
            name,
            attributes: Vec::new(),
            return_type,
            params: Vec::new(),
            block_present: true,
            code: Vec::new(),
            set_group: Vec::new(),
            param_vars: Vec::new(),
        });
        id
    }

    pub fn add_builtin(&mut self, name: NameId, return_type: TypeRef) -> FunctionId {
        let id = self.add_function(name, return_type);
        self.functions[id.index()].block_present = false;
        id
    }

    pub fn add_param(&mut self, f: FunctionId, param: Param) -> Result<()> {
        let func = &mut self.functions[f.index()];
        if func.params.len() >= MAX_PARAMETERS {
            return Err(Error::CapacityExceeded {
                what: "parameter",
                limit: MAX_PARAMETERS,
                ctx: DebugContext::default(),
            });
        }
        func.params.push(param);
        Ok(())
    }

    pub fn find_function(&self, name: NameId) -> Option<FunctionId> {
        self.functions.iter().position(|f| f.name == name).map(|i| FunctionId(i as u32))
    }

    pub fn get(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn get_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions.iter().enumerate().map(|(i, f)| (FunctionId(i as u32), f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::NameTable;
    use crate::ty::NO_TYPE;

    #[test]
    fn code_buffer_iterates_exactly_by_size() {
        let mut names = NameTable::new();
        let f_name = names.intern("main");
        let mut functions = FunctionsTable::new();
        let id = functions.add_function(f_name, TypeRef::scalar(NO_TYPE));
        let func = functions.get_mut(id).unwrap();
        func.code.push(Opcode::Var { var: VariableId::default(), ty: crate::ty::NO_TYPE });
        func.code.push(Opcode::Return { value: None });

        let mut consumed = 0usize;
        let mut index = 0usize;
        while index < func.code.len() {
            consumed += func.code[index].size();
            index += func.code[index].size();
        }
        assert_eq!(consumed, func.code.len());
    }

    #[test]
    fn builtin_has_no_block() {
        let mut names = NameTable::new();
        let mut functions = FunctionsTable::new();
        let id = functions.add_builtin(names.intern("sample"), TypeRef::scalar(NO_TYPE));
        assert!(functions.get(id).unwrap().is_builtin());
    }

    #[test]
    fn param_capacity_is_enforced() {
        let mut names = NameTable::new();
        let mut functions = FunctionsTable::new();
        let id = functions.add_function(names.intern("f"), TypeRef::scalar(NO_TYPE));
        for i in 0..MAX_PARAMETERS {
            let n = names.intern(&format!("p{}", i));
            functions
                .add_param(id, Param { name: n, ty: TypeRef::scalar(NO_TYPE), attributes: Vec::new() })
                .unwrap();
        }
        let extra = names.intern("overflow");
        let err = functions.add_param(id, Param { name: extra, ty: TypeRef::scalar(NO_TYPE), attributes: Vec::new() });
        assert!(err.is_err());
    }
}
