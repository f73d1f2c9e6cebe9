//! A minimal, already-typed expression/statement AST. The real tokenizer and
//! recursive-descent parser are out of scope (spec §1); this is just enough
//! surface for `compiler::lower_function` to exercise every rule in spec
//! §4.2, grounded on the node shapes in
//! `examples/original_source/Sources/parser/expression.h` and `statement.h`.
use crate::error::DebugContext;
use crate::func::BinOp;
use crate::ty::TypeRef;

#[derive(Debug, Clone)]
pub enum ExprKind {
    FloatLiteral(f32),
    IntLiteral(i32),
    BoolLiteral(bool),
    /// An unresolved identifier; the compiler resolves it through the
    /// lexical scope chain, then the globals table.
    Name(String),
    Member { base: Box<Expr>, member: String },
    Index { base: Box<Expr>, index: Box<Expr> },
    Not(Box<Expr>),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Call { func: String, args: Vec<Expr> },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    /// Populated by whatever produced this AST (the out-of-scope parser, in
    /// a real front end); every expression node the compiler touches must
    /// carry one so access paths and arithmetic can be type-checked at
    /// lowering time (spec §6).
    pub ty: TypeRef,
    pub ctx: DebugContext,
}
impl Expr {
    pub fn new(kind: ExprKind, ty: TypeRef, ctx: DebugContext) -> Self {
        Expr { kind, ty, ctx }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    VarDecl {
        name: String,
        ty: TypeRef,
        init: Option<Expr>,
        ctx: DebugContext,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    CompoundAssign {
        op: BinOp,
        target: Expr,
        value: Expr,
    },
    /// No `else`: the IR's `IF` opcode (spec §3) carries only a then-block
    /// start and a merge id, so the else-less form is the only one this
    /// surface can lower without inventing IR the spec doesn't define.
    If {
        cond: Expr,
        then_block: Block,
    },
    While {
        cond: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        cond: Expr,
    },
    Return {
        value: Option<Expr>,
        ctx: DebugContext,
    },
    Block(Block),
}

pub type Block = Vec<Stmt>;
