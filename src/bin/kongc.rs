//! Drives a compilation end to end for harness/test-tooling use: reads a JSON
//! fixture describing a module (types, globals, functions, and which
//! function is the entry point), builds a `Context` from it, and runs the
//! analyzer-backed SPIR-V backend plus the optional GLSL and C-integration
//! backends, writing each artefact next to the input. Plays the role
//! `src/bin/spirq.rs` plays for the teacher: a small binary around the
//! library, not a place for new logic.
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use kongc_core::ast::{Block, Expr, ExprKind, Stmt};
use kongc_core::backends::glsl::GlslBackend;
use kongc_core::backends::{self, TextualBackend};
use kongc_core::cintegration::{CIntegration, HeaderEmitter};
use kongc_core::compiler;
use kongc_core::context::Context;
use kongc_core::error::{DebugContext, Error};
use kongc_core::func::{BinOp, FunctionId, Param};
use kongc_core::spirv;
use kongc_core::ty::{TypeRef, NOT_ARRAY, NO_TYPE};
use kongc_core::CompileOptions;

#[derive(Parser)]
#[command(name = "kongc", about = "Compiles a Kong-style shader IR fixture to SPIR-V (plus optional GLSL / C glue).")]
struct Args {
    /// Path to the JSON fixture describing the module.
    fixture: PathBuf,

    /// Directory artefacts are written into; defaults to the fixture's own directory.
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Also emit the GLSL reference backend's output for the entry point.
    #[arg(long)]
    glsl: bool,

    /// Also emit the C host-integration header/source pair for the whole module.
    #[arg(long)]
    cintegration: bool,

    /// Skip spirv-val validation even in debug builds.
    #[arg(long)]
    no_validate: bool,
}

#[derive(Deserialize)]
struct Fixture {
    #[serde(default)]
    types: Vec<FType>,
    #[serde(default)]
    globals: Vec<FGlobal>,
    functions: Vec<FFunction>,
    /// Name of the function to compile as the entry point.
    entry: String,
    /// "vertex" or "fragment" — which stage `entry` is (spec §4.4).
    stage: String,
}

#[derive(Deserialize)]
struct FType {
    name: String,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    members: Vec<FMember>,
}

#[derive(Deserialize)]
struct FMember {
    name: String,
    ty: String,
    /// For pipeline-block members (`vertex: vs_main`): the named function.
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct FGlobal {
    name: String,
    ty: String,
}

#[derive(Deserialize)]
struct FFunction {
    name: String,
    #[serde(default)]
    return_type: Option<String>,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    params: Vec<FParam>,
    #[serde(default)]
    body: Vec<FStmt>,
}

#[derive(Deserialize)]
struct FParam {
    name: String,
    ty: String,
    #[serde(default)]
    attributes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(tag = "kind")]
enum FExprKind {
    Float { value: f32 },
    Int { value: i32 },
    Bool { value: bool },
    Name { name: String },
    Member { base: Box<FExpr>, member: String },
    Index { base: Box<FExpr>, index: Box<FExpr> },
    Not { operand: Box<FExpr> },
    Binary { op: String, left: Box<FExpr>, right: Box<FExpr> },
    Call { func: String, args: Vec<FExpr> },
}

#[derive(Deserialize)]
struct FExpr {
    #[serde(flatten)]
    kind: FExprKind,
    #[serde(default)]
    ty: Option<String>,
    #[serde(default)]
    line: u32,
    #[serde(default)]
    column: u32,
}

#[derive(Deserialize)]
#[serde(tag = "kind")]
enum FStmt {
    Expr { expr: FExpr },
    VarDecl {
        name: String,
        ty: String,
        init: Option<FExpr>,
        #[serde(default)]
        line: u32,
        #[serde(default)]
        column: u32,
    },
    Assign { target: FExpr, value: FExpr },
    CompoundAssign { op: String, target: FExpr, value: FExpr },
    If { cond: FExpr, then_block: Vec<FStmt> },
    While { cond: FExpr, body: Vec<FStmt> },
    DoWhile { body: Vec<FStmt>, cond: FExpr },
    Return {
        value: Option<FExpr>,
        #[serde(default)]
        line: u32,
        #[serde(default)]
        column: u32,
    },
    Block { block: Vec<FStmt> },
}

fn parse_binop(s: &str) -> Result<BinOp, Error> {
    use BinOp::*;
    Ok(match s {
        "Add" => Add,
        "Sub" => Sub,
        "Multiply" => Multiply,
        "Divide" => Divide,
        "Mod" => Mod,
        "Equals" => Equals,
        "NotEquals" => NotEquals,
        "Greater" => Greater,
        "GreaterEqual" => GreaterEqual,
        "Less" => Less,
        "LessEqual" => LessEqual,
        "And" => And,
        "Or" => Or,
        "BitwiseAnd" => BitwiseAnd,
        "BitwiseOr" => BitwiseOr,
        "BitwiseXor" => BitwiseXor,
        "LeftShift" => LeftShift,
        "RightShift" => RightShift,
        other => return Err(Error::UnknownName { name: other.to_owned(), ctx: DebugContext::default() }),
    })
}

/// Resolves a fixture type spelling ("float4", "VOut", "float4[4]") against
/// names already interned/declared in `ctx`. Trailing `[N]` becomes
/// `TypeRef::array_size`, matching how every member/param carries its own
/// array size rather than a distinct array `Type` (spec §3).
fn parse_type_ref(ctx: &mut Context, spec: &str) -> Result<TypeRef, Error> {
    let (base, array_size) = match spec.find('[') {
        Some(pos) => {
            let close = spec.find(']').ok_or_else(|| Error::UnknownType { name: spec.to_owned(), ctx: DebugContext::default() })?;
            let n: u32 = spec[pos + 1..close]
                .parse()
                .map_err(|_| Error::UnknownType { name: spec.to_owned(), ctx: DebugContext::default() })?;
            (&spec[..pos], n)
        }
        None => (spec, NOT_ARRAY),
    };
    let name_id = ctx.names.intern(base);
    let ty = ctx.types.find_type_by_name(name_id);
    if ty == NO_TYPE {
        return Err(Error::UnknownType { name: base.to_owned(), ctx: DebugContext::default() });
    }
    Ok(TypeRef { ty, array_size })
}

fn expr_type_ref(ctx: &mut Context, ty: &Option<String>) -> Result<TypeRef, Error> {
    match ty {
        Some(s) => parse_type_ref(ctx, s),
        None => Ok(TypeRef::scalar(NO_TYPE)),
    }
}

fn conv_expr(ctx: &mut Context, fe: &FExpr) -> Result<Expr, Error> {
    let ty = expr_type_ref(ctx, &fe.ty)?;
    let dbg = DebugContext::new(fe.line, fe.column);
    let kind = match &fe.kind {
        FExprKind::Float { value } => ExprKind::FloatLiteral(*value),
        FExprKind::Int { value } => ExprKind::IntLiteral(*value),
        FExprKind::Bool { value } => ExprKind::BoolLiteral(*value),
        FExprKind::Name { name } => ExprKind::Name(name.clone()),
        FExprKind::Member { base, member } => ExprKind::Member { base: Box::new(conv_expr(ctx, base)?), member: member.clone() },
        FExprKind::Index { base, index } => {
            ExprKind::Index { base: Box::new(conv_expr(ctx, base)?), index: Box::new(conv_expr(ctx, index)?) }
        }
        FExprKind::Not { operand } => ExprKind::Not(Box::new(conv_expr(ctx, operand)?)),
        FExprKind::Binary { op, left, right } => {
            ExprKind::Binary { op: parse_binop(op)?, left: Box::new(conv_expr(ctx, left)?), right: Box::new(conv_expr(ctx, right)?) }
        }
        FExprKind::Call { func, args } => {
            let mut conv_args = Vec::with_capacity(args.len());
            for a in args {
                conv_args.push(conv_expr(ctx, a)?);
            }
            ExprKind::Call { func: func.clone(), args: conv_args }
        }
    };
    Ok(Expr::new(kind, ty, dbg))
}

fn conv_stmt(ctx: &mut Context, fs: &FStmt) -> Result<Stmt, Error> {
    Ok(match fs {
        FStmt::Expr { expr } => Stmt::Expr(conv_expr(ctx, expr)?),
        FStmt::VarDecl { name, ty, init, line, column } => Stmt::VarDecl {
            name: name.clone(),
            ty: parse_type_ref(ctx, ty)?,
            init: init.as_ref().map(|e| conv_expr(ctx, e)).transpose()?,
            ctx: DebugContext::new(*line, *column),
        },
        FStmt::Assign { target, value } => Stmt::Assign { target: conv_expr(ctx, target)?, value: conv_expr(ctx, value)? },
        FStmt::CompoundAssign { op, target, value } => {
            Stmt::CompoundAssign { op: parse_binop(op)?, target: conv_expr(ctx, target)?, value: conv_expr(ctx, value)? }
        }
        FStmt::If { cond, then_block } => Stmt::If { cond: conv_expr(ctx, cond)?, then_block: conv_block(ctx, then_block)? },
        FStmt::While { cond, body } => Stmt::While { cond: conv_expr(ctx, cond)?, body: conv_block(ctx, body)? },
        FStmt::DoWhile { body, cond } => Stmt::DoWhile { body: conv_block(ctx, body)?, cond: conv_expr(ctx, cond)? },
        FStmt::Return { value, line, column } => {
            Stmt::Return { value: value.as_ref().map(|e| conv_expr(ctx, e)).transpose()?, ctx: DebugContext::new(*line, *column) }
        }
        FStmt::Block { block } => Stmt::Block(conv_block(ctx, block)?),
    })
}

fn conv_block(ctx: &mut Context, stmts: &[FStmt]) -> Result<Block, Error> {
    stmts.iter().map(|s| conv_stmt(ctx, s)).collect()
}

/// Registers every type name first (so later structs can reference earlier
/// *or* later ones), then fills in members and attributes in a second pass.
fn declare_types(ctx: &mut Context, ftypes: &[FType]) -> Result<(), Error> {
    let mut ids = Vec::with_capacity(ftypes.len());
    for ft in ftypes {
        let name_id = ctx.names.intern(&ft.name);
        ids.push(ctx.types.add_type(Some(name_id)));
    }
    for (ft, &id) in ftypes.iter().zip(&ids) {
        for attr in &ft.attributes {
            let a = ctx.names.intern(attr);
            ctx.types.get_mut(id).unwrap().attributes.push(a);
        }
        for m in &ft.members {
            let member_ty = parse_type_ref(ctx, &m.ty)?;
            let member_name = ctx.names.intern(&m.name);
            match &m.value {
                Some(func_name) => {
                    let fname_id = ctx.names.intern(func_name);
                    ctx.types.add_struct_member_with_value(id, member_name, member_ty, kongc_core::ty::Literal::Name(fname_id));
                }
                None => ctx.types.add_struct_member(id, member_name, member_ty),
            }
        }
    }
    Ok(())
}

fn declare_globals(ctx: &mut Context, fglobals: &[FGlobal]) -> Result<(), Error> {
    for fg in fglobals {
        let ty = parse_type_ref(ctx, &fg.ty)?.ty;
        let name_id = ctx.names.intern(&fg.name);
        let var = ctx.vars.alloc(TypeRef::scalar(ty), kongc_core::var::VariableKind::Global).id;
        ctx.globals.add_global(name_id, ty, var);
    }
    Ok(())
}

/// Declares every function's signature (so calls can resolve forward
/// references), then lowers each body once every signature is in place.
fn declare_and_lower_functions(ctx: &mut Context, ffuncs: &[FFunction]) -> Result<(), Error> {
    let mut ids: Vec<FunctionId> = Vec::with_capacity(ffuncs.len());
    for ff in ffuncs {
        let name_id = ctx.names.intern(&ff.name);
        let ret = match &ff.return_type {
            Some(t) => parse_type_ref(ctx, t)?,
            None => TypeRef::scalar(NO_TYPE),
        };
        ids.push(ctx.functions.add_function(name_id, ret));
    }
    for (ff, &fid) in ffuncs.iter().zip(&ids) {
        for attr in &ff.attributes {
            let a = ctx.names.intern(attr);
            ctx.functions.get_mut(fid).unwrap().attributes.push(a);
        }
        for p in &ff.params {
            let pty = parse_type_ref(ctx, &p.ty)?;
            let pname = ctx.names.intern(&p.name);
            let attrs = p.attributes.iter().map(|a| ctx.names.intern(a)).collect();
            ctx.functions.add_param(fid, Param { name: pname, ty: pty, attributes: attrs })?;
        }
    }
    for (ff, &fid) in ffuncs.iter().zip(&ids) {
        let block = conv_block(ctx, &ff.body)?;
        compiler::lower_function(ctx, fid, &block)?;
    }
    Ok(())
}

fn build_context(fixture: &Fixture) -> Result<(Context, FunctionId, bool), Error> {
    let mut ctx = Context::new();
    declare_types(&mut ctx, &fixture.types)?;
    declare_globals(&mut ctx, &fixture.globals)?;
    declare_and_lower_functions(&mut ctx, &fixture.functions)?;

    let entry_name = ctx.names.intern(&fixture.entry);
    let entry = ctx
        .functions
        .find_function(entry_name)
        .ok_or_else(|| Error::UnknownName { name: fixture.entry.clone(), ctx: DebugContext::default() })?;

    let is_vertex = match fixture.stage.as_str() {
        "vertex" => true,
        "fragment" => false,
        other => {
            log::error!("unrecognized stage '{}'", other);
            return Err(Error::UnsupportedType { what: "stage (expected vertex or fragment)", ctx: DebugContext::default() });
        }
    };

    Ok((ctx, entry, is_vertex))
}

fn write_spirv_binary(words: &[u32], path: &Path) -> std::io::Result<()> {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for w in words {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    fs::write(path, bytes)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&args.fixture)?;
    let fixture: Fixture = serde_json::from_str(&text)?;

    let (ctx, entry, is_vertex) = build_context(&fixture)?;

    let out_dir = args.out_dir.clone().unwrap_or_else(|| {
        args.fixture.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
    });
    fs::create_dir_all(&out_dir)?;

    let mut options = CompileOptions::default();
    if args.no_validate {
        options.validate = false;
    }

    log::debug!("compiling entry '{}' ({})", fixture.entry, fixture.stage);
    let words = spirv::compile_entry_module(&ctx, entry, is_vertex, &options)?;
    write_spirv_binary(&words, &out_dir.join(format!("{}.spv", fixture.entry)))?;
    log::info!("wrote {} words of SPIR-V for '{}'", words.len(), fixture.entry);

    if args.glsl {
        let backend = GlslBackend;
        let artefact = if is_vertex { backend.compile_vertex(&ctx, entry)? } else { backend.compile_fragment(&ctx, entry)? };
        fs::write(out_dir.join(format!("{}.glsl", fixture.entry)), &artefact.source)?;
        let (header, source) = backends::write_source_pair(&artefact, &fixture.entry);
        fs::write(out_dir.join(format!("kong_{}.h", fixture.entry)), header)?;
        fs::write(out_dir.join(format!("kong_{}.c", fixture.entry)), source)?;
    }

    if args.cintegration {
        let (header, source) = HeaderEmitter.emit(&ctx)?;
        fs::write(out_dir.join("kong.h"), header)?;
        fs::write(out_dir.join("kong.c"), source)?;
    }

    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        eprintln!("kongc: {}", e);
        std::process::exit(1);
    }
}
