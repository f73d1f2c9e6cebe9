//! Error and result reported by compiler procedures.
use std::error;
use std::fmt;

/// Source location a check was made against. A zeroed context means the
/// check point had no meaningful location to report (see spec §7); the
/// message alone must then carry the diagnostic.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DebugContext {
    pub line: u32,
    pub column: u32,
}
impl DebugContext {
    pub fn new(line: u32, column: u32) -> Self {
        DebugContext { line, column }
    }
}

#[derive(Debug)]
pub enum Error {
    UnknownName { name: String, ctx: DebugContext },
    NoSuchMember { ty: String, member: String, ctx: DebugContext },
    UnknownType { name: String, ctx: DebugContext },
    MalformedAccessChain { ctx: DebugContext },
    MissingStage { pipeline: String, ctx: DebugContext },
    MissingParameterType { ctx: DebugContext },
    MissingReturnType { ctx: DebugContext },
    MissingThreadsAttribute { ctx: DebugContext },
    AmbiguousDescriptorSet { global: String, ctx: DebugContext },
    InvalidRootConstants { ctx: DebugContext },
    UnsupportedType { what: &'static str, ctx: DebugContext },
    CapacityExceeded { what: &'static str, limit: usize, ctx: DebugContext },
    ExternalToolFailed { tool: &'static str, exit_code: i32 },
    Io(std::io::Error),
}

impl Error {
    fn ctx(&self) -> Option<DebugContext> {
        use Error::*;
        match self {
            UnknownName { ctx, .. }
            | NoSuchMember { ctx, .. }
            | UnknownType { ctx, .. }
            | MalformedAccessChain { ctx }
            | MissingStage { ctx, .. }
            | MissingParameterType { ctx }
            | MissingReturnType { ctx }
            | MissingThreadsAttribute { ctx }
            | AmbiguousDescriptorSet { ctx, .. }
            | InvalidRootConstants { ctx }
            | UnsupportedType { ctx, .. }
            | CapacityExceeded { ctx, .. } => Some(*ctx),
            ExternalToolFailed { .. } | Io(_) => None,
        }
    }
    fn message(&self) -> String {
        use Error::*;
        match self {
            UnknownName { name, .. } => format!("unknown name '{}'", name),
            NoSuchMember { ty, member, .. } => format!("type '{}' has no member '{}'", ty, member),
            UnknownType { name, .. } => format!("unknown type '{}'", name),
            MalformedAccessChain { .. } => "malformed access chain".to_owned(),
            MissingStage { pipeline, .. } => format!("pipeline '{}' is missing a vertex or mesh shader", pipeline),
            MissingParameterType { .. } => "parameter is missing a type".to_owned(),
            MissingReturnType { .. } => "missing return type".to_owned(),
            MissingThreadsAttribute { .. } => "compute entry is missing a threads attribute".to_owned(),
            AmbiguousDescriptorSet { global, .. } => {
                format!("global '{}' could be used from multiple descriptor sets", global)
            }
            InvalidRootConstants { .. } => "the root_constants set must contain exactly one struct global".to_owned(),
            UnsupportedType { what, .. } => format!("unsupported type: {}", what),
            CapacityExceeded { what, limit, .. } => format!("max {} count of {} reached", what, limit),
            ExternalToolFailed { tool, exit_code } => format!("{} check failed with exit code {}", tool, exit_code),
            Io(e) => format!("{}", e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.ctx() {
            Some(ctx) => write!(f, "In column {} at line {}: {}", ctx.column + 1, ctx.line + 1, self.message()),
            None => write!(f, "{}", self.message()),
        }
    }
}
impl error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
