//! Middle end for a small C-like shading language: a name/type/global/
//! function/descriptor-set intermediate representation, an analyzer that
//! derives reachability and descriptor-set usage per entry point, and
//! backends that turn analyzed functions into SPIR-V binaries (or, for
//! textual targets and C host integration, describe the contract a future
//! backend fills in).
//!
//! A compilation starts from a single [`Context`](context::Context), built
//! once by a front end (out of scope here; see [`ast`] and [`compiler`] for
//! the surface this crate accepts instead of parsing source text itself),
//! then walked read-only by [`analysis`] and the backends in [`spirv`],
//! [`backends`], and [`cintegration`].
pub mod analysis;
pub mod ast;
pub mod backends;
pub mod cintegration;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod func;
pub mod global;
pub mod name;
pub mod pipeline;
pub mod sets;
pub mod spirv;
pub mod ty;
pub mod var;

pub use config::CompileOptions;
pub use context::Context;
pub use error::{Error, Result};
