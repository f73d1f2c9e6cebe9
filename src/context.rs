//! The process-wide tables, collected into one value per spec §9's
//! "Context" strategy rather than threaded as separate global statics. A
//! `Context` is built once by the front end, then read-only for the rest of
//! a compilation; tests construct a fresh one per case.
use crate::func::FunctionsTable;
use crate::global::GlobalsTable;
use crate::name::NameTable;
use crate::sets::SetsTable;
use crate::ty::TypeTable;
use crate::var::{BlockAllocator, VariableAllocator};

pub struct Context {
    pub names: NameTable,
    pub types: TypeTable,
    pub globals: GlobalsTable,
    pub functions: FunctionsTable,
    pub sets: SetsTable,
    pub vars: VariableAllocator,
    pub blocks: BlockAllocator,
}

impl Context {
    pub fn new() -> Self {
        let mut names = NameTable::new();
        let types = TypeTable::new(&mut names);
        Context {
            names,
            types,
            globals: GlobalsTable::new(),
            functions: FunctionsTable::new(),
            sets: SetsTable::new(),
            vars: VariableAllocator::new(),
            blocks: BlockAllocator::new(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
