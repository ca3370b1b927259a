mod args;
mod blob;
mod codegen;
mod diversity;
mod error;

pub use args::{
    BinaryOp, Elementwise, Instr, KernelArgs, NdRange, Operand, Problem, ReduceOp, UnaryOp,
    MAX_DEPTH, MAX_OPERANDS,
};
pub use blob::Blob;
pub use codegen::{CodeGen, KernelSource};
pub use diversity::{CacheSize, Config, Diversity};
pub use error::{functions::*, Error, ErrorKind};
