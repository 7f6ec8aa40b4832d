//! Viper IL: the typed, block-structured intermediate language shared by
//! every frontend, the verifier, the virtual machine, and native backends.
//!
//! Key design principles:
//! - The IL is passive data: `Module` → `Function` → `Block` → `Instr`, held
//!   in indexed arenas (`Vec` at every level, temps are plain `u32` ids).
//! - Behavior lives elsewhere: `verify` rejects malformed modules, the VM
//!   crate executes accepted ones, `analysis` derives CFG facts on demand.
//! - The textual form in `text` is canonical and round-trippable so tools
//!   and tests can exchange modules as plain files.

pub mod analysis;
pub mod build;
pub mod instr;
pub mod module;
pub mod text;
pub mod types;
pub mod value;
pub mod verify;

pub use build::IrBuilder;
pub use instr::{FloatPredicate, Instr, IntPredicate, Opcode, SourceLoc};
pub use module::{Block, Extern, Function, FunctionParam, Global, Module, Param};
pub use text::{parse_module, print_module, ParseError};
pub use types::Type;
pub use value::{TempId, Value};
pub use verify::{verify_module, VerifyError};
