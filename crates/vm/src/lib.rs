//! Viper virtual machine: a tree-walking interpreter for verified IL
//! modules, with trap-precise fault attribution, an exception-handler
//! stack, and the shared refcounted runtime value model.
//!
//! Native backends implement the [`codegen::Backend`] contract: observable
//! behavior equivalent to this interpreter for every IL instruction,
//! including trap kinds, trap source lines, and retain/release balance.
//! The interpreter itself is the reference backend.

pub mod codegen;
pub mod externs;
pub mod frame;
pub mod slot;
pub mod vm;

pub use externs::{ExternFn, ExternRegistry, Signature};
pub use slot::Slot;
pub use vm::{run_module, Outcome, RunConfig, TrapDescriptor, Vm, VmError};
