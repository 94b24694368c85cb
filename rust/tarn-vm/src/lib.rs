//! Tarn VM
//!
//! Register-based interpreter for compiled Tarn programs, with native
//! function marshalling, external service calls, and value rendering.

pub mod asm;
pub mod describe;
pub mod external;
pub mod io;
pub mod native;
pub mod settings;
pub mod vm;

pub use asm::Assembler;
pub use external::{ExternalService, OperatorPlacement};
pub use io::{CapturedIo, IoHandle, StdIo};
pub use native::{Native, NativeFn};
pub use settings::VmSettings;
pub use vm::{DebugCallback, DebugEvent, Vm, VmError};
