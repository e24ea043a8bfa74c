//! The middle of the compiler: the low-level IR, lowering into it, and
//! the optimizer passes that clean it up before code generation.

pub mod llir;
pub mod lower;
pub mod optimize;

pub use lower::lower;
pub use optimize::{optimize, Passes};
