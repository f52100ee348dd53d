pub mod console;
pub mod cpu;
pub mod image;
pub mod inst;
pub mod mem;
pub mod trap;

pub use console::{BufferConsole, Console, StdConsole};
pub use cpu::{CondFlag, Registers, Vm, VmError, PC_START};
pub use inst::{Instruction, Opcode};
pub use mem::Memory;
pub use trap::TrapCode;
