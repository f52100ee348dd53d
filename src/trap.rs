use log::info;

use crate::console::Console;
use crate::cpu::{Vm, VmError};
use crate::inst::Instruction;

/// The six operating-system service calls reachable through TRAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCode {
    /// read one character into R0
    Getc = 0x20,
    /// write the character in R0
    Out = 0x21,
    /// write a zero-terminated string, one character per cell
    Puts = 0x22,
    /// prompt, read one character into R0 and echo it
    In = 0x23,
    /// write a zero-terminated string, two characters per cell
    Putsp = 0x24,
    /// stop the machine
    Halt = 0x25,
}

impl TrapCode {
    pub fn from_vector(vector: u16) -> Option<Self> {
        match vector {
            0x20 => Some(TrapCode::Getc),
            0x21 => Some(TrapCode::Out),
            0x22 => Some(TrapCode::Puts),
            0x23 => Some(TrapCode::In),
            0x24 => Some(TrapCode::Putsp),
            0x25 => Some(TrapCode::Halt),
            _ => None,
        }
    }
}

impl<C: Console> Vm<C> {
    /// Dispatches a TRAP instruction. `pc` is the address of the trap
    /// instruction itself, reported on an unknown service number.
    pub(crate) fn trap(&mut self, inst: Instruction, pc: u16) -> Result<(), VmError> {
        let vector = inst.trap_vector();
        let Some(code) = TrapCode::from_vector(vector) else {
            return Err(VmError::UnknownTrap { pc, vector });
        };

        match code {
            TrapCode::Getc => {
                let byte = self.read_console_byte()?;
                self.regs.set(0, byte as u16);
            }
            TrapCode::Out => {
                let byte = self.regs.get(0) as u8;
                self.console.write_byte(byte).map_err(VmError::Io)?;
                self.console.flush().map_err(VmError::Io)?;
            }
            TrapCode::Puts => {
                let mut addr = self.regs.get(0);
                loop {
                    let cell = self.read_mem(addr)?;
                    if cell == 0 {
                        break;
                    }
                    self.console.write_byte(cell as u8).map_err(VmError::Io)?;
                    addr = addr.wrapping_add(1);
                }
                self.console.flush().map_err(VmError::Io)?;
            }
            TrapCode::In => {
                for byte in b"Enter a character: " {
                    self.console.write_byte(*byte).map_err(VmError::Io)?;
                }
                self.console.flush().map_err(VmError::Io)?;
                let byte = self.read_console_byte()?;
                self.console.write_byte(byte).map_err(VmError::Io)?;
                self.console.flush().map_err(VmError::Io)?;
                self.regs.set(0, byte as u16);
            }
            TrapCode::Putsp => {
                let mut addr = self.regs.get(0);
                'cells: loop {
                    let cell = self.read_mem(addr)?;
                    // Low byte first; a zero byte in either half ends
                    // the string.
                    for byte in [cell as u8, (cell >> 8) as u8] {
                        if byte == 0 {
                            break 'cells;
                        }
                        self.console.write_byte(byte).map_err(VmError::Io)?;
                    }
                    addr = addr.wrapping_add(1);
                }
                self.console.flush().map_err(VmError::Io)?;
            }
            TrapCode::Halt => {
                for byte in b"\nHALT\n" {
                    self.console.write_byte(*byte).map_err(VmError::Io)?;
                }
                self.console.flush().map_err(VmError::Io)?;
                info!("halt at {:#06x}", pc);
                self.running = false;
            }
        }

        Ok(())
    }

    // EOF on a blocking read is a fault: the run aborts cleanly rather
    // than spinning on a closed stream.
    fn read_console_byte(&mut self) -> Result<u8, VmError> {
        self.console
            .read_byte()
            .map_err(VmError::Io)?
            .ok_or(VmError::InputExhausted)
    }
}
