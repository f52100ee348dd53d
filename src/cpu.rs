use std::fmt;
use std::io::{self, Read};

use log::trace;

use crate::console::Console;
use crate::image;
use crate::inst::{Instruction, Opcode};
use crate::mem::{Memory, KBDR, KBSR};

/// Fixed entry address; execution starts here regardless of the image's
/// load origin.
pub const PC_START: u16 = 0x3000;

/// Index of the link register written by JSR/JSRR. An ordinary general
/// register by convention, not a separate entity.
pub const LINK_REG: u16 = 7;

/// Condition flags. Exactly one holds at any time; every flag-setting
/// instruction replaces the whole value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondFlag {
    Positive,
    Zero,
    Negative,
}

impl CondFlag {
    /// Encoding used by the BR condition mask (bit 0 = p, 1 = z, 2 = n).
    pub fn bits(self) -> u16 {
        match self {
            CondFlag::Positive => 1 << 0,
            CondFlag::Zero => 1 << 1,
            CondFlag::Negative => 1 << 2,
        }
    }

    fn of(value: u16) -> Self {
        if value == 0 {
            CondFlag::Zero
        } else if value >> 15 != 0 {
            CondFlag::Negative
        } else {
            CondFlag::Positive
        }
    }
}

/// The register file: eight general registers, the program counter and
/// the condition flag.
#[derive(Debug)]
pub struct Registers {
    gpr: [u16; 8],
    pub pc: u16,
    pub cond: CondFlag,
}

impl Registers {
    fn new() -> Self {
        Self {
            gpr: [0; 8],
            pc: PC_START,
            cond: CondFlag::Zero,
        }
    }

    pub fn get(&self, index: u16) -> u16 {
        self.gpr[index as usize]
    }

    pub fn set(&mut self, index: u16, value: u16) {
        self.gpr[index as usize] = value;
    }

    /// Flag update rule shared by all flag-setting opcodes: inspect the
    /// register just written and replace the condition flag. The
    /// register itself is never altered.
    pub fn update_flags(&mut self, index: u16) {
        self.cond = CondFlag::of(self.get(index));
    }
}

#[derive(Debug)]
pub enum VmError {
    /// Image stream missing, unreadable, or truncated mid-word.
    Load(io::Error),
    /// RTI or the reserved opcode reached at runtime.
    IllegalInstruction { pc: u16, inst: u16 },
    /// TRAP with a service number outside the six defined codes.
    UnknownTrap { pc: u16, vector: u16 },
    /// Console input reached EOF during a blocking GETC/IN read.
    InputExhausted,
    /// Console read/write/flush failure.
    Io(io::Error),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Load(e) => write!(f, "failed to load program image: {e}"),
            VmError::IllegalInstruction { pc, inst } => {
                write!(f, "illegal instruction {inst:#06x} at {pc:#06x}")
            }
            VmError::UnknownTrap { pc, vector } => {
                write!(f, "unknown trap vector {vector:#04x} at {pc:#06x}")
            }
            VmError::InputExhausted => write!(f, "console input exhausted during a blocking read"),
            VmError::Io(e) => write!(f, "console I/O error: {e}"),
        }
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VmError::Load(e) | VmError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// One LC-3 machine: register file, memory and the console it talks to.
/// Instances are independent; nothing is process-global.
#[derive(Debug)]
pub struct Vm<C> {
    pub regs: Registers,
    pub mem: Memory,
    pub(crate) console: C,
    pub(crate) running: bool,
}

impl<C: Console> Vm<C> {
    pub fn new(console: C) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            console,
            running: true,
        }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Populates memory from a big-endian program image and returns its
    /// origin. The program counter stays at [`PC_START`] either way.
    pub fn load_image<R: Read>(&mut self, reader: R) -> Result<u16, VmError> {
        let (origin, _) = image::load_image(reader, &mut self.mem).map_err(VmError::Load)?;
        Ok(origin)
    }

    /// Runs the fetch-decode-execute loop until a HALT trap clears the
    /// running flag or a fault stops the machine.
    pub fn run(&mut self) -> Result<(), VmError> {
        while self.running {
            self.step()?;
        }
        Ok(())
    }

    /// Executes exactly one instruction.
    pub fn step(&mut self) -> Result<(), VmError> {
        let pc = self.regs.pc;
        let inst = Instruction(self.read_mem(pc)?);
        self.regs.pc = pc.wrapping_add(1);
        trace!("{:04x}: {:04x} {:?}", pc, inst.0, inst.opcode());

        match inst.opcode() {
            Opcode::Add => {
                let rhs = if inst.imm_flag() {
                    inst.imm5()
                } else {
                    self.regs.get(inst.sr2())
                };
                let value = self.regs.get(inst.sr1()).wrapping_add(rhs);
                self.regs.set(inst.dr(), value);
                self.regs.update_flags(inst.dr());
            }
            Opcode::And => {
                let rhs = if inst.imm_flag() {
                    inst.imm5()
                } else {
                    self.regs.get(inst.sr2())
                };
                let value = self.regs.get(inst.sr1()) & rhs;
                self.regs.set(inst.dr(), value);
                self.regs.update_flags(inst.dr());
            }
            Opcode::Not => {
                self.regs.set(inst.dr(), !self.regs.get(inst.sr1()));
                self.regs.update_flags(inst.dr());
            }
            Opcode::Br => {
                if inst.cond_mask() & self.regs.cond.bits() != 0 {
                    self.regs.pc = self.regs.pc.wrapping_add(inst.offset9());
                }
            }
            Opcode::Jmp => {
                self.regs.pc = self.regs.get(inst.sr1());
            }
            Opcode::Jsr => {
                self.regs.set(LINK_REG, self.regs.pc);
                if inst.long_flag() {
                    self.regs.pc = self.regs.pc.wrapping_add(inst.offset11());
                } else {
                    self.regs.pc = self.regs.get(inst.sr1());
                }
            }
            Opcode::Ld => {
                let addr = self.regs.pc.wrapping_add(inst.offset9());
                let value = self.read_mem(addr)?;
                self.regs.set(inst.dr(), value);
                self.regs.update_flags(inst.dr());
            }
            Opcode::Ldi => {
                let indirect = self.regs.pc.wrapping_add(inst.offset9());
                let addr = self.read_mem(indirect)?;
                let value = self.read_mem(addr)?;
                self.regs.set(inst.dr(), value);
                self.regs.update_flags(inst.dr());
            }
            Opcode::Ldr => {
                let addr = self.regs.get(inst.sr1()).wrapping_add(inst.offset6());
                let value = self.read_mem(addr)?;
                self.regs.set(inst.dr(), value);
                self.regs.update_flags(inst.dr());
            }
            Opcode::Lea => {
                let value = self.regs.pc.wrapping_add(inst.offset9());
                self.regs.set(inst.dr(), value);
                self.regs.update_flags(inst.dr());
            }
            Opcode::St => {
                let addr = self.regs.pc.wrapping_add(inst.offset9());
                self.mem.write(addr, self.regs.get(inst.dr()));
            }
            Opcode::Sti => {
                let indirect = self.regs.pc.wrapping_add(inst.offset9());
                let addr = self.read_mem(indirect)?;
                self.mem.write(addr, self.regs.get(inst.dr()));
            }
            Opcode::Str => {
                let addr = self.regs.get(inst.sr1()).wrapping_add(inst.offset6());
                self.mem.write(addr, self.regs.get(inst.dr()));
            }
            Opcode::Trap => self.trap(inst, pc)?,
            Opcode::Rti | Opcode::Reserved => {
                return Err(VmError::IllegalInstruction { pc, inst: inst.0 });
            }
        }

        Ok(())
    }

    /// Memory read with the keyboard registers mapped in: reading KBSR
    /// polls the console; a pending byte sets bit 15 and latches the
    /// byte into KBDR.
    pub fn read_mem(&mut self, addr: u16) -> Result<u16, VmError> {
        if addr == KBSR {
            match self.console.poll_byte().map_err(VmError::Io)? {
                Some(byte) => {
                    self.mem.write(KBSR, 1 << 15);
                    self.mem.write(KBDR, byte as u16);
                }
                None => self.mem.write(KBSR, 0),
            }
        }
        Ok(self.mem.read(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;

    fn vm() -> Vm<BufferConsole> {
        Vm::new(BufferConsole::new())
    }

    /// Places `word` at the current PC and executes it.
    fn exec(vm: &mut Vm<BufferConsole>, word: u16) {
        vm.mem.write(vm.regs.pc, word);
        vm.step().unwrap();
    }

    #[test]
    fn starts_at_entry_address() {
        let vm = vm();
        assert_eq!(vm.regs.pc, 0x3000);
        assert_eq!(vm.regs.cond, CondFlag::Zero);
        assert!(vm.is_running());
    }

    #[test]
    fn add_immediate_minus_one() {
        let mut vm = vm();
        vm.regs.set(3, 5);
        // ADD R2, R3, #-1
        exec(&mut vm, 0b0001_010_011_1_11111);
        assert_eq!(vm.regs.get(2), 4);
        assert_eq!(vm.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn add_register_mode_wraps() {
        let mut vm = vm();
        vm.regs.set(1, 0xFFFF);
        vm.regs.set(2, 2);
        // ADD R0, R1, R2
        exec(&mut vm, 0b0001_000_001_0_00_010);
        assert_eq!(vm.regs.get(0), 1);
        assert_eq!(vm.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn add_sets_zero_and_negative_flags() {
        let mut vm = vm();
        vm.regs.set(1, 1);
        // ADD R0, R1, #-1  ->  0
        exec(&mut vm, 0b0001_000_001_1_11111);
        assert_eq!(vm.regs.cond, CondFlag::Zero);
        // ADD R0, R0, #-1  ->  0xFFFF
        exec(&mut vm, 0b0001_000_000_1_11111);
        assert_eq!(vm.regs.get(0), 0xFFFF);
        assert_eq!(vm.regs.cond, CondFlag::Negative);
    }

    #[test]
    fn and_immediate_and_register() {
        let mut vm = vm();
        vm.regs.set(1, 0b1010);
        // AND R0, R1, #0
        exec(&mut vm, 0b0101_000_001_1_00000);
        assert_eq!(vm.regs.get(0), 0);
        assert_eq!(vm.regs.cond, CondFlag::Zero);

        vm.regs.set(2, 0b0110);
        // AND R0, R1, R2
        exec(&mut vm, 0b0101_000_001_0_00_010);
        assert_eq!(vm.regs.get(0), 0b0010);
        assert_eq!(vm.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn not_complements() {
        let mut vm = vm();
        vm.regs.set(4, 0x00FF);
        // NOT R5, R4
        exec(&mut vm, 0b1001_101_100_111111);
        assert_eq!(vm.regs.get(5), 0xFF00);
        assert_eq!(vm.regs.cond, CondFlag::Negative);
    }

    #[test]
    fn br_taken_only_when_mask_matches_flag() {
        // BRn #5 with flag NEGATIVE advances the PC.
        let mut vm = vm();
        vm.regs.cond = CondFlag::Negative;
        exec(&mut vm, 0b0000_100_000000101);
        assert_eq!(vm.regs.pc, 0x3001 + 5);

        // BRz and BRp with flag NEGATIVE fall through.
        for mask in [0b010u16, 0b001] {
            let mut vm = self::vm();
            vm.regs.cond = CondFlag::Negative;
            exec(&mut vm, (mask << 9) | 0b000000101);
            assert_eq!(vm.regs.pc, 0x3001);
        }
    }

    #[test]
    fn br_backward_offset() {
        let mut vm = vm();
        vm.regs.cond = CondFlag::Zero;
        // BRz #-2
        exec(&mut vm, 0b0000_010_111111110);
        assert_eq!(vm.regs.pc, 0x2FFF);
    }

    #[test]
    fn jmp_and_ret() {
        let mut vm = vm();
        vm.regs.set(2, 0x4242);
        // JMP R2
        exec(&mut vm, 0b1100_000_010_000000);
        assert_eq!(vm.regs.pc, 0x4242);

        // RET is JMP R7.
        vm.regs.set(7, 0x3010);
        exec(&mut vm, 0b1100_000_111_000000);
        assert_eq!(vm.regs.pc, 0x3010);
    }

    #[test]
    fn jsr_saves_link_and_jumps_relative() {
        let mut vm = vm();
        // JSR #16
        exec(&mut vm, 0b0100_1_00000010000);
        assert_eq!(vm.regs.get(7), 0x3001);
        assert_eq!(vm.regs.pc, 0x3011);
    }

    #[test]
    fn jsrr_jumps_through_register() {
        let mut vm = vm();
        vm.regs.set(3, 0x5000);
        // JSRR R3
        exec(&mut vm, 0b0100_0_00_011_000000);
        assert_eq!(vm.regs.get(7), 0x3001);
        assert_eq!(vm.regs.pc, 0x5000);
    }

    #[test]
    fn ld_and_st_are_pc_relative() {
        let mut vm = vm();
        vm.mem.write(0x3005, 0xABCD);
        // LD R1, #4
        exec(&mut vm, 0b0010_001_000000100);
        assert_eq!(vm.regs.get(1), 0xABCD);
        assert_eq!(vm.regs.cond, CondFlag::Negative);

        vm.regs.set(2, 0x0042);
        // ST R2, #4  (PC is now 0x3001, so the cell is 0x3006)
        exec(&mut vm, 0b0011_010_000000100);
        assert_eq!(vm.mem.read(0x3006), 0x0042);
    }

    #[test]
    fn ldi_and_sti_follow_the_pointer() {
        let mut vm = vm();
        vm.mem.write(0x3003, 0x4000);
        vm.mem.write(0x4000, 0x0007);
        // LDI R0, #2
        exec(&mut vm, 0b1010_000_000000010);
        assert_eq!(vm.regs.get(0), 0x0007);
        assert_eq!(vm.regs.cond, CondFlag::Positive);

        vm.mem.write(0x3004, 0x5000);
        vm.regs.set(6, 0x1111);
        // STI R6, #2  (PC is now 0x3001)
        exec(&mut vm, 0b1011_110_000000010);
        assert_eq!(vm.mem.read(0x5000), 0x1111);
    }

    #[test]
    fn ldr_and_str_are_base_plus_offset() {
        let mut vm = vm();
        vm.regs.set(1, 0x4000);
        vm.mem.write(0x3FFF, 0x1234);
        // LDR R0, R1, #-1
        exec(&mut vm, 0b0110_000_001_111111);
        assert_eq!(vm.regs.get(0), 0x1234);

        vm.regs.set(2, 0x00FF);
        // STR R2, R1, #1
        exec(&mut vm, 0b0111_010_001_000001);
        assert_eq!(vm.mem.read(0x4001), 0x00FF);
    }

    #[test]
    fn lea_loads_the_effective_address() {
        let mut vm = vm();
        // LEA R0, #5
        exec(&mut vm, 0b1110_000_000000101);
        assert_eq!(vm.regs.get(0), 0x3006);
        assert_eq!(vm.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn rti_and_reserved_are_illegal() {
        for word in [0x8000u16, 0xD000] {
            let mut vm = self::vm();
            vm.mem.write(0x3000, word);
            match vm.step() {
                Err(VmError::IllegalInstruction { pc, inst }) => {
                    assert_eq!(pc, 0x3000);
                    assert_eq!(inst, word);
                }
                other => panic!("expected an illegal-instruction fault, got {other:?}"),
            }
        }
    }

    #[test]
    fn keyboard_status_register_polls_the_console() {
        let mut vm = Vm::new(BufferConsole::with_input(*b"k"));
        assert_eq!(vm.read_mem(KBSR).unwrap(), 1 << 15);
        assert_eq!(vm.read_mem(KBDR).unwrap(), b'k' as u16);

        // Input drained: status drops to zero.
        assert_eq!(vm.read_mem(KBSR).unwrap(), 0);
    }

    #[test]
    fn flag_trichotomy() {
        let mut vm = vm();
        for value in [0u16, 1, 0x7FFF, 0x8000, 0xFFFF] {
            vm.regs.set(0, value);
            vm.regs.update_flags(0);
            let expected = if value == 0 {
                CondFlag::Zero
            } else if value >> 15 != 0 {
                CondFlag::Negative
            } else {
                CondFlag::Positive
            };
            assert_eq!(vm.regs.cond, expected);
            assert_eq!(vm.regs.get(0), value);
        }
    }
}
