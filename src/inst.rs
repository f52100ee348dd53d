/// The sixteen LC-3 operations, one per 4-bit opcode value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// conditional branch
    Br,
    /// add
    Add,
    /// load
    Ld,
    /// store
    St,
    /// jump to subroutine
    Jsr,
    /// bitwise and
    And,
    /// load base+offset
    Ldr,
    /// store base+offset
    Str,
    /// return from interrupt (no user-mode behavior)
    Rti,
    /// bitwise complement
    Not,
    /// load indirect
    Ldi,
    /// store indirect
    Sti,
    /// jump
    Jmp,
    /// reserved (no behavior)
    Reserved,
    /// load effective address
    Lea,
    /// execute trap service call
    Trap,
}

/// Architecture-defined mapping from opcode value to operation. The
/// ordering is fixed by the ISA and is not derivable from the variant
/// names; entry `n` is the operation encoded by opcode value `n`.
pub const OPCODE_TABLE: [Opcode; 16] = [
    Opcode::Br,
    Opcode::Add,
    Opcode::Ld,
    Opcode::St,
    Opcode::Jsr,
    Opcode::And,
    Opcode::Ldr,
    Opcode::Str,
    Opcode::Rti,
    Opcode::Not,
    Opcode::Ldi,
    Opcode::Sti,
    Opcode::Jmp,
    Opcode::Reserved,
    Opcode::Lea,
    Opcode::Trap,
];

/// A fetched 16-bit instruction word. Fields are extracted on demand;
/// the word has no identity beyond the fetch cycle that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u16);

impl Instruction {
    pub fn opcode(self) -> Opcode {
        OPCODE_TABLE[(self.0 >> 12) as usize]
    }

    /// Destination register, bits 11-9.
    pub fn dr(self) -> u16 {
        (self.0 >> 9) & 0x7
    }

    /// First source register, bits 8-6.
    pub fn sr1(self) -> u16 {
        (self.0 >> 6) & 0x7
    }

    /// Second source register, bits 2-0.
    pub fn sr2(self) -> u16 {
        self.0 & 0x7
    }

    /// Immediate-mode flag, bit 5.
    pub fn imm_flag(self) -> bool {
        (self.0 >> 5) & 0x1 != 0
    }

    /// Sign-extended 5-bit immediate, bits 4-0.
    pub fn imm5(self) -> u16 {
        sign_extend(self.0 & 0x1F, 5)
    }

    /// Sign-extended 6-bit offset, bits 5-0.
    pub fn offset6(self) -> u16 {
        sign_extend(self.0 & 0x3F, 6)
    }

    /// Sign-extended 9-bit PC-relative offset, bits 8-0.
    pub fn offset9(self) -> u16 {
        sign_extend(self.0 & 0x1FF, 9)
    }

    /// Sign-extended 11-bit PC-relative offset, bits 10-0.
    pub fn offset11(self) -> u16 {
        sign_extend(self.0 & 0x7FF, 11)
    }

    /// JSR addressing-mode flag, bit 11: set for PC-relative, clear for
    /// register-indirect (JSRR).
    pub fn long_flag(self) -> bool {
        (self.0 >> 11) & 0x1 != 0
    }

    /// Branch condition mask, bits 11-9 (n/z/p).
    pub fn cond_mask(self) -> u16 {
        (self.0 >> 9) & 0x7
    }

    /// Trap service number, low byte.
    pub fn trap_vector(self) -> u16 {
        self.0 & 0xFF
    }
}

/// Replicates bit `width - 1` of `x` into all higher bits of a 16-bit
/// result, turning a narrow two's-complement field into a full word.
pub fn sign_extend(x: u16, width: u32) -> u16 {
    if (x >> (width - 1)) & 1 != 0 {
        x | 0xFFFF_u16.wrapping_shl(width)
    } else {
        x
    }
}
