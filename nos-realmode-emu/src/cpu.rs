//! 8086 subset interpreter
//!
//! Enough of the real-mode instruction set to run BIOS-style handlers:
//! data movement, ALU, stack, flags, control transfer, software interrupts
//! and port I/O. The operand-size prefix widens register moves and ALU
//! operations to 32 bits; addressing stays 16-bit. Unsupported opcodes stop
//! the run with [`EmuError::UnsupportedOpcode`].

use nos_bios_thunk::ivt::vectors;
use nos_bios_thunk::{Eflags, RegisterSet};

use crate::error::EmuError;
use crate::ram::ADDRESS_MASK;

pub const EAX: usize = 0;
pub const ECX: usize = 1;
pub const EDX: usize = 2;
pub const EBX: usize = 3;
pub const ESP: usize = 4;
pub const EBP: usize = 5;
pub const ESI: usize = 6;
pub const EDI: usize = 7;

/// Flags bits POPF and IRET may change in real mode
const WRITABLE_FLAGS: u32 = 0x7FD5;

/// Flags bits POPFD may change in real mode; VM, VIF and VIP stay as they are
const WRITABLE_FLAGS_32: u32 = WRITABLE_FLAGS | Eflags::AC.bits() | Eflags::ID.bits();

/// Memory and I/O as seen by the processor
pub trait Bus {
    fn read_u8(&self, linear: u32) -> u8;

    fn write_u8(&mut self, linear: u32, value: u8);

    fn port_in(&mut self, port: u16) -> u8;

    fn port_out(&mut self, port: u16, value: u8);

    fn read_u16(&self, linear: u32) -> u16 {
        u16::from_le_bytes([self.read_u8(linear), self.read_u8((linear + 1) & ADDRESS_MASK)])
    }

    fn write_u16(&mut self, linear: u32, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write_u8(linear, lo);
        self.write_u8((linear + 1) & ADDRESS_MASK, hi);
    }
}

/// Linear address of `segment:offset`
pub const fn linear(segment: u16, offset: u16) -> u32 {
    (((segment as u32) << 4) + offset as u32) & ADDRESS_MASK
}

/// Segment registers, in ModRM encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegReg {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
}

/// Result of one [`Cpu::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// HLT retired at `linear`; the processor waits for an interrupt
    Halted { linear: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Size {
    Byte,
    Word,
    Dword,
}

impl Size {
    fn mask(self) -> u32 {
        match self {
            Size::Byte => 0xFF,
            Size::Word => 0xFFFF,
            Size::Dword => 0xFFFF_FFFF,
        }
    }

    fn sign(self) -> u32 {
        match self {
            Size::Byte => 0x80,
            Size::Word => 0x8000,
            Size::Dword => 0x8000_0000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AluOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    fn from_index(index: u8) -> Self {
        match index & 7 {
            0 => Self::Add,
            1 => Self::Or,
            2 => Self::Adc,
            3 => Self::Sbb,
            4 => Self::And,
            5 => Self::Sub,
            6 => Self::Xor,
            _ => Self::Cmp,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ModRm {
    md: u8,
    reg: u8,
    rm: u8,
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Reg(usize),
    Mem(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Executed {
    Normal,
    SoftwareInterrupt,
    Halt,
}

/// Processor state
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    /// General registers, in ModRM encoding order
    pub gpr: [u32; 8],
    seg: [u16; 4],
    pub ip: u16,
    pub flags: Eflags,
    halted: bool,
    steps: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            flags: Eflags::RESERVED_1,
            ..Self::default()
        }
    }

    /// Take every register from `regs`
    pub fn load(&mut self, regs: &RegisterSet) {
        self.gpr = [
            regs.eax, regs.ecx, regs.edx, regs.ebx, regs.esp, regs.ebp, regs.esi, regs.edi,
        ];
        self.seg = [regs.es, regs.cs, regs.ss, regs.ds];
        self.ip = regs.eip as u16;
        self.flags = regs.eflags | Eflags::RESERVED_1;
        self.halted = false;
    }

    /// Write every register back to `regs`
    pub fn store(&self, regs: &mut RegisterSet) {
        regs.eax = self.gpr[EAX];
        regs.ecx = self.gpr[ECX];
        regs.edx = self.gpr[EDX];
        regs.ebx = self.gpr[EBX];
        regs.esp = self.gpr[ESP];
        regs.ebp = self.gpr[EBP];
        regs.esi = self.gpr[ESI];
        regs.edi = self.gpr[EDI];
        regs.es = self.seg[SegReg::Es as usize];
        regs.cs = self.seg[SegReg::Cs as usize];
        regs.ss = self.seg[SegReg::Ss as usize];
        regs.ds = self.seg[SegReg::Ds as usize];
        regs.eip = self.ip as u32;
        regs.eflags = self.flags;
    }

    pub fn segment(&self, seg: SegReg) -> u16 {
        self.seg[seg as usize]
    }

    pub fn set_segment(&mut self, seg: SegReg, value: u16) {
        self.seg[seg as usize] = value;
    }

    pub fn sp(&self) -> u16 {
        self.gpr[ESP] as u16
    }

    pub fn set_sp(&mut self, sp: u16) {
        self.write_reg(ESP, Size::Word, sp as u32);
    }

    /// Linear address of the next instruction
    pub fn pc(&self) -> u32 {
        linear(self.seg[SegReg::Cs as usize], self.ip)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Instructions retired since creation
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn push16<B: Bus + ?Sized>(&mut self, bus: &mut B, value: u16) {
        let sp = self.sp().wrapping_sub(2);
        self.set_sp(sp);
        bus.write_u16(linear(self.seg[SegReg::Ss as usize], sp), value);
    }

    pub fn pop16<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let sp = self.sp();
        let value = bus.read_u16(linear(self.seg[SegReg::Ss as usize], sp));
        self.set_sp(sp.wrapping_add(2));
        value
    }

    fn push32<B: Bus + ?Sized>(&mut self, bus: &mut B, value: u32) {
        self.push16(bus, (value >> 16) as u16);
        self.push16(bus, value as u16);
    }

    fn pop32<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let low = self.pop16(bus) as u32;
        let high = self.pop16(bus) as u32;
        (high << 16) | low
    }

    /// Enter the handler for `vector` through the vector table: push FLAGS,
    /// CS and IP, clear IF and TF.
    pub fn interrupt<B: Bus + ?Sized>(&mut self, bus: &mut B, vector: u8) {
        self.push16(bus, self.flags.bits() as u16);
        self.push16(bus, self.seg[SegReg::Cs as usize]);
        self.push16(bus, self.ip);
        self.flags.remove(Eflags::IF | Eflags::TF);

        let entry = vector as u32 * 4;
        self.ip = bus.read_u16(entry);
        self.seg[SegReg::Cs as usize] = bus.read_u16(entry + 2);
        self.halted = false;
    }

    /// Execute one instruction.
    ///
    /// With TF set when the instruction starts, a single-step trap through
    /// vector 1 follows it (software interrupts excepted, they clear TF).
    pub fn step<B: Bus + ?Sized>(&mut self, bus: &mut B) -> Result<Step, EmuError> {
        let at = self.pc();
        if self.halted {
            return Ok(Step::Halted { linear: at });
        }

        let trap = self.flags.contains(Eflags::TF);
        let executed = self.execute(bus)?;
        self.steps += 1;

        if trap && executed != Executed::SoftwareInterrupt {
            self.interrupt(bus, vectors::SINGLE_STEP);
            return Ok(Step::Continue);
        }
        if executed == Executed::Halt {
            self.halted = true;
            return Ok(Step::Halted { linear: at });
        }
        Ok(Step::Continue)
    }

    fn fetch_u8<B: Bus + ?Sized>(&mut self, bus: &B) -> u8 {
        let value = bus.read_u8(self.pc());
        self.ip = self.ip.wrapping_add(1);
        value
    }

    fn fetch_u16<B: Bus + ?Sized>(&mut self, bus: &B) -> u16 {
        let low = self.fetch_u8(bus) as u16;
        let high = self.fetch_u8(bus) as u16;
        (high << 8) | low
    }

    fn fetch_imm<B: Bus + ?Sized>(&mut self, bus: &B, size: Size) -> u32 {
        match size {
            Size::Byte => self.fetch_u8(bus) as u32,
            Size::Word => self.fetch_u16(bus) as u32,
            Size::Dword => {
                let low = self.fetch_u16(bus) as u32;
                let high = self.fetch_u16(bus) as u32;
                (high << 16) | low
            }
        }
    }

    fn modrm<B: Bus + ?Sized>(&mut self, bus: &B) -> ModRm {
        let byte = self.fetch_u8(bus);
        ModRm {
            md: byte >> 6,
            reg: (byte >> 3) & 7,
            rm: byte & 7,
        }
    }

    fn decode_rm<B: Bus + ?Sized>(&mut self, bus: &B, m: ModRm, seg_override: Option<SegReg>) -> Operand {
        if m.md == 3 {
            return Operand::Reg(m.rm as usize);
        }

        let bx = self.gpr[EBX] as u16;
        let bp = self.gpr[EBP] as u16;
        let si = self.gpr[ESI] as u16;
        let di = self.gpr[EDI] as u16;
        let (base, default_seg) = match m.rm {
            0 => (bx.wrapping_add(si), SegReg::Ds),
            1 => (bx.wrapping_add(di), SegReg::Ds),
            2 => (bp.wrapping_add(si), SegReg::Ss),
            3 => (bp.wrapping_add(di), SegReg::Ss),
            4 => (si, SegReg::Ds),
            5 => (di, SegReg::Ds),
            6 if m.md == 0 => (self.fetch_u16(bus), SegReg::Ds),
            6 => (bp, SegReg::Ss),
            _ => (bx, SegReg::Ds),
        };
        let disp = match m.md {
            1 => self.fetch_u8(bus) as i8 as u16,
            2 => self.fetch_u16(bus),
            _ => 0,
        };

        let seg = seg_override.unwrap_or(default_seg);
        Operand::Mem(linear(self.seg[seg as usize], base.wrapping_add(disp)))
    }

    fn read_reg(&self, index: usize, size: Size) -> u32 {
        match size {
            Size::Byte if index < 4 => self.gpr[index] & 0xFF,
            Size::Byte => (self.gpr[index - 4] >> 8) & 0xFF,
            Size::Word => self.gpr[index] & 0xFFFF,
            Size::Dword => self.gpr[index],
        }
    }

    fn write_reg(&mut self, index: usize, size: Size, value: u32) {
        match size {
            Size::Byte if index < 4 => {
                self.gpr[index] = (self.gpr[index] & !0xFF) | (value & 0xFF);
            }
            Size::Byte => {
                let reg = &mut self.gpr[index - 4];
                *reg = (*reg & !0xFF00) | ((value & 0xFF) << 8);
            }
            Size::Word => self.gpr[index] = (self.gpr[index] & !0xFFFF) | (value & 0xFFFF),
            Size::Dword => self.gpr[index] = value,
        }
    }

    fn read_operand<B: Bus + ?Sized>(&self, bus: &B, operand: Operand, size: Size) -> u32 {
        match operand {
            Operand::Reg(index) => self.read_reg(index, size),
            Operand::Mem(addr) => match size {
                Size::Byte => bus.read_u8(addr) as u32,
                Size::Word => bus.read_u16(addr) as u32,
                Size::Dword => {
                    let high = bus.read_u16((addr + 2) & ADDRESS_MASK) as u32;
                    (high << 16) | bus.read_u16(addr) as u32
                }
            },
        }
    }

    fn write_operand<B: Bus + ?Sized>(&mut self, bus: &mut B, operand: Operand, size: Size, value: u32) {
        match operand {
            Operand::Reg(index) => self.write_reg(index, size, value),
            Operand::Mem(addr) => match size {
                Size::Byte => bus.write_u8(addr, value as u8),
                Size::Word => bus.write_u16(addr, value as u16),
                Size::Dword => {
                    bus.write_u16(addr, value as u16);
                    bus.write_u16((addr + 2) & ADDRESS_MASK, (value >> 16) as u16);
                }
            },
        }
    }

    fn set_result_flags(&mut self, result: u32, size: Size) {
        self.flags.set(Eflags::ZF, result & size.mask() == 0);
        self.flags.set(Eflags::SF, result & size.sign() != 0);
        self.flags.set(Eflags::PF, (result as u8).count_ones() % 2 == 0);
    }

    fn alu(&mut self, op: AluOp, a: u32, b: u32, size: Size) -> u32 {
        let mask = size.mask();
        let sign = size.sign();
        let carry_in = self.flags.contains(Eflags::CF) as u64;

        let (result, carry, overflow) = match op {
            AluOp::Add | AluOp::Adc => {
                let c = if op == AluOp::Adc { carry_in } else { 0 };
                let wide = a as u64 + b as u64 + c;
                let r = wide as u32 & mask;
                (r, wide > mask as u64, (a ^ r) & (b ^ r) & sign != 0)
            }
            AluOp::Sub | AluOp::Sbb | AluOp::Cmp => {
                let c = if op == AluOp::Sbb { carry_in } else { 0 };
                let r = (a as u64).wrapping_sub(b as u64).wrapping_sub(c) as u32 & mask;
                (r, b as u64 + c > a as u64, (a ^ b) & (a ^ r) & sign != 0)
            }
            AluOp::Or => (a | b, false, false),
            AluOp::And => (a & b, false, false),
            AluOp::Xor => (a ^ b, false, false),
        };

        self.flags.set(Eflags::CF, carry);
        self.flags.set(Eflags::OF, overflow);
        self.flags.set(Eflags::AF, (a ^ b ^ result) & 0x10 != 0);
        self.set_result_flags(result, size);
        result
    }

    /// INC/DEC leave CF alone
    fn step_by_one(&mut self, value: u32, size: Size, decrement: bool) -> u32 {
        let carry = self.flags.contains(Eflags::CF);
        let op = if decrement { AluOp::Sub } else { AluOp::Add };
        let result = self.alu(op, value, 1, size);
        self.flags.set(Eflags::CF, carry);
        result
    }

    fn load_flags(&mut self, value: u16) {
        let kept = self.flags.bits() & !0xFFFF;
        let loaded = value as u32 & WRITABLE_FLAGS;
        self.flags = Eflags::from_bits_retain(kept | loaded) | Eflags::RESERVED_1;
    }

    /// POPFD: the 16-bit load plus AC and ID; RF is cleared
    fn load_flags32(&mut self, value: u32) {
        let kept = self.flags.bits() & !(0xFFFF | WRITABLE_FLAGS_32 | Eflags::RF.bits());
        let loaded = value & WRITABLE_FLAGS_32;
        self.flags = Eflags::from_bits_retain(kept | loaded) | Eflags::RESERVED_1;
    }

    fn condition(&self, code: u8) -> bool {
        let f = self.flags;
        let taken = match code >> 1 {
            0 => f.contains(Eflags::OF),
            1 => f.contains(Eflags::CF),
            2 => f.contains(Eflags::ZF),
            3 => f.contains(Eflags::CF) || f.contains(Eflags::ZF),
            4 => f.contains(Eflags::SF),
            5 => f.contains(Eflags::PF),
            6 => f.contains(Eflags::SF) != f.contains(Eflags::OF),
            _ => f.contains(Eflags::ZF) || f.contains(Eflags::SF) != f.contains(Eflags::OF),
        };
        taken != (code & 1 == 1)
    }

    fn jump_relative(&mut self, displacement: u16) {
        self.ip = self.ip.wrapping_add(displacement);
    }

    fn execute<B: Bus + ?Sized>(&mut self, bus: &mut B) -> Result<Executed, EmuError> {
        let start_ip = self.ip;
        let mut op32 = false;
        let mut seg_override = None;
        let opcode = loop {
            match self.fetch_u8(bus) {
                0x66 => op32 = true,
                0x26 => seg_override = Some(SegReg::Es),
                0x2E => seg_override = Some(SegReg::Cs),
                0x36 => seg_override = Some(SegReg::Ss),
                0x3E => seg_override = Some(SegReg::Ds),
                byte => break byte,
            }
        };
        let fault = EmuError::UnsupportedOpcode {
            cs: self.seg[SegReg::Cs as usize],
            ip: start_ip,
            opcode,
        };
        let word = if op32 { Size::Dword } else { Size::Word };

        match opcode {
            // PUSH/POP segment
            0x06 => self.push16(bus, self.seg[SegReg::Es as usize]),
            0x0E => self.push16(bus, self.seg[SegReg::Cs as usize]),
            0x16 => self.push16(bus, self.seg[SegReg::Ss as usize]),
            0x1E => self.push16(bus, self.seg[SegReg::Ds as usize]),
            0x07 => self.seg[SegReg::Es as usize] = self.pop16(bus),
            0x17 => self.seg[SegReg::Ss as usize] = self.pop16(bus),
            0x1F => self.seg[SegReg::Ds as usize] = self.pop16(bus),

            // ALU in its six classic encodings
            0x00..=0x3F if opcode & 7 < 6 => {
                let op = AluOp::from_index(opcode >> 3);
                let size = if opcode & 1 == 0 { Size::Byte } else { word };
                match opcode & 7 {
                    0 | 1 => {
                        let m = self.modrm(bus);
                        let dst = self.decode_rm(bus, m, seg_override);
                        let a = self.read_operand(bus, dst, size);
                        let b = self.read_reg(m.reg as usize, size);
                        let result = self.alu(op, a, b, size);
                        if op != AluOp::Cmp {
                            self.write_operand(bus, dst, size, result);
                        }
                    }
                    2 | 3 => {
                        let m = self.modrm(bus);
                        let src = self.decode_rm(bus, m, seg_override);
                        let a = self.read_reg(m.reg as usize, size);
                        let b = self.read_operand(bus, src, size);
                        let result = self.alu(op, a, b, size);
                        if op != AluOp::Cmp {
                            self.write_reg(m.reg as usize, size, result);
                        }
                    }
                    _ => {
                        let b = self.fetch_imm(bus, size);
                        let a = self.read_reg(EAX, size);
                        let result = self.alu(op, a, b, size);
                        if op != AluOp::Cmp {
                            self.write_reg(EAX, size, result);
                        }
                    }
                }
            }

            0x40..=0x47 => {
                let index = (opcode & 7) as usize;
                let result = self.step_by_one(self.read_reg(index, word), word, false);
                self.write_reg(index, word, result);
            }
            0x48..=0x4F => {
                let index = (opcode & 7) as usize;
                let result = self.step_by_one(self.read_reg(index, word), word, true);
                self.write_reg(index, word, result);
            }
            0x50..=0x57 => {
                let value = self.read_reg((opcode & 7) as usize, word);
                if op32 {
                    self.push32(bus, value);
                } else {
                    self.push16(bus, value as u16);
                }
            }
            0x58..=0x5F => {
                let value = if op32 { self.pop32(bus) } else { self.pop16(bus) as u32 };
                self.write_reg((opcode & 7) as usize, word, value);
            }

            0x70..=0x7F => {
                let displacement = self.fetch_u8(bus) as i8 as u16;
                if self.condition(opcode & 0x0F) {
                    self.jump_relative(displacement);
                }
            }

            // Group 1: ALU r/m, imm
            0x80 | 0x81 | 0x83 => {
                let size = if opcode == 0x80 { Size::Byte } else { word };
                let m = self.modrm(bus);
                let dst = self.decode_rm(bus, m, seg_override);
                let imm = match opcode {
                    0x83 => self.fetch_u8(bus) as i8 as i32 as u32 & size.mask(),
                    _ => self.fetch_imm(bus, size),
                };
                let op = AluOp::from_index(m.reg);
                let a = self.read_operand(bus, dst, size);
                let result = self.alu(op, a, imm, size);
                if op != AluOp::Cmp {
                    self.write_operand(bus, dst, size, result);
                }
            }

            // TEST r/m, reg
            0x84 | 0x85 => {
                let size = if opcode == 0x84 { Size::Byte } else { word };
                let m = self.modrm(bus);
                let src = self.decode_rm(bus, m, seg_override);
                let a = self.read_operand(bus, src, size);
                let b = self.read_reg(m.reg as usize, size);
                self.alu(AluOp::And, a, b, size);
            }

            // MOV r/m <-> reg
            0x88..=0x8B => {
                let size = if opcode & 1 == 0 { Size::Byte } else { word };
                let m = self.modrm(bus);
                let rm = self.decode_rm(bus, m, seg_override);
                if opcode & 2 == 0 {
                    let value = self.read_reg(m.reg as usize, size);
                    self.write_operand(bus, rm, size, value);
                } else {
                    let value = self.read_operand(bus, rm, size);
                    self.write_reg(m.reg as usize, size, value);
                }
            }
            0x8C => {
                let m = self.modrm(bus);
                if m.reg > 3 {
                    return Err(fault);
                }
                let dst = self.decode_rm(bus, m, seg_override);
                let value = self.seg[m.reg as usize] as u32;
                self.write_operand(bus, dst, Size::Word, value);
            }
            0x8E => {
                let m = self.modrm(bus);
                if m.reg > 3 || m.reg == SegReg::Cs as u8 {
                    return Err(fault);
                }
                let src = self.decode_rm(bus, m, seg_override);
                self.seg[m.reg as usize] = self.read_operand(bus, src, Size::Word) as u16;
            }

            0x90 => {}
            0x9C => {
                if op32 {
                    // VM and RF never reach the stack
                    self.push32(bus, self.flags.bits() & 0x00FC_FFFF);
                } else {
                    self.push16(bus, self.flags.bits() as u16);
                }
            }
            0x9D => {
                if op32 {
                    let value = self.pop32(bus);
                    self.load_flags32(value);
                } else {
                    let value = self.pop16(bus);
                    self.load_flags(value);
                }
            }

            // MOV accumulator <-> moffs
            0xA0..=0xA3 => {
                let size = if opcode & 1 == 0 { Size::Byte } else { word };
                let offset = self.fetch_u16(bus);
                let seg = seg_override.unwrap_or(SegReg::Ds);
                let addr = Operand::Mem(linear(self.seg[seg as usize], offset));
                if opcode & 2 == 0 {
                    let value = self.read_operand(bus, addr, size);
                    self.write_reg(EAX, size, value);
                } else {
                    let value = self.read_reg(EAX, size);
                    self.write_operand(bus, addr, size, value);
                }
            }
            0xA8 | 0xA9 => {
                let size = if opcode == 0xA8 { Size::Byte } else { word };
                let imm = self.fetch_imm(bus, size);
                let a = self.read_reg(EAX, size);
                self.alu(AluOp::And, a, imm, size);
            }

            0xB0..=0xB7 => {
                let imm = self.fetch_u8(bus) as u32;
                self.write_reg((opcode & 7) as usize, Size::Byte, imm);
            }
            0xB8..=0xBF => {
                let imm = self.fetch_imm(bus, word);
                self.write_reg((opcode & 7) as usize, word, imm);
            }

            0xC2 | 0xC3 => {
                let release = if opcode == 0xC2 { self.fetch_u16(bus) } else { 0 };
                self.ip = self.pop16(bus);
                self.set_sp(self.sp().wrapping_add(release));
            }
            0xC6 | 0xC7 => {
                let size = if opcode == 0xC6 { Size::Byte } else { word };
                let m = self.modrm(bus);
                if m.reg != 0 {
                    return Err(fault);
                }
                let dst = self.decode_rm(bus, m, seg_override);
                let imm = self.fetch_imm(bus, size);
                self.write_operand(bus, dst, size, imm);
            }
            0xCA | 0xCB => {
                let release = if opcode == 0xCA { self.fetch_u16(bus) } else { 0 };
                self.ip = self.pop16(bus);
                self.seg[SegReg::Cs as usize] = self.pop16(bus);
                self.set_sp(self.sp().wrapping_add(release));
            }
            0xCC => {
                self.interrupt(bus, 3);
                return Ok(Executed::SoftwareInterrupt);
            }
            0xCD => {
                let vector = self.fetch_u8(bus);
                self.interrupt(bus, vector);
                return Ok(Executed::SoftwareInterrupt);
            }
            0xCF => {
                self.ip = self.pop16(bus);
                self.seg[SegReg::Cs as usize] = self.pop16(bus);
                let flags = self.pop16(bus);
                self.load_flags(flags);
            }

            0xE4 => {
                let port = self.fetch_u8(bus) as u16;
                let value = bus.port_in(port) as u32;
                self.write_reg(EAX, Size::Byte, value);
            }
            0xE6 => {
                let port = self.fetch_u8(bus) as u16;
                bus.port_out(port, self.gpr[EAX] as u8);
            }
            0xEC => {
                let value = bus.port_in(self.gpr[EDX] as u16) as u32;
                self.write_reg(EAX, Size::Byte, value);
            }
            0xEE => bus.port_out(self.gpr[EDX] as u16, self.gpr[EAX] as u8),

            0xE8 => {
                let displacement = self.fetch_u16(bus);
                self.push16(bus, self.ip);
                self.jump_relative(displacement);
            }
            0xE9 => {
                let displacement = self.fetch_u16(bus);
                self.jump_relative(displacement);
            }
            0xEA => {
                let offset = self.fetch_u16(bus);
                let segment = self.fetch_u16(bus);
                self.ip = offset;
                self.seg[SegReg::Cs as usize] = segment;
            }
            0xEB => {
                let displacement = self.fetch_u8(bus) as i8 as u16;
                self.jump_relative(displacement);
            }

            0xF4 => return Ok(Executed::Halt),
            0xF5 => self.flags.toggle(Eflags::CF),
            0xF8 => self.flags.remove(Eflags::CF),
            0xF9 => self.flags.insert(Eflags::CF),
            0xFA => self.flags.remove(Eflags::IF),
            0xFB => self.flags.insert(Eflags::IF),
            0xFC => self.flags.remove(Eflags::DF),
            0xFD => self.flags.insert(Eflags::DF),

            // Group 4/5: INC, DEC, PUSH r/m
            0xFE | 0xFF => {
                let size = if opcode == 0xFE { Size::Byte } else { word };
                let m = self.modrm(bus);
                let operand = self.decode_rm(bus, m, seg_override);
                match (m.reg, opcode) {
                    (0 | 1, _) => {
                        let value = self.read_operand(bus, operand, size);
                        let result = self.step_by_one(value, size, m.reg == 1);
                        self.write_operand(bus, operand, size, result);
                    }
                    (6, 0xFF) => {
                        let value = self.read_operand(bus, operand, size);
                        if op32 {
                            self.push32(bus, value);
                        } else {
                            self.push16(bus, value as u16);
                        }
                    }
                    _ => return Err(fault),
                }
            }

            _ => return Err(fault),
        }

        Ok(Executed::Normal)
    }
}
