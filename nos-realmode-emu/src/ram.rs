//! The first megabyte of physical memory

use nos_bios_thunk::{PhysAddr, PhysicalMemory};

/// Size of the real-mode address space
pub const RAM_SIZE: usize = 0x10_0000;

/// Real-mode linear addresses wrap at 1MB (A20 masked)
pub const ADDRESS_MASK: u32 = (RAM_SIZE - 1) as u32;

/// Flat 1MB RAM
pub struct Ram {
    bytes: Box<[u8]>,
}

impl Ram {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; RAM_SIZE].into_boxed_slice(),
        }
    }

    pub fn read_u8(&self, linear: u32) -> u8 {
        self.bytes[(linear & ADDRESS_MASK) as usize]
    }

    pub fn write_u8(&mut self, linear: u32, value: u8) {
        self.bytes[(linear & ADDRESS_MASK) as usize] = value;
    }

    /// Copy `code` to `addr`
    pub fn load(&mut self, addr: PhysAddr, code: &[u8]) {
        self.write_bytes(addr, code);
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalMemory for Ram {
    fn read_bytes(&self, addr: PhysAddr, buf: &mut [u8]) {
        let start = addr.as_usize() as u32;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_u8(start.wrapping_add(i as u32));
        }
    }

    fn write_bytes(&mut self, addr: PhysAddr, data: &[u8]) {
        let start = addr.as_usize() as u32;
        for (i, byte) in data.iter().enumerate() {
            self.write_u8(start.wrapping_add(i as u32), *byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_at_one_megabyte() {
        let mut ram = Ram::new();
        ram.write_u16(PhysAddr::new(0xFFFFF), 0xBEEF);
        assert_eq!(ram.read_u8(0xFFFFF), 0xEF);
        assert_eq!(ram.read_u8(0), 0xBE);
        assert_eq!(ram.read_u8(0x10_0000), 0xBE);
    }
}
