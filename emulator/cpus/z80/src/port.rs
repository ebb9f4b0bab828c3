use femtos::Instant;

use gens_core::{Address, Addressable};

use crate::state::Z80Error;

/// The two address spaces the CPU can see: 64KB of memory and 64KB of I/O ports
pub struct Z80Port<'a> {
    pub memory: &'a mut dyn Addressable,
    pub io: &'a mut dyn Addressable,
}

impl<'a> Z80Port<'a> {
    pub fn new(memory: &'a mut dyn Addressable, io: &'a mut dyn Addressable) -> Self {
        Self {
            memory,
            io,
        }
    }

    #[inline]
    pub fn read_u8(&mut self, clock: Instant, addr: u16) -> Result<u8, Z80Error> {
        Ok(self.memory.read_u8(clock, addr as Address)?)
    }

    #[inline]
    pub fn write_u8(&mut self, clock: Instant, addr: u16, value: u8) -> Result<(), Z80Error> {
        Ok(self.memory.write_u8(clock, addr as Address, value)?)
    }

    /// Words are read a byte at a time so that accesses at 0xFFFF wrap around to 0x0000
    pub fn read_leu16(&mut self, clock: Instant, addr: u16) -> Result<u16, Z80Error> {
        let low = self.read_u8(clock, addr)?;
        let high = self.read_u8(clock, addr.wrapping_add(1))?;
        Ok(((high as u16) << 8) | low as u16)
    }

    pub fn write_leu16(&mut self, clock: Instant, addr: u16, value: u16) -> Result<(), Z80Error> {
        self.write_u8(clock, addr, value as u8)?;
        self.write_u8(clock, addr.wrapping_add(1), (value >> 8) as u8)
    }

    #[inline]
    pub fn read_io(&mut self, clock: Instant, port: u16) -> Result<u8, Z80Error> {
        Ok(self.io.read_u8(clock, port as Address)?)
    }

    #[inline]
    pub fn write_io(&mut self, clock: Instant, port: u16, value: u8) -> Result<(), Z80Error> {
        Ok(self.io.write_u8(clock, port as Address, value)?)
    }
}
