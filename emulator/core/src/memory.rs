use std::fmt::{self, Write};
use femtos::Instant;

use crate::error::{Error, EmulatorErrorKind};
use crate::devices::{Address, Addressable, Device, read_beu16};


pub struct MemoryBlock {
    read_only: bool,
    contents: Vec<u8>,
}

impl MemoryBlock {
    pub fn new(contents: Vec<u8>) -> MemoryBlock {
        MemoryBlock {
            read_only: false,
            contents,
        }
    }

    pub fn with_size(size: usize) -> MemoryBlock {
        MemoryBlock::new(vec![0; size])
    }

    /// Copy `data` into the block starting at `addr`
    pub fn load_at(&mut self, addr: Address, data: &[u8]) -> Result<(), Error> {
        let range = self.checked_range(addr, data.len())?;
        self.contents[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read_only(&mut self) {
        self.read_only = true;
    }

    pub fn resize(&mut self, new_size: usize) {
        self.contents.resize(new_size, 0);
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    fn checked_range(&self, addr: Address, len: usize) -> Result<std::ops::Range<usize>, Error> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.contents.len() => Ok(start..end),
            _ => Err(Error::emulator(
                EmulatorErrorKind::OutOfRange,
                format!("access of {} bytes at {:#06x} is outside of a {} byte memory block", len, addr, self.contents.len()),
            )),
        }
    }
}

impl Addressable for MemoryBlock {
    fn size(&self) -> usize {
        self.contents.len()
    }

    fn read(&mut self, _clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error> {
        let range = self.checked_range(addr, data.len())?;
        data.copy_from_slice(&self.contents[range]);
        Ok(())
    }

    fn write(&mut self, _clock: Instant, addr: Address, data: &[u8]) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::emulator(
                EmulatorErrorKind::ReadOnly,
                format!("attempt to write to read-only memory at {:x} with data {:?}", addr, data),
            ));
        }

        let range = self.checked_range(addr, data.len())?;
        self.contents[range].copy_from_slice(data);
        Ok(())
    }
}


/// Mirrors a smaller device across a larger address range
pub struct AddressRepeater {
    subdevice: Device,
    range: Address,
}

impl AddressRepeater {
    pub fn new(subdevice: Device, range: Address) -> Self {
        Self {
            subdevice,
            range,
        }
    }
}

impl Addressable for AddressRepeater {
    fn size(&self) -> usize {
        self.range as usize
    }

    fn read(&mut self, clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error> {
        let size = self.subdevice.size() as Address;
        self.subdevice.read(clock, addr % size, data)
    }

    fn write(&mut self, clock: Instant, addr: Address, data: &[u8]) -> Result<(), Error> {
        let size = self.subdevice.size() as Address;
        self.subdevice.write(clock, addr % size, data)
    }
}


#[derive(Clone)]
pub struct Block {
    pub base: Address,
    pub size: usize,
    pub dev: Device,
}

/// A collection of devices mapped at fixed base addresses
#[derive(Clone, Default)]
pub struct Bus {
    blocks: Vec<Block>,
    ignore_unmapped: bool,
}

impl Bus {
    pub fn set_ignore_unmapped(&mut self, ignore_unmapped: bool) {
        self.ignore_unmapped = ignore_unmapped;
    }

    pub fn clear_all_bus_devices(&mut self) {
        self.blocks.clear();
    }

    pub fn insert(&mut self, base: Address, dev: Device) {
        let size = dev.size();
        let block = Block { base, size, dev };
        let i = self.blocks.iter().position(|cur| cur.base > block.base).unwrap_or(self.blocks.len());
        self.blocks.insert(i, block);
    }

    pub fn get_device_at(&self, addr: Address, count: usize) -> Result<(Device, Address), Error> {
        for block in &self.blocks {
            if addr >= block.base && addr < (block.base + block.size as Address) {
                let relative_addr = addr - block.base;
                if relative_addr as usize + count <= block.size {
                    return Ok((block.dev.clone(), relative_addr));
                } else {
                    return Err(Error::emulator(EmulatorErrorKind::OutOfRange, format!("access straddles the end of a device at {:#010x}", addr)));
                }
            }
        }
        Err(Error::emulator(EmulatorErrorKind::UnmappedAddress, format!("no segment found at {:#010x}", addr)))
    }

    pub fn dump_memory<W: Write>(&mut self, writer: &mut W, clock: Instant, mut addr: Address, mut count: Address) -> fmt::Result {
        while count > 0 {
            write!(writer, "{:#06x}: ", addr)?;

            let to = if count < 16 { count.div_ceil(2) } else { 8 };
            for _ in 0..to {
                match self.read_beu16(clock, addr) {
                    Ok(word) => write!(writer, "{:#06x} ", word)?,
                    Err(_) => return writeln!(writer),
                }
                addr += 2;
                count = count.saturating_sub(2);
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

impl Addressable for Bus {
    fn size(&self) -> usize {
        match self.blocks.last() {
            Some(block) => (block.base as usize) + block.size,
            None => 0,
        }
    }

    fn read(&mut self, clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error> {
        let (mut dev, relative_addr) = match self.get_device_at(addr, data.len()) {
            Ok(result) => result,
            Err(err) if self.ignore_unmapped => {
                log::debug!("ignoring unmapped read: {}", err);
                data.fill(0);
                return Ok(());
            },
            Err(err) => return Err(err),
        };
        dev.read(clock, relative_addr, data)
    }

    fn write(&mut self, clock: Instant, addr: Address, data: &[u8]) -> Result<(), Error> {
        let (mut dev, relative_addr) = match self.get_device_at(addr, data.len()) {
            Ok(result) => result,
            Err(err) if self.ignore_unmapped => {
                log::debug!("ignoring unmapped write of {:?}: {}", data, err);
                return Ok(());
            },
            Err(err) => return Err(err),
        };
        dev.write(clock, relative_addr, data)
    }
}

pub fn dump_slice<W: Write>(writer: &mut W, data: &[u8]) -> fmt::Result {
    for (i, line) in data.chunks(16).enumerate() {
        write!(writer, "{:#06x}: ", i * 16)?;
        for word in line.chunks(2) {
            if word.len() == 2 {
                write!(writer, "{:#06x} ", read_beu16(word))?;
            } else {
                write!(writer, "{:#04x} ", word[0])?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_block_bounds() {
        let mut block = MemoryBlock::with_size(0x10);
        block.write_u8(Instant::START, 0x0F, 0xAA).unwrap();
        assert_eq!(block.read_u8(Instant::START, 0x0F).unwrap(), 0xAA);

        let err = block.read_leu16(Instant::START, 0x0F).unwrap_err();
        assert_eq!(err.kind(), Some(EmulatorErrorKind::OutOfRange));
    }

    #[test]
    fn read_only_block_rejects_writes() {
        let mut block = MemoryBlock::new(vec![0x12, 0x34]);
        block.read_only();
        let err = block.write_u8(Instant::START, 0, 0).unwrap_err();
        assert_eq!(err.kind(), Some(EmulatorErrorKind::ReadOnly));
        assert_eq!(block.read_beu16(Instant::START, 0).unwrap(), 0x1234);
    }

    #[test]
    fn bus_routes_to_devices() {
        let low = Device::new(MemoryBlock::with_size(0x100));
        let high = Device::new(MemoryBlock::with_size(0x100));

        let mut bus = Bus::default();
        bus.insert(0x1000, high.clone());
        bus.insert(0x0000, low.clone());
        assert_eq!(bus.size(), 0x1100);

        bus.write_leu16(Instant::START, 0x1010, 0xBEEF).unwrap();
        assert_eq!(high.borrow_mut().read_u8(Instant::START, 0x10).unwrap(), 0xEF);
        assert_eq!(high.borrow_mut().read_u8(Instant::START, 0x11).unwrap(), 0xBE);

        let err = bus.read_u8(Instant::START, 0x0800).unwrap_err();
        assert_eq!(err.kind(), Some(EmulatorErrorKind::UnmappedAddress));

        bus.set_ignore_unmapped(true);
        assert_eq!(bus.read_u8(Instant::START, 0x0800).unwrap(), 0x00);
        bus.write_u8(Instant::START, 0x0800, 0x55).unwrap();
    }

    #[test]
    fn repeater_mirrors_subdevice() {
        let ram = Device::new(MemoryBlock::with_size(0x20));
        let mut mirror = AddressRepeater::new(ram.clone(), 0x80);
        assert_eq!(mirror.size(), 0x80);

        mirror.write_u8(Instant::START, 0x45, 0x99).unwrap();
        assert_eq!(ram.borrow_mut().read_u8(Instant::START, 0x05).unwrap(), 0x99);
        assert_eq!(mirror.read_u8(Instant::START, 0x25).unwrap(), 0x99);
    }

    #[test]
    fn dumps_memory_as_words() {
        let mut bus = Bus::default();
        bus.insert(0, Device::new(MemoryBlock::new(vec![0x12, 0x34, 0x56, 0x78])));
        let mut output = String::new();
        bus.dump_memory(&mut output, Instant::START, 0, 4).unwrap();
        assert_eq!(output, "0x0000: 0x1234 0x5678 \n");
    }
}
