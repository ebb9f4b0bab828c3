use std::rc::Rc;
use std::cell::{RefCell, RefMut};
use femtos::Instant;

use crate::Error;


/// A universal memory address used by the Addressable trait
pub type Address = u64;


/// A device that can be addressed to read data from or write data to the device.
///
/// Addresses passed to `read()` and `write()` are relative to the start of the device, and
/// `clock` is the emulated time of the access, which lets timed devices (sound chips, the VDP)
/// catch up to the CPU before answering.
pub trait Addressable {
    fn size(&self) -> usize;
    fn read(&mut self, clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error>;
    fn write(&mut self, clock: Instant, addr: Address, data: &[u8]) -> Result<(), Error>;

    #[inline]
    fn read_u8(&mut self, clock: Instant, addr: Address) -> Result<u8, Error> {
        let mut data = [0; 1];
        self.read(clock, addr, &mut data)?;
        Ok(data[0])
    }

    #[inline]
    fn read_beu16(&mut self, clock: Instant, addr: Address) -> Result<u16, Error> {
        let mut data = [0; 2];
        self.read(clock, addr, &mut data)?;
        Ok(read_beu16(&data))
    }

    #[inline]
    fn read_leu16(&mut self, clock: Instant, addr: Address) -> Result<u16, Error> {
        let mut data = [0; 2];
        self.read(clock, addr, &mut data)?;
        Ok(read_leu16(&data))
    }

    #[inline]
    fn read_beu32(&mut self, clock: Instant, addr: Address) -> Result<u32, Error> {
        let mut data = [0; 4];
        self.read(clock, addr, &mut data)?;
        Ok(read_beu32(&data))
    }

    #[inline]
    fn read_leu32(&mut self, clock: Instant, addr: Address) -> Result<u32, Error> {
        let mut data = [0; 4];
        self.read(clock, addr, &mut data)?;
        Ok(read_leu32(&data))
    }

    #[inline]
    fn write_u8(&mut self, clock: Instant, addr: Address, value: u8) -> Result<(), Error> {
        let data = [value];
        self.write(clock, addr, &data)
    }

    #[inline]
    fn write_beu16(&mut self, clock: Instant, addr: Address, value: u16) -> Result<(), Error> {
        let mut data = [0; 2];
        write_beu16(&mut data, value);
        self.write(clock, addr, &data)
    }

    #[inline]
    fn write_leu16(&mut self, clock: Instant, addr: Address, value: u16) -> Result<(), Error> {
        let mut data = [0; 2];
        write_leu16(&mut data, value);
        self.write(clock, addr, &data)
    }

    #[inline]
    fn write_beu32(&mut self, clock: Instant, addr: Address, value: u32) -> Result<(), Error> {
        let mut data = [0; 4];
        write_beu32(&mut data, value);
        self.write(clock, addr, &data)
    }

    #[inline]
    fn write_leu32(&mut self, clock: Instant, addr: Address, value: u32) -> Result<(), Error> {
        let mut data = [0; 4];
        write_leu32(&mut data, value);
        self.write(clock, addr, &data)
    }
}

#[inline]
pub fn read_beu16(data: &[u8]) -> u16 {
    (data[0] as u16) << 8 | (data[1] as u16)
}

#[inline]
pub fn read_leu16(data: &[u8]) -> u16 {
    (data[1] as u16) << 8 | (data[0] as u16)
}

#[inline]
pub fn read_beu32(data: &[u8]) -> u32 {
    (data[0] as u32) << 24 | (data[1] as u32) << 16 | (data[2] as u32) << 8 | (data[3] as u32)
}

#[inline]
pub fn read_leu32(data: &[u8]) -> u32 {
    (data[3] as u32) << 24 | (data[2] as u32) << 16 | (data[1] as u32) << 8 | (data[0] as u32)
}

#[inline]
pub fn write_beu16(data: &mut [u8], value: u16) -> &mut [u8] {
    data[0] = (value >> 8) as u8;
    data[1] = value as u8;
    data
}

#[inline]
pub fn write_leu16(data: &mut [u8], value: u16) -> &mut [u8] {
    data[0] = value as u8;
    data[1] = (value >> 8) as u8;
    data
}

#[inline]
pub fn write_beu32(data: &mut [u8], value: u32) -> &mut [u8] {
    data[0] = (value >> 24) as u8;
    data[1] = (value >> 16) as u8;
    data[2] = (value >> 8) as u8;
    data[3] = value as u8;
    data
}

#[inline]
pub fn write_leu32(data: &mut [u8], value: u32) -> &mut [u8] {
    data[0] = value as u8;
    data[1] = (value >> 8) as u8;
    data[2] = (value >> 16) as u8;
    data[3] = (value >> 24) as u8;
    data
}


/// A shared handle to an addressable device, so the same device can be mapped into more than
/// one bus (eg. the Z80's sound RAM is visible to both the Z80 and the 68000)
#[derive(Clone)]
pub struct Device(Rc<RefCell<Box<dyn Addressable>>>);

impl Device {
    pub fn new<T>(value: T) -> Self
    where
        T: Addressable + 'static,
    {
        Self(Rc::new(RefCell::new(Box::new(value))))
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Box<dyn Addressable>> {
        self.0.borrow_mut()
    }

    pub fn size(&self) -> usize {
        self.0.borrow().size()
    }
}

impl Addressable for Device {
    fn size(&self) -> usize {
        Device::size(self)
    }

    fn read(&mut self, clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error> {
        self.0.borrow_mut().read(clock, addr, data)
    }

    fn write(&mut self, clock: Instant, addr: Address, data: &[u8]) -> Result<(), Error> {
        self.0.borrow_mut().write(clock, addr, data)
    }
}
