use std::rc::Rc;
use std::cell::{Cell, RefCell};
use femtos::Instant;

use gens_core::{Bus, Error, Address, Addressable, Signal};

const DEV_NAME: &str = "coprocessor";

/// Offsets within the control block the 68000 sees at 0xA11000
const REG_MEMORY_MODE: Address = 0x000;
const REG_BUS_REQUEST: Address = 0x100;
const REG_RESET: Address = 0x200;

/// The 68000's view of the Z80's bus request and reset lines
pub struct CoprocessorCoordinator {
    reset: Signal<bool>,
    bus_request: Signal<bool>,
}

impl CoprocessorCoordinator {
    pub fn new(reset: Signal<bool>, bus_request: Signal<bool>) -> Self {
        Self {
            reset,
            bus_request,
        }
    }
}

impl Addressable for CoprocessorCoordinator {
    fn size(&self) -> usize {
        0x4000
    }

    fn read(&mut self, _clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error> {
        match addr {
            // bit 0 reads as 0 once the bus has been handed over
            REG_BUS_REQUEST => {
                data[0] = if self.bus_request.get() { 0x00 } else { 0x01 };
            },
            _ => {
                log::warn!("{}: unhandled read from {:#x}", DEV_NAME, addr);
            },
        }
        log::debug!("{}: read from register {:#x} of {:?}", DEV_NAME, addr, data);
        Ok(())
    }

    fn write(&mut self, _clock: Instant, addr: Address, data: &[u8]) -> Result<(), Error> {
        log::debug!("{}: write to register {:#x} with {:#x}", DEV_NAME, addr, data[0]);
        match addr {
            REG_MEMORY_MODE => {},
            REG_BUS_REQUEST => {
                self.bus_request.set(data[0] & 0x01 != 0);
            },
            REG_RESET => {
                self.reset.set(data[0] & 0x01 == 0);
            },
            _ => {
                log::warn!("{}: unhandled write {:#x} to {:#x}", DEV_NAME, data[0], addr);
            },
        }
        Ok(())
    }
}


type CoprocessorRegister = Rc<Cell<Address>>;

/// The bank register at 0x6000.  Each write shifts bit 0 of the data in from the top, so nine
/// writes load a full bank number, which selects address bits 15-23
pub struct CoprocessorBankRegister {
    base: CoprocessorRegister,
}

impl CoprocessorBankRegister {
    pub fn base(&self) -> Address {
        self.base.get()
    }
}

impl Addressable for CoprocessorBankRegister {
    fn size(&self) -> usize {
        0x100
    }

    fn read(&mut self, _clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error> {
        log::warn!("{}: read from the write-only bank register at {:#x}", DEV_NAME, addr);
        data.fill(0xFF);
        Ok(())
    }

    fn write(&mut self, _clock: Instant, _addr: Address, data: &[u8]) -> Result<(), Error> {
        let value = ((self.base.get() >> 1) | (((data[0] & 0x01) as Address) << 23)) & 0xFF8000;
        log::trace!("{}: bank base is now {:#08x}", DEV_NAME, value);
        self.base.set(value);
        Ok(())
    }
}


/// The 32KB window at 0x8000 into the 68000's address space
pub struct CoprocessorBankArea {
    base: CoprocessorRegister,
    bus: Rc<RefCell<Bus>>,
}

impl CoprocessorBankArea {
    pub fn new(bus: Rc<RefCell<Bus>>) -> (Self, CoprocessorBankRegister) {
        let base = Rc::new(Cell::new(0));
        let register = CoprocessorBankRegister {
            base: base.clone(),
        };
        let bank = Self {
            base,
            bus,
        };
        (bank, register)
    }
}

impl Addressable for CoprocessorBankArea {
    fn size(&self) -> usize {
        0x8000
    }

    fn read(&mut self, clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error> {
        self.bus.borrow_mut().read(clock, self.base.get() + addr, data)
    }

    fn write(&mut self, clock: Instant, addr: Address, data: &[u8]) -> Result<(), Error> {
        self.bus.borrow_mut().write(clock, self.base.get() + addr, data)
    }
}
