use std::rc::Rc;
use std::cell::RefCell;

use femtos::{Duration, Frequency, Instant};

use gens_core::{Address, AddressRepeater, Bus, Device, Error, MemoryBlock, Signal};
use gens_z80::{Z80, Z80Error, Z80Type, GENESIS_Z80_FREQUENCY};

use crate::peripherals::coprocessor::{CoprocessorBankArea, CoprocessorCoordinator};

/// Where the sound CPU's devices appear in its own 64KB address space
const Z80_RAM_BASE: Address = 0x0000;
const Z80_RAM_MIRROR: Address = 0x4000;
const Z80_YM_BASE: Address = 0x4000;
const Z80_YM_MIRROR: Address = 0x2000;
const Z80_BANK_REGISTER_BASE: Address = 0x6000;
const Z80_PSG_BASE: Address = 0x7F11;
const Z80_BANK_AREA_BASE: Address = 0x8000;

/// Where the 68000 sees the sound CPU's devices
pub const M68K_Z80_RAM_BASE: Address = 0x00A0_0000;
pub const M68K_YM_BASE: Address = 0x00A0_4000;
pub const M68K_COORDINATOR_BASE: Address = 0x00A1_1000;

pub struct GenesisCoprocessorOptions {
    pub frequency: Frequency,
    pub ram_size: usize,
}

impl Default for GenesisCoprocessorOptions {
    fn default() -> Self {
        Self {
            frequency: GENESIS_Z80_FREQUENCY,
            ram_size: 0x2000,
        }
    }
}

/// The Genesis sound subsystem: the Z80, its address map, and the devices it shares with the 68000
pub struct GenesisCoprocessor {
    pub cpu: Z80,
    pub bus: Rc<RefCell<Bus>>,
    pub io: Bus,
    pub ram: Device,
    pub ym_sound: Device,
    pub coordinator: Device,
}

impl GenesisCoprocessor {
    /// Run the sound CPU for one instruction
    pub fn step(&mut self, clock: Instant) -> Result<Duration, Z80Error> {
        let mut bus = self.bus.borrow_mut();
        self.cpu.step(clock, &mut *bus, &mut self.io)
    }

    /// Map the sound RAM, the YM2612 and the bus request/reset control block into the 68000's bus
    pub fn map_into_host(&self, host_bus: &mut Bus) {
        host_bus.insert(M68K_Z80_RAM_BASE, self.ram.clone());
        host_bus.insert(M68K_YM_BASE, self.ym_sound.clone());
        host_bus.insert(M68K_COORDINATOR_BASE, self.coordinator.clone());
    }

    pub fn reset_line(&self) -> Signal<bool> {
        self.cpu.signals.reset.clone()
    }

    pub fn bus_request_line(&self) -> Signal<bool> {
        self.cpu.signals.bus_request.clone()
    }
}

/// Build the sound CPU and its address map.  `host_bus` is the 68000's bus, seen through the
/// banked window, and `ym_sound` and `psg_sound` are devices provided by the host
pub fn build_coprocessor(
    host_bus: Rc<RefCell<Bus>>,
    ym_sound: Device,
    psg_sound: Device,
    options: GenesisCoprocessorOptions,
) -> Result<GenesisCoprocessor, Error> {
    if options.ram_size == 0 || options.ram_size > Z80_RAM_MIRROR as usize {
        return Err(Error::new(format!("coprocessor: unsupported sound ram size {:#x}", options.ram_size)));
    }

    let ram = Device::new(MemoryBlock::new(vec![0; options.ram_size]));
    let (bank_area, bank_register) = CoprocessorBankArea::new(host_bus);

    let mut bus = Bus::default();
    bus.set_ignore_unmapped(true);
    bus.insert(Z80_RAM_BASE, Device::new(AddressRepeater::new(ram.clone(), Z80_RAM_MIRROR)));
    bus.insert(Z80_YM_BASE, Device::new(AddressRepeater::new(ym_sound.clone(), Z80_YM_MIRROR)));
    bus.insert(Z80_BANK_REGISTER_BASE, Device::new(bank_register));
    bus.insert(Z80_PSG_BASE, psg_sound);
    bus.insert(Z80_BANK_AREA_BASE, Device::new(bank_area));

    // the Genesis doesn't connect anything to the Z80's IO ports
    let mut io = Bus::default();
    io.set_ignore_unmapped(true);

    let mut cpu = Z80::from_type(Z80Type::Z80, options.frequency);
    // the 68000 has to release the sound CPU before it runs
    cpu.signals.reset.set(true);
    cpu.signals.bus_request.set(true);

    let coordinator = Device::new(CoprocessorCoordinator::new(cpu.signals.reset.clone(), cpu.signals.bus_request.clone()));

    Ok(GenesisCoprocessor {
        cpu,
        bus: Rc::new(RefCell::new(bus)),
        io,
        ram,
        ym_sound,
        coordinator,
    })
}
