use std::rc::Rc;
use std::cell::RefCell;

use femtos::Instant;

use gens_core::{Addressable, Bus, Device, MemoryBlock};
use gens_systems_genesis::{build_coprocessor, GenesisCoprocessor, GenesisCoprocessorOptions, M68K_COORDINATOR_BASE, M68K_Z80_RAM_BASE};
use gens_z80::Status;

const MAX_STEPS: usize = 1000;

struct TestMachine {
    host_bus: Rc<RefCell<Bus>>,
    coproc: GenesisCoprocessor,
    ym_sound: Device,
    psg_sound: Device,
}

fn build_test_machine() -> TestMachine {
    let host_bus = Rc::new(RefCell::new(Bus::default()));
    let mut cartridge = MemoryBlock::new(vec![0; 0x20000]);
    cartridge.load_at(0x18000, &[0x99, 0x98]).unwrap();
    host_bus.borrow_mut().insert(0x000000, Device::new(cartridge));

    // plain memory stands in for the sound chips, so writes can be checked afterwards
    let ym_sound = Device::new(MemoryBlock::new(vec![0; 4]));
    let psg_sound = Device::new(MemoryBlock::new(vec![0; 1]));

    let coproc = build_coprocessor(host_bus.clone(), ym_sound.clone(), psg_sound.clone(), GenesisCoprocessorOptions::default()).unwrap();
    coproc.map_into_host(&mut host_bus.borrow_mut());

    TestMachine {
        host_bus,
        coproc,
        ym_sound,
        psg_sound,
    }
}

impl TestMachine {
    fn load_program(&mut self, program: &[u8]) {
        self.host_bus.borrow_mut().write(Instant::START, M68K_Z80_RAM_BASE, program).unwrap();
    }

    fn release_z80(&mut self) {
        let mut bus = self.host_bus.borrow_mut();
        bus.write_u8(Instant::START, M68K_COORDINATOR_BASE + 0x100, 0x00).unwrap();
        bus.write_u8(Instant::START, M68K_COORDINATOR_BASE + 0x200, 0x01).unwrap();
    }

    fn run_until_halted(&mut self) {
        for _ in 0..MAX_STEPS {
            if self.coproc.cpu.state.status == Status::Halted {
                return;
            }
            self.coproc.step(Instant::START).unwrap();
        }
        panic!("the sound cpu did not halt");
    }
}

#[test]
fn z80_is_held_until_the_68000_releases_it() {
    let mut machine = build_test_machine();
    machine.load_program(&[0x00, 0x00, 0x76]);

    for _ in 0..4 {
        machine.coproc.step(Instant::START).unwrap();
    }
    assert_eq!(machine.coproc.cpu.state.pc, 0x0000);
    assert_eq!(machine.host_bus.borrow_mut().read_u8(Instant::START, M68K_COORDINATOR_BASE + 0x100).unwrap(), 0x00);

    machine.release_z80();
    assert_eq!(machine.host_bus.borrow_mut().read_u8(Instant::START, M68K_COORDINATOR_BASE + 0x100).unwrap(), 0x01);
    machine.run_until_halted();
    assert_eq!(machine.coproc.cpu.state.pc, 0x0003);
}

#[test]
fn sound_chips_are_mapped_and_mirrored() {
    let mut machine = build_test_machine();
    #[rustfmt::skip]
    let program: &[u8] = &[
        0x3E, 0x2A,             // LD A,0x2A
        0x32, 0x00, 0x40,       // LD (0x4000),A
        0x3C,                   // INC A
        0x32, 0xFE, 0x5F,       // LD (0x5FFE),A
        0x32, 0x11, 0x7F,       // LD (0x7F11),A
        0x76,                   // HALT
    ];
    machine.load_program(program);
    machine.release_z80();
    machine.run_until_halted();

    let mut ym = machine.ym_sound.clone();
    assert_eq!(ym.read_u8(Instant::START, 0).unwrap(), 0x2A);
    assert_eq!(ym.read_u8(Instant::START, 2).unwrap(), 0x2B);
    let mut psg = machine.psg_sound.clone();
    assert_eq!(psg.read_u8(Instant::START, 0).unwrap(), 0x2B);
}

#[test]
fn sound_ram_is_mirrored_and_shared_with_the_68000() {
    let mut machine = build_test_machine();
    #[rustfmt::skip]
    let program: &[u8] = &[
        0x3A, 0x00, 0x20,       // LD A,(0x2000)
        0x32, 0x00, 0x10,       // LD (0x1000),A
        0x3A, 0x00, 0x70,       // LD A,(0x7000)
        0x76,                   // HALT
    ];
    machine.load_program(program);
    machine.release_z80();
    machine.run_until_halted();

    // 0x2000 mirrors the first opcode, and the write is visible from the 68000 side
    let value = machine.host_bus.borrow_mut().read_u8(Instant::START, M68K_Z80_RAM_BASE + 0x1000).unwrap();
    assert_eq!(value, 0x3A);
    // nothing is mapped at 0x7000, which reads as zero
    assert_eq!(machine.coproc.cpu.state.get_register(gens_z80::Register::A), 0x00);
}

#[test]
fn bank_window_reads_the_68000_address_space() {
    let mut machine = build_test_machine();
    #[rustfmt::skip]
    let program: &[u8] = &[
        0x21, 0x00, 0x60,       // LD HL,0x6000
        0x36, 0x01,             // LD (HL),1
        0x36, 0x01,             // LD (HL),1
        0x36, 0x00,             // LD (HL),0 (seven times)
        0x36, 0x00,
        0x36, 0x00,
        0x36, 0x00,
        0x36, 0x00,
        0x36, 0x00,
        0x36, 0x00,
        0x2A, 0x00, 0x80,       // LD HL,(0x8000)
        0x76,                   // HALT
    ];
    machine.load_program(program);
    machine.release_z80();
    machine.run_until_halted();

    assert_eq!(machine.coproc.cpu.state.get_register_pair(gens_z80::RegisterPair::HL), 0x9899);
}

#[test]
fn oversized_sound_ram_is_rejected() {
    let host_bus = Rc::new(RefCell::new(Bus::default()));
    let options = GenesisCoprocessorOptions {
        ram_size: 0x8000,
        ..Default::default()
    };
    let result = build_coprocessor(host_bus, Device::new(MemoryBlock::new(vec![0; 4])), Device::new(MemoryBlock::new(vec![0; 1])), options);
    assert!(result.is_err());
}
