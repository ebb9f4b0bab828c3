const DEFAULT_RAD_TESTS: &str = "tests/jsmoo/misc/tests/GeneratedTests/z80/v1/";

use std::io::prelude::*;
use std::fmt::{Debug, UpperHex};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use std::fs::{self, File};

use clap::Parser;
use flate2::read::GzDecoder;
use serde_derive::Deserialize;
use femtos::Instant;

use gens_core::{Error, MemoryBlock, Address, Addressable};
use gens_z80::{Z80, Z80Type, Z80Error, Status, InterruptMode, Register, FLAGS_XY, GENESIS_Z80_FREQUENCY};


#[derive(Parser)]
struct Args {
    /// Filter the tests by file name prefix
    filter: Option<String>,
    /// Only run the one test with the given number
    #[clap(short, long)]
    only: Option<String>,
    /// Dump the CPU state when a test fails
    #[clap(short, long)]
    debug: bool,
    /// Only print a summary for each test file
    #[clap(short, long)]
    quiet: bool,
    /// Check the undocumented X and Y flags (bits 5 and 3)
    #[clap(short = 'f', long)]
    check_extra_flags: bool,
    /// Check the internal WZ (MEMPTR) latch when the test records it
    #[clap(short = 'w', long)]
    check_memptr: bool,
    /// Check undocumented instructions
    #[clap(short = 'u', long)]
    check_undocumented: bool,
    /// Check instruction timings
    #[clap(short = 't', long)]
    check_timings: bool,
    /// Directory to the test suite to run
    #[clap(long, default_value = DEFAULT_RAD_TESTS)]
    testsuite: String,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run_all_tests(&args) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}


#[derive(Debug, Deserialize)]
struct TestState {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
    h: u8,
    l: u8,
    i: u8,
    r: u8,
    #[serde(default)]
    wz: Option<u16>,
    ix: u16,
    iy: u16,
    af_: u16,
    bc_: u16,
    de_: u16,
    hl_: u16,
    im: u8,
    iff1: u8,
    iff2: u8,
    ram: Vec<(u16, u8)>,
}

#[derive(Debug, Deserialize)]
struct TestCycle(u16, Option<u8>, String);

#[derive(Debug, Deserialize)]
struct TestPort {
    addr: u16,
    value: u8,
    atype: String,
}

#[derive(Debug, Deserialize)]
struct TestCase {
    name: String,
    #[serde(rename(deserialize = "initial"))]
    initial_state: TestState,
    #[serde(rename(deserialize = "final"))]
    final_state: TestState,
    #[serde(default)]
    cycles: Vec<TestCycle>,
    #[serde(default)]
    ports: Vec<TestPort>,
}

impl TestState {
    fn dump(&self) {
        println!(" a: {:02x}   a': {:02x}", self.a, self.af_ >> 8);
        println!(" f: {:02x}   f': {:02x}", self.f, self.af_ & 0xff);
        println!(" b: {:02x}   b': {:02x}", self.b, self.bc_ >> 8);
        println!(" c: {:02x}   c': {:02x}", self.c, self.bc_ & 0xff);
        println!(" d: {:02x}   d': {:02x}", self.d, self.de_ >> 8);
        println!(" e: {:02x}   e': {:02x}", self.e, self.de_ & 0xff);
        println!(" h: {:02x}   h': {:02x}", self.h, self.hl_ >> 8);
        println!(" l: {:02x}   l': {:02x}", self.l, self.hl_ & 0xff);
        println!("pc: {:04x}   sp: {:04x}", self.pc, self.sp);
        println!("ix: {:04x}   iy: {:04x}", self.ix, self.iy);
        println!(" i: {:02x}    r: {:02x}   wz: {:?}", self.i, self.r, self.wz);
        println!("im: {:02x} iff1: {:02x} iff2: {:02x}", self.im, self.iff1, self.iff2);

        println!("ram: ");
        for (addr, byte) in self.ram.iter() {
            println!("{:04x} {:02x} ", *addr, *byte);
        }
    }
}

impl TestCase {
    fn dump(&self) {
        println!("{}", self.name);
        println!("initial:");
        self.initial_state.dump();
        println!("final:");
        self.final_state.dump();

        println!("ports: ");
        for port in self.ports.iter() {
            println!("{:04x} {:02x} {}", port.addr, port.value, port.atype);
        }
    }
}


/// A CPU with a flat 64KB memory and a flat 64KB port space
struct TestMachine {
    cpu: Z80,
    memory: MemoryBlock,
    io: MemoryBlock,
}

impl TestMachine {
    fn new(cputype: Z80Type, initial: &TestState, ports: &[TestPort]) -> Result<Self, Error> {
        let mut machine = Self {
            cpu: Z80::from_type(cputype, GENESIS_Z80_FREQUENCY),
            memory: MemoryBlock::new(vec![0; 0x1_0000]),
            io: MemoryBlock::new(vec![0; 0x1_0000]),
        };
        machine.cpu.state.status = Status::Running;
        machine.load_state(initial, ports)?;
        Ok(machine)
    }

    fn load_state(&mut self, initial: &TestState, ports: &[TestPort]) -> Result<(), Error> {
        let state = &mut self.cpu.state;
        state.reg = [initial.b, initial.c, initial.d, initial.e, initial.h, initial.l, initial.a, initial.f];
        state.shadow_reg = split_pairs([initial.bc_, initial.de_, initial.hl_, initial.af_]);

        state.ix = initial.ix;
        state.iy = initial.iy;
        state.sp = initial.sp;
        state.pc = initial.pc;
        state.i = initial.i;
        state.r = initial.r;
        state.wz = initial.wz.unwrap_or(0);
        state.im = interrupt_mode(initial.im)?;
        state.iff1 = initial.iff1 != 0;
        state.iff2 = initial.iff2 != 0;

        for (addr, byte) in initial.ram.iter() {
            self.memory.write_u8(Instant::START, *addr as Address, *byte)?;
        }

        // values that the instruction will read from its ports
        for port in ports.iter().filter(|port| port.atype == "r") {
            self.io.write_u8(Instant::START, port.addr as Address, port.value)?;
        }

        Ok(())
    }

    fn step(&mut self) -> Result<u16, Error> {
        self.cpu
            .begin(Instant::START, &mut self.memory, &mut self.io)
            .step_one()
            .map_err(|err| match err {
                Z80Error::Breakpoint => Error::breakpoint("unexpected breakpoint"),
                err => Error::new(err.to_string()),
            })
    }

    fn assert_state(&mut self, expected: &TestState, ports: &[TestPort], args: &Args) -> Result<(), Error> {
        let state = &self.cpu.state;
        let expected_regs = [expected.b, expected.c, expected.d, expected.e, expected.h, expected.l, expected.a];
        for (i, name) in ["b", "c", "d", "e", "h", "l", "a"].iter().enumerate() {
            assert_value(state.reg[i], expected_regs[i], name)?;
        }

        let flag_mask = if args.check_extra_flags { 0xFF } else { !FLAGS_XY };
        assert_value(state.get_register(Register::F) & flag_mask, expected.f & flag_mask, "f")?;

        let expected_shadow = split_pairs([expected.bc_, expected.de_, expected.hl_, expected.af_]);
        for (i, name) in ["b'", "c'", "d'", "e'", "h'", "l'", "a'", "f'"].iter().enumerate() {
            assert_value(state.shadow_reg[i], expected_shadow[i], name)?;
        }

        assert_value(state.ix, expected.ix, "ix")?;
        assert_value(state.iy, expected.iy, "iy")?;
        assert_value(state.sp, expected.sp, "sp")?;
        assert_value(state.pc, expected.pc, "pc")?;
        assert_value(state.i, expected.i, "i")?;
        assert_value(state.r, expected.r, "r")?;
        if args.check_memptr {
            if let Some(wz) = expected.wz {
                assert_value(state.wz, wz, "wz")?;
            }
        }

        let expected_im = interrupt_mode(expected.im)?;
        if state.im != expected_im {
            return Err(Error::assertion(format!("{:?} != {:?}, im", state.im, expected_im)));
        }
        assert_value(state.iff1 as u8, expected.iff1, "iff1")?;
        assert_value(state.iff2 as u8, expected.iff2, "iff2")?;

        for (addr, byte) in expected.ram.iter() {
            let actual = self.memory.read_u8(Instant::START, *addr as Address)?;
            assert_value(actual, *byte, &format!("ram at {:x}", addr))?;
        }

        for port in ports.iter().filter(|port| port.atype == "w") {
            let actual = self.io.read_u8(Instant::START, port.addr as Address)?;
            assert_value(actual, port.value, &format!("port value at {:x}", port.addr))?;
        }

        Ok(())
    }
}

fn split_pairs(pairs: [u16; 4]) -> [u8; 8] {
    let mut bytes = [0; 8];
    for (i, pair) in pairs.iter().enumerate() {
        bytes[i * 2..i * 2 + 2].copy_from_slice(&pair.to_be_bytes());
    }
    bytes
}

fn interrupt_mode(im: u8) -> Result<InterruptMode, Error> {
    match im {
        0 => Ok(InterruptMode::Mode0),
        1 => Ok(InterruptMode::Mode1),
        2 => Ok(InterruptMode::Mode2),
        _ => Err(Error::new(format!("invalid interrupt mode {} in test data", im))),
    }
}

fn assert_value<T>(actual: T, expected: T, message: &str) -> Result<(), Error>
where
    T: PartialEq + Debug + UpperHex,
{
    if actual == expected {
        Ok(())
    } else {
        Err(Error::assertion(format!("{:#X} != {:#X}, {}", actual, expected, message)))
    }
}

fn step_cpu_and_assert(machine: &mut TestMachine, case: &TestCase, args: &Args) -> Result<(), Error> {
    let cycles = machine.step()?;

    machine.assert_state(&case.final_state, &case.ports, args)?;
    if args.check_timings && cycles as usize != case.cycles.len() {
        return Err(Error::assertion(format!(
            "expected instruction to take {} cycles, but took {}",
            case.cycles.len(),
            cycles
        )));
    }

    Ok(())
}

fn run_test(case: &TestCase, args: &Args) -> Result<(), Error> {
    let mut machine = TestMachine::new(Z80Type::Z80, &case.initial_state, &case.ports)?;
    let mut initial_cpu = machine.cpu.clone();

    let result = step_cpu_and_assert(&mut machine, case, args);

    if let Err(err) = &result {
        if !args.quiet {
            if args.debug {
                case.dump();
                println!();
                let mut text = String::new();
                let _ = initial_cpu.dump_state(&mut text, Instant::START, &mut machine.memory);
                let _ = machine.cpu.dump_state(&mut text, Instant::START, &mut machine.memory);
                print!("{}", text);
            }
            println!("FAILED: {:?}", err);
        }
    }
    result
}

fn load_test_file(path: &Path) -> Result<Vec<TestCase>, Error> {
    let read_error = |err: std::io::Error| Error::new(format!("error reading {}: {}", path.display(), err));

    let data = if path.extension().map(|ext| ext == "gz").unwrap_or(false) {
        let file = File::open(path).map_err(read_error)?;
        let mut decoder = GzDecoder::new(file);
        let mut data = vec![];
        decoder.read_to_end(&mut data).map_err(read_error)?;
        data
    } else {
        fs::read(path).map_err(read_error)?
    };

    serde_json::from_slice(&data).map_err(|err| Error::new(format!("error parsing {}: {}", path.display(), err)))
}

fn test_json_file(path: &Path, name: &str, args: &Args) -> Result<(usize, usize, String), Error> {
    let cases = load_test_file(path)?;

    let mut passed = 0;
    let mut failed = 0;
    for mut case in cases {
        if let Some(only) = args.only.as_ref() {
            if !case.name.ends_with(only) {
                continue;
            }
        }

        // Sort the ram memory for debugging help
        if args.debug {
            case.initial_state.ram.sort_by_key(|(addr, _)| *addr);
            case.final_state.ram.sort_by_key(|(addr, _)| *addr);
        }

        if !args.quiet {
            println!("Running test {}", case.name);
        }

        match run_test(&case, args) {
            Ok(()) => passed += 1,
            Err(_) => failed += 1,
        }
    }

    let message = if failed == 0 {
        format!("{} completed, all passed!", name)
    } else {
        format!("{} completed: {} passed, {} FAILED", name, passed, failed)
    };

    Ok((passed, failed, message))
}


fn run_all_tests(args: &Args) -> Result<(), Error> {
    let mut passed = 0;
    let mut failed = 0;
    let mut messages = vec![];

    let mut tests: Vec<PathBuf> = fs::read_dir(&args.testsuite)
        .map_err(|err| Error::new(format!("error reading test suite {}: {}", args.testsuite, err)))?
        .filter_map(|dirent| dirent.ok().map(|dirent| dirent.path()))
        .collect();
    tests.sort();

    let start = SystemTime::now();
    for path in tests {
        // Only test json files (the repo has .md files as well)
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        if extension != "json" && extension != "gz" {
            continue;
        }

        let name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        if let Some(filter) = &args.filter {
            if !name.starts_with(filter) {
                continue;
            }
        }

        if !args.check_undocumented && is_undocumented_instruction(&name) {
            continue;
        }

        let (test_passed, test_failed, message) = test_json_file(&path, &name, args)?;

        // In quiet mode, print each summary as it's received to give a progress update
        if args.quiet {
            println!("{}", message);
        }

        passed += test_passed;
        failed += test_failed;
        messages.push(message);
    }
    let elapsed_secs = start.elapsed().map(|elapsed| elapsed.as_secs()).unwrap_or(0);

    if !args.quiet {
        for message in messages {
            println!("{}", message);
        }
    }

    println!();
    println!(
        "passed: {}, failed: {}, total {:.0}%",
        passed,
        failed,
        ((passed as f32) / (passed as f32 + failed as f32)) * 100.0
    );
    println!("completed in {}m {}s", elapsed_secs / 60, elapsed_secs % 60);
    Ok(())
}

/// Test files are named after the opcode bytes, such as "dd cb __ 46.json" or "ed 63.json"
fn is_undocumented_instruction(name: &str) -> bool {
    let mut opcodes: Vec<u8> = name
        .split(&[' ', '.'][..])
        .filter_map(|s| u8::from_str_radix(s, 16).ok())
        .take(3)
        .collect();
    opcodes.resize(3, 0);

    match (opcodes[0], opcodes[1]) {
        // SLL
        (0xCB, op) => (0x30..=0x37).contains(&op),
        // only the (IX+d) forms that don't also copy into a register are documented
        (0xDD, 0xCB) | (0xFD, 0xCB) => opcodes[2] & 0x07 != 0x06,
        (0xDD, op) | (0xFD, op) => !is_documented_indexed(op),
        // the duplicate LD (nn),HL / LD HL,(nn) encodings, and IN (C) / OUT (C),0
        (0xED, op) => op == 0x63 || op == 0x6B || op == 0x70 || op == 0x71,
        _ => false,
    }
}

fn is_documented_indexed(op: u8) -> bool {
    let upper = op & 0xF0;
    let lower = op & 0x0F;
    let uses_indexed_memory = (lower == 0x06 || lower == 0x0E) && (0x40..=0xB0).contains(&upper) && op != 0x76
        || (0x70..=0x77).contains(&op) && op != 0x76
        || (0x34..=0x36).contains(&op);
    let uses_whole_index = (0x21..=0x23).contains(&op)
        || (0x29..=0x2B).contains(&op)
        || lower == 0x09 && upper <= 0x30
        || matches!(op, 0xE1 | 0xE3 | 0xE5 | 0xE9 | 0xF9);
    uses_indexed_memory || uses_whole_index
}
