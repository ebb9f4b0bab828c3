use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::io::{self, Write};
use femtos::{Duration, Instant};

use gens_core::{Address, Addressable, Bus, Error, MemoryBlock, verify_host_byte_order};
use gens_z80::{Z80, Z80Type, Z80Error, Z80Decoder, Status, Register, RegisterPair, GENESIS_Z80_FREQUENCY};

/// CP/M programs call the BDOS through 0x0005 and return to the command processor through 0x0000
const CPM_WARM_BOOT: u16 = 0x0000;
const CPM_BDOS_ENTRY: u16 = 0x0005;
/// The word at 0x0006 tells a CP/M program where its memory ends, which most use as the stack top
const CPM_MEMORY_TOP: u16 = 0xF000;

const BDOS_CONSOLE_OUTPUT: u8 = 2;
const BDOS_PRINT_STRING: u8 = 9;

/// Upper bound on a `$` terminated string, so a missing terminator can't spin through all of memory
const MAX_BDOS_STRING: usize = 0x10000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Halted,
    WarmBoot,
    CycleLimit,
}

/// Runs a raw Z80 image in a flat 64KB address space, with an optional CP/M BDOS stand-in
pub struct Z80Runner<W: Write> {
    pub cpu: Z80,
    pub memory: MemoryBlock,
    pub io: Bus,
    cpm: bool,
    output: W,
    clock: Instant,
    cycles: u64,
}

impl<W: Write> Z80Runner<W> {
    pub fn new(image: &[u8], load_address: u16, cpm: bool, output: W) -> Result<Self, Error> {
        let mut memory = MemoryBlock::new(vec![0; 0x1_0000]);
        memory.load_at(load_address as Address, image)?;

        let mut cpu = Z80::from_type(Z80Type::Z80, GENESIS_Z80_FREQUENCY);
        cpu.state.reset();
        cpu.state.pc = load_address;

        if cpm {
            // RET at the BDOS entry, after the BDOS function has been handled by the runner
            let [low, high] = CPM_MEMORY_TOP.to_le_bytes();
            memory.load_at(CPM_BDOS_ENTRY as Address, &[0xC9, low, high])?;
            // a final RET from the program lands on the warm boot vector
            cpu.state.sp = 0xFFFE;
        }

        let mut io = Bus::default();
        io.set_ignore_unmapped(true);

        Ok(Self {
            cpu,
            memory,
            io,
            cpm,
            output,
            clock: Instant::START,
            cycles: 0,
        })
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.duration_since(Instant::START)
    }

    pub fn add_breakpoint(&mut self, addr: u16) {
        self.cpu.add_breakpoint(addr);
    }

    /// Run until the CPU halts, the program warm boots, or `max_cycles` have been executed
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<StopReason, Z80Error> {
        loop {
            if self.cpm {
                match self.cpu.state.pc {
                    CPM_WARM_BOOT => return Ok(StopReason::WarmBoot),
                    CPM_BDOS_ENTRY => self.call_bdos()?,
                    _ => {},
                }
            }

            if self.cpu.state.status == Status::Halted {
                return Ok(StopReason::Halted);
            }
            if max_cycles.map(|max| self.cycles >= max).unwrap_or(false) {
                return Ok(StopReason::CycleLimit);
            }

            let cycles = self.cpu.begin(self.clock, &mut self.memory, &mut self.io).step_one()?;
            self.cycles += cycles as u64;
            self.clock += self.cpu.frequency.period_duration() * cycles as u64;
        }
    }

    fn call_bdos(&mut self) -> Result<(), Z80Error> {
        let function = self.cpu.state.get_register(Register::C);
        match function {
            BDOS_CONSOLE_OUTPUT => {
                let ch = self.cpu.state.get_register(Register::E);
                self.write_output(&[ch])?;
            },
            BDOS_PRINT_STRING => {
                let mut addr = self.cpu.state.get_register_pair(RegisterPair::DE);
                let mut text = vec![];
                for _ in 0..MAX_BDOS_STRING {
                    let ch = self.memory.read_u8(self.clock, addr as Address)?;
                    if ch == b'$' {
                        break;
                    }
                    text.push(ch);
                    addr = addr.wrapping_add(1);
                }
                self.write_output(&text)?;
            },
            _ => {
                log::warn!("bdos: unsupported function {} called from {:#06x}", function, self.return_address()?);
            },
        }
        Ok(())
    }

    fn return_address(&mut self) -> Result<u16, Z80Error> {
        Ok(self.memory.read_leu16(self.clock, self.cpu.state.sp as Address)?)
    }

    fn write_output(&mut self, data: &[u8]) -> Result<(), Z80Error> {
        self.output
            .write_all(data)
            .and_then(|_| self.output.flush())
            .map_err(|err| Z80Error::Other(format!("bdos: error writing output: {}", err)))
    }

    /// Print `count` decoded instructions starting at `start`
    pub fn disassemble(&mut self, start: u16, count: usize) -> Result<(), Error> {
        let mut text = String::new();
        let mut decoder = Z80Decoder::default();
        decoder
            .dump_disassembly(&mut text, &mut self.memory, start, count)
            .map_err(|_| Error::new("console: error formatting disassembly"))?;
        self.output
            .write_all(text.as_bytes())
            .map_err(|err| Error::new(format!("console: error writing disassembly: {}", err)))
    }

    pub fn dump_state(&mut self) -> String {
        let mut text = String::new();
        if self.cpu.dump_state(&mut text, self.clock, &mut self.memory).is_err() {
            text.push_str("error formatting cpu state\n");
        }
        text
    }
}

pub fn args(application_name: &'static str) -> Command {
    Command::new(application_name)
        .about("Run a raw Z80 program image")
        .arg(
            Arg::new("IMAGE")
                .required(true)
                .help("Flat binary to load into memory"),
        )
        .arg(
            Arg::new("load-address")
                .short('a')
                .long("load-address")
                .value_parser(parse_address)
                .default_value("0x100")
                .help("Address to load the image at, which is also where execution starts"),
        )
        .arg(
            Arg::new("cpm")
                .short('c')
                .long("cpm")
                .action(ArgAction::SetTrue)
                .help("Provide the CP/M console output calls through 0x0005, and stop when 0x0000 is reached"),
        )
        .arg(
            Arg::new("max-cycles")
                .short('m')
                .long("max-cycles")
                .value_parser(clap::value_parser!(u64))
                .help("Stop after this many clock cycles"),
        )
        .arg(
            Arg::new("breakpoint")
                .short('b')
                .long("breakpoint")
                .value_parser(parse_address)
                .action(ArgAction::Append)
                .help("Stop and dump the cpu state when this address is reached"),
        )
        .arg(
            Arg::new("disassemble")
                .short('d')
                .long("disassemble")
                .value_parser(clap::value_parser!(usize))
                .help("Print this many instructions from the load address instead of running"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .help("Set the type of log messages to print"),
        )
}

pub fn parse_address(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    };
    parsed.map_err(|err| format!("invalid address {:?}: {}", value, err))
}

/// Report a fatal error through the logger, or on stderr if the logger never started
pub fn report_error(err: &Error) {
    if log::log_enabled!(log::Level::Error) {
        log::error!("{}", err);
    } else {
        eprintln!("{}", err);
    }
}

pub fn start(matches: ArgMatches) -> Result<(), Error> {
    let log_level = match matches.get_one("log-level").map(|s: &String| s.as_str()) {
        Some("trace") => log::Level::Trace,
        Some("debug") => log::Level::Debug,
        Some("info") => log::Level::Info,
        Some("warn") => log::Level::Warn,
        Some("error") => log::Level::Error,
        _ => log::Level::Info,
    };

    simple_logger::SimpleLogger::new()
        .with_level(log_level.to_level_filter())
        .without_timestamps()
        .init()
        .map_err(|err| Error::new(format!("console: unable to start the logger: {}", err)))?;

    let byte_order = verify_host_byte_order()?;
    log::debug!("host byte order is {:?}", byte_order);

    let filename = matches
        .get_one::<String>("IMAGE")
        .ok_or_else(|| Error::new("console: no image given"))?;
    let image = fs::read(filename).map_err(|err| Error::new(format!("console: error reading {}: {}", filename, err)))?;
    let load_address = matches.get_one::<u16>("load-address").copied().unwrap_or(0x100);

    let mut runner = Z80Runner::new(&image, load_address, matches.get_flag("cpm"), io::stdout())?;
    log::info!("loaded {} bytes from {} at {:#06x}", image.len(), filename, load_address);

    if let Some(count) = matches.get_one::<usize>("disassemble") {
        return runner.disassemble(load_address, *count);
    }

    if let Some(breakpoints) = matches.get_many::<u16>("breakpoint") {
        for addr in breakpoints {
            runner.add_breakpoint(*addr);
        }
    }

    let max_cycles = matches.get_one::<u64>("max-cycles").copied();
    loop {
        match runner.run(max_cycles) {
            Ok(reason) => {
                println!();
                log::info!("stopped ({:?}) after {} cycles, {}us of emulated time", reason, runner.cycles(), runner.elapsed().as_micros());
                return Ok(());
            },
            Err(Z80Error::Breakpoint) => {
                log::info!("breakpoint at {:#06x} after {} cycles", runner.cpu.state.pc, runner.cycles());
                print!("{}", runner.dump_state());
            },
            Err(err) => {
                log::error!("{}", err);
                print!("{}", runner.dump_state());
                return Err(Error::new(format!("console: emulation stopped: {}", err)));
            },
        }
    }
}
