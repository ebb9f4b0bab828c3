mod devices;
mod endian;
mod error;
mod memory;
mod signals;

pub use crate::devices::{Address, Addressable, Device};
pub use crate::devices::{read_beu16, read_beu32, read_leu16, read_leu32, write_beu16, write_beu32, write_leu16, write_leu32};
pub use crate::endian::{ByteOrder, HOST_BYTE_ORDER, HOST_IS_LITTLE_ENDIAN, probe_byte_order, verify_host_byte_order};
pub use crate::error::{Error, EmulatorErrorKind};
pub use crate::memory::{MemoryBlock, AddressRepeater, Bus, dump_slice};
pub use crate::signals::{Signal, EdgeSignal};
