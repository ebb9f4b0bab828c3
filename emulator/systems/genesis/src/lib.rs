pub mod peripherals;

mod system;
pub use crate::system::{
    GenesisCoprocessor, GenesisCoprocessorOptions, build_coprocessor, M68K_COORDINATOR_BASE, M68K_YM_BASE, M68K_Z80_RAM_BASE,
};
