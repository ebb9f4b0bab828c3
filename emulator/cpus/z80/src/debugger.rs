use crate::state::Z80Error;

#[derive(Clone, Default)]
pub struct Z80Debugger {
    pub(crate) skip_breakpoint: usize,
    pub(crate) breakpoints: Vec<u16>,
}

impl Z80Debugger {
    /// Stop once at each breakpoint.  Stepping again from the same address runs the instruction
    pub fn check_breakpoints(&mut self, pc: u16) -> Result<(), Z80Error> {
        if self.breakpoints.iter().any(|breakpoint| *breakpoint == pc) {
            if self.skip_breakpoint > 0 {
                self.skip_breakpoint -= 1;
            } else {
                self.skip_breakpoint = 1;
                log::debug!("breakpoint reached at {:#06x}", pc);
                return Err(Z80Error::Breakpoint);
            }
        }
        Ok(())
    }

    pub fn breakpoints(&self) -> &[u16] {
        &self.breakpoints
    }
}
