use std::rc::Rc;
use std::cell::Cell;


/// A level-triggered line shared between the device that drives it and the device that samples it
#[derive(Clone, Debug, Default)]
pub struct Signal<T: Copy>(Rc<Cell<T>>);

impl<T: Copy> Signal<T> {
    pub fn new(init: T) -> Signal<T> {
        Signal(Rc::new(Cell::new(init)))
    }

    pub fn set(&mut self, value: T) {
        self.0.set(value);
    }

    pub fn get(&self) -> T {
        self.0.get()
    }
}

/// An edge-triggered line.  Reading it acknowledges the edge
#[derive(Clone, Debug)]
pub struct EdgeSignal(Signal<bool>);

impl Default for EdgeSignal {
    fn default() -> Self {
        EdgeSignal(Signal::new(false))
    }
}

impl EdgeSignal {
    pub fn signal(&mut self) {
        self.0.set(true);
    }

    pub fn get(&mut self) -> bool {
        let value = self.0.get();
        self.0.set(false);
        value
    }

    pub fn is_pending(&self) -> bool {
        self.0.get()
    }
}
