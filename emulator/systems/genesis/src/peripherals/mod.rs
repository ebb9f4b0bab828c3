pub mod coprocessor;
