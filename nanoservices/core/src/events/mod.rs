pub mod bus;
pub mod clock;
pub mod trigger;
