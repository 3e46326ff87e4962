//! AXI4 subordinate bus-functional model and cosimulation driver.
//!
//! The crate emulates the memory side of a core's AXI buses: a main-memory
//! bus backed by a sparse [`MemoryImage`] and an MMIO bus carrying the
//! `tohost` host-control protocol. [`Cosim`] steps a [`DeviceModel`] against
//! both ports until the program reports success or the cycle budget runs out.

pub mod axi;
pub mod device;
pub mod driver;
pub mod host;
pub mod loader;
pub mod mem;
mod utils;

pub use axi::{AxiInputs, AxiOutputs, AxiPort, ProtocolViolation};
pub use device::{Bus, DeviceModel, ScriptedManager};
pub use driver::{Cosim, CosimConfig, Outcome, StepStatus, TraceWindow};
pub use host::{HostControl, HostLayout};
pub use loader::{load_elf, LoadedElf};
pub use mem::{MemoryImage, SharedMemory, PARKED_WORD};
pub use utils::{changed_words, mem_diff, parse_literal};
