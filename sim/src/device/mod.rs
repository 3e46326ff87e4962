//! The clocked device model the ports are attached to.
//!
//! Usually this is a compiled RTL model of a core. The crate only needs the
//! small set of operations in [`DeviceModel`]; [`ScriptedManager`] is a
//! behavioral implementation that replays AXI traffic from a script.

mod manager;
mod script;
mod wave;

pub use manager::{ReadBeat, ScriptedManager, Transaction};
pub use script::{parse_script, Op, WriteBeat};
pub use wave::WaveTrace;

use crate::axi::{AxiInputs, AxiOutputs};

/// The AXI buses a device exposes to the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bus {
    /// Main memory: code and data.
    Mem,
    /// Memory-mapped host-control region.
    Mmio,
}

impl Bus {
    pub const ALL: [Bus; 2] = [Bus::Mem, Bus::Mmio];

    pub fn name(self) -> &'static str {
        match self {
            Bus::Mem => "mem",
            Bus::Mmio => "mmio",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A clocked model driving AXI manager interfaces.
///
/// The harness sets inputs, calls [`DeviceModel::eval`] to settle the
/// combinational logic and reads outputs back. Registers update when `eval`
/// runs after a rising clock edge.
pub trait DeviceModel {
    fn set_clock(&mut self, high: bool);
    fn set_reset(&mut self, asserted: bool);
    fn eval(&mut self);
    fn outputs(&self, bus: Bus) -> AxiOutputs;
    fn set_inputs(&mut self, bus: Bus, inputs: &AxiInputs);

    /// Record the current signal values at `cycle` into a waveform, if the
    /// model keeps one.
    fn sample_waveform(&mut self, _cycle: u64) {}
}
