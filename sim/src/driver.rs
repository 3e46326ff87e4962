//! The cosimulation step loop.
//!
//! A [`Cosim`] owns the device model and one [`AxiPort`] per bus. Every cycle
//! it runs both ports' `phase_a`, evaluates the device, runs `phase_b` and
//! then toggles the clock. The run ends when the program writes success to
//! `tohost` or the cycle budget is used up.

use std::io::Write;

use anyhow::Context;

use crate::{
    axi::AxiPort,
    device::{Bus, DeviceModel},
    host::{HostControl, HostLayout},
    mem::SharedMemory,
};

/// Cycles during which the device samples its waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceWindow {
    pub start: u64,
    pub cycles: u64,
}

impl Default for TraceWindow {
    fn default() -> Self {
        Self {
            start: 0,
            cycles: 20000,
        }
    }
}

impl TraceWindow {
    pub fn contains(&self, cycle: u64) -> bool {
        cycle >= self.start && cycle - self.start < self.cycles
    }
}

#[derive(Debug, Clone)]
pub struct CosimConfig {
    /// Cycles with reset asserted at the start of the settle phase.
    pub reset_cycles: u64,
    /// Total cycles before the steady run, reset included.
    pub settle_cycles: u64,
    /// Budget of steady-run steps.
    pub max_cycles: u64,
    pub trace: Option<TraceWindow>,
}

impl Default for CosimConfig {
    fn default() -> Self {
        Self {
            reset_cycles: 100,
            settle_cycles: 1000,
            max_cycles: 1_000_000,
            trace: None,
        }
    }
}

impl CosimConfig {
    pub fn set_reset_cycles(mut self, reset_cycles: u64) -> Self {
        self.reset_cycles = reset_cycles;
        self
    }
    pub fn set_settle_cycles(mut self, settle_cycles: u64) -> Self {
        self.settle_cycles = settle_cycles;
        self
    }
    pub fn set_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = max_cycles;
        self
    }
    pub fn set_trace(mut self, trace: Option<TraceWindow>) -> Self {
        self.trace = trace;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    /// The program wrote success to `tohost` during the step.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Success, reported at the cycle of the completing step.
    Finished { cycle: u64 },
    Timeout { max_cycles: u64 },
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Finished { .. } => 0,
            Outcome::Timeout { .. } => 1,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Finished { cycle } => write!(f, "Benchmark run successful at cycle {cycle}"),
            Outcome::Timeout { max_cycles } => {
                write!(f, "benchmark did not finish within {max_cycles} cycles")
            }
        }
    }
}

pub struct Cosim<D, W: Write> {
    device: D,
    mem_port: AxiPort<SharedMemory>,
    mmio_port: AxiPort<HostControl<W>>,
    config: CosimConfig,
    cycle: u64,
}

impl<D: DeviceModel, W: Write> Cosim<D, W> {
    /// Attach `device` to a memory port and a host-control port that share
    /// `memory`. Program output goes to `console`.
    pub fn new(
        device: D,
        memory: SharedMemory,
        layout: HostLayout,
        console: W,
        config: CosimConfig,
    ) -> Self {
        let host = HostControl::new(memory.clone(), layout, console);
        Self {
            device,
            mem_port: AxiPort::new(Bus::Mem.name(), memory),
            mmio_port: AxiPort::new(Bus::Mmio.name(), host),
            config,
            cycle: 0,
        }
    }

    /// Number of clock cycles simulated so far, settle phase included.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn config(&self) -> &CosimConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn mem_port(&self) -> &AxiPort<SharedMemory> {
        &self.mem_port
    }

    pub fn mmio_port(&self) -> &AxiPort<HostControl<W>> {
        &self.mmio_port
    }

    pub fn host(&self) -> &HostControl<W> {
        self.mmio_port.backing()
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Both clock edges, each followed by an evaluation.
    fn tick(&mut self) {
        if let Some(window) = self.config.trace {
            if window.contains(self.cycle) {
                self.device.sample_waveform(self.cycle);
            }
        }
        self.device.set_clock(true);
        self.device.eval();
        self.device.set_clock(false);
        self.device.eval();
        self.cycle += 1;
    }

    /// Run the settle phase, holding reset for the first `reset_cycles`.
    pub fn reset(&mut self) {
        tracing::debug!(
            "settling for {} cycles, {} in reset",
            self.config.settle_cycles,
            self.config.reset_cycles
        );
        for i in 0..self.config.settle_cycles {
            self.device.set_reset(i < self.config.reset_cycles);
            self.tick();
        }
        self.device.set_reset(false);
    }

    /// Simulate one cycle of the steady run.
    pub fn step(&mut self) -> anyhow::Result<StepStatus> {
        let cycle = self.cycle;

        let out = self.device.outputs(Bus::Mem);
        let inp = self
            .mem_port
            .phase_a(&out)
            .with_context(|| format!("cycle {cycle}"))?;
        self.device.set_inputs(Bus::Mem, &inp);

        let out = self.device.outputs(Bus::Mmio);
        let inp = self
            .mmio_port
            .phase_a(&out)
            .with_context(|| format!("cycle {cycle}"))?;
        self.device.set_inputs(Bus::Mmio, &inp);

        self.device.eval();

        let out = self.device.outputs(Bus::Mem);
        let inp = self.mem_port.phase_b(&out);
        self.device.set_inputs(Bus::Mem, &inp);

        let out = self.device.outputs(Bus::Mmio);
        let inp = self.mmio_port.phase_b(&out);
        self.device.set_inputs(Bus::Mmio, &inp);

        self.tick();

        Ok(if self.host().is_finished() {
            StepStatus::Finished
        } else {
            StepStatus::Running
        })
    }

    /// Settle, then step until the program finishes or the budget runs out.
    pub fn run(&mut self) -> anyhow::Result<Outcome> {
        self.reset();
        for _ in 0..self.config.max_cycles {
            if self.step()? == StepStatus::Finished {
                let cycle = self.cycle - 1;
                tracing::info!("finished at cycle {cycle}");
                return Ok(Outcome::Finished { cycle });
            }
        }
        tracing::info!("cycle budget of {} exhausted", self.config.max_cycles);
        Ok(Outcome::Timeout {
            max_cycles: self.config.max_cycles,
        })
    }
}
