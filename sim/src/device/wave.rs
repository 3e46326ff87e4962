//! VCD waveform of the AXI bus signals.

use std::io;

use vcd::{IdCode, TimescaleUnit, Value};

use super::Bus;
use crate::axi::{AxiInputs, AxiOutputs};

type Probe = fn(&AxiOutputs, &AxiInputs) -> u64;

/// Signals dumped for every bus, with their widths.
const SIGNALS: &[(&str, u32, Probe)] = &[
    ("ar_valid", 1, |o, _| o.ar_valid as u64),
    ("ar_ready", 1, |_, i| i.ar_ready as u64),
    ("ar_id", 32, |o, _| o.ar_id as u64),
    ("ar_addr", 64, |o, _| o.ar_addr),
    ("ar_len", 8, |o, _| o.ar_len as u64),
    ("ar_size", 3, |o, _| o.ar_size as u64),
    ("r_valid", 1, |_, i| i.r_valid as u64),
    ("r_ready", 1, |o, _| o.r_ready as u64),
    ("r_id", 32, |_, i| i.r_id as u64),
    ("r_data", 64, |_, i| i.r_data),
    ("r_resp", 2, |_, i| i.r_resp as u64),
    ("r_last", 1, |_, i| i.r_last as u64),
    ("aw_valid", 1, |o, _| o.aw_valid as u64),
    ("aw_ready", 1, |_, i| i.aw_ready as u64),
    ("aw_id", 32, |o, _| o.aw_id as u64),
    ("aw_addr", 64, |o, _| o.aw_addr),
    ("aw_len", 8, |o, _| o.aw_len as u64),
    ("aw_size", 3, |o, _| o.aw_size as u64),
    ("w_valid", 1, |o, _| o.w_valid as u64),
    ("w_ready", 1, |_, i| i.w_ready as u64),
    ("w_data", 64, |o, _| o.w_data),
    ("w_strb", 8, |o, _| o.w_strb as u64),
    ("w_last", 1, |o, _| o.w_last as u64),
    ("b_valid", 1, |_, i| i.b_valid as u64),
    ("b_ready", 1, |o, _| o.b_ready as u64),
    ("b_id", 32, |_, i| i.b_id as u64),
    ("b_resp", 2, |_, i| i.b_resp as u64),
];

fn bit(v: u64, n: u32) -> Value {
    if v >> n & 1 != 0 {
        Value::V1
    } else {
        Value::V0
    }
}

/// Writes the AXI signals of both buses as a value change dump, one time unit
/// per cycle. Only changed signals are emitted after the first sample.
pub struct WaveTrace<W: io::Write> {
    writer: vcd::Writer<W>,
    ids: [Vec<IdCode>; 2],
    last: [Vec<Option<u64>>; 2],
    time: Option<u64>,
}

impl<W: io::Write> WaveTrace<W> {
    /// Write the VCD header to `out`.
    pub fn new(out: W) -> io::Result<Self> {
        let mut writer = vcd::Writer::new(out);
        writer.timescale(1, TimescaleUnit::NS)?;
        writer.add_module("axsim")?;
        let mut ids: [Vec<IdCode>; 2] = Default::default();
        for bus in Bus::ALL {
            writer.add_module(bus.name())?;
            for (name, width, _) in SIGNALS {
                ids[bus.index()].push(writer.add_wire(*width, name)?);
            }
            writer.upscope()?;
        }
        writer.upscope()?;
        writer.enddefinitions()?;
        Ok(Self {
            writer,
            ids,
            last: [vec![None; SIGNALS.len()], vec![None; SIGNALS.len()]],
            time: None,
        })
    }

    /// Record the signals of `bus` at `cycle`. Cycles must not go backwards.
    pub fn sample(
        &mut self,
        cycle: u64,
        bus: Bus,
        outputs: &AxiOutputs,
        inputs: &AxiInputs,
    ) -> io::Result<()> {
        if self.time != Some(cycle) {
            self.writer.timestamp(cycle)?;
            self.time = Some(cycle);
        }
        let b = bus.index();
        for (n, (_, width, probe)) in SIGNALS.iter().enumerate() {
            let value = probe(outputs, inputs);
            if self.last[b][n] == Some(value) {
                continue;
            }
            self.last[b][n] = Some(value);
            let id = self.ids[b][n];
            if *width == 1 {
                self.writer.change_scalar(id, bit(value, 0))?;
            } else {
                self.writer
                    .change_vector(id, (0..*width).rev().map(|i| bit(value, i)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump() -> io::Result<()> {
        let mut out = Vec::new();
        {
            let mut trace = WaveTrace::new(&mut out)?;
            let mut o = AxiOutputs::default();
            let i = AxiInputs::default();
            trace.sample(0, Bus::Mem, &o, &i)?;
            trace.sample(0, Bus::Mmio, &o, &i)?;
            o.ar_valid = true;
            o.ar_addr = 0x1000;
            trace.sample(1, Bus::Mem, &o, &i)?;
            // unchanged, nothing but the timestamp
            trace.sample(2, Bus::Mem, &o, &i)?;
        }
        let text = String::from_utf8(out).expect("vcd is ascii");
        assert!(text.contains("$scope module mem $end"));
        assert!(text.contains("$scope module mmio $end"));
        assert!(text.contains("ar_addr"));
        assert!(text.contains("#1\n"));
        assert!(text.contains(&format!("b{:064b} ", 0x1000)));
        assert!(text.trim_end().ends_with("#2"));
        Ok(())
    }
}
