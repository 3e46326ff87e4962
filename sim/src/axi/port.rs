use crate::mem::{Backing, Unbacked};

use super::{resp, AxiInputs, AxiOutputs, Burst};

/// The device broke burst framing. Simulation can not continue once this
/// happens, since the port no longer knows which beat belongs to which burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// `w_last` disagreed with the number of beats announced on AW.
    WriteLast {
        bus: &'static str,
        addr: u64,
        beats_left: u32,
        w_last: bool,
    },
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolViolation::WriteLast {
                bus,
                addr,
                beats_left,
                w_last,
            } => write!(
                f,
                "{bus}: w_last = {w_last} on write beat at {addr:#x} with {beats_left} beat(s) left; \
                 w_last must be set exactly on the final beat",
            ),
        }
    }
}

impl std::error::Error for ProtocolViolation {}

/// AXI4 subordinate port.
///
/// Each cycle the driver calls [`AxiPort::phase_a`] with the device outputs
/// before the device evaluates, pushes the returned inputs, lets the device
/// evaluate, and then calls [`AxiPort::phase_b`] with the settled outputs.
/// Only incrementing bursts are modeled and every response is `OKAY`.
#[derive(Debug)]
pub struct AxiPort<B> {
    name: &'static str,
    read: Burst,
    write: Burst,
    write_acked: bool,
    inputs: AxiInputs,
    backing: B,
}

impl AxiPort<Unbacked> {
    /// A port without storage: reads return `parked`, writes are dropped.
    pub fn unbacked(name: &'static str, parked: u64) -> Self {
        Self::new(name, Unbacked { parked })
    }
}

impl<B: Backing> AxiPort<B> {
    pub fn new(name: &'static str, backing: B) -> Self {
        Self {
            name,
            read: Burst::default(),
            write: Burst::default(),
            write_acked: true,
            inputs: AxiInputs::default(),
            backing,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The read burst in flight, if any beats are left.
    pub fn read_burst(&self) -> Option<&Burst> {
        self.read.is_active().then_some(&self.read)
    }

    /// The write burst in flight, if any beats are left.
    pub fn write_burst(&self) -> Option<&Burst> {
        self.write.is_active().then_some(&self.write)
    }

    /// Whether the last write burst has had its response accepted.
    pub fn write_acked(&self) -> bool {
        self.write_acked
    }

    /// The inputs computed for the current cycle.
    pub fn inputs(&self) -> &AxiInputs {
        &self.inputs
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    pub fn backing_mut(&mut self) -> &mut B {
        &mut self.backing
    }

    /// Present responses and accept new requests. Must run before the device
    /// evaluates, since the device logic depends on the returned values.
    pub fn phase_a(&mut self, out: &AxiOutputs) -> Result<AxiInputs, ProtocolViolation> {
        let mut inp = AxiInputs::default();

        // read data
        if self.read.is_active() {
            inp.r_valid = true;
            inp.r_id = self.read.id;
            inp.r_data = self.backing.read(self.read.addr);
            inp.r_resp = resp::OKAY;
            inp.r_last = self.read.is_last();
        }

        // write response
        if !self.write.is_active() && !self.write_acked {
            inp.b_valid = true;
            inp.b_id = self.write.id;
            inp.b_resp = resp::OKAY;
        }

        // write data
        inp.w_ready = self.write.is_active();
        if out.w_valid && inp.w_ready {
            if out.w_last != self.write.is_last() {
                return Err(ProtocolViolation::WriteLast {
                    bus: self.name,
                    addr: self.write.addr,
                    beats_left: self.write.beats_left,
                    w_last: out.w_last,
                });
            }
            let strobe = out.w_strb & self.write.lane_window();
            tracing::trace!(
                bus = self.name,
                "write beat {:#x} <- {:#018x} strb {:#04x}",
                self.write.addr,
                out.w_data,
                strobe
            );
            self.backing.write(self.write.addr, out.w_data, strobe);
            self.write.advance();
            if !self.write.is_active() {
                tracing::debug!(bus = self.name, id = self.write.id, "write burst drained");
            }
        }

        // read address
        inp.ar_ready = !self.read.is_active();
        if out.ar_valid && inp.ar_ready {
            self.read = Burst::new(out.ar_id, out.ar_addr, out.ar_len, out.ar_size);
            tracing::debug!(
                bus = self.name,
                id = out.ar_id,
                "accept read burst at {:#x}, {} beat(s) of {} byte(s)",
                out.ar_addr,
                self.read.beats_left,
                1u32 << self.read.size
            );
        }

        // write address
        inp.aw_ready = !self.write.is_active() && self.write_acked;
        if out.aw_valid && inp.aw_ready {
            self.write = Burst::new(out.aw_id, out.aw_addr, out.aw_len, out.aw_size);
            self.write_acked = false;
            tracing::debug!(
                bus = self.name,
                id = out.aw_id,
                "accept write burst at {:#x}, {} beat(s) of {} byte(s)",
                out.aw_addr,
                self.write.beats_left,
                1u32 << self.write.size
            );
        }

        self.inputs = inp;
        Ok(inp)
    }

    /// Commit the handshakes the device accepted this cycle. Must run after
    /// the device evaluated, once its ready signals are final.
    pub fn phase_b(&mut self, out: &AxiOutputs) -> AxiInputs {
        if self.inputs.r_valid && out.r_ready {
            tracing::trace!(
                bus = self.name,
                "read beat {:#x} -> {:#018x}",
                self.read.addr,
                self.inputs.r_data
            );
            self.read.advance();
            if !self.read.is_active() {
                tracing::debug!(bus = self.name, id = self.read.id, "read burst done");
            }
        }

        if self.inputs.b_valid && out.b_ready {
            self.write_acked = true;
            tracing::debug!(bus = self.name, id = self.write.id, "write response accepted");
        }

        self.inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{MemoryImage, PARKED_WORD};

    fn read_req(id: u32, addr: u64, len: u8, size: u8) -> AxiOutputs {
        AxiOutputs {
            ar_valid: true,
            ar_id: id,
            ar_addr: addr,
            ar_len: len,
            ar_size: size,
            r_ready: true,
            b_ready: true,
            ..Default::default()
        }
    }

    fn write_req(id: u32, addr: u64, len: u8, size: u8) -> AxiOutputs {
        AxiOutputs {
            aw_valid: true,
            aw_id: id,
            aw_addr: addr,
            aw_len: len,
            aw_size: size,
            r_ready: true,
            b_ready: true,
            ..Default::default()
        }
    }

    fn write_beat(data: u64, strb: u8, last: bool) -> AxiOutputs {
        AxiOutputs {
            w_valid: true,
            w_data: data,
            w_strb: strb,
            w_last: last,
            r_ready: true,
            b_ready: true,
            ..Default::default()
        }
    }

    fn idle() -> AxiOutputs {
        AxiOutputs {
            r_ready: true,
            b_ready: true,
            ..Default::default()
        }
    }

    /// run one cycle where the device outputs do not change during evaluation
    fn cycle<B: Backing>(port: &mut AxiPort<B>, out: &AxiOutputs) -> AxiInputs {
        let inp = port.phase_a(out).unwrap();
        port.phase_b(out);
        inp
    }

    #[test]
    fn test_read_burst_beats_and_addresses() {
        let mut mem = MemoryImage::new(0);
        for i in 0..4 {
            mem.write(0x1000 + 8 * i, 0x100 + i, 0xff);
        }
        let mut port = AxiPort::new("mem", mem);

        let inp = cycle(&mut port, &read_req(5, 0x1000, 3, 3));
        assert!(inp.ar_ready);
        assert!(!inp.r_valid);

        let mut beats = Vec::new();
        for k in 0..4u64 {
            assert_eq!(port.read_burst().unwrap().addr, 0x1000 + k * 8);
            let inp = cycle(&mut port, &idle());
            assert!(inp.r_valid);
            assert!(!inp.ar_ready);
            assert_eq!(inp.r_id, 5);
            assert_eq!(inp.r_resp, resp::OKAY);
            beats.push((inp.r_data, inp.r_last));
        }
        assert_eq!(
            beats,
            vec![(0x100, false), (0x101, false), (0x102, false), (0x103, true)]
        );
        assert!(port.read_burst().is_none());
        assert!(cycle(&mut port, &idle()).ar_ready);
    }

    #[test]
    fn test_read_stalls_without_ready() {
        let mut port = AxiPort::unbacked("mem", PARKED_WORD);
        cycle(&mut port, &read_req(0, 0x40, 1, 3));
        let stalled = AxiOutputs::default();
        for _ in 0..10 {
            let inp = cycle(&mut port, &stalled);
            assert!(inp.r_valid);
            assert!(!inp.r_last);
            assert_eq!(inp.r_data, PARKED_WORD);
        }
        assert_eq!(port.read_burst().unwrap().beats_left, 2);
    }

    #[test]
    fn test_single_read_in_flight() {
        let mut port = AxiPort::unbacked("mem", PARKED_WORD);
        cycle(&mut port, &read_req(1, 0x1000, 1, 3));
        // a second request while the first is active is not accepted
        let inp = port.phase_a(&read_req(2, 0x2000, 0, 3)).unwrap();
        assert!(!inp.ar_ready);
        assert_eq!(inp.r_id, 1);
        port.phase_b(&read_req(2, 0x2000, 0, 3));
        let burst = port.read_burst().unwrap();
        assert_eq!(burst.id, 1);
        assert_eq!(burst.addr, 0x1008);
    }

    #[test]
    fn test_write_burst_and_response() {
        let mut port = AxiPort::new("mem", MemoryImage::new(0));
        let inp = cycle(&mut port, &write_req(7, 0x3000, 1, 3));
        assert!(inp.aw_ready);
        assert!(!inp.w_ready);
        assert!(!port.write_acked());

        let inp = cycle(&mut port, &write_beat(0xaa, 0xff, false));
        assert!(inp.w_ready);
        assert!(!inp.b_valid);
        // no new write burst until the response went out
        let inp = port.phase_a(&write_beat(0xbb, 0xff, true)).unwrap();
        assert!(!inp.aw_ready);
        port.phase_b(&idle());
        assert!(port.write_burst().is_none());

        let not_ready = AxiOutputs::default();
        let inp = cycle(&mut port, &not_ready);
        assert!(inp.b_valid);
        assert_eq!(inp.b_id, 7);
        assert!(!inp.aw_ready);
        assert!(!port.write_acked());

        let inp = cycle(&mut port, &idle());
        assert!(inp.b_valid);
        assert!(port.write_acked());
        let inp = cycle(&mut port, &idle());
        assert!(!inp.b_valid);
        assert!(inp.aw_ready);

        assert_eq!(port.backing().read(0x3000), 0xaa);
        assert_eq!(port.backing().read(0x3008), 0xbb);
    }

    #[test]
    fn test_write_strobe_masked_to_lane_window() {
        let mut port = AxiPort::new("mem", MemoryImage::new(0));
        // two single byte beats starting at 0x105
        cycle(&mut port, &write_req(0, 0x105, 1, 0));
        cycle(&mut port, &write_beat(0x1111_1111_1111_1111, 0xff, false));
        cycle(&mut port, &write_beat(0x2222_2222_2222_2222, 0xff, true));
        assert_eq!(port.backing().read(0x100), 0x0022_1100_0000_0000);
    }

    #[test]
    fn test_missing_w_last_is_fatal() {
        let mut port = AxiPort::new("mmio", MemoryImage::new(0));
        cycle(&mut port, &write_req(0, 0x100, 1, 3));
        let err = port.phase_a(&write_beat(1, 0xff, true)).unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::WriteLast {
                bus: "mmio",
                addr: 0x100,
                beats_left: 2,
                w_last: true,
            }
        );
        assert!(err.to_string().contains("w_last"));
        // nothing was written
        assert!(port.backing().get(0x100).is_none());
    }

    #[test]
    fn test_read_and_write_are_independent() {
        let mut port = AxiPort::new("mem", MemoryImage::new(0));
        let both = AxiOutputs {
            ar_valid: true,
            ar_addr: 0x10,
            aw_valid: true,
            aw_addr: 0x20,
            aw_size: 3,
            ar_size: 3,
            ..idle()
        };
        let inp = cycle(&mut port, &both);
        assert!(inp.ar_ready && inp.aw_ready);
        assert!(port.read_burst().is_some());
        assert!(port.write_burst().is_some());
    }
}
