//! AXI4 channel bundles and burst bookkeeping.
//!
//! Signal names follow the AXI specification from the point of view of the
//! device (the manager): [`AxiOutputs`] are what the device drives, and
//! [`AxiInputs`] are what the subordinate port drives back.

mod port;

pub use port::{AxiPort, ProtocolViolation};

macro_rules! define_code {
    {
        @mod $modname:ident;
        @type $typ:ty;
        $( $cname:ident = $cval:expr; )*
    } => {
        pub mod $modname {
            $(pub const $cname : $typ = $cval; )*
            #[allow(unused)]
            pub fn name_of(code: $typ) -> &'static str {
                match code {
                    $($cname => stringify!($cname), )*
                    _ => "no name"
                }
            }
        }
    };
}

define_code! {
    @mod resp;
    @type u8;
    OKAY = 0b00;
    EXOKAY = 0b01;
    SLVERR = 0b10;
    DECERR = 0b11;
}

/// Width of the data bus in bytes. Every port in this crate is 64 bits wide.
pub const BUS_BYTES: u64 = 8;

/// Largest `size` field a 64-bit data bus can carry.
pub const MAX_SIZE: u8 = 3;

/// Signals driven by the device towards the subordinate port.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AxiOutputs {
    pub aw_valid: bool,
    pub aw_id: u32,
    pub aw_addr: u64,
    pub aw_len: u8,
    pub aw_size: u8,

    pub w_valid: bool,
    pub w_data: u64,
    pub w_strb: u8,
    pub w_last: bool,

    pub b_ready: bool,

    pub ar_valid: bool,
    pub ar_id: u32,
    pub ar_addr: u64,
    pub ar_len: u8,
    pub ar_size: u8,

    pub r_ready: bool,
}

/// Signals driven by the subordinate port towards the device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AxiInputs {
    pub aw_ready: bool,

    pub w_ready: bool,

    pub b_valid: bool,
    pub b_id: u32,
    pub b_resp: u8,

    pub ar_ready: bool,

    pub r_valid: bool,
    pub r_id: u32,
    pub r_data: u64,
    pub r_resp: u8,
    pub r_last: bool,
}

/// Address of the beat following one at `addr`, for an incrementing burst
/// of `1 << size` byte beats. The result is aligned to the beat size.
pub fn next_beat_addr(addr: u64, size: u8) -> u64 {
    ((addr >> size).wrapping_add(1)) << size
}

/// Byte lanes a beat of `1 << size` bytes at `addr` may touch.
pub fn lane_window(addr: u64, size: u8) -> u8 {
    let bytes = 1u32 << size;
    let window: u32 = if bytes >= BUS_BYTES as u32 {
        0xff
    } else {
        (1 << bytes) - 1
    };
    ((window << (addr % BUS_BYTES)) & 0xff) as u8
}

/// One in-flight burst of a single direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Burst {
    pub id: u32,
    pub addr: u64,
    /// log2 of the bytes per beat
    pub size: u8,
    pub beats_left: u32,
}

impl Burst {
    /// A burst of `len + 1` beats, as encoded on the AR/AW channels.
    pub fn new(id: u32, addr: u64, len: u8, size: u8) -> Self {
        Self {
            id,
            addr,
            size: size & 0x7,
            beats_left: len as u32 + 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.beats_left > 0
    }

    pub fn is_last(&self) -> bool {
        self.beats_left == 1
    }

    /// Lanes the current beat is allowed to write.
    pub fn lane_window(&self) -> u8 {
        lane_window(self.addr, self.size)
    }

    /// Retire the current beat.
    pub fn advance(&mut self) {
        debug_assert!(self.is_active());
        self.beats_left -= 1;
        self.addr = next_beat_addr(self.addr, self.size);
    }
}
