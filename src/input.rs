//! Client→server input events (`PacketType::Misc`, SPEC_FULL §6). The wire
//! protocol treats every input payload as an opaque blob; this module's only
//! job is handing each one to whatever injects it into the kernel.
//!
//! uhid device emulation is the external component named in §6 — this crate
//! defines the seam (`InputSink`) and a thin `/dev/uhid` writer, not a full
//! HID report-descriptor stack.

use std::fs::{File, OpenOptions};
use std::io::Write;

use crate::error::{ErrorContext, Result, StreamError};

/// Destination for decoded input-event payloads. Implementations own
/// whatever kernel resource actually injects events.
pub trait InputSink: Send {
    fn inject(&mut self, payload: &[u8]) -> Result<()>;
}

/// Used when `--disable-uhid` is set: events are accepted off the wire and
/// discarded, matching the CLI flag's documented behavior.
pub struct NullInputSink;

impl InputSink for NullInputSink {
    fn inject(&mut self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Writes each event payload verbatim to `/dev/uhid`. The payload framing
/// and report format are owned entirely by the client and the uhid-side
/// consumer; this sink performs no interpretation.
pub struct UhidInputSink {
    device: File,
}

impl UhidInputSink {
    pub fn open() -> Result<Self> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/uhid")
            .map_err(|e| StreamError::DeviceUnavailable(ErrorContext::new("open /dev/uhid", e.to_string())))?;
        Ok(Self { device })
    }
}

impl InputSink for UhidInputSink {
    fn inject(&mut self, payload: &[u8]) -> Result<()> {
        self.device
            .write_all(payload)
            .map_err(|e| StreamError::DeviceUnavailable(ErrorContext::new("write /dev/uhid", e.to_string())))
    }
}

/// Picks the sink named by `--disable-uhid`.
pub fn open_sink(disable_uhid: bool) -> Result<Box<dyn InputSink>> {
    if disable_uhid {
        Ok(Box::new(NullInputSink))
    } else {
        Ok(Box::new(UhidInputSink::open()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_and_discards_every_payload() {
        let mut sink = NullInputSink;
        assert!(sink.inject(&[1, 2, 3]).is_ok());
        assert!(sink.inject(&[]).is_ok());
    }
}
