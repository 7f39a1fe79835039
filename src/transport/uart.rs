//! Serial (UART) channel to the boot ROM.
//!
//! In serial download mode the boot ROM has no framing or addressing. The only
//! evidence that a compatible listener sits on the other end of the line is the
//! association handshake: the host sends a 4-byte magic and the ROM echoes it
//! back. A [`UartChannel`] therefore only exists after that echo has been
//! received and checked.

use std::{
    io::{self, Read, Write},
    time::Duration,
};

use hexplay::HexViewBuilder;
use log::{debug, info, log_enabled, trace, Level::Debug};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use super::{Report, Transfer};
use crate::{
    error::{Error, Result},
    Settings,
};

/// The boot ROM only listens at this speed.
pub const BAUD_RATE: u32 = 115_200;

/// Inter-character read timeout; a read blocks for at least one byte or until
/// this much time has passed without one.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Association magic, echoed back verbatim by a listening boot ROM.
pub const MAGIC: [u8; 4] = [0x23, 0x45, 0x45, 0x23];

// =============================================================================
// Public Interface
// =============================================================================

/// The byte stream a [`UartChannel`] runs on.
pub trait Line: Read + Write {
    /// Throw away anything queued for input or output.
    fn discard(&mut self) -> io::Result<()>;
}

impl Line for Box<dyn SerialPort> {
    fn discard(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}

/// Open the serial device named in `settings`, configure it for the boot
/// protocol and associate with the boot ROM.
///
/// The port is closed again before any error is returned.
pub fn open_channel(settings: &Settings) -> Result<UartChannel<Box<dyn SerialPort>>> {
    let path = settings.path.as_deref().ok_or_else(|| {
        serialport::Error::new(
            serialport::ErrorKind::InvalidInput,
            "no serial device was given",
        )
    })?;

    let port = serialport::new(path, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(settings.flow_control)
        .timeout(READ_TIMEOUT)
        .open()?;

    info!("Connected to {} at {} baud", path, BAUD_RATE);
    debug!("flow control : {:#?}", settings.flow_control);

    UartChannel::associate(port, settings.stall_reads)
}

/// An associated serial channel to the boot ROM.
pub struct UartChannel<L: Line> {
    line: L,
    stall_reads: u32,
}
impl<L: Line> UartChannel<L> {
    /// Run the association handshake over `line`.
    ///
    /// Stale data is discarded, the magic is written and drained, then exactly
    /// four bytes are read back, tolerating short reads. Up to `stall_reads`
    /// consecutive empty reads are accepted while waiting. The line is dropped
    /// when the handshake fails.
    pub fn associate(mut line: L, stall_reads: u32) -> Result<Self> {
        let stall_reads = stall_reads.max(1);
        info!("starting association phase");

        line.discard().map_err(Error::Line)?;
        line.write_all(&MAGIC).map_err(Error::Line)?;
        // Drain only; pending input may already hold the echo.
        line.flush().map_err(Error::Line)?;

        let mut response = [0u8; 4];
        fill(&mut line, &mut response, stall_reads).map_err(|shortfall| match shortfall {
            Shortfall::Failed {
                transferred,
                source,
            } => Error::HandshakeTimeout {
                received: transferred,
                source,
            },
            Shortfall::Stalled { transferred } => Error::HandshakeTimeout {
                received: transferred,
                source: io::Error::new(io::ErrorKind::TimedOut, "the boot ROM did not answer"),
            },
        })?;

        if log_enabled!(Debug) {
            let view = HexViewBuilder::new(&response)
                .address_offset(0)
                .row_width(16)
                .finish();
            debug!("association response:\n{}", view);
        }

        if response != MAGIC {
            return Err(Error::HandshakeMismatch { response });
        }

        info!(
            "association phase succeeded, response was 0x{:08x}",
            u32::from_be_bytes(response)
        );

        Ok(UartChannel { line, stall_reads })
    }

    /// Give back the underlying line.
    pub fn into_line(self) -> L {
        self.line
    }
}

impl<L: Line> Transfer for UartChannel<L> {
    fn transfer(&mut self, report: Report, buf: &mut [u8], expected: usize) -> Result<usize> {
        if report.is_outbound() {
            let written = self.line.write(buf).map_err(|source| Error::Transfer {
                report,
                transferred: 0,
                source,
            })?;
            trace!("{:?}: {} of {} byte(s) written", report, written, buf.len());
            return Ok(written);
        }

        if expected > buf.len() {
            return Err(Error::BufferTooSmall {
                expected,
                capacity: buf.len(),
            });
        }

        fill(&mut self.line, &mut buf[..expected], self.stall_reads).map_err(|shortfall| {
            match shortfall {
                Shortfall::Failed {
                    transferred,
                    source,
                } => Error::Transfer {
                    report,
                    transferred,
                    source,
                },
                Shortfall::Stalled { transferred } => Error::Stalled {
                    report,
                    transferred,
                    expected,
                },
            }
        })?;
        trace!("{:?}: {} byte(s) read", report, expected);

        Ok(expected)
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Why `fill` gave up, with the byte count of the reads that completed.
enum Shortfall {
    Failed {
        transferred: usize,
        source: io::Error,
    },
    Stalled {
        transferred: usize,
    },
}

/// Read until `buf` is full.
///
/// A read returning nothing, or timing out, counts as idle; `stall_reads` idle
/// reads in a row end the wait. Any other read error ends it
/// immediately.
fn fill<L: Read>(
    line: &mut L,
    buf: &mut [u8],
    stall_reads: u32,
) -> std::result::Result<(), Shortfall> {
    let mut transferred = 0;
    let mut idle = 0;

    while transferred < buf.len() {
        match line.read(&mut buf[transferred..]) {
            Ok(0) => idle += 1,
            Ok(count) => {
                transferred += count;
                idle = 0;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => idle += 1,
            Err(source) => {
                return Err(Shortfall::Failed {
                    transferred,
                    source,
                })
            }
        }

        if idle >= stall_reads {
            return Err(Shortfall::Stalled { transferred });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SettingsBuilder;
    use std::collections::VecDeque;

    /// A line replaying scripted read results. Running out of script behaves
    /// like a silent line.
    #[derive(Default)]
    struct ScriptedLine {
        reads: VecDeque<io::Result<Vec<u8>>>,
        read_calls: usize,
        written: Vec<u8>,
        write_limit: Option<usize>,
        discards: usize,
        flushes: usize,
        broken_discard: bool,
        broken_flush: bool,
    }
    impl ScriptedLine {
        fn answering(chunks: &[&[u8]]) -> Self {
            ScriptedLine {
                reads: chunks.iter().map(|c| Ok(c.to_vec())).collect(),
                ..Default::default()
            }
        }
    }
    impl Read for ScriptedLine {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.read_calls += 1;
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    let count = chunk.len().min(buf.len());
                    buf[..count].copy_from_slice(&chunk[..count]);
                    if count < chunk.len() {
                        self.reads.push_front(Ok(chunk[count..].to_vec()));
                    }
                    Ok(count)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "silence")),
            }
        }
    }
    impl Write for ScriptedLine {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let count = self.write_limit.map_or(buf.len(), |l| l.min(buf.len()));
            self.written.extend_from_slice(&buf[..count]);
            Ok(count)
        }
        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            if self.broken_flush {
                return Err(io::Error::new(io::ErrorKind::Other, "tcdrain"));
            }
            Ok(())
        }
    }
    impl Line for ScriptedLine {
        fn discard(&mut self) -> io::Result<()> {
            self.discards += 1;
            if self.broken_discard {
                return Err(io::Error::new(io::ErrorKind::Other, "tcflush"));
            }
            Ok(())
        }
    }

    /// Whatever is written comes back on the read side.
    #[derive(Default)]
    struct LoopbackLine {
        queue: VecDeque<u8>,
    }
    impl Read for LoopbackLine {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let count = buf.len().min(self.queue.len());
            for (slot, byte) in buf.iter_mut().zip(self.queue.drain(..count)) {
                *slot = byte;
            }
            Ok(count)
        }
    }
    impl Write for LoopbackLine {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.queue.extend(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    impl Line for LoopbackLine {
        fn discard(&mut self) -> io::Result<()> {
            self.queue.clear();
            Ok(())
        }
    }

    fn associated(chunks: &[&[u8]]) -> UartChannel<ScriptedLine> {
        let mut line = ScriptedLine::answering(&[&MAGIC]);
        line.reads.extend(chunks.iter().map(|c| Ok(c.to_vec())));
        match UartChannel::associate(line, 3) {
            Ok(channel) => channel,
            Err(e) => panic!("association failed: {}", e),
        }
    }

    #[test]
    fn handshake_writes_magic_between_discard_and_flush() {
        let channel = associated(&[]);
        let line = channel.into_line();
        assert_eq!(line.written, MAGIC);
        assert_eq!(line.discards, 1);
        assert_eq!(line.flushes, 1);
    }

    #[test]
    fn handshake_tolerates_short_reads() {
        let line = ScriptedLine::answering(&[&[0x23], &[], &[0x45, 0x45], &[0x23]]);
        assert!(UartChannel::associate(line, 3).is_ok());
    }

    #[test]
    fn handshake_rejects_any_single_byte_deviation() {
        for position in 0..4 {
            for delta in &[1u8, 0x80, 0xff] {
                let mut response = MAGIC;
                response[position] = response[position].wrapping_add(*delta);
                let line = ScriptedLine::answering(&[&response]);
                match UartChannel::associate(line, 3) {
                    Err(Error::HandshakeMismatch { response: got }) => assert_eq!(got, response),
                    Err(e) => panic!("unexpected error {}", e),
                    Ok(_) => panic!("accepted {:02x?}", response),
                }
            }
        }
    }

    #[test]
    fn handshake_rejects_reordered_magic() {
        for response in &[[0x45u8, 0x23, 0x23, 0x45], [0x23, 0x23, 0x45, 0x45]] {
            let line = ScriptedLine::answering(&[response]);
            assert!(matches!(
                UartChannel::associate(line, 3),
                Err(Error::HandshakeMismatch { .. })
            ));
        }
    }

    #[test]
    fn handshake_rejects_truncated_response() {
        let line = ScriptedLine::answering(&[&[0x23, 0x45, 0x45]]);
        assert!(matches!(
            UartChannel::associate(line, 3),
            Err(Error::HandshakeTimeout { received: 3, .. })
        ));
    }

    #[test]
    fn handshake_stops_at_first_failing_read() {
        let mut line = ScriptedLine::answering(&[&[0x23]]);
        line.reads
            .push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        line.reads.push_back(Ok(vec![0x45, 0x45, 0x23]));
        assert!(matches!(
            UartChannel::associate(line, 3),
            Err(Error::HandshakeTimeout { received: 1, .. })
        ));
    }

    #[test]
    fn loopback_handshake_succeeds_on_every_fresh_channel() {
        for _ in 0..3 {
            let channel = UartChannel::associate(LoopbackLine::default(), 1);
            assert!(channel.is_ok());
        }
    }

    #[test]
    fn read_returns_exactly_the_expected_count() {
        let payload: Vec<u8> = (0u8..80).collect();
        for &expected in &[1usize, 4, 7, 64] {
            let chunks: Vec<&[u8]> = payload.chunks(3).collect();
            let mut channel = associated(&chunks);
            let mut buf = [0u8; 80];
            let count = channel
                .transfer(Report::Status, &mut buf, expected)
                .expect("read");
            assert_eq!(count, expected);
            assert_eq!(&buf[..expected], &payload[..expected]);
            assert!(buf[expected..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn zero_byte_reads_do_not_end_a_read() {
        let mut channel = associated(&[&[1], &[], &[], &[2, 3], &[], &[4]]);
        let mut buf = [0u8; 4];
        assert_eq!(channel.transfer(Report::HabMode, &mut buf, 4).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn read_failure_counts_only_completed_reads() {
        let mut channel = associated(&[&[1, 2, 3], &[4, 5]]);
        channel
            .line
            .reads
            .push_back(Err(io::Error::new(io::ErrorKind::Other, "framing")));
        let mut buf = [0u8; 16];
        match channel.transfer(Report::Status, &mut buf, 16) {
            Err(Error::Transfer {
                report,
                transferred,
                ..
            }) => {
                assert_eq!(report, Report::Status);
                assert_eq!(transferred, 5);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn silent_line_stalls_after_the_configured_reads() {
        let mut channel = associated(&[&[9]]);
        let calls_before = channel.line.read_calls;
        let mut buf = [0u8; 4];
        assert!(matches!(
            channel.transfer(Report::Status, &mut buf, 4),
            Err(Error::Stalled {
                transferred: 1,
                expected: 4,
                ..
            })
        ));
        assert_eq!(channel.line.read_calls - calls_before, 1 + 3);
    }

    #[test]
    fn short_write_is_reported_verbatim() {
        let mut channel = associated(&[]);
        channel.line.write_limit = Some(3);
        let mut buf = [0xaa; 8];
        assert_eq!(channel.transfer(Report::Data, &mut buf, 0).unwrap(), 3);
        assert_eq!(&channel.line.written[MAGIC.len()..], &[0xaa; 3]);
    }

    #[test]
    fn read_larger_than_buffer_is_refused() {
        let mut channel = associated(&[&[0; 8]]);
        let mut buf = [0u8; 4];
        assert!(matches!(
            channel.transfer(Report::Status, &mut buf, 8),
            Err(Error::BufferTooSmall {
                expected: 8,
                capacity: 4
            })
        ));
    }

    #[test]
    fn open_without_a_device_path_fails() {
        let settings = SettingsBuilder::new().finalize();
        assert!(matches!(open_channel(&settings), Err(Error::Open(_))));
    }

    #[test]
    fn open_of_a_missing_device_fails() {
        let settings = SettingsBuilder::new()
            .path("/dev/does-not-exist")
            .finalize();
        assert!(matches!(open_channel(&settings), Err(Error::Open(_))));
    }

    #[test]
    fn handshake_reports_a_failing_discard() {
        let mut line = ScriptedLine::answering(&[&MAGIC]);
        line.broken_discard = true;
        assert!(matches!(
            UartChannel::associate(line, 3),
            Err(Error::Line(_))
        ));
    }

    #[test]
    fn handshake_reports_a_failing_drain() {
        let mut line = ScriptedLine::answering(&[&MAGIC]);
        line.broken_flush = true;
        assert!(matches!(
            UartChannel::associate(line, 3),
            Err(Error::Line(_))
        ));
    }

    #[test]
    fn interrupted_reads_are_retried_without_stalling() {
        let mut channel = associated(&[]);
        for _ in 0..5 {
            channel
                .line
                .reads
                .push_back(Err(io::Error::new(io::ErrorKind::Interrupted, "signal")));
        }
        channel.line.reads.push_back(Ok(vec![1, 2, 3, 4]));
        let calls_before = channel.line.read_calls;

        let mut buf = [0u8; 4];
        assert_eq!(channel.transfer(Report::Status, &mut buf, 4).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(channel.line.read_calls - calls_before, 6);
    }
}
