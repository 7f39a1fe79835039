//! Transports carrying serial download protocol exchanges.
//!
//! The command layer never talks to a serial port directly. It goes through a
//! [`Device`] handle, which owns a transport implementing [`Transfer`], the
//! single entry point for moving bytes to and from the boot ROM. Only the UART
//! transport is provided.

pub mod uart;

use crate::error::Result;

/// SDP report numbers. They tag every exchange with the boot ROM and also
/// give its direction: the host sends commands and data, the device answers
/// with its HAB mode and a status or data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Report {
    Command = 1,
    Data = 2,
    HabMode = 3,
    Status = 4,
}
impl Report {
    /// Reports numbered from here on flow from the device to the host.
    const FIRST_INBOUND: u8 = 3;

    /// `true` when the report is written to the device.
    pub fn is_outbound(self) -> bool {
        (self as u8) < Self::FIRST_INBOUND
    }
}

/// Duplex byte transfer over an established channel.
pub trait Transfer {
    /// For outbound reports, writes `buf` once and returns the number of bytes
    /// the line accepted, which may be fewer than `buf.len()`.
    ///
    /// For inbound reports, blocks until exactly `expected` bytes have been
    /// read into the front of `buf` and returns `expected`. Reads returning
    /// fewer bytes are retried; a failing read aborts the transfer.
    fn transfer(&mut self, report: Report, buf: &mut [u8], expected: usize) -> Result<usize>;
}

impl<T: Transfer + ?Sized> Transfer for &mut T {
    fn transfer(&mut self, report: Report, buf: &mut [u8], expected: usize) -> Result<usize> {
        (**self).transfer(report, buf, expected)
    }
}

impl<T: Transfer + ?Sized> Transfer for Box<T> {
    fn transfer(&mut self, report: Report, buf: &mut [u8], expected: usize) -> Result<usize> {
        (**self).transfer(report, buf, expected)
    }
}

/// A boot ROM reachable through the transport `T`.
///
/// The handle owns the transport for the whole session; dropping the handle
/// closes the channel.
pub struct Device<T: Transfer> {
    transport: T,
    max_packet: usize,
}
impl<T: Transfer> Device<T> {
    /// Largest data report sent in a single transfer unless the work file
    /// says otherwise.
    pub const DEFAULT_MAX_PACKET: usize = 1024;

    pub fn new(transport: T) -> Self {
        Device {
            transport,
            max_packet: Self::DEFAULT_MAX_PACKET,
        }
    }

    /// Set the largest data report size, at least one byte.
    pub fn with_max_packet(mut self, max_packet: usize) -> Self {
        self.max_packet = max_packet.max(1);
        self
    }

    pub fn max_packet(&self) -> usize {
        self.max_packet
    }

    pub fn transfer(&mut self, report: Report, buf: &mut [u8], expected: usize) -> Result<usize> {
        self.transport.transfer(report, buf, expected)
    }

    /// Give the transport back, closing nothing.
    pub fn into_inner(self) -> T {
        self.transport
    }
}
