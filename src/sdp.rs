//! Serial download protocol commands.
//!
//! Every command is a 16-byte packet sent as report 1. The boot ROM first
//! answers with its HAB mode (report 3) and then, depending on the command,
//! with a completion word or data (report 4). Image data follows a `WRITE_FILE`
//! command as report 2 packets.
//!
//! The commands are implemented on [`Device`] so they run over any
//! [`Transfer`] implementation. [`BootCommands`] is the subset the work
//! sequencer relies on.

mod ivt;

use std::fs;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, trace};

pub use ivt::{find_ivt, BootData, Ivt};

use crate::{
    error::{Error, Result},
    transport::{Device, Report, Transfer},
    work::{JumpMode, MemOp, MemWork, WorkItem},
};

/// Operations the work sequencer drives on the device.
pub trait BootCommands {
    /// Query the device status word; also tells whether the ROM still listens.
    fn status(&mut self) -> Result<u32>;

    /// Apply one memory directive.
    fn write_memory(&mut self, mem: &MemWork) -> Result<()>;

    /// Download the item's image, check it when `verify` is set and jump into
    /// it as the item requests.
    fn download(&mut self, item: &WorkItem, verify: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandType {
    ReadRegister = 0x0101,
    WriteRegister = 0x0202,
    WriteFile = 0x0404,
    ErrorStatus = 0x0505,
    JumpAddress = 0x0b0b,
}

/// Access width flag for register commands.
const FORMAT_32: u8 = 0x20;

/// Reply to a completed `WRITE_REGISTER`.
const WRITE_COMPLETE: u32 = 0x128a_8a12;
/// Reply to a completed `WRITE_FILE`.
const FILE_COMPLETE: u32 = 0x8888_8888;

/// Images are read back for verification in pieces of this size.
const VERIFY_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandType,
    pub address: u32,
    pub format: u8,
    pub count: u32,
    pub data: u32,
}
impl Command {
    pub const LEN: usize = 16;

    fn new(kind: CommandType, address: u32) -> Self {
        Command {
            kind,
            address,
            format: 0,
            count: 0,
            data: 0,
        }
    }

    /// Wire layout, all fields big endian:
    /// type(2) address(4) format(1) count(4) data(4) reserved(1).
    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut packet = [0u8; Self::LEN];
        packet[0..2].copy_from_slice(&(self.kind as u16).to_be_bytes());
        packet[2..6].copy_from_slice(&self.address.to_be_bytes());
        packet[6] = self.format;
        packet[7..11].copy_from_slice(&self.count.to_be_bytes());
        packet[11..15].copy_from_slice(&self.data.to_be_bytes());
        packet
    }
}

/// High assurance boot state reported ahead of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HabMode {
    Closed,
    Open,
}
impl HabMode {
    const CLOSED: u32 = 0x1234_3412;
    const OPEN: u32 = 0x5678_7856;

    fn from_word(word: u32) -> Result<Self> {
        match word {
            Self::CLOSED => Ok(HabMode::Closed),
            Self::OPEN => Ok(HabMode::Open),
            value => Err(Error::UnexpectedResponse {
                what: "HAB mode",
                value,
            }),
        }
    }
}

impl<T: Transfer> Device<T> {
    /// `ERROR_STATUS`: the status word of the last operation.
    pub fn error_status(&mut self) -> Result<u32> {
        self.command(&Command::new(CommandType::ErrorStatus, 0))?;
        let hab = self.hab_mode()?;
        let status = self.read_word()?;
        info!("HAB security state: {:?}, status=0x{:08x}", hab, status);
        Ok(status)
    }

    /// Read `len` bytes of device memory starting at `address`.
    pub fn read_memory(&mut self, address: u32, len: usize) -> Result<Vec<u8>> {
        let mut command = Command::new(CommandType::ReadRegister, address);
        command.format = FORMAT_32;
        command.count = len as u32;
        self.command(&command)?;
        self.hab_mode()?;

        // The ROM always answers with whole words.
        let padded = (len + 3) & !3;
        let mut data = vec![0u8; padded];
        self.transfer(Report::Status, &mut data, padded)?;
        data.truncate(len);
        Ok(data)
    }

    pub fn read_register(&mut self, address: u32) -> Result<u32> {
        let bytes = self.read_memory(address, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write_register(&mut self, address: u32, value: u32) -> Result<()> {
        let mut command = Command::new(CommandType::WriteRegister, address);
        command.format = FORMAT_32;
        command.count = 4;
        command.data = value;
        self.command(&command)?;
        self.hab_mode()?;

        match self.read_word()? {
            WRITE_COMPLETE => {
                debug!("0x{:08x} <- 0x{:08x}", address, value);
                Ok(())
            }
            value => Err(Error::UnexpectedResponse {
                what: "write register",
                value,
            }),
        }
    }

    /// `WRITE_FILE`: store `data` at `address`.
    pub fn write_file(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let mut command = Command::new(CommandType::WriteFile, address);
        command.count = data.len() as u32;
        self.command(&command)?;

        let pb = ProgressBar::new(data.len() as u64);
        pb.set_style(ProgressStyle::default_bar()
            .template("[SDP] ⏩ Loading [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .progress_chars("=>-"));

        let mut packet = vec![0u8; self.max_packet()];
        for chunk in data.chunks(packet.len()) {
            let packet = &mut packet[..chunk.len()];
            packet.copy_from_slice(chunk);
            self.send(Report::Data, packet)?;
            pb.inc(chunk.len() as u64);
        }
        pb.finish_with_message("[SDP] Image loaded");

        self.hab_mode()?;
        match self.read_word()? {
            FILE_COMPLETE => Ok(()),
            value => Err(Error::UnexpectedResponse {
                what: "write file",
                value,
            }),
        }
    }

    /// `JUMP_ADDRESS`: start the image whose IVT is at `address`.
    ///
    /// A successful jump leaves the ROM, so nothing but the HAB mode comes
    /// back.
    pub fn jump(&mut self, address: u32) -> Result<()> {
        self.command(&Command::new(CommandType::JumpAddress, address))?;
        let hab = self.hab_mode()?;
        info!("jumping to 0x{:08x} (HAB {:?})", address, hab);
        Ok(())
    }

    /// Read back `expected` from `address` and compare.
    pub fn verify(&mut self, address: u32, expected: &[u8]) -> Result<()> {
        for (index, chunk) in expected.chunks(VERIFY_CHUNK).enumerate() {
            let chunk_address = address.wrapping_add((index * VERIFY_CHUNK) as u32);
            let actual = self.read_memory(chunk_address, chunk.len())?;
            if let Some(position) = actual.iter().zip(chunk).position(|(a, b)| a != b) {
                return Err(Error::Verify {
                    address: chunk_address.wrapping_add(position as u32),
                });
            }
        }
        info!("verified {} byte(s) at 0x{:08x}", expected.len(), address);
        Ok(())
    }

    fn command(&mut self, command: &Command) -> Result<()> {
        trace!("{:?}", command);
        let mut packet = command.encode();
        self.send(Report::Command, &mut packet)
    }

    /// Write all of `bytes`, resuming after short writes.
    fn send(&mut self, report: Report, bytes: &mut [u8]) -> Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            let count = self.transfer(report, &mut bytes[written..], 0)?;
            if count == 0 {
                return Err(Error::ShortWrite {
                    written,
                    expected: bytes.len(),
                });
            }
            written += count;
        }
        Ok(())
    }

    fn read_word(&mut self) -> Result<u32> {
        let mut word = [0u8; 4];
        self.transfer(Report::Status, &mut word, 4)?;
        Ok(u32::from_le_bytes(word))
    }

    fn hab_mode(&mut self) -> Result<HabMode> {
        let mut word = [0u8; 4];
        self.transfer(Report::HabMode, &mut word, 4)?;
        HabMode::from_word(u32::from_le_bytes(word))
    }
}

impl<T: Transfer> BootCommands for Device<T> {
    fn status(&mut self) -> Result<u32> {
        self.error_status()
    }

    fn write_memory(&mut self, mem: &MemWork) -> Result<()> {
        match mem.op {
            MemOp::Read => {
                let value = self.read_register(mem.address)?;
                info!("mem read 0x{:08x} = 0x{:08x}", mem.address, value);
                Ok(())
            }
            MemOp::Write => self.write_register(mem.address, mem.value),
            MemOp::SetBits => {
                let value = self.read_register(mem.address)?;
                self.write_register(mem.address, value | mem.value)
            }
            MemOp::ClearBits => {
                let value = self.read_register(mem.address)?;
                self.write_register(mem.address, value & !mem.value)
            }
        }
    }

    fn download(&mut self, item: &WorkItem, verify: bool) -> Result<()> {
        let path = match &item.file {
            Some(path) => path,
            None => return Ok(()),
        };
        let image = fs::read(path).map_err(|source| Error::Image {
            path: path.clone(),
            source,
        })?;

        let header = find_ivt(&image);
        if item.jump == JumpMode::Header && header.is_none() {
            return Err(Error::NoImageHeader(path.clone()));
        }
        let load = match (item.load, header) {
            (Some(load), _) => load,
            (None, Some((offset, ivt))) => ivt.self_address.wrapping_sub(offset as u32),
            (None, None) => return Err(Error::NoLoadAddress(path.clone())),
        };
        let size = match (item.size, header) {
            (Some(size), _) => size,
            (None, Some((offset, ivt))) => ivt
                .boot_data_in(&image, offset)
                .map_or(image.len(), |boot| image_length(&boot, load)),
            (None, None) => image.len(),
        };
        let size = size.min(image.len());
        let image = &image[..size];

        info!(
            "loading {} ({} bytes) at 0x{:08x}",
            path.display(),
            size,
            load
        );
        self.write_file(load, image)?;

        if verify {
            self.verify(load, image)?;
        }

        match item.jump {
            JumpMode::None => Ok(()),
            JumpMode::Header => {
                let (offset, _) = header.ok_or_else(|| Error::NoImageHeader(path.clone()))?;
                self.jump(load.wrapping_add(offset as u32))
            }
            JumpMode::Address(address) => self.jump(address),
        }
    }
}

/// Bytes of the file covered by the boot data once the file is loaded at
/// `load`.
fn image_length(boot: &BootData, load: u32) -> usize {
    let end = boot.start.wrapping_add(boot.length);
    end.saturating_sub(load) as usize
}
