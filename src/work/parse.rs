//! Parsers for work descriptions: command line jobs and work files.
//!
//! A work file describes one target. Blank lines and `#` comments are
//! ignored; the first line names the target and the rest is made of:
//!
//! ```text
//! vybrid
//! hid,1024,0x3f000000,512K
//! mem set_bits 0x4006b08c 0x00000040
//! u-boot.imx:plug,load 0x3f408000,jump header
//! ```
//!
//! * a transport line (`hid,...` or `bulk,...`) whose first number is the
//!   largest data packet the target accepts,
//! * `mem <read|write|set_bits|clear_bits> <address> [<value>]` directives,
//!   collected into a memory-only work item,
//! * `<file>:<modifiers>` download items, with the comma separated modifiers
//!   `plug`, `load <address>`, `size <bytes>` and `jump [header|<address>]`.

use std::{
    fs, iter,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use super::{JumpMode, MemOp, MemWork, WorkChain, WorkItem};
use crate::error::{Error, Result};

/// Where installed work files live.
pub const SYSTEM_WORK_DIR: &str = "/etc/imx-loader.d/";

/// DCD modifiers found in shared work files. This loader does not support
/// them.
const IGNORED_MODIFIERS: &[&str] = &["dcd", "clear_dcd"];

/// Parse a number written in decimal or `0x` hexadecimal, optionally followed
/// by a `K` or `M` multiplier.
pub fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    let (digits, multiplier) = match text.chars().last()? {
        'k' | 'K' => (&text[..text.len() - 1], 1024),
        'm' | 'M' => (&text[..text.len() - 1], 1024 * 1024),
        _ => (text, 1),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    value.checked_mul(multiplier)
}

/// Build a work chain from the job arguments `FILE [-lLOADADDR] [-sSIZE] ...`.
///
/// The first job is launched through its image header.
pub fn parse_jobs<S: AsRef<str>>(args: &[S]) -> Result<WorkChain> {
    let mut chain = WorkChain::default();

    for arg in args {
        let arg: &str = arg.as_ref();
        let job_error = |reason: &str| Error::Job {
            arg: arg.to_owned(),
            reason: reason.to_owned(),
        };

        if let Some(value) = arg.strip_prefix("-l") {
            let load = parse_number(value).ok_or_else(|| job_error("bad load address"))?;
            let item = chain
                .last_mut()
                .ok_or_else(|| job_error("load address given before a file"))?;
            item.load = Some(load);
        } else if let Some(value) = arg.strip_prefix("-s") {
            let size = parse_number(value).ok_or_else(|| job_error("bad size"))?;
            let item = chain
                .last_mut()
                .ok_or_else(|| job_error("size given before a file"))?;
            item.size = Some(size as usize);
        } else if arg.starts_with('-') {
            return Err(job_error("unknown job option"));
        } else {
            let mut item = WorkItem::download(arg);
            if chain.is_empty() {
                item.jump = JumpMode::Header;
            }
            chain.push(item);
        }
    }

    Ok(chain)
}

/// Locate the work file `name`.
///
/// The file is looked for in the directory given with the name or, for a bare
/// file name, next to the executable `exe`; then in [`SYSTEM_WORK_DIR`].
pub fn find_work_file(name: &str, exe: Option<&Path>) -> Result<PathBuf> {
    let given = Path::new(name);
    let file_name = given
        .file_name()
        .ok_or_else(|| Error::ConfigNotFound(name.to_owned()))?;

    let base = match given.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Some(dir.to_path_buf()),
        _ => exe.and_then(Path::parent).map(Path::to_path_buf),
    };

    base.into_iter()
        .chain(iter::once(PathBuf::from(SYSTEM_WORK_DIR)))
        .map(|dir| dir.join(file_name))
        .inspect(|candidate| debug!("looking for work file {}", candidate.display()))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| Error::ConfigNotFound(name.to_owned()))
}

/// A parsed work file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFile {
    /// Target name from the first line.
    pub name: String,
    /// Largest data packet from the transport line, if any.
    pub max_packet: Option<usize>,
    /// The default work chain of the target.
    pub work: WorkChain,
}
impl WorkFile {
    /// Read and parse the work file at `path`. Relative image names are taken
    /// relative to the work file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::WorkFile {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&text, base)
    }

    /// Parse work file `text`, resolving relative image names against `base`.
    pub fn parse(text: &str, base: &Path) -> Result<Self> {
        let mut name = None;
        let mut max_packet = None;
        let mut work = WorkChain::default();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            if name.is_none() {
                name = Some(line.to_owned());
            } else if line.starts_with("hid,") || line.starts_with("bulk,") {
                max_packet = line
                    .split(',')
                    .skip(1)
                    .find_map(parse_number)
                    .map(|n| n as usize);
            } else if let Some(rest) = line.strip_prefix("mem ") {
                let mem = parse_mem(rest, line_no)?;
                match work.last_mut() {
                    Some(item) if item.file.is_none() => item.mem.push(mem),
                    _ => work.push(WorkItem::memory(vec![mem])),
                }
            } else if let Some(colon) = line.find(':') {
                let file = line[..colon].trim();
                if file.is_empty() {
                    return Err(parse_error(line_no, "missing file name"));
                }
                let mut item = WorkItem::download(base.join(file));
                parse_modifiers(&mut item, &line[colon + 1..], line_no)?;
                work.push(item);
            } else {
                return Err(parse_error(
                    line_no,
                    &format!("cannot make sense of `{}`", line),
                ));
            }
        }

        Ok(WorkFile {
            name: name.ok_or_else(|| parse_error(0, "empty work file"))?,
            max_packet,
            work,
        })
    }
}

fn parse_error(line: usize, reason: &str) -> Error {
    Error::Parse {
        line,
        reason: reason.to_owned(),
    }
}

fn parse_mem(text: &str, line: usize) -> Result<MemWork> {
    let mut words = text.split_whitespace();
    let op = match words.next() {
        Some("read") => MemOp::Read,
        Some("write") => MemOp::Write,
        Some("set_bits") => MemOp::SetBits,
        Some("clear_bits") => MemOp::ClearBits,
        _ => return Err(parse_error(line, "unknown memory operation")),
    };
    let address = words
        .next()
        .and_then(parse_number)
        .ok_or_else(|| parse_error(line, "bad memory address"))?;
    let value = match (op, words.next()) {
        (MemOp::Read, None) => 0,
        (MemOp::Read, Some(_)) => return Err(parse_error(line, "read takes no value")),
        (_, word) => word
            .and_then(parse_number)
            .ok_or_else(|| parse_error(line, "bad memory value"))?,
    };
    Ok(MemWork { op, address, value })
}

fn parse_modifiers(item: &mut WorkItem, text: &str, line: usize) -> Result<()> {
    for modifier in text.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        let mut words = modifier.split_whitespace();
        let keyword = words.next().unwrap_or("");
        let argument = words.next();

        match (keyword, argument) {
            ("plug", None) => item.plug = true,
            ("load", Some(value)) => {
                item.load =
                    Some(parse_number(value).ok_or_else(|| parse_error(line, "bad load address"))?)
            }
            ("size", Some(value)) => {
                let size = parse_number(value).ok_or_else(|| parse_error(line, "bad size"))?;
                item.size = Some(size as usize);
            }
            ("jump", None) | ("jump", Some("header")) => item.jump = JumpMode::Header,
            ("jump", Some(value)) => {
                let address =
                    parse_number(value).ok_or_else(|| parse_error(line, "bad jump address"))?;
                item.jump = JumpMode::Address(address);
            }
            (keyword, _) if IGNORED_MODIFIERS.contains(&keyword) => {
                warn!("line {}: `{}` is not supported, ignored", line, keyword)
            }
            _ => {
                return Err(parse_error(
                    line,
                    &format!("unknown modifier `{}`", modifier),
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const VYBRID: &str = "\
# Vybrid tower
vybrid

hid,1024,0x3f000000,512K   # internal RAM
mem write 0x4006b08c 0x1
mem set_bits 0x4006b090 0x40
u-boot.imx:dcd,plug,load 0x3f408000,jump header
/srv/tftp/linux.bin:load 0x80008000,size 4M,jump 0x80800000
";

    #[test]
    fn numbers() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x3f000000"), Some(0x3f00_0000));
        assert_eq!(parse_number("0XfF"), Some(0xff));
        assert_eq!(parse_number("512K"), Some(512 * 1024));
        assert_eq!(parse_number("4m"), Some(4 * 1024 * 1024));
        assert_eq!(parse_number("8192M"), None);
        assert_eq!(parse_number("0xzz"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn first_job_jumps_through_header() {
        let chain = parse_jobs(&["u-boot.imx", "-l0x3f408000", "zImage", "-s0x100"]).unwrap();
        assert_eq!(chain.len(), 2);

        let first = chain.get(0).unwrap();
        assert_eq!(first.file, Some(PathBuf::from("u-boot.imx")));
        assert_eq!(first.jump, JumpMode::Header);
        assert_eq!(first.load, Some(0x3f40_8000));

        let second = chain.get(1).unwrap();
        assert_eq!(second.jump, JumpMode::None);
        assert_eq!(second.size, Some(0x100));
    }

    #[test]
    fn job_options_need_a_file() {
        assert!(matches!(
            parse_jobs(&["-l0x1000"]),
            Err(Error::Job { .. })
        ));
        assert!(matches!(
            parse_jobs(&["a.imx", "-x"]),
            Err(Error::Job { .. })
        ));
        assert!(parse_jobs::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn vybrid_work_file() {
        let file = WorkFile::parse(VYBRID, Path::new("/etc/imx-loader.d")).unwrap();
        assert_eq!(file.name, "vybrid");
        assert_eq!(file.max_packet, Some(1024));
        assert_eq!(file.work.len(), 3);

        let mem = file.work.get(0).unwrap();
        assert_eq!(mem.file, None);
        assert_eq!(
            mem.mem,
            vec![
                MemWork {
                    op: MemOp::Write,
                    address: 0x4006_b08c,
                    value: 1
                },
                MemWork {
                    op: MemOp::SetBits,
                    address: 0x4006_b090,
                    value: 0x40
                },
            ]
        );

        let uboot = file.work.get(1).unwrap();
        assert_eq!(
            uboot.file,
            Some(PathBuf::from("/etc/imx-loader.d/u-boot.imx"))
        );
        assert!(uboot.plug);
        assert_eq!(uboot.load, Some(0x3f40_8000));
        assert_eq!(uboot.jump, JumpMode::Header);

        let linux = file.work.get(2).unwrap();
        assert_eq!(linux.file, Some(PathBuf::from("/srv/tftp/linux.bin")));
        assert!(!linux.plug);
        assert_eq!(linux.size, Some(4 * 1024 * 1024));
        assert_eq!(linux.jump, JumpMode::Address(0x8080_0000));
    }

    #[test]
    fn work_file_errors_carry_the_line() {
        let text = "target\nu-boot.imx:explode\n";
        assert!(matches!(
            WorkFile::parse(text, Path::new("")),
            Err(Error::Parse { line: 2, .. })
        ));

        let text = "target\n\nmem poke 0x0 0x0\n";
        assert!(matches!(
            WorkFile::parse(text, Path::new("")),
            Err(Error::Parse { line: 3, .. })
        ));

        assert!(matches!(
            WorkFile::parse("# nothing\n", Path::new("")),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn memory_read_takes_no_value() {
        let file = WorkFile::parse("t\nmem read 0x20\n", Path::new("")).unwrap();
        assert_eq!(file.work.get(0).unwrap().mem[0].op, MemOp::Read);
        assert!(WorkFile::parse("t\nmem read 0x20 0x1\n", Path::new("")).is_err());
        assert!(WorkFile::parse("t\nmem write 0x20\n", Path::new("")).is_err());
    }

    #[test]
    fn work_file_lookup() {
        let dir = env::temp_dir().join(format!("sdpcom-lookup-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let conf = dir.join("board.conf");
        fs::write(&conf, "board\n").unwrap();
        let exe = dir.join("sdpcom");

        assert_eq!(find_work_file("board.conf", Some(exe.as_path())).unwrap(), conf);
        assert_eq!(
            find_work_file(conf.to_str().unwrap(), None).unwrap(),
            conf
        );
        assert!(matches!(
            find_work_file("missing-board.conf", Some(exe.as_path())),
            Err(Error::ConfigNotFound(_))
        ));

        let loaded = WorkFile::load(&conf).unwrap();
        assert_eq!(loaded.name, "board");
        assert!(loaded.work.is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }
}
