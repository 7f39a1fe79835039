//! A complete serial download session: from work file lookup to the last item.

use std::path::Path;

use console::style;
use log::{debug, info};

use crate::{
    error::{Error, Result},
    sdp::BootCommands,
    sequencer::Sequencer,
    settings::Settings,
    transport::{uart::open_channel, Device},
    work::{find_work_file, WorkChain, WorkFile},
};

/// Run a download session as described by `settings`.
///
/// The work file is looked up next to `exe` (usually the running executable)
/// and in the system directory. `jobs` from the command line replace the work
/// file's own chain when not empty.
pub fn load(settings: &Settings, jobs: WorkChain, exe: Option<&Path>) -> Result<()> {
    let name = settings
        .work_file
        .as_deref()
        .ok_or_else(|| Error::ConfigNotFound(String::from("<none>")))?;
    let path = find_work_file(name, exe)?;
    let work_file = WorkFile::load(&path)?;
    println!(
        "[SDP] {} {} ({})",
        style("target").cyan(),
        style(&work_file.name).bold(),
        path.display()
    );

    let mut chain = WorkChain::resolve(jobs, work_file.work);
    debug!("{:#?}", chain);

    let channel = open_channel(settings)?;
    let mut device = Device::new(channel);
    if let Some(max_packet) = work_file.max_packet {
        device = device.with_max_packet(max_packet);
    }

    run_session(settings, &mut device, &mut chain)
}

/// Query the device status once, then run `chain` to completion.
pub fn run_session<C: BootCommands>(
    settings: &Settings,
    commands: &mut C,
    chain: &mut WorkChain,
) -> Result<()> {
    let status = commands
        .status()
        .map_err(|e| Error::Status(Box::new(e)))?;
    info!("device status: 0x{:08x}", status);

    Sequencer::new(settings.clone(), commands, chain).run()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        transport::Report,
        work::{MemWork, WorkItem},
        SettingsBuilder,
    };

    struct Rom {
        answers: bool,
        calls: Vec<&'static str>,
    }
    impl BootCommands for Rom {
        fn status(&mut self) -> Result<u32> {
            self.calls.push("status");
            if self.answers {
                Ok(0xf0f0_f0f0)
            } else {
                Err(Error::Stalled {
                    report: Report::Status,
                    transferred: 0,
                    expected: 4,
                })
            }
        }
        fn write_memory(&mut self, _mem: &MemWork) -> Result<()> {
            self.calls.push("mem");
            Ok(())
        }
        fn download(&mut self, _item: &WorkItem, _verify: bool) -> Result<()> {
            self.calls.push("download");
            Ok(())
        }
    }

    #[test]
    fn status_comes_before_the_first_item() {
        let settings = SettingsBuilder::new().finalize();
        let mut rom = Rom {
            answers: true,
            calls: vec![],
        };
        let mut chain = WorkChain::from(vec![WorkItem::download("u-boot.imx")]);

        assert!(run_session(&settings, &mut rom, &mut chain).is_ok());
        assert_eq!(rom.calls, vec!["status", "download", "status"]);
    }

    #[test]
    fn silent_device_stops_the_session() {
        let settings = SettingsBuilder::new().finalize();
        let mut rom = Rom {
            answers: false,
            calls: vec![],
        };
        let mut chain = WorkChain::from(vec![WorkItem::download("u-boot.imx")]);

        assert!(matches!(
            run_session(&settings, &mut rom, &mut chain),
            Err(Error::Status(_))
        ));
        assert_eq!(rom.calls, vec!["status"]);
    }

    #[test]
    fn load_needs_a_work_file() {
        let settings = SettingsBuilder::new().path("/dev/null").finalize();
        assert!(matches!(
            load(&settings, WorkChain::default(), None),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn load_reports_a_missing_work_file() {
        let settings = SettingsBuilder::new()
            .path("/dev/null")
            .work_file("no-such-board-sdpcom.conf")
            .finalize();
        assert!(matches!(
            load(&settings, WorkChain::default(), None),
            Err(Error::ConfigNotFound(_))
        ));
    }
}
