//! Settings related to the serial download session.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values. The line speed and read timeout are
//! fixed by the boot ROM and are therefore not part of the settings.

pub use serialport::FlowControl;

/// Consecutive empty reads tolerated before a transfer is declared stalled.
/// With the 0.5s read timeout this is roughly ten seconds of silence.
pub const DEFAULT_STALL_READS: u32 = 20;

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings of a serial download session and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The type of signalling to use for controlling data transfer. Vybrid
    /// parts require RTS/CTS, hence `Hardware` by default.
    pub flow_control: FlowControl,
    /// Read back every downloaded image and compare it with the file.
    pub verify: bool,
    /// The work file describing the target and its default work chain.
    pub work_file: Option<String>,
    /// How many consecutive reads may come back empty before the transfer is
    /// abandoned.
    pub stall_reads: u32,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```
/// use sdpcom::SettingsBuilder;
///
/// let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
/// assert_eq!(settings.path.as_deref(), Some("/dev/ttyUSB0"));
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                flow_control: FlowControl::Hardware,
                verify: false,
                work_file: None,
                stall_reads: DEFAULT_STALL_READS,
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Turn RTS/CTS hardware flow control on or off
    pub fn use_flow_control(mut self, enabled: bool) -> Self {
        self.settings.flow_control = if enabled {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };
        self
    }

    /// Request a read back of downloaded images
    pub fn verify(mut self, verify: bool) -> Self {
        self.settings.verify = verify;
        self
    }

    /// Set the work file name or path
    pub fn work_file<'a>(mut self, work_file: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.work_file = Some(work_file.into().as_ref().to_owned());
        self
    }

    /// Set the number of consecutive empty reads tolerated on the line
    pub fn stall_reads(mut self, stall_reads: u32) -> Self {
        self.settings.stall_reads = stall_reads.max(1);
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            path: None,
            flow_control: FlowControl::Hardware,
            verify: false,
            work_file: None,
            stall_reads: DEFAULT_STALL_READS,
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn no_flow_control() {
    let settings = SettingsBuilder::new().use_flow_control(false).finalize();
    assert_eq!(settings.flow_control, FlowControl::None);
}

#[test]
fn flow_control_back_on() {
    let settings = SettingsBuilder::new()
        .use_flow_control(false)
        .use_flow_control(true)
        .finalize();
    assert_eq!(settings.flow_control, FlowControl::Hardware);
}

#[test]
fn verify() {
    let settings = SettingsBuilder::new().verify(true).finalize();
    assert!(settings.verify);
}

#[test]
fn work_file() {
    let settings = SettingsBuilder::new()
        .work_file("vybrid_usb_work.conf")
        .finalize();
    assert_eq!(settings.work_file.unwrap(), "vybrid_usb_work.conf");
}

#[test]
fn stall_reads_never_zero() {
    let settings = SettingsBuilder::new().stall_reads(0).finalize();
    assert_eq!(settings.stall_reads, 1);
}
