//! Coordinator firmware-update supervisor
//!
//! Drives the external flasher process through an explicit state machine.
//! Serial-port access and the flasher itself are injected traits so the
//! machine is testable without hardware. The update never auto-retries;
//! a failed run returns to idle and waits for the next API trigger.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{NetError, Result};

/// Firmware versions below this are offered an update.
pub const MIN_FIRMWARE_VERSION: u32 = 0x26780700;

/// Seconds the user has to confirm before the offer expires.
const CONFIRM_TIMEOUT_SECS: u32 = 120;

/// Extension of coordinator firmware images.
const FIRMWARE_EXT: &str = "gcf";

/// One detected serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path, e.g. `/dev/ttyACM0`
    pub path: String,
    /// Vendor string reported by the USB descriptor
    pub vendor: String,
}

/// Serial-port enumeration as seen by the supervisor.
pub trait PortScanner: Send {
    /// All candidate coordinator ports.
    fn scan(&self) -> Vec<PortInfo>;
    /// True when nothing holds the port open.
    fn is_free(&self, path: &str) -> bool;
}

/// Progress of the external flasher process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlasherStatus {
    /// No process running
    Idle,
    /// Running; carries stdout lines produced since the last poll
    Running(Vec<String>),
    /// Process exited
    Finished {
        success: bool,
        output: Vec<String>,
    },
}

/// The external flasher process.
pub trait Flasher: Send {
    fn start(&mut self, port: &str, file: &Path) -> Result<()>;
    fn poll(&mut self) -> FlasherStatus;
}

/// States of the update supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareState {
    Idle,
    CheckDevices,
    CheckVersion,
    WaitUserConfirm,
    DisconnectDevice,
    Update,
    UpdateWaitFinished,
}

/// Actions the caller must perform after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareAction {
    /// Read the coordinator firmware version and report it back
    ReadVersion,
    /// An update is staged and waits for user confirmation
    UpdateReady,
}

/// The supervisor. One per gateway process.
pub struct FirmwareUpdate<S: PortScanner, F: Flasher> {
    state: FirmwareState,
    scanner: S,
    flasher: F,
    firmware_dir: PathBuf,
    port: Option<PortInfo>,
    update_file: Option<PathBuf>,
    cached_version: Option<u32>,
    confirm_secs: u32,
}

impl<S: PortScanner, F: Flasher> FirmwareUpdate<S, F> {
    pub fn new(scanner: S, flasher: F, firmware_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: FirmwareState::Idle,
            scanner,
            flasher,
            firmware_dir: firmware_dir.into(),
            port: None,
            update_file: None,
            cached_version: None,
            confirm_secs: 0,
        }
    }

    pub fn state(&self) -> FirmwareState {
        self.state
    }

    /// Version read in the last check, cleared after a flash run.
    pub fn cached_version(&self) -> Option<u32> {
        self.cached_version
    }

    /// True while the machine waits for the user's go-ahead.
    pub fn update_ready(&self) -> bool {
        self.state == FirmwareState::WaitUserConfirm
    }

    /// Begin a check run.
    pub fn start_check(&mut self) -> Result<()> {
        if self.state != FirmwareState::Idle {
            return Err(NetError::Busy(state_name(self.state)));
        }
        self.state = FirmwareState::CheckDevices;
        Ok(())
    }

    /// API confirmation while an update is staged.
    pub fn start_update(&mut self) -> Result<()> {
        if self.state != FirmwareState::WaitUserConfirm {
            return Err(NetError::Busy(state_name(self.state)));
        }
        info!("firmware update confirmed by user");
        self.state = FirmwareState::DisconnectDevice;
        Ok(())
    }

    /// Host reports the coordinator version; `None` means bootloader-only
    /// (factory fresh), which auto-advances without confirmation.
    pub fn version_read(&mut self, version: Option<u32>) -> Vec<FirmwareAction> {
        if self.state != FirmwareState::CheckVersion {
            return Vec::new();
        }
        self.cached_version = version;
        self.update_file = self.find_update_file();

        match (version, &self.update_file) {
            (None, Some(_)) => {
                info!("factory-fresh coordinator, flashing without confirmation");
                self.state = FirmwareState::DisconnectDevice;
                Vec::new()
            }
            (Some(v), Some(file)) if v < MIN_FIRMWARE_VERSION => {
                info!(
                    "firmware 0x{:08X} below minimum, update {} staged",
                    v,
                    file.display()
                );
                self.state = FirmwareState::WaitUserConfirm;
                self.confirm_secs = 0;
                vec![FirmwareAction::UpdateReady]
            }
            _ => {
                self.state = FirmwareState::Idle;
                Vec::new()
            }
        }
    }

    /// One-second tick.
    pub fn tick(&mut self) -> Vec<FirmwareAction> {
        match self.state {
            FirmwareState::Idle => Vec::new(),

            FirmwareState::CheckDevices => {
                let ports = self.scanner.scan();
                match ports.into_iter().next() {
                    Some(port) => {
                        info!("coordinator candidate {} ({})", port.path, port.vendor);
                        self.port = Some(port);
                        self.state = FirmwareState::CheckVersion;
                        vec![FirmwareAction::ReadVersion]
                    }
                    None => {
                        self.state = FirmwareState::Idle;
                        Vec::new()
                    }
                }
            }

            // Waiting for version_read().
            FirmwareState::CheckVersion => Vec::new(),

            FirmwareState::WaitUserConfirm => {
                self.confirm_secs += 1;
                if self.confirm_secs >= CONFIRM_TIMEOUT_SECS {
                    info!("firmware update offer expired");
                    self.state = FirmwareState::Idle;
                }
                Vec::new()
            }

            FirmwareState::DisconnectDevice => {
                let released = self
                    .port
                    .as_ref()
                    .map(|p| self.scanner.is_free(&p.path))
                    .unwrap_or(false);
                if released {
                    self.state = FirmwareState::Update;
                }
                Vec::new()
            }

            FirmwareState::Update => {
                let (Some(port), Some(file)) = (self.port.clone(), self.update_file.clone())
                else {
                    self.state = FirmwareState::Idle;
                    return Vec::new();
                };
                match self.flasher.start(&port.path, &file) {
                    Ok(()) => self.state = FirmwareState::UpdateWaitFinished,
                    Err(e) => {
                        warn!("flasher failed to start: {}", e);
                        self.state = FirmwareState::Idle;
                    }
                }
                Vec::new()
            }

            FirmwareState::UpdateWaitFinished => {
                match self.flasher.poll() {
                    FlasherStatus::Running(lines) => {
                        for line in lines {
                            info!("flasher: {}", line);
                        }
                    }
                    FlasherStatus::Finished { success, output } => {
                        for line in output {
                            info!("flasher: {}", line);
                        }
                        if !success {
                            warn!("flasher exited with failure");
                        }
                        // Force a fresh version read on the next check.
                        self.cached_version = None;
                        self.state = FirmwareState::Idle;
                    }
                    FlasherStatus::Idle => {
                        self.state = FirmwareState::Idle;
                    }
                }
                Vec::new()
            }
        }
    }

    /// Highest-named firmware image in the firmware directory.
    fn find_update_file(&self) -> Option<PathBuf> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(&self.firmware_dir)
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case(FIRMWARE_EXT))
                    .unwrap_or(false)
            })
            .collect();
        candidates.sort();
        candidates.pop()
    }
}

fn state_name(state: FirmwareState) -> &'static str {
    match state {
        FirmwareState::Idle => "idle",
        FirmwareState::CheckDevices => "check-devices",
        FirmwareState::CheckVersion => "check-version",
        FirmwareState::WaitUserConfirm => "wait-user-confirm",
        FirmwareState::DisconnectDevice => "disconnect-device",
        FirmwareState::Update => "update",
        FirmwareState::UpdateWaitFinished => "update-wait-finished",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct MockScanner {
        ports: Vec<PortInfo>,
        free: RefCell<bool>,
    }

    impl PortScanner for MockScanner {
        fn scan(&self) -> Vec<PortInfo> {
            self.ports.clone()
        }
        fn is_free(&self, _path: &str) -> bool {
            *self.free.borrow()
        }
    }

    #[derive(Default)]
    struct MockFlasher {
        started: bool,
        polls: u8,
    }

    impl Flasher for MockFlasher {
        fn start(&mut self, _port: &str, _file: &Path) -> Result<()> {
            self.started = true;
            Ok(())
        }
        fn poll(&mut self) -> FlasherStatus {
            self.polls += 1;
            if self.polls < 3 {
                FlasherStatus::Running(vec!["writing page".into()])
            } else {
                FlasherStatus::Finished { success: true, output: vec!["done".into()] }
            }
        }
    }

    fn supervisor(dir: &Path) -> FirmwareUpdate<MockScanner, MockFlasher> {
        let scanner = MockScanner {
            ports: vec![PortInfo { path: "/dev/ttyACM0".into(), vendor: "dresden elektronik".into() }],
            free: RefCell::new(true),
        };
        FirmwareUpdate::new(scanner, MockFlasher::default(), dir)
    }

    fn with_firmware_dir() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("coordinator_0x26780700.bin.gcf"), b"image").unwrap();
        dir
    }

    #[test]
    fn test_full_update_run() {
        let dir = with_firmware_dir();
        let mut fw = supervisor(dir.path());
        fw.start_check().unwrap();
        assert_eq!(fw.tick(), vec![FirmwareAction::ReadVersion]);

        let actions = fw.version_read(Some(0x26100500));
        assert_eq!(actions, vec![FirmwareAction::UpdateReady]);
        assert!(fw.update_ready());

        fw.start_update().unwrap();
        fw.tick(); // port released -> Update
        fw.tick(); // spawn flasher -> UpdateWaitFinished
        assert_eq!(fw.state(), FirmwareState::UpdateWaitFinished);
        for _ in 0..3 {
            fw.tick();
        }
        assert_eq!(fw.state(), FirmwareState::Idle);
        assert_eq!(fw.cached_version(), None);
    }

    #[test]
    fn test_up_to_date_returns_idle() {
        let dir = with_firmware_dir();
        let mut fw = supervisor(dir.path());
        fw.start_check().unwrap();
        fw.tick();
        assert!(fw.version_read(Some(MIN_FIRMWARE_VERSION)).is_empty());
        assert_eq!(fw.state(), FirmwareState::Idle);
    }

    #[test]
    fn test_factory_fresh_auto_advances() {
        let dir = with_firmware_dir();
        let mut fw = supervisor(dir.path());
        fw.start_check().unwrap();
        fw.tick();
        fw.version_read(None);
        assert_eq!(fw.state(), FirmwareState::DisconnectDevice);
    }

    #[test]
    fn test_confirm_window_expires() {
        let dir = with_firmware_dir();
        let mut fw = supervisor(dir.path());
        fw.start_check().unwrap();
        fw.tick();
        fw.version_read(Some(1));
        for _ in 0..120 {
            fw.tick();
        }
        assert_eq!(fw.state(), FirmwareState::Idle);
        assert!(fw.start_update().is_err());
    }

    #[test]
    fn test_no_update_file_returns_idle() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut fw = supervisor(dir.path());
        fw.start_check().unwrap();
        fw.tick();
        fw.version_read(Some(1));
        assert_eq!(fw.state(), FirmwareState::Idle);
    }
}
