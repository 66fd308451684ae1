//! Serial-port scanning and the external flasher process
//!
//! Concrete [`PortScanner`] and [`Flasher`] implementations for the
//! firmware-update supervisor. The flasher is an external binary; its
//! stdout is collected after exit so polling never blocks the tick.

use std::fs::OpenOptions;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use hive_net::{Flasher, FlasherStatus, NetError, PortInfo, PortScanner};

const PORT_PATTERNS: &[&str] = &["/dev/ttyACM*", "/dev/ttyUSB*"];

/// Scans `/dev` for candidate coordinator ports.
#[derive(Debug, Default)]
pub struct DevPortScanner;

impl PortScanner for DevPortScanner {
    fn scan(&self) -> Vec<PortInfo> {
        let mut ports = Vec::new();
        for pattern in PORT_PATTERNS {
            let Ok(paths) = glob::glob(pattern) else {
                continue;
            };
            for path in paths.flatten() {
                ports.push(PortInfo {
                    path: path.display().to_string(),
                    vendor: usb_vendor(&path).unwrap_or_else(|| "unknown".to_string()),
                });
            }
        }
        ports
    }

    fn is_free(&self, path: &str) -> bool {
        // Exclusive open fails while another process holds the port.
        OpenOptions::new().read(true).write(true).open(path).is_ok()
    }
}

/// Vendor string from the sysfs manufacturer attribute, when present.
fn usb_vendor(dev_path: &Path) -> Option<String> {
    let name = dev_path.file_name()?.to_str()?;
    let sysfs = Path::new("/sys/class/tty").join(name).join("device/../manufacturer");
    let vendor = std::fs::read_to_string(sysfs).ok()?;
    let vendor = vendor.trim();
    (!vendor.is_empty()).then(|| vendor.to_string())
}

/// Runs the external GCF flasher binary and tracks its lifetime.
pub struct GcfFlasher {
    program: String,
    child: Option<Child>,
}

impl GcfFlasher {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), child: None }
    }
}

impl Flasher for GcfFlasher {
    fn start(&mut self, port: &str, file: &Path) -> hive_net::Result<()> {
        if self.child.is_some() {
            return Err(NetError::Busy("flasher"));
        }
        debug!("starting {} for {} on {}", self.program, file.display(), port);
        let child = Command::new(&self.program)
            .arg("-d")
            .arg(port)
            .arg("-f")
            .arg(file)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| NetError::FlasherFailed(e.to_string()))?;
        self.child = Some(child);
        Ok(())
    }

    fn poll(&mut self) -> FlasherStatus {
        let Some(child) = self.child.as_mut() else {
            return FlasherStatus::Idle;
        };
        match child.try_wait() {
            Ok(None) => FlasherStatus::Running(Vec::new()),
            Ok(Some(status)) => {
                let mut child = self.child.take().expect("checked above");
                let mut output = String::new();
                if let Some(stdout) = child.stdout.as_mut() {
                    let _ = stdout.read_to_string(&mut output);
                }
                FlasherStatus::Finished {
                    success: status.success(),
                    output: output.lines().map(str::to_string).collect(),
                }
            }
            Err(e) => {
                warn!("flasher wait failed: {}", e);
                self.child = None;
                FlasherStatus::Finished { success: false, output: Vec::new() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_without_child_is_idle() {
        let mut flasher = GcfFlasher::new("/nonexistent/flasher");
        assert_eq!(flasher.poll(), FlasherStatus::Idle);
    }

    #[test]
    fn test_start_missing_binary_fails() {
        let mut flasher = GcfFlasher::new("/nonexistent/flasher");
        let err = flasher.start("/dev/null", Path::new("/tmp/fw.gcf")).unwrap_err();
        assert!(matches!(err, NetError::FlasherFailed(_)));
    }
}
