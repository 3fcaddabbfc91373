//! QEMU invocation for the rescue VM.
//!
//! Pure string assembly: nothing here checks that the binary, firmware or
//! block devices actually exist on the remote host.

use shell_escape::unix::escape;

/// Binary launched on the remote host.
pub const QEMU_BINARY: &str = "qemu-system-x86_64";

/// VNC display the VM exports. Display `:1` listens on TCP 5901, the
/// default remote end of the tunnel.
pub const VNC_DISPLAY: &str = "127.0.0.1:1";

/// OVMF firmware shipped by the `ovmf` package.
pub const OVMF_FIRMWARE: &str = "/usr/share/ovmf/OVMF.fd";

/// Boot firmware mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firmware {
    /// SeaBIOS, QEMU's default.
    Legacy,
    /// OVMF.
    Uefi,
}

impl Firmware {
    #[must_use]
    pub fn from_uefi_flag(use_uefi: bool) -> Self {
        if use_uefi { Self::Uefi } else { Self::Legacy }
    }
}

/// Resources and devices for the rescue VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuSpec {
    /// Installer image on the remote host, attached as CD-ROM.
    pub boot_image: String,
    /// vCPU count.
    pub cpus: u32,
    /// Memory size in QEMU notation (`512m`, `16g`).
    pub memory: String,
    pub firmware: Firmware,
    /// Raw block devices, attached in this order.
    pub drives: Vec<String>,
}

impl QemuSpec {
    /// Assemble the full command line.
    ///
    /// Same spec in, same string out: the result depends on nothing but
    /// `self`, and drives keep the order they were given in.
    #[must_use]
    pub fn invocation(&self) -> String {
        let mut cmd = format!(
            "{QEMU_BINARY} -enable-kvm -cdrom {} -boot d -vnc {VNC_DISPLAY} -smp {} -m {}",
            escape(self.boot_image.as_str().into()),
            self.cpus,
            escape(self.memory.as_str().into()),
        );
        if self.firmware == Firmware::Uefi {
            cmd.push_str(" -bios ");
            cmd.push_str(OVMF_FIRMWARE);
        }
        for drive in &self.drives {
            cmd.push_str(" -drive ");
            cmd.push_str(&escape(drive_option(drive).into()));
        }
        cmd
    }
}

/// `-drive` option value for one raw disk. Commas inside the path are
/// doubled, which is how QEMU escapes them in option strings.
fn drive_option(path: &str) -> String {
    format!("file={},format=raw,media=disk", path.replace(',', ",,"))
}
