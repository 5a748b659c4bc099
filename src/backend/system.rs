// Production DeviceCommands implementation.
//
// Shells out to the usual fleet of block-device tools (hdparm, sg_sanitize,
// sg_format, nvme, blkdiscard, sedutil-cli, blockdev) and translates each
// tool's exit status and stderr chatter into the raw status codes of this
// backend family. No normalization happens here; that is normalize.rs's job.

use super::{
    AtaStatus, BackendError, BackendResult, BackendStatus, Device, DeviceCommands, Interface,
    NvmeStatus, OsStatus, RawCapabilities, SanitizeOperation, ScsiStatus, SupportBit, TcgStatus,
};
use crate::{
    is_interrupted, EraseMethod, NvmFormatOptions, ProgressMode, WriteAfterEraseRequirement,
};
use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct SystemCommands {
    // Exclusive OS locks held for reset-sensitive operations; keyed by
    // device path, dropped (and thus released) on unlock.
    locks: Mutex<HashMap<String, File>>,
}

impl SystemCommands {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn tool_output(tool: &str, args: &[&str]) -> BackendResult<std::process::Output> {
        Command::new(tool)
            .args(args)
            .output()
            .map_err(|e| BackendError(format!("{} invocation failed: {}", tool, e)))
    }

    fn identify_text(device: &Device) -> Option<String> {
        let output = Command::new("hdparm").args(["-I", &device.path]).output().ok()?;
        Some(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn nvme_id_ctrl_text(device: &Device) -> Option<String> {
        let output = Command::new("nvme")
            .args(["id-ctrl", &device.path])
            .output()
            .ok()?;
        if output.status.success() {
            Some(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            None
        }
    }

    fn detect_interface(path: &str) -> Interface {
        if path.contains("nvme") {
            Interface::Nvme
        } else if path.contains("/dev/sd") {
            Interface::Scsi
        } else {
            Interface::Ata
        }
    }

    fn blockdev_u64(path: &str, flag: &str) -> BackendResult<u64> {
        let output = Self::tool_output("blockdev", &[flag, path])?;
        if !output.status.success() {
            return Err(BackendError(format!(
                "blockdev {} failed: {}",
                flag,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        text.parse::<u64>()
            .map_err(|e| BackendError(format!("blockdev {} returned '{}': {}", flag, text, e)))
    }

    fn model_and_serial(path: &str) -> (String, String) {
        let mut model = "Unknown".to_string();
        let mut serial = "Unknown".to_string();
        if let Ok(output) = Command::new("smartctl").args(["-i", path]).output() {
            let text = String::from_utf8_lossy(&output.stdout).to_string();
            for line in text.lines() {
                if line.contains("Device Model:") || line.contains("Model Number:") {
                    if let Some(v) = line.split(':').nth(1) {
                        model = v.trim().to_string();
                    }
                } else if line.contains("Serial Number:") {
                    if let Some(v) = line.split(':').nth(1) {
                        serial = v.trim().to_string();
                    }
                }
            }
        }
        (model, serial)
    }

    /// Drive-declared full-surface overwrite estimate from the IDENTIFY
    /// security section ("ERASE UNIT" minutes).
    fn parse_overwrite_estimate(identify: &str) -> Option<Duration> {
        let re = Regex::new(r"(\d+)\s*min(?:utes)?\s+for\s+SECURITY\s+ERASE\s+UNIT").ok()?;
        let caps = re.captures(identify)?;
        let minutes: u64 = caps.get(1)?.as_str().parse().ok()?;
        Some(Duration::from_secs(minutes * 60))
    }

    fn tcg_support_bit(device: &Device) -> SupportBit {
        match Command::new("sedutil-cli")
            .args(["--isValidSED", &device.path])
            .output()
        {
            Ok(output) if output.status.success() => SupportBit::Supported,
            Ok(_) => SupportBit::Unsupported,
            Err(_) => SupportBit::Unreadable,
        }
    }

    fn ata_capabilities(device: &Device) -> RawCapabilities {
        let identify = Self::identify_text(device);
        let bit = |needle: &str| match &identify {
            Some(text) if text.contains(needle) => SupportBit::Supported,
            Some(_) => SupportBit::Unsupported,
            None => SupportBit::Unreadable,
        };

        let tcg = Self::tcg_support_bit(device);
        let security = bit("Security Mode feature set");
        let enhanced = bit("enhanced erase");
        let trim = bit("Data Set Management TRIM supported");

        // Firmware-declared priority order: instant cryptographic paths
        // first, then firmware erases, then host-driven fallbacks.
        let methods_in_priority_order = vec![
            (EraseMethod::TcgRevert, tcg),
            (EraseMethod::TcgRevertSp, tcg),
            (EraseMethod::SanitizeCryptoErase, bit("CRYPTO SCRAMBLE EXT")),
            (EraseMethod::SanitizeBlockErase, bit("BLOCK ERASE EXT")),
            (EraseMethod::AtaSecurityEraseEnhanced, enhanced),
            (EraseMethod::AtaSecurityEraseNormal, security),
            (EraseMethod::SanitizeOverwriteErase, bit("OVERWRITE EXT")),
            (EraseMethod::TrimUnmap, trim),
            (EraseMethod::WriteSame, bit("SCT Write Same")),
            (EraseMethod::HostOverwrite, SupportBit::Supported),
        ];

        RawCapabilities {
            methods_in_priority_order,
            overwrite_estimate: identify.as_deref().and_then(Self::parse_overwrite_estimate),
        }
    }

    fn nvme_capabilities(device: &Device) -> RawCapabilities {
        let id_ctrl = Self::nvme_id_ctrl_text(device);
        let sanicap: u32 = id_ctrl
            .as_deref()
            .and_then(|text| {
                let re = Regex::new(r"sanicap\s*:\s*(0x[0-9a-fA-F]+|\d+)").ok()?;
                let raw = re.captures(text)?.get(1)?.as_str().to_string();
                if let Some(hex) = raw.strip_prefix("0x") {
                    u32::from_str_radix(hex, 16).ok()
                } else {
                    raw.parse().ok()
                }
            })
            .unwrap_or(0);
        let fna_present = id_ctrl
            .as_deref()
            .map(|t| t.contains("fna"))
            .unwrap_or(false);

        let bit = |supported: bool| {
            if id_ctrl.is_none() {
                SupportBit::Unreadable
            } else if supported {
                SupportBit::Supported
            } else {
                SupportBit::Unsupported
            }
        };

        let tcg = Self::tcg_support_bit(device);
        let methods_in_priority_order = vec![
            (EraseMethod::TcgRevert, tcg),
            (EraseMethod::TcgRevertSp, tcg),
            (EraseMethod::SanitizeCryptoErase, bit(sanicap & 0x1 != 0)),
            (EraseMethod::NvmFormatCryptoSecureErase, bit(fna_present)),
            (EraseMethod::SanitizeBlockErase, bit(sanicap & 0x2 != 0)),
            (EraseMethod::NvmFormatUserSecureErase, bit(fna_present)),
            (EraseMethod::SanitizeOverwriteErase, bit(sanicap & 0x4 != 0)),
            (EraseMethod::TrimUnmap, SupportBit::Supported),
            (EraseMethod::HostOverwrite, SupportBit::Supported),
        ];

        RawCapabilities {
            methods_in_priority_order,
            overwrite_estimate: None,
        }
    }

    fn scsi_capabilities(device: &Device) -> RawCapabilities {
        let opcodes = Command::new("sg_opcodes")
            .args([device.path.as_str()])
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).to_string());
        let bit = |needle: &str| match &opcodes {
            Some(text) if text.contains(needle) => SupportBit::Supported,
            Some(_) => SupportBit::Unsupported,
            None => SupportBit::Unreadable,
        };

        let tcg = Self::tcg_support_bit(device);
        let sanitize = bit("Sanitize");
        let methods_in_priority_order = vec![
            (EraseMethod::TcgRevert, tcg),
            (EraseMethod::TcgRevertSp, tcg),
            (EraseMethod::SanitizeCryptoErase, sanitize),
            (EraseMethod::SanitizeBlockErase, sanitize),
            (EraseMethod::SanitizeOverwriteErase, sanitize),
            (EraseMethod::FormatUnit, bit("Format unit")),
            (EraseMethod::WriteSame, bit("Write same")),
            (EraseMethod::TrimUnmap, bit("Unmap")),
            (EraseMethod::HostOverwrite, SupportBit::Supported),
        ];

        RawCapabilities {
            methods_in_priority_order,
            overwrite_estimate: None,
        }
    }

    fn classify_ata_stderr(stderr: &str) -> AtaStatus {
        let lower = stderr.to_lowercase();
        if lower.contains("frozen") {
            AtaStatus::Frozen
        } else if lower.contains("not supported") || lower.contains("bad/missing sense") {
            AtaStatus::NotSupported
        } else if lower.contains("abort") {
            AtaStatus::Aborted
        } else if lower.contains("password") {
            AtaStatus::PasswordRejected
        } else {
            AtaStatus::DeviceFault
        }
    }

    fn classify_scsi_stderr(stderr: &str) -> ScsiStatus {
        let lower = stderr.to_lowercase();
        if lower.contains("illegal request") || lower.contains("invalid opcode") {
            ScsiStatus::IllegalRequest
        } else if lower.contains("sanitize in progress") {
            ScsiStatus::SanitizeInProgress
        } else if lower.contains("not ready") {
            ScsiStatus::NotReady
        } else if lower.contains("reservation conflict") {
            ScsiStatus::ReservationConflict
        } else if lower.contains("aborted") {
            ScsiStatus::AbortedCommand
        } else {
            ScsiStatus::MediumError
        }
    }

    fn classify_nvme_stderr(stderr: &str) -> NvmeStatus {
        let lower = stderr.to_lowercase();
        if lower.contains("invalid field") || lower.contains("invalid opcode") {
            NvmeStatus::InvalidFieldInCommand
        } else if lower.contains("sanitize in progress") {
            NvmeStatus::SanitizeInProgress
        } else if lower.contains("format in progress") {
            NvmeStatus::FormatInProgress
        } else if lower.contains("operation denied") || lower.contains("access denied") {
            NvmeStatus::OperationDenied
        } else if lower.contains("operation not permitted") || lower.contains("blocked") {
            NvmeStatus::OsCommandNotAvailable
        } else {
            NvmeStatus::InternalError
        }
    }

    fn write_pattern_range(
        device: &Device,
        start_lba: u64,
        count: u64,
        pattern: &[u8],
    ) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(&device.path)?;
        let block = device.block_size as u64;
        file.seek(SeekFrom::Start(start_lba * block))?;

        // 4 MiB write chunks filled with the repeated pattern.
        let chunk_len = 4 * 1024 * 1024;
        let mut chunk = Vec::with_capacity(chunk_len);
        while chunk.len() < chunk_len {
            chunk.extend_from_slice(pattern);
        }
        chunk.truncate(chunk_len);

        let total = count * block;
        let mut written = 0u64;
        while written < total {
            if is_interrupted() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "overwrite interrupted",
                ));
            }
            let to_write = std::cmp::min(chunk_len as u64, total - written) as usize;
            file.write_all(&chunk[..to_write])?;
            written += to_write as u64;
        }
        file.sync_all()
    }

    fn os_status_from_io(err: &std::io::Error) -> OsStatus {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => OsStatus::PermissionDenied,
            std::io::ErrorKind::Interrupted => OsStatus::Interrupted,
            _ => OsStatus::IoError,
        }
    }
}

impl Default for SystemCommands {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCommands for SystemCommands {
    fn open_device(&self, path: &str) -> BackendResult<Device> {
        let sectors = Self::blockdev_u64(path, "--getsz")?;
        if sectors == 0 {
            return Err(BackendError(format!("{} reports zero capacity", path)));
        }
        let logical = Self::blockdev_u64(path, "--getss").unwrap_or(512);
        // --getsz counts 512-byte units regardless of logical sector size.
        let max_lba = (sectors * 512) / logical - 1;
        let (model, serial) = Self::model_and_serial(path);

        Ok(Device {
            path: path.to_string(),
            interface: Self::detect_interface(path),
            model,
            serial,
            max_lba,
            child_max_lba: None,
            block_size: logical as u32,
        })
    }

    fn close_device(&self, device: &mut Device) {
        // Drop any lock still held; the handle itself has no kernel state
        // beyond that.
        self.locks.lock().unwrap().remove(&device.path);
        debug!("closed device handle for {}", device.path);
    }

    fn probe_capabilities(&self, device: &Device) -> BackendResult<RawCapabilities> {
        Ok(match device.interface {
            Interface::Ata => Self::ata_capabilities(device),
            Interface::Nvme => Self::nvme_capabilities(device),
            Interface::Scsi => Self::scsi_capabilities(device),
        })
    }

    fn current_max_lba(&self, device: &Device) -> BackendResult<u64> {
        let sectors = Self::blockdev_u64(&device.path, "--getsz")?;
        Ok((sectors * 512) / device.block_size as u64 - 1)
    }

    fn adapter_reported_max_lba(&self, device: &Device) -> BackendResult<u64> {
        // sysfs size is the adapter/driver view and can lag the drive after
        // a max-LBA change until the host rescans.
        let name = device.path.trim_start_matches("/dev/");
        let sys = format!("/sys/block/{}/size", name);
        let text = std::fs::read_to_string(&sys)
            .map_err(|e| BackendError(format!("reading {} failed: {}", sys, e)))?;
        let sectors: u64 = text
            .trim()
            .parse()
            .map_err(|e| BackendError(format!("bad size in {}: {}", sys, e)))?;
        Ok((sectors * 512) / device.block_size as u64 - 1)
    }

    fn restore_max_lba(&self, device: &Device) -> AtaStatus {
        let output = match Command::new("hdparm")
            .args(["--yes-i-know-what-i-am-doing", "-N", "p0", &device.path])
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("hdparm -N invocation failed: {}", e);
                return AtaStatus::DeviceFault;
            }
        };
        if output.status.success() {
            AtaStatus::Success
        } else {
            Self::classify_ata_stderr(&String::from_utf8_lossy(&output.stderr))
        }
    }

    fn run_sanitize(
        &self,
        device: &Device,
        op: SanitizeOperation,
        mode: ProgressMode,
    ) -> BackendStatus {
        match device.interface {
            Interface::Nvme => {
                let action = match op {
                    SanitizeOperation::BlockErase => "1",
                    SanitizeOperation::OverwriteErase => "3",
                    SanitizeOperation::CryptoErase => "4",
                };
                let output = match Command::new("nvme")
                    .args(["sanitize", &device.path, "-a", action])
                    .output()
                {
                    Ok(o) => o,
                    Err(e) => {
                        warn!("nvme sanitize invocation failed: {}", e);
                        return BackendStatus::Nvme(NvmeStatus::InternalError);
                    }
                };
                if !output.status.success() {
                    return BackendStatus::Nvme(Self::classify_nvme_stderr(
                        &String::from_utf8_lossy(&output.stderr),
                    ));
                }
                if mode == ProgressMode::Blocking {
                    // nvme-cli returns once the command is accepted; poll the
                    // sanitize log until the device reports completion.
                    loop {
                        std::thread::sleep(Duration::from_secs(5));
                        let log = Command::new("nvme")
                            .args(["sanitize-log", &device.path])
                            .output();
                        match log {
                            Ok(o) => {
                                let text = String::from_utf8_lossy(&o.stdout).to_lowercase();
                                if !text.contains("in progress") {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                }
                BackendStatus::Nvme(NvmeStatus::Success)
            }
            Interface::Ata | Interface::Scsi => {
                let op_flag = match op {
                    SanitizeOperation::BlockErase => "--block",
                    SanitizeOperation::CryptoErase => "--crypto",
                    SanitizeOperation::OverwriteErase => "--overwrite",
                };
                let mut args = vec![op_flag];
                if mode == ProgressMode::Blocking {
                    args.push("--wait");
                } else {
                    args.push("--quick");
                }
                args.push(&device.path);
                let output = match Command::new("sg_sanitize").args(&args).output() {
                    Ok(o) => o,
                    Err(e) => {
                        warn!("sg_sanitize invocation failed: {}", e);
                        return BackendStatus::Scsi(ScsiStatus::MediumError);
                    }
                };
                if output.status.success() {
                    BackendStatus::Scsi(ScsiStatus::Good)
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if device.interface == Interface::Ata && stderr.to_lowercase().contains("frozen")
                    {
                        BackendStatus::Ata(AtaStatus::Frozen)
                    } else {
                        BackendStatus::Scsi(Self::classify_scsi_stderr(&stderr))
                    }
                }
            }
        }
    }

    fn run_ata_security_erase(
        &self,
        device: &Device,
        enhanced: bool,
        password: &[u8; 32],
    ) -> AtaStatus {
        // hdparm takes the password as a string; trailing NUL padding is
        // stripped, interior bytes pass through.
        let pass: String = String::from_utf8_lossy(password)
            .trim_end_matches('\0')
            .to_string();

        let set = Command::new("hdparm")
            .args([
                "--user-master",
                "u",
                "--security-set-pass",
                &pass,
                &device.path,
            ])
            .output();
        match set {
            Ok(o) if !o.status.success() => {
                return Self::classify_ata_stderr(&String::from_utf8_lossy(&o.stderr));
            }
            Err(e) => {
                warn!("hdparm security-set-pass invocation failed: {}", e);
                return AtaStatus::DeviceFault;
            }
            _ => {}
        }

        let erase_flag = if enhanced {
            "--security-erase-enhanced"
        } else {
            "--security-erase"
        };
        let output = match Command::new("hdparm")
            .args(["--user-master", "u", erase_flag, &pass, &device.path])
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("hdparm security-erase invocation failed: {}", e);
                return AtaStatus::DeviceFault;
            }
        };
        if output.status.success() {
            AtaStatus::Success
        } else {
            Self::classify_ata_stderr(&String::from_utf8_lossy(&output.stderr))
        }
    }

    fn run_nvm_format(
        &self,
        device: &Device,
        op: SanitizeOperation,
        options: &NvmFormatOptions,
        mode: ProgressMode,
    ) -> NvmeStatus {
        let ses = match op {
            SanitizeOperation::CryptoErase => "2",
            _ => "1",
        };
        let mut args: Vec<String> = vec![
            "format".into(),
            device.path.clone(),
            "-s".into(),
            ses.into(),
        ];
        // Unset sub-parameters are omitted entirely: nvme-cli then leaves
        // the namespace's current setting alone ("no change").
        if let Some(pi) = options.protection_type {
            args.push("--pi".into());
            args.push(pi.to_string());
        }
        if let Some(first) = options.protection_location_first {
            args.push("--pil".into());
            args.push(if first { "1" } else { "0" }.into());
        }
        if let Some(extended) = options.metadata_extended {
            args.push("--ms".into());
            args.push(if extended { "1" } else { "0" }.into());
        }
        if mode == ProgressMode::PollForProgress {
            args.push("--no-wait".into());
        }
        let output = match Command::new("nvme").args(&args).output() {
            Ok(o) => o,
            Err(e) => {
                warn!("nvme format invocation failed: {}", e);
                return NvmeStatus::InternalError;
            }
        };
        if output.status.success() {
            NvmeStatus::Success
        } else {
            Self::classify_nvme_stderr(&String::from_utf8_lossy(&output.stderr))
        }
    }

    fn run_write_same(&self, device: &Device, start_lba: u64, count: u64) -> ScsiStatus {
        let output = match Command::new("sg_write_same")
            .args([
                "--lba",
                &start_lba.to_string(),
                "--num",
                &count.to_string(),
                "--in",
                "/dev/zero",
                &device.path,
            ])
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("sg_write_same invocation failed: {}", e);
                return ScsiStatus::MediumError;
            }
        };
        if output.status.success() {
            ScsiStatus::Good
        } else {
            Self::classify_scsi_stderr(&String::from_utf8_lossy(&output.stderr))
        }
    }

    fn run_host_overwrite(
        &self,
        device: &Device,
        start_lba: u64,
        count: u64,
        pattern: &[u8],
    ) -> OsStatus {
        match Self::write_pattern_range(device, start_lba, count, pattern) {
            Ok(()) => OsStatus::Success,
            Err(e) => Self::os_status_from_io(&e),
        }
    }

    fn run_host_overwrite_timed(
        &self,
        device: &Device,
        duration: Duration,
        pattern: &[u8],
    ) -> OsStatus {
        let deadline = Instant::now() + duration;
        let block = device.block_size as u64;
        // Overwrite in 64 MiB slices from LBA 0 until the timer expires,
        // wrapping at the end of the device.
        let slice_lbas = (64 * 1024 * 1024) / block;
        let mut lba = 0u64;
        while Instant::now() < deadline {
            if is_interrupted() {
                return OsStatus::Interrupted;
            }
            let remaining = device.max_lba - lba + 1;
            let count = slice_lbas.min(remaining);
            if let Err(e) = Self::write_pattern_range(device, lba, count, pattern) {
                return Self::os_status_from_io(&e);
            }
            lba += count;
            if lba > device.max_lba {
                lba = 0;
            }
        }
        OsStatus::Success
    }

    fn run_trim_unmap(&self, device: &Device, start_lba: u64, count: u64) -> BackendStatus {
        let block = device.block_size as u64;
        let output = match Command::new("blkdiscard")
            .args([
                "--offset",
                &(start_lba * block).to_string(),
                "--length",
                &(count * block).to_string(),
                &device.path,
            ])
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("blkdiscard invocation failed: {}", e);
                return BackendStatus::Os(OsStatus::IoError);
            }
        };
        if output.status.success() {
            return BackendStatus::Os(OsStatus::Success);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("not supported") {
            match device.interface {
                Interface::Nvme => BackendStatus::Nvme(NvmeStatus::InvalidFieldInCommand),
                Interface::Scsi => BackendStatus::Scsi(ScsiStatus::IllegalRequest),
                Interface::Ata => BackendStatus::Ata(AtaStatus::NotSupported),
            }
        } else if stderr.to_lowercase().contains("permission denied") {
            BackendStatus::Os(OsStatus::PermissionDenied)
        } else {
            BackendStatus::Os(OsStatus::IoError)
        }
    }

    fn run_format_unit(&self, device: &Device, fast: bool, mode: ProgressMode) -> ScsiStatus {
        let mut args = vec!["--format"];
        if fast {
            args.push("--ffmt=1");
        }
        if mode == ProgressMode::Blocking {
            args.push("--wait");
        }
        args.push(&device.path);
        let output = match Command::new("sg_format").args(&args).output() {
            Ok(o) => o,
            Err(e) => {
                warn!("sg_format invocation failed: {}", e);
                return ScsiStatus::MediumError;
            }
        };
        if output.status.success() {
            ScsiStatus::Good
        } else {
            Self::classify_scsi_stderr(&String::from_utf8_lossy(&output.stderr))
        }
    }

    fn run_tcg_revert<'a>(&self, device: &Device, sid: Option<&'a str>) -> TcgStatus {
        let credential = sid.unwrap_or("");
        let output = match Command::new("sedutil-cli")
            .args(["--revertTPer", credential, &device.path])
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("sedutil-cli invocation failed: {}", e);
                return TcgStatus::Failed;
            }
        };
        if output.status.success() {
            TcgStatus::PowerCycleRequired
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if stderr.contains("authority") || stderr.contains("not authorized") {
                TcgStatus::NotAuthorized
            } else if stderr.contains("password") || stderr.contains("credential") {
                TcgStatus::InvalidCredential
            } else if stderr.contains("no tper") || stderr.contains("not supported") {
                TcgStatus::NotSupported
            } else {
                TcgStatus::Failed
            }
        }
    }

    fn run_tcg_revert_sp(&self, device: &Device, psid: &str) -> TcgStatus {
        let output = match Command::new("sedutil-cli")
            .args(["--PSIDrevert", psid, &device.path])
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("sedutil-cli invocation failed: {}", e);
                return TcgStatus::Failed;
            }
        };
        if output.status.success() {
            TcgStatus::PowerCycleRequired
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if stderr.contains("psid") {
                TcgStatus::InvalidCredential
            } else if stderr.contains("not supported") {
                TcgStatus::NotSupported
            } else {
                TcgStatus::Failed
            }
        }
    }

    fn query_write_after_erase(
        &self,
        device: &Device,
        method: EraseMethod,
    ) -> WriteAfterEraseRequirement {
        match method {
            EraseMethod::SanitizeBlockErase => {
                // NVMe sanicap NODMMAS tells us whether media is readable
                // after a block erase; when unreadable the host must rewrite
                // every LBA before reads succeed.
                if device.interface == Interface::Nvme {
                    if let Some(text) = Self::nvme_id_ctrl_text(device) {
                        if text.to_lowercase().contains("nodmmas") {
                            return WriteAfterEraseRequirement::RequiredBeforeReadsSucceed;
                        }
                    }
                    WriteAfterEraseRequirement::MayRequireOverwriteDueToFormatting
                } else {
                    WriteAfterEraseRequirement::MayRequireOverwriteDueToFormatting
                }
            }
            EraseMethod::SanitizeCryptoErase | EraseMethod::NvmFormatCryptoSecureErase => {
                WriteAfterEraseRequirement::ReadReturnsGoodStatus
            }
            EraseMethod::NvmFormatUserSecureErase | EraseMethod::FormatUnit => {
                WriteAfterEraseRequirement::MayRequireOverwriteDueToFormatting
            }
            _ => WriteAfterEraseRequirement::None,
        }
    }

    fn refresh_filesystem_cache(&self, device: &Device) -> BackendResult<()> {
        let output = Self::tool_output("blockdev", &["--rereadpt", &device.path])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BackendError(format!(
                "partition table re-read failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn lock_device(&self, device: &Device) -> BackendResult<()> {
        use std::os::fd::AsRawFd;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&device.path)
            .map_err(|e| BackendError(format!("open for lock failed: {}", e)))?;
        nix::fcntl::flock(file.as_raw_fd(), nix::fcntl::FlockArg::LockExclusiveNonblock)
            .map_err(|e| BackendError(format!("exclusive lock failed: {}", e)))?;
        self.locks
            .lock()
            .unwrap()
            .insert(device.path.clone(), file);
        Ok(())
    }

    fn unlock_device(&self, device: &Device) -> BackendResult<()> {
        // Dropping the File releases the flock.
        self.locks.lock().unwrap().remove(&device.path);
        Ok(())
    }

    fn unmount_filesystems(&self, device: &Device) -> BackendResult<()> {
        let mounts = std::fs::read_to_string("/proc/mounts")
            .map_err(|e| BackendError(format!("reading /proc/mounts failed: {}", e)))?;
        for line in mounts.lines() {
            let mut fields = line.split_whitespace();
            let (Some(source), Some(target)) = (fields.next(), fields.next()) else {
                continue;
            };
            if source.starts_with(&device.path) {
                debug!("force-unmounting {} from {}", source, target);
                nix::mount::umount2(target, nix::mount::MntFlags::MNT_FORCE)
                    .map_err(|e| BackendError(format!("unmount of {} failed: {}", target, e)))?;
            }
        }
        Ok(())
    }

    fn set_write_read_verify(&self, device: &Device, enable: bool) -> AtaStatus {
        let level = if enable { "2" } else { "0" };
        let output = match Command::new("hdparm")
            .args(["-R", level, &device.path])
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("hdparm -R invocation failed: {}", e);
                return AtaStatus::DeviceFault;
            }
        };
        if output.status.success() {
            AtaStatus::Success
        } else {
            Self::classify_ata_stderr(&String::from_utf8_lossy(&output.stderr))
        }
    }
}
