/// A scriptable device backend for end-to-end pipeline tests.
///
/// Every destructive and read-only call is recorded in order, so tests can
/// assert both what the pipeline decided and what it actually sent to the
/// device. Statuses default to success and can be overridden per family.

use oblivion_erase::backend::{
    AtaStatus, BackendResult, BackendStatus, Device, DeviceCommands, Interface, NvmeStatus,
    OsStatus, RawCapabilities, SanitizeOperation, ScsiStatus, SupportBit, TcgStatus,
};
use oblivion_erase::{
    EraseMethod, NvmFormatOptions, ProgressMode, WriteAfterEraseRequirement,
};
use std::sync::Mutex;
use std::time::Duration;

pub struct ScriptedBackend {
    pub max_lba: u64,
    pub methods: Vec<(EraseMethod, SupportBit)>,
    pub overwrite_estimate: Option<Duration>,
    pub sanitize_status: BackendStatus,
    pub nvm_format_status: NvmeStatus,
    pub write_after: WriteAfterEraseRequirement,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(max_lba: u64) -> Self {
        Self {
            max_lba,
            methods: Vec::new(),
            overwrite_estimate: None,
            sanitize_status: BackendStatus::Ata(AtaStatus::Success),
            nvm_format_status: NvmeStatus::Success,
            write_after: WriteAfterEraseRequirement::None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn supporting(mut self, method: EraseMethod) -> Self {
        self.methods.push((method, SupportBit::Supported));
        self
    }

    pub fn sanitize_status(mut self, status: BackendStatus) -> Self {
        self.sanitize_status = status;
        self
    }

    pub fn write_after(mut self, requirement: WriteAfterEraseRequirement) -> Self {
        self.write_after = requirement;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DeviceCommands for ScriptedBackend {
    fn open_device(&self, path: &str) -> BackendResult<Device> {
        self.record(format!("open {}", path));
        Ok(Device {
            path: path.to_string(),
            interface: Interface::Ata,
            model: "Scripted".to_string(),
            serial: "TEST-0001".to_string(),
            max_lba: self.max_lba,
            child_max_lba: None,
            block_size: 512,
        })
    }

    fn close_device(&self, device: &mut Device) {
        self.record(format!("close {}", device.path));
    }

    fn probe_capabilities(&self, _device: &Device) -> BackendResult<RawCapabilities> {
        self.record("probe".to_string());
        Ok(RawCapabilities {
            methods_in_priority_order: self.methods.clone(),
            overwrite_estimate: self.overwrite_estimate,
        })
    }

    fn current_max_lba(&self, _device: &Device) -> BackendResult<u64> {
        Ok(self.max_lba)
    }

    fn adapter_reported_max_lba(&self, _device: &Device) -> BackendResult<u64> {
        Ok(self.max_lba)
    }

    fn restore_max_lba(&self, _device: &Device) -> AtaStatus {
        self.record("restore_max_lba".to_string());
        AtaStatus::Success
    }

    fn run_sanitize(
        &self,
        _device: &Device,
        op: SanitizeOperation,
        _mode: ProgressMode,
    ) -> BackendStatus {
        self.record(format!("sanitize {:?}", op));
        self.sanitize_status
    }

    fn run_ata_security_erase(
        &self,
        _device: &Device,
        enhanced: bool,
        _password: &[u8; 32],
    ) -> AtaStatus {
        self.record(format!("ata_security enhanced={}", enhanced));
        AtaStatus::Success
    }

    fn run_nvm_format(
        &self,
        _device: &Device,
        op: SanitizeOperation,
        _options: &NvmFormatOptions,
        _mode: ProgressMode,
    ) -> NvmeStatus {
        self.record(format!("nvm_format {:?}", op));
        self.nvm_format_status
    }

    fn run_write_same(&self, _device: &Device, start_lba: u64, count: u64) -> ScsiStatus {
        self.record(format!("write_same {} {}", start_lba, count));
        ScsiStatus::Good
    }

    fn run_host_overwrite(
        &self,
        _device: &Device,
        start_lba: u64,
        count: u64,
        _pattern: &[u8],
    ) -> OsStatus {
        self.record(format!("host_overwrite {} {}", start_lba, count));
        OsStatus::Success
    }

    fn run_host_overwrite_timed(
        &self,
        _device: &Device,
        duration: Duration,
        _pattern: &[u8],
    ) -> OsStatus {
        self.record(format!("host_overwrite_timed {:?}", duration));
        OsStatus::Success
    }

    fn run_trim_unmap(&self, _device: &Device, start_lba: u64, count: u64) -> BackendStatus {
        self.record(format!("trim {} {}", start_lba, count));
        BackendStatus::Scsi(ScsiStatus::Good)
    }

    fn run_format_unit(&self, _device: &Device, fast: bool, _mode: ProgressMode) -> ScsiStatus {
        self.record(format!("format_unit fast={}", fast));
        ScsiStatus::Good
    }

    fn run_tcg_revert(&self, _device: &Device, sid: Option<&str>) -> TcgStatus {
        self.record(format!("tcg_revert sid={}", sid.is_some()));
        TcgStatus::Success
    }

    fn run_tcg_revert_sp(&self, _device: &Device, _psid: &str) -> TcgStatus {
        self.record("tcg_revert_sp".to_string());
        TcgStatus::Success
    }

    fn query_write_after_erase(
        &self,
        _device: &Device,
        _method: EraseMethod,
    ) -> WriteAfterEraseRequirement {
        self.write_after
    }

    fn refresh_filesystem_cache(&self, _device: &Device) -> BackendResult<()> {
        self.record("refresh_fs_cache".to_string());
        Ok(())
    }

    fn lock_device(&self, _device: &Device) -> BackendResult<()> {
        self.record("lock".to_string());
        Ok(())
    }

    fn unlock_device(&self, _device: &Device) -> BackendResult<()> {
        self.record("unlock".to_string());
        Ok(())
    }

    fn unmount_filesystems(&self, _device: &Device) -> BackendResult<()> {
        self.record("unmount".to_string());
        Ok(())
    }

    fn set_write_read_verify(&self, _device: &Device, enable: bool) -> AtaStatus {
        self.record(format!("write_read_verify {}", enable));
        AtaStatus::Success
    }
}
