// Capability probing.
//
// One snapshot per device per invocation, taken immediately before method
// selection and never reused across devices or cached across runs. Probing
// is read-only and never fails the overall flow: a bit the firmware will
// not give up is recorded as unsupported.

use crate::backend::{Device, DeviceCommands, SupportBit};
use crate::EraseMethod;
use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    /// Supported methods in the vendor/firmware-declared priority order;
    /// index 0 is the fastest. The selector never re-sorts this.
    pub supported_in_priority_order: Vec<EraseMethod>,
    /// Methods the device was asked about but does not support (or whose
    /// support bit was unreadable), kept for the support listing.
    pub unsupported: Vec<EraseMethod>,
    /// Drive-declared estimate for a full-surface overwrite, when it
    /// reports one.
    pub estimated_overwrite_time: Option<Duration>,
}

impl CapabilitySnapshot {
    pub fn supports(&self, method: EraseMethod) -> bool {
        self.supported_in_priority_order.contains(&method)
    }
}

/// Query the device for every method's support bit. Unreachable bits
/// degrade to unsupported; a failed probe call degrades to an empty
/// snapshot. Read-only.
pub fn probe(backend: &dyn DeviceCommands, device: &Device) -> CapabilitySnapshot {
    let raw = match backend.probe_capabilities(device) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("capability probe failed for {}: {}", device.path, e);
            return CapabilitySnapshot {
                supported_in_priority_order: Vec::new(),
                unsupported: Vec::new(),
                estimated_overwrite_time: None,
            };
        }
    };

    let mut supported = Vec::new();
    let mut unsupported = Vec::new();
    for (method, bit) in raw.methods_in_priority_order {
        match bit {
            SupportBit::Supported => supported.push(method),
            SupportBit::Unsupported => unsupported.push(method),
            SupportBit::Unreadable => {
                warn!(
                    "{}: support bit for {} unreadable, treating as unsupported",
                    device.path,
                    method.cli_name()
                );
                unsupported.push(method);
            }
        }
    }

    CapabilitySnapshot {
        supported_in_priority_order: supported,
        unsupported,
        estimated_overwrite_time: raw.overwrite_estimate,
    }
}

#[cfg(test)]
mod capability_tests {
    use super::*;
    use crate::backend::{BackendError, MockDeviceCommands, RawCapabilities};

    fn test_device() -> Device {
        Device {
            path: "/dev/sdz".to_string(),
            interface: crate::backend::Interface::Ata,
            model: "Test".to_string(),
            serial: "0000".to_string(),
            max_lba: 999,
            child_max_lba: None,
            block_size: 512,
        }
    }

    #[test]
    fn priority_order_is_preserved() {
        let mut backend = MockDeviceCommands::new();
        backend.expect_probe_capabilities().returning(|_| {
            Ok(RawCapabilities {
                methods_in_priority_order: vec![
                    (EraseMethod::SanitizeCryptoErase, SupportBit::Supported),
                    (EraseMethod::AtaSecurityEraseEnhanced, SupportBit::Unsupported),
                    (EraseMethod::SanitizeBlockErase, SupportBit::Supported),
                    (EraseMethod::HostOverwrite, SupportBit::Supported),
                ],
                overwrite_estimate: Some(Duration::from_secs(3600)),
            })
        });

        let snapshot = probe(&backend, &test_device());
        assert_eq!(
            snapshot.supported_in_priority_order,
            vec![
                EraseMethod::SanitizeCryptoErase,
                EraseMethod::SanitizeBlockErase,
                EraseMethod::HostOverwrite,
            ]
        );
        assert_eq!(
            snapshot.unsupported,
            vec![EraseMethod::AtaSecurityEraseEnhanced]
        );
        assert_eq!(
            snapshot.estimated_overwrite_time,
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn unreadable_bit_degrades_to_unsupported() {
        let mut backend = MockDeviceCommands::new();
        backend.expect_probe_capabilities().returning(|_| {
            Ok(RawCapabilities {
                methods_in_priority_order: vec![
                    (EraseMethod::TcgRevert, SupportBit::Unreadable),
                    (EraseMethod::TrimUnmap, SupportBit::Supported),
                ],
                overwrite_estimate: None,
            })
        });

        let snapshot = probe(&backend, &test_device());
        assert!(!snapshot.supports(EraseMethod::TcgRevert));
        assert!(snapshot.supports(EraseMethod::TrimUnmap));
        assert_eq!(snapshot.unsupported, vec![EraseMethod::TcgRevert]);
    }

    #[test]
    fn probe_failure_yields_empty_snapshot_not_error() {
        let mut backend = MockDeviceCommands::new();
        backend
            .expect_probe_capabilities()
            .returning(|_| Err(BackendError("no transport".to_string())));

        let snapshot = probe(&backend, &test_device());
        assert!(snapshot.supported_in_priority_order.is_empty());
        assert!(snapshot.estimated_overwrite_time.is_none());
    }
}
