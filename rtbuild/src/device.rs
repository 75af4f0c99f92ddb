//! Device gating for acceleration-structure support.

use crate::desc::{DeviceDesc, RtasFormat};
use std::ops::RangeInclusive;

pub const INTEL_VENDOR_ID: u32 = 0x8086;

const DG2_DEVICE_IDS: [RangeInclusive<u32>; 5] = [
    0x4F80..=0x4F88,
    0x5690..=0x5698,
    0x56A0..=0x56A6,
    0x56B0..=0x56B3,
    0x56C0..=0x56C1,
];

const PVC_DEVICE_IDS: [RangeInclusive<u32>; 2] = [0x0BD0..=0x0BDB, 0x0BE5..=0x0BE5];

fn in_ranges(ranges: &[RangeInclusive<u32>], device_id: u32) -> bool {
    ranges.iter().any(|range| range.contains(&device_id))
}

/// Format the device's acceleration structures use, `None` when unsupported.
pub fn supported_rtas_format(device: &DeviceDesc) -> Option<RtasFormat> {
    if device.vendor_id != INTEL_VENDOR_ID {
        return None;
    }
    let supported = in_ranges(&DG2_DEVICE_IDS, device.device_id)
        || in_ranges(&PVC_DEVICE_IDS, device.device_id);
    supported.then_some(RtasFormat::VERSION_1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_devices() {
        for device_id in [0x4F80, 0x4F88, 0x5693, 0x56A6, 0x56B0, 0x56C1, 0x0BD0, 0x0BDB, 0x0BE5] {
            assert_eq!(
                supported_rtas_format(&DeviceDesc::new(INTEL_VENDOR_ID, device_id)),
                Some(RtasFormat::VERSION_1),
                "device {device_id:#x}"
            );
        }
    }

    #[test]
    fn test_unsupported_devices() {
        for device_id in [0x4F89, 0x5699, 0x56A7, 0x56B4, 0x56C2, 0x0BDC, 0x0BE4, 0x9A49] {
            assert_eq!(supported_rtas_format(&DeviceDesc::new(INTEL_VENDOR_ID, device_id)), None);
        }
        assert_eq!(supported_rtas_format(&DeviceDesc::new(0x10DE, 0x4F80)), None);
    }
}
