// SPDX-License-Identifier: MIT

//! Well-known partition type GUIDs.

use uuid::Uuid;

define_partition_types! {
    Unused => "Unused entry", "00000000-0000-0000-0000-000000000000",
    Efi => "EFI System Partition", "C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
    Mbr => "MBR partition scheme", "024DEE41-33E7-11D3-9D69-0008C781F39F",
    BiosBoot => "BIOS boot partition", "21686148-6449-6E6F-744E-656564454649",
    FreebsdBoot => "FreeBSD boot", "83BD6B9D-7F41-11DC-BE0B-001560B84F0F",
    Freebsd => "FreeBSD data", "516E7CB4-6ECF-11D6-8FF8-00022D09712B",
    FreebsdSwap => "FreeBSD swap", "516E7CB5-6ECF-11D6-8FF8-00022D09712B",
    FreebsdUfs => "FreeBSD UFS", "516E7CB6-6ECF-11D6-8FF8-00022D09712B",
    FreebsdVinum => "FreeBSD Vinum", "516E7CB8-6ECF-11D6-8FF8-00022D09712B",
    FreebsdZfs => "FreeBSD ZFS", "516E7CBA-6ECF-11D6-8FF8-00022D09712B",
    LinuxFs => "Linux filesystem", "0FC63DAF-8483-4772-8E79-3D69D8477DE4",
    LinuxSwap => "Linux swap", "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F",
    MsReserved => "Microsoft reserved", "E3C9E316-0B5C-4DB8-817D-F92DF00215AE",
    MsBasicData => "Microsoft basic data", "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7",
    AppleHfs => "Apple HFS+", "48465300-0000-11AA-AA11-00306543ECAC",
}

/// Types that mark boot/system plumbing rather than user data.
pub const RESERVED_TYPES: [Uuid; 5] = [
    GPT_PARTITION_TYPE_EFI,
    GPT_PARTITION_TYPE_MBR,
    GPT_PARTITION_TYPE_BIOS_BOOT,
    GPT_PARTITION_TYPE_FREEBSD_BOOT,
    GPT_PARTITION_TYPE_MS_RESERVED,
];

/// Types a kernel dump may be written to.
pub const DUMP_TYPES: [Uuid; 2] = [GPT_PARTITION_TYPE_FREEBSD_SWAP, GPT_PARTITION_TYPE_LINUX_SWAP];

#[inline]
pub fn is_reserved_type(guid: &Uuid) -> bool {
    RESERVED_TYPES.contains(guid)
}

#[inline]
pub fn is_dump_type(guid: &Uuid) -> bool {
    DUMP_TYPES.contains(guid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trip() {
        let kind = GptPartitionKind::from_guid(&GPT_PARTITION_TYPE_LINUX_FS);
        assert_eq!(kind, GptPartitionKind::LinuxFs);
        assert_eq!(kind.as_guid(), Some(&GPT_PARTITION_TYPE_LINUX_FS));
        assert_eq!(kind.to_string(), "Linux filesystem");
    }

    #[test]
    fn unknown_kind_keeps_guid() {
        let guid = uuid::uuid!("01234567-89AB-CDEF-0123-456789ABCDEF");
        let kind = GptPartitionKind::from_guid(&guid);
        assert_eq!(kind, GptPartitionKind::Unknown(guid));
        assert!(kind.as_guid().is_none());
        assert_eq!(
            kind.to_string(),
            "Unknown (01234567-89ab-cdef-0123-456789abcdef)"
        );
    }

    #[test]
    fn unused_is_nil() {
        assert!(GPT_PARTITION_TYPE_UNUSED.is_nil());
    }

    #[test]
    fn reserved_and_dump_sets() {
        assert!(is_reserved_type(&GPT_PARTITION_TYPE_EFI));
        assert!(is_reserved_type(&GPT_PARTITION_TYPE_MS_RESERVED));
        assert!(!is_reserved_type(&GPT_PARTITION_TYPE_LINUX_FS));

        assert!(is_dump_type(&GPT_PARTITION_TYPE_FREEBSD_SWAP));
        assert!(is_dump_type(&GPT_PARTITION_TYPE_LINUX_SWAP));
        assert!(!is_dump_type(&GPT_PARTITION_TYPE_FREEBSD_UFS));
    }
}
