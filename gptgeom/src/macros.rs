// SPDX-License-Identifier: MIT

#[macro_export]
/// Defines a set of GPT partition types, along with associated constants, predicates, and an enum for partition kinds.
///
/// This macro generates:
/// - A `Uuid` constant for each partition type GUID, in canonical (string) form.
/// - A function to check if a partition entry matches a given type.
/// - An enum `GptPartitionKind` representing all defined partition types and an `Unknown` variant for unrecognized GUIDs.
/// - Implementations for converting between GUIDs and `GptPartitionKind`.
/// - A `Display` implementation for `GptPartitionKind`.
///
/// # Example
/// ```rust
/// use gptgeom::define_partition_types;
///
/// define_partition_types! {
///     Efi => "EFI System Partition", "C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
///     LinuxFs => "Linux filesystem", "0FC63DAF-8483-4772-8E79-3D69D8477DE4",
/// }
///
/// assert_eq!(GptPartitionKind::from_guid(&GPT_PARTITION_TYPE_EFI), GptPartitionKind::Efi);
/// ```
///
/// # Parameters
/// - `$name`: CamelCase identifier for the partition type (enum variant; snake-cased for constants and functions).
/// - `$desc`: Description string for the partition type.
/// - `$guid`: GUID string literal.
///
/// # Generated Items
/// For each partition type:
/// - `pub const GPT_PARTITION_TYPE_<NAME>: Uuid`
/// - `pub fn is_<name>_partition(entry: &GptEntry) -> bool`
///
/// # Note
/// This macro requires the `paste` and `uuid` crates.
macro_rules! define_partition_types {
    (
        $(
            $name:ident => $desc:expr, $guid:literal
        ),+ $(,)?
    ) => {
        paste::paste! {
            $(
                #[doc = $desc]
                pub const [<GPT_PARTITION_TYPE_ $name:snake:upper>]: uuid::Uuid = uuid::uuid!($guid);

                #[doc = concat!("Checks if a GPT partition is of type: ", $desc)]
                pub fn [<is_ $name:snake _partition>](
                    entry: &$crate::table::GptEntry,
                ) -> bool {
                    entry.type_guid == [<GPT_PARTITION_TYPE_ $name:snake:upper>]
                }
            )+

            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub enum GptPartitionKind {
                $($name,)+
                Unknown(uuid::Uuid),
            }

            impl GptPartitionKind {
                pub fn from_guid(guid: &uuid::Uuid) -> Self {
                    match guid {
                        $(g if g == &[<GPT_PARTITION_TYPE_ $name:snake:upper>] => Self::$name,)+
                        other => Self::Unknown(*other),
                    }
                }

                pub fn as_guid(&self) -> Option<&'static uuid::Uuid> {
                    match self {
                        $(Self::$name => Some(&[<GPT_PARTITION_TYPE_ $name:snake:upper>]),)+
                        Self::Unknown(_) => None,
                    }
                }
            }

            impl core::fmt::Display for GptPartitionKind {
                fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                    match self {
                        $(Self::$name => f.write_str($desc),)+
                        Self::Unknown(guid) => write!(f, "Unknown ({})", guid.hyphenated()),
                    }
                }
            }
        }
    };
}
