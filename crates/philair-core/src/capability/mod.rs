// ── Device capabilities ──
//
// Per-model descriptors, the catalog that dispatches model ids to them, and
// the fan operations that turn descriptor lookups into coordinator writes.

mod catalog;
mod descriptor;
mod fan;
pub mod keys;

pub use catalog::{GENERIC, ModelCatalog, NEW_GENERIC, NEW2_GENERIC};
pub use descriptor::{
    DescriptorOverrides, HumidifierCapability, KeyReplacement, ModelDescriptor, OscillationSpec,
    PowerSpec, ToggleSpec,
};
pub use fan::{FanControl, ordered_index_to_percentage, percentage_to_ordered_index};
