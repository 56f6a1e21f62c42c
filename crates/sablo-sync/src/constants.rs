//! Wire vocabulary shared by the inbound reconciler and the outbound
//! serializer.
//!
//! Tags are short and stable; they appear verbatim in every payload.

// ── Payload field tags ────────────────────────────────────────────────────

/// Full value: an array for `JSON_arr`, an object for `JSON_obj`.
pub const VALUE: &str = "v";
/// Sparse update list (`[{i|k, v}]`).
pub const UPDATES: &str = "u";
/// Granular op list (arrays only).
pub const GRANULAR_UPDATES: &str = "g";
/// Per-op data array.
pub const GRANULAR_UPDATE_DATA: &str = "d";
/// Per-op `[start, end, opType]` triple.
pub const OP_ARRAY_START_END_TYPE: &str = "op";
/// Index of an entry in an array sparse update.
pub const INDEX: &str = "i";
/// Key of an entry in an object sparse update.
pub const KEY: &str = "k";
/// Initialize-only flag.
pub const INITIALIZE: &str = "in";
/// Content version.
pub const CONTENT_VERSION: &str = "vEr";
/// Push-to-server policy.
pub const PUSH_TO_SERVER: &str = "w";
/// Explicit "nothing changed" marker.
pub const NO_OP: &str = "n";
/// Conversion metadata, keyed like the payload it annotates.
pub const CONVERSIONS: &str = "conversions";

/// Type tags of the converters shipped with this crate.
pub mod type_tag {
    pub const ARRAY: &str = "JSON_arr";
    pub const OBJECT: &str = "JSON_obj";
}

// ── Op codes ──────────────────────────────────────────────────────────────

/// Kind of a granular array op (third element of the `op` triple).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Changed = 0,
    Insert = 1,
    Delete = 2,
}

impl OpKind {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(OpKind::Changed),
            1 => Some(OpKind::Insert),
            2 => Some(OpKind::Delete),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}
