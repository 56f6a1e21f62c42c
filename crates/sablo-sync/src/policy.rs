//! Push-to-server policy (`w` tag).

use serde_json::Value;

/// How local mutations of a container's dumb elements are observed.
///
/// On the wire the server sends `false` for shallow, `true` for deep and
/// omits the tag for none. String spellings are accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushPolicy {
    /// Local changes are never observed nor sent.
    #[default]
    None,
    /// Element identity is watched (re-assignment).
    Shallow,
    /// Element contents are compared structurally.
    Deep,
}

impl PushPolicy {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(false) => PushPolicy::Shallow,
            Value::Bool(true) => PushPolicy::Deep,
            Value::String(s) => match s.as_str() {
                "shallow" => PushPolicy::Shallow,
                "deep" => PushPolicy::Deep,
                _ => PushPolicy::None,
            },
            _ => PushPolicy::None,
        }
    }

    /// Wire form; `None` for the policy that omits the tag.
    pub fn to_json(self) -> Option<Value> {
        match self {
            PushPolicy::None => None,
            PushPolicy::Shallow => Some(Value::Bool(false)),
            PushPolicy::Deep => Some(Value::Bool(true)),
        }
    }

    pub fn is_watched(self) -> bool {
        self != PushPolicy::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PushPolicy::None => "none",
            PushPolicy::Shallow => "shallow",
            PushPolicy::Deep => "deep",
        }
    }
}
