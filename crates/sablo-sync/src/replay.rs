//! Scripted sessions: server payloads and client edits run against one
//! property, recording every payload the client sends back.
//!
//! ```json
//! {"type": "JSON_arr",
//!  "steps": [
//!    {"step": "server", "payload": {"vEr": 1, "w": false, "v": [1, 2]}},
//!    {"step": "set", "target": 0, "value": 5},
//!    {"step": "digest"},
//!    {"step": "send"}
//!  ]}
//! ```

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::array::SyncArray;
use crate::conversion::ConversionInfo;
use crate::converters::ConverterRegistry;
use crate::error::{Result, SyncError};
use crate::object::SyncObject;
use crate::property::PropertySync;
use crate::scope::Scope;

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    /// Type tag of the property; `null` for a plain property.
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    /// Full conversion metadata; takes precedence over `type`.
    #[serde(default)]
    pub conversions: Option<Value>,
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReplayStep {
    Server { payload: Value },
    Set { target: Target, value: Value },
    Push { value: Value },
    Insert { target: usize, value: Value },
    Remove { target: Target },
    Replace { value: Value },
    Digest,
    Send,
}

/// Element address: a position for arrays, a key for objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Index(usize),
    Key(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub value: Value,
    pub sent: Vec<Value>,
    pub watch_firings: usize,
}

impl ReplayScript {
    fn conversion(&self) -> Result<Option<ConversionInfo>> {
        match (&self.conversions, &self.type_name) {
            (Some(info), _) if !info.is_null() => ConversionInfo::from_json(info),
            (_, Some(type_name)) => Ok(Some(ConversionInfo::of_type(type_name.clone()))),
            _ => Ok(None),
        }
    }
}

pub fn run_str(script: &str) -> Result<ReplayReport> {
    let script: ReplayScript = serde_json::from_str(script)?;
    run(&script)
}

/// Runs `script` with the default converters.
pub fn run(script: &ReplayScript) -> Result<ReplayReport> {
    run_with(Rc::new(ConverterRegistry::with_defaults()), script)
}

pub fn run_with(registry: Rc<ConverterRegistry>, script: &ReplayScript) -> Result<ReplayReport> {
    let scope = Scope::new();
    let mut property = PropertySync::new(registry, script.conversion()?).with_scope(scope.clone());
    let mut sent = Vec::new();
    let mut watch_firings = 0;

    for (index, step) in script.steps.iter().enumerate() {
        debug!(index, step = ?step, "replay step");
        match step {
            ReplayStep::Server { payload } => {
                property.apply_server(payload)?;
            }
            ReplayStep::Set { target, value } => match target {
                Target::Index(i) => array_of(&property, index)?.set(*i, value.clone())?,
                Target::Key(key) => object_of(&property, index)?.set(key.as_str(), value.clone()),
            },
            ReplayStep::Push { value } => array_of(&property, index)?.push(value.clone()),
            ReplayStep::Insert { target, value } => array_of(&property, index)?.insert(*target, value.clone())?,
            ReplayStep::Remove { target } => match target {
                Target::Index(i) => {
                    array_of(&property, index)?.remove(*i)?;
                }
                Target::Key(key) => {
                    object_of(&property, index)?.remove(key);
                }
            },
            ReplayStep::Replace { value } => match value {
                Value::Array(items) => array_of(&property, index)?.replace_all(items.iter().cloned()),
                Value::Object(map) => object_of(&property, index)?.replace_all(map.clone()),
                other => {
                    return Err(SyncError::InvalidStep(format!(
                        "step {index}: replace needs an array or object, got {other}"
                    )))
                }
            },
            ReplayStep::Digest => watch_firings += scope.digest()?,
            ReplayStep::Send => sent.push(property.send()?),
        }
    }

    Ok(ReplayReport {
        value: property.value().to_json(),
        sent,
        watch_firings,
    })
}

fn array_of(property: &PropertySync, step: usize) -> Result<SyncArray> {
    property
        .value()
        .as_array()
        .cloned()
        .ok_or_else(|| SyncError::InvalidStep(format!("step {step}: property does not hold an array")))
}

fn object_of(property: &PropertySync, step: usize) -> Result<SyncObject> {
    property
        .value()
        .as_object()
        .cloned()
        .ok_or_else(|| SyncError::InvalidStep(format!("step {step}: property does not hold an object")))
}
