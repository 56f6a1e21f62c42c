//! A single component property kept in sync with the server.

use std::cell::Cell;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::conversion::ConversionInfo;
use crate::converters::ConverterRegistry;
use crate::error::Result;
use crate::scope::Scope;
use crate::value::ClientValue;

/// Owns one property value, its conversion metadata and observation scope.
///
/// Smart values get a change notifier that raises the property's dirty flag,
/// so callers can tell when an outbound payload is due.
pub struct PropertySync {
    registry: Rc<ConverterRegistry>,
    conversion: Option<ConversionInfo>,
    scope: Option<Scope>,
    value: ClientValue,
    /// Value as last exchanged with the server.
    previous: Option<ClientValue>,
    dirty: Rc<Cell<bool>>,
}

impl PropertySync {
    pub fn new(registry: Rc<ConverterRegistry>, conversion: Option<ConversionInfo>) -> Self {
        Self {
            registry,
            conversion,
            scope: None,
            value: ClientValue::null(),
            previous: None,
            dirty: Rc::new(Cell::new(false)),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn value(&self) -> &ClientValue {
        &self.value
    }

    pub fn conversion(&self) -> Option<&ConversionInfo> {
        self.conversion.as_ref()
    }

    /// Whether a smart value reported changes since the last send.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Applies a server payload and returns the resulting value.
    pub fn apply_server(&mut self, payload: &Value) -> Result<&ClientValue> {
        let value = self.registry.convert_or_plain(
            payload,
            self.conversion.as_ref(),
            Some(&self.value),
            self.scope.as_ref(),
        )?;
        self.install(value);
        self.previous = Some(self.value.clone());
        Ok(&self.value)
    }

    /// Assigns a new value client-side. The next send carries it in full.
    pub fn set_value(&mut self, value: impl Into<ClientValue>) {
        let value = value.into();
        value.adopt_scope(self.scope.as_ref());
        self.install(value);
        self.dirty.set(true);
    }

    /// Serializes the current value for the server and clears the dirty flag.
    pub fn send(&mut self) -> Result<Value> {
        let conversion = self.conversion.clone().or_else(|| self.value.implied_conversion());
        let payload = self
            .registry
            .to_server_or_plain(&self.value, conversion.as_ref(), self.previous.as_ref())?;
        self.dirty.set(false);
        self.previous = Some(self.value.clone());
        trace!(payload = %payload, "property sent");
        Ok(payload)
    }

    /// Like [`PropertySync::send`], but only when something is pending.
    pub fn send_if_dirty(&mut self) -> Result<Option<Value>> {
        if !self.is_dirty() {
            return Ok(None);
        }
        self.send().map(Some)
    }

    /// Moves the value to another scope (or out of any).
    pub fn set_scope(&mut self, scope: Option<Scope>) {
        self.scope = scope;
        match &self.conversion {
            Some(info) => self.registry.update_scope(&self.value, info, self.scope.as_ref()),
            None => self.value.adopt_scope(self.scope.as_ref()),
        }
    }

    fn install(&mut self, value: ClientValue) {
        if let Some(smart) = value.as_smart() {
            let dirty = Rc::clone(&self.dirty);
            smart.set_change_notifier(Rc::new(move || dirty.set(true)));
        }
        self.value = value;
    }
}

impl std::fmt::Debug for PropertySync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySync")
            .field("conversion", &self.conversion)
            .field("value", &self.value)
            .field("dirty", &self.dirty.get())
            .finish()
    }
}
