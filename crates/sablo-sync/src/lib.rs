//! Client-side synchronization of server-driven component
//! properties.
//!
//! The server owns component state; the client mirrors it in
//! [`ClientValue`]s and pushes local edits back. Container properties
//! (`JSON_arr`, `JSON_obj`) are exchanged differentially: the server sends
//! versioned granular ops, the client answers with sparse per-element
//! updates or, after structural edits, with a full value and a bumped
//! version.
//!
//! Local edits are observed through an explicit [`Scope`]: nothing is
//! detected until [`Scope::digest`] runs.

// Wire vocabulary and metadata
pub mod constants;
pub mod conversion;
pub mod error;
pub mod policy;

// Values and observation
pub mod equal;
pub mod scope;
pub mod value;
mod notifier;
mod observer;
mod state;

// Converters
pub mod array;
pub mod converters;
pub mod object;
mod inbound;
mod outbound;

pub mod property;
pub mod replay;

pub use array::{ArrayConverter, GranularOp, SyncArray};
pub use conversion::ConversionInfo;
pub use converters::{ConverterRegistry, PropertyConverter};
pub use error::{Result, SyncError};
pub use object::{ObjectConverter, SyncObject};
pub use policy::PushPolicy;
pub use property::PropertySync;
pub use scope::{Scope, WatchHandle, DEFAULT_DIGEST_TTL};
pub use value::{ChangeNotifier, ClientValue, SmartValue};
