//! Protocol engine for the Roland/Boss GT-1000 family: schema-driven
//! address resolution, the SysEx frame codec, transaction correlation, the
//! editor-mode handshake, a typed effect model, and a periodically
//! refreshed state mirror. See [`facade::Gt1000`] for the entry point.

pub mod error;
pub mod facade;
pub mod handshake;
pub mod mirror;
pub mod model;
pub mod schema;
pub mod sysex;
pub mod transaction;
pub mod transport;

pub use error::{Error, Result};
pub use facade::Gt1000;
pub use handshake::Model;
pub use model::{Category, EffectModel, EffectView, Slider};
pub use mirror::MirrorSnapshot;
pub use schema::SchemaStore;
