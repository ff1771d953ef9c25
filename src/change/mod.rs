//! # Change Events
//!
//! Typed row changes decoded from trigger notifications.
//!
//! - **Event**: wire payload and the `Insert` / `Update` / `Delete` union
//! - **Decoder**: column → property renaming and the scalar update diff

pub mod decoder;
pub mod errors;
pub mod event;

pub use decoder::ChangeDecoder;
pub use errors::{ChangeError, ChangeResult};
pub use event::{
    ChangeEvent, ChangeKind, DeleteChange, InsertChange, RawNotification, Row, UpdateChange,
};
