pub mod cursors;
pub mod error;
pub mod records;

pub use cursors::CursorStore;
pub use error::{Result, StoreError};
pub use records::RecordStore;
