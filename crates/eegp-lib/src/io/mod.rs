pub mod loader;
pub mod table;
pub mod upload;

pub use loader::{load_raw, signal_to_table};
pub use table::{Table, STIMULUS_COLUMN, TIMESTAMP_COLUMN};
pub use upload::{build_headset_table, UploadPayload};
