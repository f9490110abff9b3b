//! Onezone integration for workflow dumps.
//!
//! Lambda revision checksums stored in a workflow dump are computed by
//! Onezone. Once a dump has been edited, [`recalculate_checksums`] uploads
//! each revision to a scratch automation inventory, dumps it back, and patches
//! the checksum Onezone reports.
//!
//! ```no_run
//! use std::path::Path;
//! use imgaudit_onezone::{OnezoneClient, load_dump, recalculate_checksums, save_dump};
//!
//! # async fn example() -> imgaudit_onezone::Result<()> {
//! let client = OnezoneClient::builder().token("secret").build()?;
//! let path = Path::new("workflows/bagit-uploader.json");
//! let mut dump = load_dump(path)?;
//! if recalculate_checksums(&client, &mut dump).await?.changed() {
//!     save_dump(path, &dump)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod checksums;
pub mod client;
pub mod dump;
pub mod error;

pub use checksums::{
    ChecksumReport, DUMP_INVENTORY_NAME, RevisionChecksum, recalculate_checksums,
};
pub use client::{DEFAULT_DOMAIN, OnezoneClient, OnezoneClientBuilder};
pub use dump::{load_dump, save_dump, workflow_dump_path};
pub use error::{OnezoneError, Result};
