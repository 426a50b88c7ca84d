//! Model persistence.
//!
//! - [`schema`]: on-disk types, independent of runtime types
//! - [`native`]: checksummed binary codec
//! - [`ArtifactStore`]: a directory of member files plus a manifest
//!
//! Single models can also be read and written directly with
//! [`TrainedModel::write_json`](crate::model::TrainedModel::write_json) and
//! [`TrainedModel::to_binary`](crate::model::TrainedModel::to_binary).

mod artifacts;
mod convert;
mod error;
pub mod native;
pub mod schema;

pub use artifacts::{ArtifactStore, MANIFEST_FILE};
pub use error::{ReadError, WriteError};
pub use native::{DeserializeError, SerializeError};
