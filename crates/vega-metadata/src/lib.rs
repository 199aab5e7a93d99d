//! Compiled-class metadata model and structural diff.
//!
//! The compiler front end hands the cache one [`ProtoData`] record per
//! compiled unit. The cache persists the serialized form as an opaque blob
//! and only re-decodes it to diff an old round's record against a new one;
//! [`compute_difference`] is that diff.

mod diff;
mod proto;

pub use diff::{compute_difference, ProtoDifference};
pub use proto::{ClassProtoData, PackageFacadeProtoData, ProtoData};

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata blob is corrupt: {0}")]
    CorruptBlob(#[from] bincode::Error),
}
