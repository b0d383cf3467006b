//! Repository traits.

pub mod chunks;
pub mod uploads;

pub use chunks::ChunkRepo;
pub use uploads::{FinalizeClaim, UploadRepo};
