//! Object storage domain module

mod locator;

pub use locator::{StorageLocator, UPLOAD_ROOT};
