//! Foundry operations
//!
//! - `world`: world snapshot and client-side reads over it
//! - `documents`: `modifyDocument` update, create and delete
//! - `files`: upload over HTTP and directory browsing over the socket
//! - `compendium`: `manageCompendium` create and delete

mod compendium;
mod documents;
mod files;
mod world;

pub use documents::{DocumentOptions, create_operation, delete_operation, update_operation};
pub use files::{
    BrowseRequest, DEFAULT_IMAGE_EXTENSIONS, UploadOutcome, UploadSource, content_type_for,
    interpret_upload_response,
};
