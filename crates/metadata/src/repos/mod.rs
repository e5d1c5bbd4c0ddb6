//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod files;
pub mod folders;
pub mod tokens;
pub mod uploads;

pub use bootstrap::BootstrapRepo;
pub use files::FileRepo;
pub use folders::{FolderRepo, TagRepo};
pub use tokens::{TokenRepo, UserRepo};
pub use uploads::UploadRepo;
