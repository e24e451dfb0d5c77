pub mod fs;
pub mod traits;

pub use fs::FsRawStore;
pub use traits::RawStore;
