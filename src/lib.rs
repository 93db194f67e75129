pub mod cursor;
pub mod codec;
pub mod header;
pub mod quirks;
pub mod block;
pub mod index;
pub mod bundle;
pub mod archive;
pub mod error;

pub use bundle::Bundle;
pub use codec::{CompressionType, CodecError, get_codec};
pub use header::{Header, UnityVersion};
pub use block::StorageBlockInfo;
pub use index::{BlocksAndDirectoryInfo, DirectoryInfo, EntryPath};
pub use error::{BundleError, ErrorKind, Result};
