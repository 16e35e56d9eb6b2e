pub mod descriptor;
pub mod reader;
pub mod dpfs;
pub mod extract;
pub mod compare;

pub use reader::{resolve, ReaderContext, ResolveError};
pub use dpfs::{read_lvl4, read_lvl4_uncached, DpfsError, DuplexRegion, Lvl2Cache};
pub use extract::{extract_lvl4, ExtractError};
