pub mod crawl;
pub mod search;
pub mod stats;

pub use crawl::*;
pub use search::*;
pub use stats::*;
