pub mod framer;
pub mod pipeline;
pub mod source;

pub use framer::Framer;
pub use pipeline::{IngestConfig, IngestionLoop, LoopState, LoopSummary};
pub use source::{ByteSource, SourceConnector};
