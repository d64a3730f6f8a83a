pub mod chunk;
pub mod datasource;
pub mod request;

pub use chunk::{ChunkMetadata, ContentChunk, ProcessedContent, SourceType};
pub use datasource::DataSourceStatus;
pub use request::{
    DocumentMetadata, ProcessRequest, ProcessResponse, ProcessStatus, ProcessingOptions, QaPair,
    SourceOutcome, SourceResult, TextContent, WebsiteUrl,
};
