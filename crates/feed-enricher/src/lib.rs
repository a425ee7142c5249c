//! feed-enricher — capture a feed endpoint's payload, match its records to the
//! entries rendered in a document, and annotate each entry exactly once.

pub mod cache;
pub mod candidates;
pub mod config;
pub mod dom;
pub mod enricher;
pub mod index;
pub mod inject;
pub mod matching;
pub mod payload;
pub mod pipeline;
pub mod scheduler;
pub mod status;
pub mod transport;
pub mod triggers;
pub mod types;

pub use cache::{default_cache_dir, CacheRecord, DurableCache, FileCache, MemoryCache, DEFAULT_CACHE_KEY};
pub use config::EnricherConfig;
pub use dom::{Document, MutationRecord, NodeId};
pub use enricher::Enricher;
pub use index::{FeedItem, ItemIndex};
pub use matching::{resolve, MatchResult, MatchStrategy};
pub use payload::PayloadStore;
pub use pipeline::{run_pipeline, PipelineState};
pub use scheduler::{Debouncer, Phase, SchedulerHandle, SharedDocument};
pub use status::{StatusDisplay, StatusSnapshot, TracingStatus};
pub use transport::{
    CallbackTransport, HttpRequest, HttpResponse, InterceptingTransport, ReqwestTransport,
    Transport, TransportError,
};
pub use triggers::{NavigationKind, Trigger};
pub use types::*;
