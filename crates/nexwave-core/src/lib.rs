//! nexwave-core — Find an attendee's event photos from a selfie.
//!
//! Matches query face embeddings against precomputed per-photo embeddings
//! using Euclidean distance, multi-angle corroboration, and a ranked
//! confidence score. Face detection and embedding are external.

pub mod distance;
pub mod indexer;
pub mod matcher;
pub mod policy;
pub mod scoring;
pub mod search;
pub mod store;
pub mod types;

pub use indexer::{EventIndexer, EventPhoto, IndexProgress, IndexSummary};
pub use matcher::{match_faces, FaceMatcher, MatchError, MatchOptions, Matcher};
pub use policy::{MatchPolicy, PolicyError};
pub use search::{collect_query_faces, EmbeddingOracle, OracleError, SearchError, SelfieSearch};
pub use store::{
    load_corpus_file, CorpusStore, CorpusWriter, JsonCorpusStore, MemoryCorpusStore, StoreError,
};
pub use types::{
    BoundingBox, CorpusPhoto, DescriptorError, DetectedFace, FaceDescriptor, MatchCandidate,
    MatchResult, QueryFace,
};
