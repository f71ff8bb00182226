//! Embedding gateway
//!
//! Abstract text-to-vector capability used by the dense index at build time
//! and by the hybrid retriever at query time. The bundled implementation is
//! local (fastembed); anything satisfying `EmbeddingProvider` plugs in.

mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
