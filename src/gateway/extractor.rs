//! MetadataExtractor trait definition.
//!
//! Hosts that only need "bytes in, lines out" can depend on this trait
//! instead of the concrete gateway.

use async_trait::async_trait;

use super::{MetadataGateway, ResponseInfo, ResponseMetadata};
use crate::worker::{EngineResult, Mode};

/// Something that turns response bodies into metadata lines.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extract metadata from the body of `raw`.
    async fn extract(
        &self,
        raw: &[u8],
        metadata: &dyn ResponseMetadata,
        mode: Mode,
    ) -> EngineResult<Vec<String>>;

    /// Extract metadata from several responses.
    ///
    /// Default implementation runs the extractions concurrently with
    /// `join_all`. Results are returned in input order, one per response, so
    /// a failure in one does not hide the others.
    async fn extract_batch(
        &self,
        responses: &[(Vec<u8>, ResponseInfo)],
        mode: Mode,
    ) -> Vec<EngineResult<Vec<String>>> {
        let futures: Vec<_> = responses
            .iter()
            .map(|(raw, info)| self.extract(raw, info, mode))
            .collect();

        futures::future::join_all(futures).await
    }
}

#[async_trait]
impl MetadataExtractor for MetadataGateway {
    async fn extract(
        &self,
        raw: &[u8],
        metadata: &dyn ResponseMetadata,
        mode: Mode,
    ) -> EngineResult<Vec<String>> {
        MetadataGateway::extract(self, raw, metadata, mode).await
    }
}
