//! Nearest-neighbor recommendations with self-exclusion.

use std::sync::Arc;

use tracing::{debug, instrument};

use paperdex_core::{defaults, PaperRepository, PaperSummary, Result, VectorIndex};

/// Resolves "papers like this one" from the vector index.
pub struct RecommendationResolver {
    papers: Arc<dyn PaperRepository>,
    vectors: Arc<dyn VectorIndex>,
}

impl RecommendationResolver {
    pub fn new(papers: Arc<dyn PaperRepository>, vectors: Arc<dyn VectorIndex>) -> Self {
        Self { papers, vectors }
    }

    /// Up to five papers nearest to the given one, closest first.
    ///
    /// An unindexed paper has no recommendations: the result is an empty
    /// list, not an error. Neighbors whose relational row is missing are
    /// silently dropped.
    #[instrument(skip(self), fields(subsystem = "search", component = "recommend", op = "recommend", paper_id = id))]
    pub async fn recommend(&self, id: &str) -> Result<Vec<PaperSummary>> {
        let vector = match self.vectors.get(id).await? {
            Some(v) => v,
            None => {
                debug!(paper_id = id, "Paper is unindexed, no recommendations");
                return Ok(vec![]);
            }
        };

        // Fetch one extra neighbor: the paper is always its own nearest.
        let neighbors = self
            .vectors
            .nearest(&vector, defaults::RECOMMEND_FETCH)
            .await?;

        let ids: Vec<String> = neighbors
            .into_iter()
            .map(|n| n.id)
            .filter(|n| n != id)
            .take(defaults::RECOMMEND_LIMIT)
            .collect();

        let summaries = self.papers.fetch_summaries(&ids).await?;
        debug!(
            paper_id = id,
            result_count = summaries.len(),
            "Recommendations resolved"
        );
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paperdex_core::{
        CandidateRecord, Error, ExtractedMetadata, ListPapersRequest, Neighbor, Paper,
        ProcessingState, Vector,
    };
    use std::collections::HashMap;

    struct FakePapers {
        known: Vec<String>,
    }

    #[async_trait]
    impl PaperRepository for FakePapers {
        async fn ensure_pending(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn mark_processing(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn store_extracted(
            &self,
            _id: &str,
            _authors: &[String],
            _meta: &ExtractedMetadata,
        ) -> Result<()> {
            Ok(())
        }
        async fn set_state(&self, _id: &str, _state: ProcessingState) -> Result<()> {
            Ok(())
        }
        async fn state_of(&self, _id: &str) -> Result<Option<ProcessingState>> {
            Ok(None)
        }
        async fn fetch(&self, id: &str) -> Result<Paper> {
            Err(Error::PaperNotFound(id.to_string()))
        }
        async fn list(&self, _req: ListPapersRequest) -> Result<(Vec<PaperSummary>, i64)> {
            Ok((vec![], 0))
        }
        async fn candidates(&self, _ids: &[String]) -> Result<Vec<CandidateRecord>> {
            Ok(vec![])
        }

        async fn fetch_summaries(&self, ids: &[String]) -> Result<Vec<PaperSummary>> {
            Ok(ids
                .iter()
                .filter(|id| self.known.contains(id))
                .map(|id| PaperSummary {
                    id: id.clone(),
                    title: format!("Title of {}", id),
                    authors: vec![],
                })
                .collect())
        }
    }

    struct FakeVectors {
        stored: HashMap<String, Vector>,
        neighbors: Vec<Neighbor>,
    }

    #[async_trait]
    impl VectorIndex for FakeVectors {
        async fn upsert(&self, _id: &str, _vector: &Vector) -> Result<()> {
            Ok(())
        }
        async fn get(&self, id: &str) -> Result<Option<Vector>> {
            Ok(self.stored.get(id).cloned())
        }
        async fn nearest(&self, _query: &Vector, k: usize) -> Result<Vec<Neighbor>> {
            Ok(self.neighbors.iter().take(k).cloned().collect())
        }
        async fn remove(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn neighbor(id: &str, distance: f64) -> Neighbor {
        Neighbor {
            id: id.to_string(),
            distance,
        }
    }

    fn resolver(known: &[&str], stored: &[&str], neighbors: Vec<Neighbor>) -> RecommendationResolver {
        RecommendationResolver::new(
            Arc::new(FakePapers {
                known: known.iter().map(|s| s.to_string()).collect(),
            }),
            Arc::new(FakeVectors {
                stored: stored
                    .iter()
                    .map(|s| (s.to_string(), Vector::from(vec![0.0, 0.0])))
                    .collect(),
                neighbors,
            }),
        )
    }

    #[tokio::test]
    async fn test_self_excluded_order_preserved() {
        // X's six nearest are [X, P1..P5]; the result is exactly [P1..P5].
        let neighbors = vec![
            neighbor("X", 0.0),
            neighbor("P1", 0.1),
            neighbor("P2", 0.2),
            neighbor("P3", 0.3),
            neighbor("P4", 0.4),
            neighbor("P5", 0.5),
        ];
        let resolver = resolver(&["P1", "P2", "P3", "P4", "P5"], &["X"], neighbors);

        let recs = resolver.recommend("X").await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3", "P4", "P5"]);
    }

    #[tokio::test]
    async fn test_unindexed_paper_is_empty_not_error() {
        let resolver = resolver(&[], &[], vec![]);
        let recs = resolver.recommend("never-ingested").await.unwrap();
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn test_missing_relational_rows_silently_dropped() {
        let neighbors = vec![
            neighbor("X", 0.0),
            neighbor("present", 0.1),
            neighbor("ghost", 0.2),
            neighbor("present2", 0.3),
        ];
        let resolver = resolver(&["present", "present2"], &["X"], neighbors);

        let recs = resolver.recommend("X").await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["present", "present2"]);
    }

    #[tokio::test]
    async fn test_self_not_in_neighbors_caps_at_limit() {
        // Degenerate index answer without the paper itself: still at most 5.
        let neighbors = (1..=6)
            .map(|i| neighbor(&format!("P{}", i), i as f64 / 10.0))
            .collect();
        let resolver = resolver(
            &["P1", "P2", "P3", "P4", "P5", "P6"],
            &["X"],
            neighbors,
        );

        let recs = resolver.recommend("X").await.unwrap();
        assert_eq!(recs.len(), 5);
        assert_eq!(recs[0].id, "P1");
        assert_eq!(recs[4].id, "P5");
    }
}
