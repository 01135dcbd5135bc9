//! C10 — Cluster Manager (§4.5). A pure computation: given the
//! current `ClusterState` for a group and a freshly promoted
//! `MemCell`, decides which cluster it joins (or starts a new one)
//! and returns the updated state. No store dependency — the caller
//! (the Memorize Worker, C12) owns loading and persisting
//! `ClusterState` via C3, same split as the Segmentation Engine (C8).

use memoria_config::ClusteringConfig;
use memoria_core::types::{Cluster, ClusterState, Embedding, MemCell};

pub struct ClusterAssignment {
    pub cluster_id: String,
    pub state: ClusterState,
    /// Set when the embedding was zero/unusable and a singleton
    /// cluster was created as a fallback (§4.5 degenerate case).
    pub degenerate: bool,
}

pub struct ClusterManager {
    config: ClusteringConfig,
}

impl ClusterManager {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Assigns `cell` to the best matching cluster in `state` (or
    /// starts a new one), returning the updated state. `state` is
    /// consumed and rebuilt rather than mutated in place so the
    /// caller always holds a fresh, self-consistent snapshot.
    pub fn assign(&self, mut state: ClusterState, cell: &MemCell) -> ClusterAssignment {
        if cell.embedding.is_zero() {
            return self.start_new_cluster(state, cell, true);
        }

        let best = state
            .clusters
            .iter()
            .filter(|(_, c)| {
                let gap = (cell.timestamp - c.last_timestamp).num_seconds().abs();
                gap <= self.config.time_gap_secs
            })
            .map(|(id, c)| (id.clone(), cell.embedding.cosine(&c.centroid), c.last_timestamp))
            .filter(|(_, sim, _)| *sim >= self.config.similarity_threshold)
            .max_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.2.cmp(&b.2))
            });

        let Some((cluster_id, _, _)) = best else {
            return self.start_new_cluster(state, cell, false);
        };

        let cluster = state.clusters.get_mut(&cluster_id).expect("best came from state.clusters");
        cluster.centroid = running_mean(&cluster.centroid, cluster.count, &cell.embedding);
        cluster.count += 1;
        cluster.last_timestamp = cluster.last_timestamp.max(cell.timestamp);

        state.event_ids.push(cell.event_id.clone());
        state.event_to_cluster.insert(cell.event_id.clone(), cluster_id.clone());

        ClusterAssignment {
            cluster_id,
            state,
            degenerate: false,
        }
    }

    fn start_new_cluster(&self, mut state: ClusterState, cell: &MemCell, degenerate: bool) -> ClusterAssignment {
        let cluster_id = state.allocate_cluster_id();
        state.clusters.insert(
            cluster_id.clone(),
            Cluster {
                cluster_id: cluster_id.clone(),
                centroid: cell.embedding.clone(),
                count: 1,
                last_timestamp: cell.timestamp,
            },
        );
        state.event_ids.push(cell.event_id.clone());
        state.event_to_cluster.insert(cell.event_id.clone(), cluster_id.clone());

        ClusterAssignment {
            cluster_id,
            state,
            degenerate,
        }
    }
}

/// `(centroid * count + new) / (count + 1)`.
fn running_mean(centroid: &Embedding, count: u64, new: &Embedding) -> Embedding {
    if centroid.dim() != new.dim() || centroid.dim() == 0 {
        return new.clone();
    }
    let n = count as f32;
    let values = centroid
        .values
        .iter()
        .zip(new.values.iter())
        .map(|(c, v)| (c * n + v) / (n + 1.0))
        .collect();
    Embedding::new(centroid.model_id.clone(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn cell(event_id: &str, embedding: Vec<f32>, timestamp: chrono::DateTime<Utc>) -> MemCell {
        let now = Utc::now();
        MemCell {
            event_id: event_id.to_string(),
            group_id: Some("g1".to_string()),
            user_id: None,
            participants: BTreeSet::new(),
            timestamp,
            subject: "s".to_string(),
            summary: "s".to_string(),
            episode: "e".to_string(),
            original_data: Vec::new(),
            embedding: Embedding::new("m", embedding),
            r#type: "episode".to_string(),
            keywords: Vec::new(),
            linked_entities: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn first_event_starts_a_new_cluster() {
        let manager = ClusterManager::new(ClusteringConfig::default());
        let state = ClusterState::new("g1");
        let now = Utc::now();

        let assignment = manager.assign(state, &cell("e1", vec![1.0, 0.0], now));
        assert_eq!(assignment.cluster_id, "cluster_000");
        assert_eq!(assignment.state.clusters.len(), 1);
        assert!(!assignment.degenerate);
    }

    #[test]
    fn similar_nearby_event_joins_existing_cluster_and_updates_centroid() {
        let manager = ClusterManager::new(ClusteringConfig::default());
        let now = Utc::now();
        let state = ClusterState::new("g1");
        let first = manager.assign(state, &cell("e1", vec![1.0, 0.0], now));

        let second = manager.assign(first.state, &cell("e2", vec![1.0, 0.0], now + Duration::seconds(10)));
        assert_eq!(second.cluster_id, "cluster_000");
        assert_eq!(second.state.clusters.len(), 1);
        assert_eq!(second.state.clusters["cluster_000"].count, 2);
        assert!(second.state.count_matches_membership());
    }

    #[test]
    fn dissimilar_event_starts_a_second_cluster() {
        let manager = ClusterManager::new(ClusteringConfig::default());
        let now = Utc::now();
        let state = ClusterState::new("g1");
        let first = manager.assign(state, &cell("e1", vec![1.0, 0.0], now));

        let second = manager.assign(first.state, &cell("e2", vec![0.0, 1.0], now + Duration::seconds(10)));
        assert_eq!(second.cluster_id, "cluster_001");
        assert_eq!(second.state.clusters.len(), 2);
    }

    #[test]
    fn stale_cluster_beyond_time_gap_is_skipped() {
        let config = ClusteringConfig {
            time_gap_secs: 60,
            ..ClusteringConfig::default()
        };
        let manager = ClusterManager::new(config);
        let now = Utc::now();
        let state = ClusterState::new("g1");
        let first = manager.assign(state, &cell("e1", vec![1.0, 0.0], now));

        let second = manager.assign(first.state, &cell("e2", vec![1.0, 0.0], now + Duration::seconds(120)));
        assert_eq!(second.cluster_id, "cluster_001");
    }

    #[test]
    fn zero_embedding_creates_degenerate_singleton_cluster() {
        let manager = ClusterManager::new(ClusteringConfig::default());
        let state = ClusterState::new("g1");
        let assignment = manager.assign(state, &cell("e1", vec![0.0, 0.0], Utc::now()));
        assert!(assignment.degenerate);
        assert_eq!(assignment.state.clusters.len(), 1);
    }
}
