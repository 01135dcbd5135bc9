//! Per-group clustering state (§3), grounded on the original system's
//! `memory_layer/cluster_manager/manager.py::ClusterState` (pure data,
//! updated by the `ClusterManager` pure-computation component in
//! `memoria-memory`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::embedding::Embedding;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub centroid: Embedding,
    pub count: u64,
    pub last_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterState {
    pub group_id: String,
    pub event_ids: Vec<String>,
    pub clusters: HashMap<String, Cluster>,
    pub event_to_cluster: HashMap<String, String>,
    pub next_cluster_index: u64,
}

impl ClusterState {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn allocate_cluster_id(&mut self) -> String {
        let id = format!("cluster_{:03}", self.next_cluster_index);
        self.next_cluster_index += 1;
        id
    }

    /// §8 P3: `count(cluster) == |{e : mapping[e] == cluster}|`.
    pub fn count_matches_membership(&self) -> bool {
        self.clusters.iter().all(|(id, c)| {
            let actual = self
                .event_to_cluster
                .values()
                .filter(|v| *v == id)
                .count() as u64;
            actual == c.count
        })
    }
}
