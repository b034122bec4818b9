//! Transformation ordering and same-file conflict resolution

use crate::config::EngineConfig;
use crate::models::{Category, Transformation};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// A candidate removed during conflict resolution
#[derive(Debug, Clone, Serialize)]
pub struct DroppedTransformation {
    pub transformation: Transformation,
    pub reason: String,
    /// The kept transformation it overlapped
    pub conflicts_with: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolution {
    pub kept: Vec<Transformation>,
    pub dropped: Vec<DroppedTransformation>,
}

#[derive(Debug, Clone)]
pub struct Prioritizer {
    type_priority: Vec<Category>,
    min_confidence: f64,
}

impl Prioritizer {
    pub fn new(type_priority: Vec<Category>, min_confidence: f64) -> Self {
        Self {
            type_priority,
            min_confidence,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.type_priority_order.clone(), config.confidence_threshold)
    }

    fn category_rank(&self, category: Category) -> usize {
        self.type_priority
            .iter()
            .position(|c| *c == category)
            .unwrap_or(self.type_priority.len())
    }

    /// Total order: severity, category priority, confidence (desc), then path and offset
    pub fn compare(&self, a: &Transformation, b: &Transformation) -> Ordering {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then_with(|| self.category_rank(a.category).cmp(&self.category_rank(b.category)))
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.original.start.cmp(&b.original.start))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Drop candidates below the confidence threshold and sort the rest
    pub fn prioritize(&self, candidates: Vec<Transformation>) -> Vec<Transformation> {
        let mut ordered: Vec<Transformation> = candidates
            .into_iter()
            .filter(|t| t.confidence >= self.min_confidence)
            .collect();
        ordered.sort_by(|a, b| self.compare(a, b));
        ordered
    }

    /// Walk an ordered list and drop any candidate overlapping an already kept one in the same file
    pub fn resolve_conflicts(&self, ordered: Vec<Transformation>) -> ConflictResolution {
        let mut kept_ranges: HashMap<PathBuf, Vec<(crate::models::TextRange, String)>> = HashMap::new();
        let mut out = ConflictResolution::default();

        for t in ordered {
            let ranges = kept_ranges.entry(t.file_path.clone()).or_default();
            let range = t.range();
            if let Some((_, winner)) = ranges.iter().find(|(r, _)| r.overlaps(&range)) {
                debug!("Dropping {} in {}: overlaps {}", t.id, t.file_path.display(), winner);
                out.dropped.push(DroppedTransformation {
                    reason: format!("overlaps higher-priority transformation {}", winner),
                    conflicts_with: winner.clone(),
                    transformation: t,
                });
                continue;
            }
            ranges.push((range, t.id.clone()));
            out.kept.push(t);
        }
        out
    }

    /// `prioritize` followed by `resolve_conflicts`
    pub fn plan(&self, candidates: Vec<Transformation>) -> ConflictResolution {
        self.resolve_conflicts(self.prioritize(candidates))
    }
}
