//! Intra-project import graph and circular dependency detection
//!
//! The graph is rebuilt per run from the parsed files and shared read-only
//! (behind an `Arc`) once built. Only relative specifiers (`./`, `../`)
//! become edges; bare package imports are ignored.

pub mod cycles;
pub mod resolver;

use crate::config::EngineConfig;
use crate::error::PipelineResult;
use crate::models::CircularDependency;
use crate::parsers::SourceUnit;
use globset::GlobSet;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Edge payload: where the import appears in the importing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportEdge {
    /// 1-based line of the import
    pub line: u32,
}

/// Directed graph from each file to the files it imports
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<PathBuf, ImportEdge>,
    index: HashMap<PathBuf, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parsed files. Edges into files matching `exclude` are dropped.
    pub fn build<'a>(units: impl IntoIterator<Item = &'a SourceUnit>, exclude: &GlobSet) -> Self {
        let units: Vec<&SourceUnit> = units.into_iter().collect();
        let known: HashSet<PathBuf> = units.iter().map(|u| u.path().to_path_buf()).collect();
        let mut graph = Self::new();

        for unit in &units {
            graph.add_file(unit.path());
        }

        let mut unresolved = 0usize;
        for unit in &units {
            for import in unit.imports().into_iter().filter(|i| i.is_relative()) {
                match resolver::resolve(unit.path(), &import.specifier, &known) {
                    Some(target) if exclude.is_match(&target) => {
                        debug!("Dropping import of excluded {}", target.display());
                    }
                    Some(target) => graph.add_import(unit.path(), &target, import.line),
                    None => unresolved += 1,
                }
            }
        }

        info!(
            "Dependency graph: {} files, {} imports ({} unresolved specifiers)",
            graph.node_count(),
            graph.edge_count(),
            unresolved
        );
        graph
    }

    /// Build from explicit `(from, to, line)` triples
    pub fn from_edges<P: Into<PathBuf>>(edges: impl IntoIterator<Item = (P, P, u32)>) -> Self {
        let mut graph = Self::new();
        for (from, to, line) in edges {
            let (from, to) = (from.into(), to.into());
            graph.add_import(&from, &to, line);
        }
        graph
    }

    pub fn add_file(&mut self, path: &Path) -> NodeIndex {
        if let Some(&idx) = self.index.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(path.to_path_buf());
        self.index.insert(path.to_path_buf(), idx);
        idx
    }

    /// Record that `from` imports `to`. Self imports and repeated edges are ignored.
    pub fn add_import(&mut self, from: &Path, to: &Path, line: u32) {
        if from == to {
            return;
        }
        let a = self.add_file(from);
        let b = self.add_file(to);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ImportEdge { line });
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All files, sorted
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = self.graph.node_weights().map(PathBuf::as_path).collect();
        files.sort();
        files
    }

    /// Files imported by `path`, sorted
    pub fn imports_of(&self, path: &Path) -> Vec<&Path> {
        let Some(&idx) = self.index.get(path) else {
            return Vec::new();
        };
        let mut out: Vec<&Path> = self
            .graph
            .edges(idx)
            .map(|e| self.graph[e.target()].as_path())
            .collect();
        out.sort();
        out
    }

    /// Line of the import of `to` in `from`
    pub fn import_line(&self, from: &Path, to: &Path) -> Option<u32> {
        let a = *self.index.get(from)?;
        let b = *self.index.get(to)?;
        self.graph.find_edge(a, b).map(|e| self.graph[e].line)
    }

    pub(crate) fn inner(&self) -> &DiGraph<PathBuf, ImportEdge> {
        &self.graph
    }
}

/// Graph plus the cycles found in it
#[derive(Debug, Clone, Default)]
pub struct DependencyReport {
    pub graph: Arc<DependencyGraph>,
    pub cycles: Vec<CircularDependency>,
    /// Start files whose search hit the depth limit
    pub unresolved: Vec<PathBuf>,
}

impl DependencyReport {
    pub fn build<'a>(
        units: impl IntoIterator<Item = &'a SourceUnit>,
        config: &EngineConfig,
    ) -> PipelineResult<Self> {
        let exclude = config.exclude_set()?;
        let graph = DependencyGraph::build(units, &exclude);
        Ok(Self::from_graph(graph, config.max_depth))
    }

    pub fn from_graph(graph: DependencyGraph, max_depth: usize) -> Self {
        let search = cycles::find_cycles(&graph, max_depth);
        if !search.cycles.is_empty() {
            info!("Found {} circular dependencies", search.cycles.len());
        }
        Self {
            graph: Arc::new(graph),
            cycles: search.cycles,
            unresolved: search.unresolved,
        }
    }
}
