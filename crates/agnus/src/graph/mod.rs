// crates/agnus/src/graph/mod.rs
// In-memory symbol dependency graph: adjacency, bounded BFS, blast radius,
// per-file invalidation, and durable snapshotting

pub mod types;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::Result;

pub use self::types::{BlastRadius, Edge, EdgeKind, EdgeTarget, Symbol, SymbolKind};

/// Snapshot wire format: symbols plus canonical (possibly name-targeted) edges.
/// All indices are rebuilt on load.
#[derive(Serialize, Deserialize)]
struct GraphSnapshot {
    symbols: Vec<Symbol>,
    edges: Vec<Edge>,
}

/// Per-(repo, branch) symbol graph.
///
/// Edges are kept in their extracted form (`EdgeTarget::Name` for call sites
/// captured as bare identifiers); `resolve_names` derives the resolved
/// adjacency maps from the name index. Keeping the canonical form means a
/// removed-and-reparsed file re-resolves cross-file references instead of
/// losing them.
#[derive(Default)]
pub struct SymbolGraph {
    symbols: HashMap<String, Symbol>,
    /// Canonical edges as extracted, in insertion order
    edges: Vec<Edge>,
    edge_set: HashSet<Edge>,
    /// Resolved adjacency, rebuilt by `resolve_names`
    out_edges: HashMap<String, Vec<Edge>>,
    in_edges: HashMap<String, Vec<Edge>>,
    /// Bare name -> ids sharing that name (resolves unqualified call sites)
    name_to_ids: HashMap<String, BTreeSet<String>>,
    /// File path -> ids declared in that file
    file_to_symbols: HashMap<String, BTreeSet<String>>,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Number of resolved edges (after the last `resolve_names`)
    pub fn edge_count(&self) -> usize {
        self.out_edges.values().map(|v| v.len()).sum()
    }

    pub fn get_symbol(&self, id: &str) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Ids of every symbol declared in `file_path`
    pub fn symbols_in_file(&self, file_path: &str) -> Vec<&Symbol> {
        self.file_to_symbols
            .get(file_path)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    /// Upsert a symbol by id, updating the name and file indices
    pub fn add_symbol(&mut self, symbol: Symbol) {
        if let Some(old) = self.symbols.get(&symbol.id) {
            // Re-parse of the same declaration: drop stale index entries first
            if old.name != symbol.name
                && let Some(ids) = self.name_to_ids.get_mut(&old.name)
            {
                ids.remove(&old.id);
            }
        }
        self.name_to_ids
            .entry(symbol.name.clone())
            .or_default()
            .insert(symbol.id.clone());
        self.file_to_symbols
            .entry(symbol.file_path.clone())
            .or_default()
            .insert(symbol.id.clone());
        self.symbols.insert(symbol.id.clone(), symbol);
    }

    /// Append an edge; exact duplicates are ignored
    pub fn add_edge(&mut self, edge: Edge) {
        if self.edge_set.contains(&edge) {
            return;
        }
        self.edge_set.insert(edge.clone());
        self.edges.push(edge);
    }

    /// Rebuild the resolved adjacency maps.
    ///
    /// Name-targeted edges expand to one resolved edge per id sharing the
    /// bare name; edges that resolve to nothing (or whose source symbol is
    /// gone) are simply absent from the resolved view. Called at the end of
    /// a full index and after each incremental batch.
    pub fn resolve_names(&mut self) {
        self.out_edges.clear();
        self.in_edges.clear();
        let mut seen: HashSet<(String, String, EdgeKind)> = HashSet::new();

        for edge in &self.edges {
            if !self.symbols.contains_key(&edge.from) {
                continue;
            }
            let targets: Vec<String> = match &edge.to {
                EdgeTarget::Id(id) => {
                    if self.symbols.contains_key(id) {
                        vec![id.clone()]
                    } else {
                        Vec::new()
                    }
                }
                EdgeTarget::Name(name) => self
                    .name_to_ids
                    .get(name)
                    .map(|ids| ids.iter().cloned().collect())
                    .unwrap_or_default(),
            };

            for to_id in targets {
                if !seen.insert((edge.from.clone(), to_id.clone(), edge.kind)) {
                    continue;
                }
                let resolved = Edge::resolved(edge.from.clone(), to_id.clone(), edge.kind);
                self.out_edges
                    .entry(edge.from.clone())
                    .or_default()
                    .push(resolved.clone());
                self.in_edges.entry(to_id).or_default().push(resolved);
            }
        }
    }

    /// Remove every symbol declared in `file_path` along with its outgoing
    /// edges. Name-targeted edges from other files survive and simply stop
    /// resolving until the file reappears.
    pub fn remove_file(&mut self, file_path: &str) {
        let Some(ids) = self.file_to_symbols.remove(file_path) else {
            return;
        };

        for id in &ids {
            if let Some(symbol) = self.symbols.remove(id)
                && let Some(named) = self.name_to_ids.get_mut(&symbol.name)
            {
                named.remove(id);
                if named.is_empty() {
                    self.name_to_ids.remove(&symbol.name);
                }
            }
        }

        // Drop canonical edges originating in the removed file, and resolved
        // edges explicitly pinned to a removed id
        self.edges.retain(|e| {
            let keep = !ids.contains(&e.from)
                && !matches!(&e.to, EdgeTarget::Id(id) if ids.contains(id));
            if !keep {
                self.edge_set.remove(e);
            }
            keep
        });

        // Prune the resolved views so reads between batches stay consistent
        for id in &ids {
            self.out_edges.remove(id);
            self.in_edges.remove(id);
        }
        for edges in self.out_edges.values_mut() {
            edges.retain(|e| !matches!(&e.to, EdgeTarget::Id(id) if ids.contains(id)));
        }
        for edges in self.in_edges.values_mut() {
            edges.retain(|e| !ids.contains(&e.from));
        }
    }

    /// Symbols reachable within `hops` inbound hops of `id`, in discovery
    /// order, excluding the seed. Zero hops or an unknown seed yield nothing.
    pub fn get_callers(&self, id: &str, hops: u32) -> Vec<&Symbol> {
        self.bfs(id, hops, &self.in_edges, |e| &e.from)
    }

    /// Symbols reachable within `hops` outbound hops of `id`
    pub fn get_callees(&self, id: &str, hops: u32) -> Vec<&Symbol> {
        self.bfs(id, hops, &self.out_edges, |e| match &e.to {
            EdgeTarget::Id(to) => to,
            EdgeTarget::Name(name) => name,
        })
    }

    fn bfs<'a>(
        &'a self,
        seed: &str,
        hops: u32,
        adjacency: &'a HashMap<String, Vec<Edge>>,
        next: impl Fn(&'a Edge) -> &'a String,
    ) -> Vec<&'a Symbol> {
        if hops == 0 || !self.symbols.contains_key(seed) {
            return Vec::new();
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, u32)> = VecDeque::new();
        let mut result = Vec::new();

        visited.insert(seed);
        queue.push_back((seed, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= hops {
                continue;
            }
            let Some(edges) = adjacency.get(current) else {
                continue;
            };
            for edge in edges {
                let neighbor = next(edge).as_str();
                if visited.contains(neighbor) {
                    continue;
                }
                visited.insert(neighbor);
                if let Some(symbol) = self.symbols.get(neighbor) {
                    result.push(symbol);
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        result
    }

    /// Minimum hop distance from any of `seeds` to `target`, following edges
    /// in either direction, capped at `cap` when no path exists within
    /// `max_hops`.
    pub fn min_distance(&self, seeds: &HashSet<String>, target: &str, max_hops: u32, cap: u32) -> u32 {
        if seeds.contains(target) {
            return 0;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, u32)> = VecDeque::new();
        for seed in seeds {
            visited.insert(seed.as_str());
            queue.push_back((seed.as_str(), 0));
        }

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            let outgoing = self.out_edges.get(current).into_iter().flatten();
            let incoming = self.in_edges.get(current).into_iter().flatten();
            for edge in outgoing.chain(incoming) {
                let neighbor: &str = if edge.from == current {
                    edge.to.as_str()
                } else {
                    edge.from.as_str()
                };
                if visited.contains(neighbor) {
                    continue;
                }
                visited.insert(neighbor);
                if neighbor == target {
                    return depth + 1;
                }
                queue.push_back((neighbor, depth + 1));
            }
        }

        cap
    }

    /// Direct (1 hop) and transitive (2 hop) callers of the changed symbols,
    /// their files, and a risk score.
    pub fn blast_radius(&self, changed_ids: &[String]) -> BlastRadius {
        let seed_set: HashSet<&str> = changed_ids.iter().map(|s| s.as_str()).collect();

        let mut direct: Vec<&Symbol> = Vec::new();
        let mut direct_ids: HashSet<&str> = HashSet::new();
        let mut within_two: Vec<&Symbol> = Vec::new();
        let mut within_two_ids: HashSet<&str> = HashSet::new();

        for id in changed_ids {
            for caller in self.get_callers(id, 1) {
                if !seed_set.contains(caller.id.as_str()) && direct_ids.insert(&caller.id) {
                    direct.push(caller);
                }
            }
            for caller in self.get_callers(id, 2) {
                if !seed_set.contains(caller.id.as_str()) && within_two_ids.insert(&caller.id) {
                    within_two.push(caller);
                }
            }
        }

        let transitive: Vec<&Symbol> = within_two
            .into_iter()
            .filter(|s| !direct_ids.contains(s.id.as_str()))
            .collect();

        let mut affected_files: Vec<String> = Vec::new();
        let mut seen_files: HashSet<&str> = HashSet::new();
        for symbol in direct.iter().chain(transitive.iter()) {
            if seen_files.insert(symbol.file_path.as_str()) {
                affected_files.push(symbol.file_path.clone());
            }
        }

        let mut score = (10 * direct.len() + 5 * affected_files.len()) as f64;
        if affected_files.len() > 5 {
            score *= 1.5;
        }
        let risk_score = (score as u32).min(100);

        BlastRadius {
            direct_callers: direct.into_iter().cloned().collect(),
            transitive_callers: transitive.into_iter().cloned().collect(),
            affected_files,
            risk_score,
        }
    }

    /// Serialize the graph as stable JSON: symbols sorted by id, canonical
    /// edges sorted, indices implied.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut symbols: Vec<Symbol> = self.symbols.values().cloned().collect();
        symbols.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges = self.edges.clone();
        edges.sort();
        let snapshot = GraphSnapshot { symbols, edges };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Rebuild a graph from a snapshot, including the resolved adjacency
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let snapshot: GraphSnapshot = serde_json::from_slice(bytes)?;
        let mut graph = Self::new();
        for symbol in snapshot.symbols {
            graph.add_symbol(symbol);
        }
        for edge in snapshot.edges {
            graph.add_edge(edge);
        }
        graph.resolve_names();
        Ok(graph)
    }
}
