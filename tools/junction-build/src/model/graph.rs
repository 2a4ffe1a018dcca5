//! Street/transit vertex and edge store
//!
//! Vertices and edges are keyed by stable ids so stages can remove parts of
//! the graph (island pruning) without invalidating references elsewhere.
//! Adjacency and the label index are derived and rebuilt after loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::geo::{build_index, BBox, PointIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VertexKind {
    Street,
    /// OSM platform or stop position carrying `ref` values
    BoardingLocation { refs: Vec<String> },
    TransitStop { stop_id: String },
    BikeRental { name: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub label: String,
    pub kind: VertexKind,
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdgeKind {
    Street { way_id: i64, name: Option<String> },
    /// Connects a stop, boarding location or rental station to the network
    Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: VertexId,
    pub to: VertexId,
    pub kind: EdgeKind,
    pub length_m: f64,
    pub climb_m: Option<f64>,
    pub descent_m: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overlay: BTreeMap<String, f64>,
}

impl Edge {
    pub fn is_street(&self) -> bool {
        matches!(self.kind, EdgeKind::Street { .. })
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, EdgeKind::Link)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Graph {
    vertices: BTreeMap<u32, Vertex>,
    edges: BTreeMap<u32, Edge>,
    has_streets: bool,
    next_vertex: u32,
    next_edge: u32,
    #[serde(skip)]
    labels: HashMap<String, VertexId>,
    #[serde(skip)]
    outgoing: HashMap<VertexId, Vec<EdgeId>>,
    #[serde(skip)]
    incoming: HashMap<VertexId, Vec<EdgeId>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, or return the existing one with the same label
    pub fn add_vertex(&mut self, label: impl Into<String>, kind: VertexKind, lat: f64, lon: f64) -> VertexId {
        let label = label.into();
        if let Some(&id) = self.labels.get(&label) {
            return id;
        }
        let id = VertexId(self.next_vertex);
        self.next_vertex += 1;
        self.labels.insert(label.clone(), id);
        self.vertices.insert(
            id.0,
            Vertex {
                id,
                label,
                kind,
                lat,
                lon,
                elevation: None,
            },
        );
        id
    }

    /// Add an edge between two existing vertices
    pub fn add_edge(&mut self, from: VertexId, to: VertexId, kind: EdgeKind, length_m: f64) -> Option<EdgeId> {
        if !self.vertices.contains_key(&from.0) || !self.vertices.contains_key(&to.0) {
            return None;
        }
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(
            id.0,
            Edge {
                id,
                from,
                to,
                kind,
                length_m,
                climb_m: None,
                descent_m: None,
                overlay: BTreeMap::new(),
            },
        );
        self.outgoing.entry(from).or_default().push(id);
        self.incoming.entry(to).or_default().push(id);
        Some(id)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id.0)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.get_mut(&id.0)
    }

    pub fn vertex_by_label(&self, label: &str) -> Option<VertexId> {
        self.labels.get(label).copied()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn vertices_mut(&mut self) -> impl Iterator<Item = &mut Vertex> {
        self.vertices.values_mut()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id.0)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(&id.0)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.edges.values_mut()
    }

    pub fn outgoing(&self, id: VertexId) -> &[EdgeId] {
        self.outgoing.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incoming(&self, id: VertexId) -> &[EdgeId] {
        self.incoming.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outgoing then incoming edges of a vertex
    pub fn incident_edges(&self, id: VertexId) -> impl Iterator<Item = &Edge> {
        self.outgoing(id)
            .iter()
            .chain(self.incoming(id))
            .filter_map(|e| self.edge(*e))
    }

    pub fn has_street_edge(&self, id: VertexId) -> bool {
        self.incident_edges(id).any(Edge::is_street)
    }

    /// True when the vertex is on a street or reaches one through link edges
    pub fn is_connected_to_streets(&self, id: VertexId) -> bool {
        let mut seen = vec![id];
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if self.has_street_edge(current) {
                return true;
            }
            for edge in self.incident_edges(current).filter(|e| e.is_link()) {
                let other = if edge.from == current { edge.to } else { edge.from };
                if !seen.contains(&other) {
                    seen.push(other);
                    pending.push(other);
                }
            }
        }
        false
    }

    /// Add a pair of link edges between two vertices
    pub fn link(&mut self, a: VertexId, b: VertexId, length_m: f64) -> bool {
        self.add_edge(a, b, EdgeKind::Link, length_m).is_some()
            && self.add_edge(b, a, EdgeKind::Link, length_m).is_some()
    }

    /// Remove a vertex and every edge touching it
    pub fn remove_vertex(&mut self, id: VertexId) -> bool {
        let Some(vertex) = self.vertices.remove(&id.0) else {
            return false;
        };
        self.labels.remove(&vertex.label);
        let mut incident: Vec<EdgeId> = self.outgoing.remove(&id).unwrap_or_default();
        incident.extend(self.incoming.remove(&id).unwrap_or_default());
        for edge_id in incident {
            self.remove_edge(edge_id);
        }
        true
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        let Some(edge) = self.edges.remove(&id.0) else {
            return false;
        };
        if let Some(out) = self.outgoing.get_mut(&edge.from) {
            out.retain(|e| *e != id);
        }
        if let Some(inc) = self.incoming.get_mut(&edge.to) {
            inc.retain(|e| *e != id);
        }
        true
    }

    pub fn has_streets(&self) -> bool {
        self.has_streets
    }

    pub fn set_has_streets(&mut self, has_streets: bool) {
        self.has_streets = has_streets;
    }

    pub fn count_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn count_edges(&self) -> usize {
        self.edges.len()
    }

    /// Vertices touched by at least one street edge
    pub fn street_vertex_ids(&self) -> Vec<VertexId> {
        let mut ids: Vec<VertexId> = self
            .edges
            .values()
            .filter(|e| e.is_street())
            .flat_map(|e| [e.from, e.to])
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// R-tree over the street vertices
    pub fn street_index(&self) -> PointIndex {
        let points: Vec<(u32, f64, f64)> = self
            .street_vertex_ids()
            .into_iter()
            .filter_map(|id| self.vertex(id))
            .map(|v| (v.id.0, v.lat, v.lon))
            .collect();
        build_index(points)
    }

    pub fn bbox(&self) -> Option<BBox> {
        let mut vertices = self.vertices.values();
        let first = vertices.next()?;
        let mut bbox = BBox::around(first.lat, first.lon);
        for v in vertices {
            bbox.extend(v.lat, v.lon);
        }
        Some(bbox)
    }

    /// Weakly connected components over all edges, largest first.
    ///
    /// Every vertex appears in exactly one component; vertices without edges
    /// form singleton components.
    pub fn connected_components(&self) -> Vec<Vec<VertexId>> {
        let ids: Vec<u32> = self.vertices.keys().copied().collect();
        let position: HashMap<u32, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut parent: Vec<usize> = (0..ids.len()).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for edge in self.edges.values() {
            if let (Some(&a), Some(&b)) = (position.get(&edge.from.0), position.get(&edge.to.0)) {
                let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                if ra != rb {
                    parent[ra.max(rb)] = ra.min(rb);
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<VertexId>> = BTreeMap::new();
        for (i, id) in ids.iter().enumerate() {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().push(VertexId(*id));
        }

        let mut components: Vec<Vec<VertexId>> = groups.into_values().collect();
        components.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
        components
    }

    /// Recompute adjacency and the label index from the stored vertices and edges
    pub fn rebuild_indexes(&mut self) {
        self.labels = self.vertices.values().map(|v| (v.label.clone(), v.id)).collect();
        self.outgoing.clear();
        self.incoming.clear();
        for edge in self.edges.values() {
            self.outgoing.entry(edge.from).or_default().push(edge.id);
            self.incoming.entry(edge.to).or_default().push(edge.id);
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut graph: Graph = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        graph.rebuild_indexes();
        Ok(graph)
    }
}
