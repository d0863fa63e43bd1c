//! Wait-For Graph for detecting active deadlocks
//!
//! A directed bipartite graph over thread and lock vertices. An arc
//! THREAD→LOCK means "this thread is blocked requesting this lock"; an arc
//! LOCK→THREAD means "this lock is currently held by this thread". A
//! wait-for cycle therefore alternates thread and lock vertices, and shows
//! up as a strongly connected component of size ≥ 2.
//!
//! Vertices and arcs live in fixed-capacity pools and reference each other
//! through integer handles; adjacency is a packed singly linked list of
//! arcs. Only the checker thread ever touches the graph, so none of this is
//! synchronized.
//!
//! # Invariants
//!
//! 1. Every arc is THREAD→LOCK or LOCK→THREAD.
//! 2. A thread vertex has at most one outgoing arc (a thread requests at
//!    most one lock at a time).
//! 3. A lock vertex has at most one outgoing arc in steady state; a
//!    cross-thread handoff can show a second owner arc until the previous
//!    owner's release drains.
//!
//! The graph itself only enforces arc uniqueness; 2 and 3 are the event
//! loop's contract.

use crate::core::config::DetectorConfig;
use crate::core::pool::Pool;
use crate::core::types::{LockInfo, ThreadInfo};
use std::ops::{Index, IndexMut};

/// Handle of a vertex in the vertex pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexId(pub(crate) u32);

/// Handle of an arc in the arc pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcId(pub(crate) u32);

/// Vertex payload: a thread or a lock
#[derive(Debug, Clone, Copy)]
pub enum VertexInfo {
    Thread(ThreadInfo),
    Lock(LockInfo),
}

/// A vertex of the wait-for graph.
///
/// `dfn`, `low` and `on_stack` are scratch fields owned by the Tarjan scan;
/// they are zero between scans.
#[derive(Debug)]
pub struct Vertex {
    pub info: VertexInfo,
    pub dfn: u32,
    pub low: u32,
    pub on_stack: bool,
    pub indeg: u32,
    pub outdeg: u32,
    pub arc_head: Option<ArcId>,
}

impl Vertex {
    fn new(info: VertexInfo) -> Self {
        Vertex {
            info,
            dfn: 0,
            low: 0,
            on_stack: false,
            indeg: 0,
            outdeg: 0,
            arc_head: None,
        }
    }

    pub fn is_thread(&self) -> bool {
        matches!(self.info, VertexInfo::Thread(_))
    }
}

/// Outgoing edge: `tail` is the vertex the edge points to
#[derive(Debug, Clone, Copy)]
pub struct ArcNode {
    pub tail: VertexId,
    pub next: Option<ArcId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphError {
    /// The requested edge already exists
    DuplicateArc,
    /// The requested edge does not exist
    MissingArc,
    /// The arc pool is exhausted (capacity misconfigured)
    ArcPoolExhausted,
    /// Vertex removal requested while edges still reference it
    VertexInUse,
}

pub struct WaitForGraph {
    vertices: Pool<Vertex>,
    arcs: Pool<ArcNode>,
}

impl WaitForGraph {
    pub fn new(config: &DetectorConfig) -> Self {
        WaitForGraph {
            vertices: Pool::new("vertex", config.vertex_capacity()),
            arcs: Pool::new("arc", config.arc_capacity()),
        }
    }

    /// Allocate a vertex. `None` means the vertex pool is exhausted; a
    /// usage dump has already been emitted.
    pub fn add_vertex(&mut self, info: VertexInfo) -> Option<VertexId> {
        match self.vertices.alloc(Vertex::new(info)) {
            Some(index) => Some(VertexId(index)),
            None => {
                self.vertices.dump();
                None
            }
        }
    }

    /// Release a vertex that no arc references anymore.
    pub fn remove_vertex(&mut self, id: VertexId) -> Result<(), GraphError> {
        let v = &self[id];
        if v.indeg != 0 || v.outdeg != 0 || v.arc_head.is_some() {
            return Err(GraphError::VertexInUse);
        }
        self.vertices.free(id.0);
        Ok(())
    }

    /// Add the edge `u → v`, keeping `v`'s degree bookkeeping in sync.
    pub fn add_edge(&mut self, u: VertexId, v: VertexId) -> Result<(), GraphError> {
        // From one vertex there is at most one arc to any other vertex.
        if self.out_neighbors(u).any(|t| t == v) {
            return Err(GraphError::DuplicateArc);
        }

        let head = self[u].arc_head;
        let Some(index) = self.arcs.alloc(ArcNode { tail: v, next: head }) else {
            self.arcs.dump();
            return Err(GraphError::ArcPoolExhausted);
        };

        self[u].arc_head = Some(ArcId(index));
        self[u].outdeg += 1;
        self[v].indeg += 1;
        Ok(())
    }

    /// Remove the edge `u → v`.
    pub fn remove_edge(&mut self, u: VertexId, v: VertexId) -> Result<(), GraphError> {
        // find the arc whose tail is v, tracking its predecessor
        let mut prev: Option<ArcId> = None;
        let mut cur = self[u].arc_head;
        while let Some(aid) = cur {
            let arc = self.arc(aid);
            if arc.tail == v {
                break;
            }
            prev = Some(aid);
            cur = arc.next;
        }

        let Some(aid) = cur else {
            return Err(GraphError::MissingArc);
        };

        let next = self.arc(aid).next;
        match prev {
            Some(p) => self.arc_mut(p).next = next,
            None => self[u].arc_head = next,
        }
        let _ = self.arcs.free(aid.0);

        self[u].outdeg -= 1;
        self[v].indeg -= 1;
        Ok(())
    }

    /// The tail of `u`'s most recently added outgoing arc.
    pub fn first_out(&self, u: VertexId) -> Option<VertexId> {
        self.out_neighbors(u).next()
    }

    /// Iterate the tails of `u`'s outgoing arcs in adjacency order.
    pub fn out_neighbors(&self, u: VertexId) -> OutNeighbors<'_> {
        OutNeighbors {
            graph: self,
            cur: self[u].arc_head,
        }
    }

    pub(crate) fn arc(&self, id: ArcId) -> &ArcNode {
        match self.arcs.get(id.0) {
            Some(arc) => arc,
            None => panic!("arc handle {:?} out of range", id),
        }
    }

    fn arc_mut(&mut self, id: ArcId) -> &mut ArcNode {
        match self.arcs.get_mut(id.0) {
            Some(arc) => arc,
            None => panic!("arc handle {:?} out of range", id),
        }
    }

    pub fn arcs_in_use(&self) -> usize {
        self.arcs.in_use()
    }

    /// Emit usage summaries of both pools.
    pub fn dump(&self) {
        self.vertices.dump();
        self.arcs.dump();
    }
}

impl Index<VertexId> for WaitForGraph {
    type Output = Vertex;

    fn index(&self, id: VertexId) -> &Vertex {
        match self.vertices.get(id.0) {
            Some(v) => v,
            None => panic!("vertex handle {:?} out of range", id),
        }
    }
}

impl IndexMut<VertexId> for WaitForGraph {
    fn index_mut(&mut self, id: VertexId) -> &mut Vertex {
        match self.vertices.get_mut(id.0) {
            Some(v) => v,
            None => panic!("vertex handle {:?} out of range", id),
        }
    }
}

pub struct OutNeighbors<'a> {
    graph: &'a WaitForGraph,
    cur: Option<ArcId>,
}

impl Iterator for OutNeighbors<'_> {
    type Item = VertexId;

    fn next(&mut self) -> Option<VertexId> {
        let aid = self.cur?;
        let arc = self.graph.arc(aid);
        self.cur = arc.next;
        Some(arc.tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_graph() -> WaitForGraph {
        WaitForGraph::new(&DetectorConfig {
            max_threads: 8,
            max_locks: 8,
            ..DetectorConfig::default()
        })
    }

    fn thread_vertex(g: &mut WaitForGraph, tid: usize) -> VertexId {
        g.add_vertex(VertexInfo::Thread(ThreadInfo::new(tid))).unwrap()
    }

    fn lock_vertex(g: &mut WaitForGraph, mid: usize) -> VertexId {
        g.add_vertex(VertexInfo::Lock(LockInfo { mid })).unwrap()
    }

    #[test]
    fn edges_update_degrees() {
        let mut g = test_graph();
        let t = thread_vertex(&mut g, 1);
        let l = lock_vertex(&mut g, 100);

        g.add_edge(t, l).unwrap();
        assert_eq!(g[t].outdeg, 1);
        assert_eq!(g[l].indeg, 1);
        assert_eq!(g.first_out(t), Some(l));

        g.remove_edge(t, l).unwrap();
        assert_eq!(g[t].outdeg, 0);
        assert_eq!(g[l].indeg, 0);
        assert_eq!(g.first_out(t), None);
        assert_eq!(g.arcs_in_use(), 0);
    }

    #[test]
    fn duplicate_and_missing_edges_are_errors() {
        let mut g = test_graph();
        let t = thread_vertex(&mut g, 1);
        let l = lock_vertex(&mut g, 100);

        g.add_edge(t, l).unwrap();
        assert_eq!(g.add_edge(t, l), Err(GraphError::DuplicateArc));
        assert_eq!(g.remove_edge(l, t), Err(GraphError::MissingArc));
    }

    #[test]
    fn adjacency_preserves_removal_of_middle_arc() {
        let mut g = test_graph();
        let l = lock_vertex(&mut g, 100);
        let t1 = thread_vertex(&mut g, 1);
        let t2 = thread_vertex(&mut g, 2);
        let t3 = thread_vertex(&mut g, 3);

        // Several incoming waiters on one lock vertex exercise the list walk
        g.add_edge(t1, l).unwrap();
        g.add_edge(t2, l).unwrap();
        g.add_edge(t3, l).unwrap();
        assert_eq!(g[l].indeg, 3);

        g.remove_edge(t2, l).unwrap();
        assert_eq!(g[l].indeg, 2);
        assert!(g.out_neighbors(t1).any(|v| v == l));
        assert!(g.out_neighbors(t3).any(|v| v == l));
        assert_eq!(g.first_out(t2), None);
    }

    #[test]
    fn vertex_removal_requires_zero_degrees() {
        let mut g = test_graph();
        let t = thread_vertex(&mut g, 1);
        let l = lock_vertex(&mut g, 100);

        g.add_edge(t, l).unwrap();
        assert_eq!(g.remove_vertex(t), Err(GraphError::VertexInUse));
        g.remove_edge(t, l).unwrap();
        assert_eq!(g.remove_vertex(t), Ok(()));
    }

    #[test]
    fn arc_pool_exhaustion_is_reported() {
        let mut g = WaitForGraph::new(&DetectorConfig {
            max_threads: 1, // arc capacity 2
            max_locks: 4,
            ..DetectorConfig::default()
        });
        let t = thread_vertex(&mut g, 1);
        let l1 = lock_vertex(&mut g, 100);
        let l2 = lock_vertex(&mut g, 200);
        let l3 = lock_vertex(&mut g, 300);

        g.add_edge(t, l1).unwrap();
        g.add_edge(t, l2).unwrap();
        assert_eq!(g.add_edge(t, l3), Err(GraphError::ArcPoolExhausted));
    }
}
