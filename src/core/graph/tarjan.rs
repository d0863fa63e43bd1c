//! Strongly-connected-component search over the wait-for graph
//!
//! Tarjan's algorithm, iterative with an explicit frame stack so a large
//! vertex population can never exhaust the native stack. The scan is rooted
//! at the pending-request thread vertices, since only a thread currently
//! blocked on a lock can be part of a deadlock cycle, and SCCs are materialized
//! into a flat vertex buffer with a parallel per-SCC count array.
//!
//! All scratch state lives in [`SccScan`] and is reused across scans; after
//! each run only the vertices actually visited get their `dfn`/`low`/
//! `on_stack` fields cleared.

use crate::core::graph::wait_for_graph::{ArcId, VertexId, WaitForGraph};

#[derive(Clone, Copy)]
struct Frame {
    v: VertexId,
    /// Next arc to explore from `v`
    arc: Option<ArcId>,
}

pub struct SccScan {
    /// Tarjan's vertex stack
    stack: Vec<VertexId>,
    /// Explicit DFS frames
    frames: Vec<Frame>,
    /// Vertices visited this run, for the post-scan reset
    touched: Vec<VertexId>,
    /// Flat SCC output: vertices of SCC i occupy the slice described by
    /// `counts[i]`
    scc: Vec<VertexId>,
    counts: Vec<usize>,
    time: u32,
}

impl SccScan {
    pub fn new(vertex_capacity: usize) -> Self {
        SccScan {
            stack: Vec::with_capacity(vertex_capacity),
            frames: Vec::with_capacity(vertex_capacity),
            touched: Vec::with_capacity(vertex_capacity),
            scc: Vec::with_capacity(vertex_capacity),
            counts: Vec::with_capacity(vertex_capacity),
            time: 0,
        }
    }

    /// Run the scan from `roots`. Results stay valid until the next `run`.
    pub fn run(&mut self, graph: &mut WaitForGraph, roots: &[VertexId]) {
        self.scc.clear();
        self.counts.clear();
        self.time = 0;

        for &root in roots {
            if graph[root].dfn == 0 {
                self.visit(graph, root);
            }
        }

        // clear the Tarjan scratch on everything we visited
        for v in self.touched.drain(..) {
            let vertex = &mut graph[v];
            vertex.dfn = 0;
            vertex.low = 0;
            vertex.on_stack = false;
        }
    }

    /// Iterate the SCCs found by the last `run`.
    pub fn sccs(&self) -> impl Iterator<Item = &[VertexId]> {
        let mut offset = 0;
        self.counts.iter().map(move |&count| {
            let slice = &self.scc[offset..offset + count];
            offset += count;
            slice
        })
    }

    fn enter(&mut self, graph: &mut WaitForGraph, v: VertexId) {
        self.time += 1;
        let vertex = &mut graph[v];
        vertex.dfn = self.time;
        vertex.low = self.time;
        vertex.on_stack = true;
        self.stack.push(v);
        self.touched.push(v);
        self.frames.push(Frame {
            v,
            arc: vertex.arc_head,
        });
    }

    fn visit(&mut self, graph: &mut WaitForGraph, root: VertexId) {
        self.enter(graph, root);

        while !self.frames.is_empty() {
            let top = self.frames.len() - 1;
            let Frame { v: u, arc } = self.frames[top];

            if let Some(aid) = arc {
                let (w, next) = {
                    let a = graph.arc(aid);
                    (a.tail, a.next)
                };
                self.frames[top].arc = next;

                if graph[w].dfn == 0 {
                    self.enter(graph, w);
                } else if graph[w].on_stack {
                    let wd = graph[w].dfn;
                    let u_low = graph[u].low;
                    graph[u].low = u_low.min(wd);
                }
                continue;
            }

            // all arcs of u explored: retreat
            self.frames.pop();
            if let Some(parent) = self.frames.last() {
                let u_low = graph[u].low;
                let p = parent.v;
                let p_low = graph[p].low;
                graph[p].low = p_low.min(u_low);
            }

            if graph[u].low == graph[u].dfn {
                // u is the root of an SCC: pop the stack down to it
                let mut count = 0;
                while let Some(w) = self.stack.pop() {
                    graph[w].on_stack = false;
                    self.scc.push(w);
                    count += 1;
                    if w == u {
                        break;
                    }
                }
                self.counts.push(count);
            }
        }
    }
}
