//! Graph module for deadlock detection
//!
//! This module contains the graph machinery behind the detector:
//! - Wait-for graph: the bipartite thread↔lock graph maintained by the
//!   checker thread
//! - Tarjan scan: the strongly-connected-component search that turns
//!   wait-for cycles into reports

pub mod tarjan;
pub mod wait_for_graph;

pub use tarjan::SccScan;
pub use wait_for_graph::{ArcNode, GraphError, Vertex, VertexId, VertexInfo, WaitForGraph};
