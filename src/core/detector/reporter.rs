//! Cycle reporting
//!
//! Turns an SCC of the wait-for graph into the stable diagnostic block
//! consumers parse, plus the structured [`DeadlockInfo`] delivered through
//! the callback channel. The walk starts at any thread vertex of the
//! component and repeatedly follows the unique outgoing arc that stays
//! inside the component; by bipartiteness the steps alternate thread and
//! lock, so the rendered lines alternate "waits" and "holds".
//!
//! The text builder is a pure function of the graph and the SCC slice: the
//! same cycle renders to the same block every time.

use crate::core::config::DEPTH_BACKTRACE;
use crate::core::graph::{VertexId, VertexInfo, WaitForGraph};
use crate::core::logger::diag_warn;
use crate::core::types::DeadlockInfo;
use chrono::Utc;
use fxhash::FxHashSet;
use std::fmt::Write as _;

/// SCC of exactly two vertices: one thread, one lock it both holds and
/// requests.
pub(crate) const CODE_SELF_LOCK: u32 = 1001;
/// Larger SCC: a lock-ordering cycle across threads.
pub(crate) const CODE_CROSS_THREAD: u32 = 1231;

/// Render `scc` into the diagnostic block and the structured report.
///
/// Returns `None` if the component does not walk like a well-formed cycle
/// (no thread vertex, a step without an in-component arc, or two vertices
/// of the same kind in a row); that means the graph is corrupted, and a
/// warning is emitted instead of a report.
pub(crate) fn report_cycle(
    graph: &WaitForGraph,
    scc: &[VertexId],
) -> Option<(String, DeadlockInfo)> {
    if scc.len() < 2 {
        return None;
    }

    let (code, headline) = if scc.len() == 2 {
        (CODE_SELF_LOCK, "Possible self-lock detected")
    } else {
        (CODE_CROSS_THREAD, "Unlocked mutex possibly held by other thread")
    };
    let prefix = format!("=={code}==");

    // membership set for O(1) "stays inside the component" checks
    let members: FxHashSet<VertexId> = scc.iter().copied().collect();

    let Some(start) = scc.iter().copied().find(|&v| graph[v].is_thread()) else {
        diag_warn!("cycle report: component of {} vertices has no thread", scc.len());
        return None;
    };

    let mut text = String::new();
    let _ = writeln!(text, "{prefix} [!!!Warning!!!] {headline}");

    let mut thread_cycle = Vec::new();
    let mut waiting_for = Vec::new();

    let mut cur = start;
    for _ in 0..scc.len() {
        let Some(next) = graph.out_neighbors(cur).find(|v| members.contains(v)) else {
            diag_warn!("cycle report: walk left the component; graph corrupted");
            return None;
        };

        match (&graph[cur].info, &graph[next].info) {
            (VertexInfo::Thread(ti), VertexInfo::Lock(li)) => {
                let _ = writeln!(text, "{prefix} Thread # [{} {}]:", ti.tid, ti.name_str());
                let _ = writeln!(
                    text,
                    "{prefix}   waits the lock #{:#x} [{}]",
                    li.mid,
                    frames(&ti.backtrace)
                );
                thread_cycle.push(ti.tid);
                waiting_for.push((ti.tid, li.mid));
            }
            (VertexInfo::Lock(li), VertexInfo::Thread(ti)) => {
                // the holder's backtrace gives the acquire site
                let _ = writeln!(
                    text,
                    "{prefix}   holds the lock #{:#x} [{}]",
                    li.mid,
                    frames(&ti.backtrace)
                );
            }
            _ => {
                diag_warn!("cycle report: walk broke bipartiteness; graph corrupted");
                return None;
            }
        }
        cur = next;
    }

    let info = DeadlockInfo {
        code,
        scc_size: scc.len(),
        thread_cycle,
        thread_waiting_for_locks: waiting_for,
        timestamp: Utc::now().to_rfc3339(),
    };
    Some((text, info))
}

fn frames(backtrace: &[usize; DEPTH_BACKTRACE]) -> String {
    backtrace
        .iter()
        .map(|f| format!("{f:#x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DetectorConfig;
    use crate::core::types::{LockInfo, ThreadInfo};

    fn test_graph() -> WaitForGraph {
        WaitForGraph::new(&DetectorConfig {
            max_threads: 8,
            max_locks: 8,
            ..DetectorConfig::default()
        })
    }

    fn named_thread(g: &mut WaitForGraph, tid: usize, name: &str) -> VertexId {
        let mut info = ThreadInfo::new(tid);
        info.set_name(name);
        g.add_vertex(VertexInfo::Thread(info)).unwrap()
    }

    fn lock(g: &mut WaitForGraph, mid: usize) -> VertexId {
        g.add_vertex(VertexInfo::Lock(LockInfo { mid })).unwrap()
    }

    #[test]
    fn self_lock_block_is_exact() {
        let mut g = test_graph();
        let t = named_thread(&mut g, 42, "worker");
        let l = lock(&mut g, 0xabc);
        g.add_edge(t, l).unwrap();
        g.add_edge(l, t).unwrap();

        let (text, info) = report_cycle(&g, &[t, l]).unwrap();

        let zeros = "0x0 0x0 0x0 0x0 0x0";
        let expected = format!(
            "==1001== [!!!Warning!!!] Possible self-lock detected\n\
             ==1001== Thread # [42 worker]:\n\
             ==1001==   waits the lock #0xabc [{zeros}]\n\
             ==1001==   holds the lock #0xabc [{zeros}]\n"
        );
        assert_eq!(text, expected);
        assert_eq!(info.code, CODE_SELF_LOCK);
        assert_eq!(info.thread_cycle, vec![42]);
        assert_eq!(info.thread_waiting_for_locks, vec![(42, 0xabc)]);
    }

    #[test]
    fn cross_thread_block_alternates_waits_and_holds() {
        let mut g = test_graph();
        let t1 = named_thread(&mut g, 1, "a");
        let t2 = named_thread(&mut g, 2, "b");
        let l1 = lock(&mut g, 0x10);
        let l2 = lock(&mut g, 0x20);

        g.add_edge(l1, t1).unwrap();
        g.add_edge(t1, l2).unwrap();
        g.add_edge(l2, t2).unwrap();
        g.add_edge(t2, l1).unwrap();

        let (text, info) = report_cycle(&g, &[t1, l2, t2, l1]).unwrap();

        assert!(text.starts_with(
            "==1231== [!!!Warning!!!] Unlocked mutex possibly held by other thread\n"
        ));
        assert_eq!(text.matches("waits the lock").count(), 2);
        assert_eq!(text.matches("holds the lock").count(), 2);
        assert_eq!(text.matches("Thread #").count(), 2);
        assert_eq!(info.code, CODE_CROSS_THREAD);
        assert_eq!(info.scc_size, 4);

        let mut threads = info.thread_cycle.clone();
        threads.sort_unstable();
        assert_eq!(threads, vec![1, 2]);
        assert!(info.thread_waiting_for_locks.contains(&(1, 0x20)));
        assert!(info.thread_waiting_for_locks.contains(&(2, 0x10)));
    }

    #[test]
    fn reporting_twice_is_idempotent() {
        let mut g = test_graph();
        let t = named_thread(&mut g, 7, "solo");
        let l = lock(&mut g, 0x99);
        g.add_edge(t, l).unwrap();
        g.add_edge(l, t).unwrap();

        let (first, _) = report_cycle(&g, &[t, l]).unwrap();
        let (second, _) = report_cycle(&g, &[t, l]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn component_without_thread_vertex_is_rejected() {
        let mut g = test_graph();
        let l1 = lock(&mut g, 0x10);
        let l2 = lock(&mut g, 0x20);
        // not a legal wait-for state, but the reporter must not loop on it
        g.add_edge(l1, l2).unwrap();
        g.add_edge(l2, l1).unwrap();

        assert!(report_cycle(&g, &[l1, l2]).is_none());
    }
}
