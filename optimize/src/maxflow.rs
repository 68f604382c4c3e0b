//! s-t max-flow / min-cut on a graph with terminal weights.
//!
//! Nodes are added up front; every node may carry a capacity from the source
//! and one to the sink (`add_tweights`), and pairs of nodes may be joined by
//! directed arcs with independent forward and reverse capacities.
//! After [`FlowGraph::maxflow`], [`FlowGraph::in_source_segment`] tells which
//! side of the minimum cut each node lies on.

use std::collections::VecDeque;

use montage_core::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Arc {
    to: usize,
    cap: f64,
    rev: usize,
}

#[derive(Debug, Clone)]
pub struct FlowGraph {
    num_nodes: usize,
    // (from, arc) in insertion order; grouped into `arcs` by `maxflow`
    pending: Vec<(usize, Arc)>,
    arcs: Vec<Arc>,
    offsets: Vec<usize>,
    level: Vec<i32>,
    source_side: Vec<bool>,
    flow: f64,
}

impl FlowGraph {
    pub fn new(num_nodes: usize) -> Result<Self> {
        let total = num_nodes
            .checked_add(2)
            .ok_or_else(|| Error::allocation("flow graph node count overflows"))?;
        let mut level = Vec::new();
        level.try_reserve_exact(total)?;
        level.resize(total, -1);
        Ok(Self {
            num_nodes,
            pending: Vec::new(),
            arcs: Vec::new(),
            offsets: Vec::new(),
            level,
            source_side: Vec::new(),
            flow: 0.0,
        })
    }

    /// Reserves room for `edges` node-node edges plus terminal links.
    pub fn reserve(&mut self, edges: usize) -> Result<()> {
        let extra = edges
            .checked_add(self.num_nodes)
            .and_then(|n| n.checked_mul(2))
            .ok_or_else(|| Error::allocation("flow graph edge count overflows"))?;
        self.pending.try_reserve(extra)?;
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    #[inline]
    fn source(&self) -> usize {
        self.num_nodes
    }

    #[inline]
    fn sink(&self) -> usize {
        self.num_nodes + 1
    }

    fn push_pair(&mut self, from: usize, to: usize, cap: f64, rev_cap: f64) -> Result<()> {
        if !(cap.is_finite() && rev_cap.is_finite()) || cap < 0.0 || rev_cap < 0.0 {
            return Err(Error::InvalidInput(format!(
                "edge capacities must be finite and non-negative, got {cap} / {rev_cap}"
            )));
        }
        self.pending.try_reserve(2)?;
        // `rev` is patched to global indices when adjacency is built
        let idx = self.pending.len();
        self.pending.push((from, Arc { to, cap, rev: idx + 1 }));
        self.pending.push((to, Arc { to: from, cap: rev_cap, rev: idx }));
        Ok(())
    }

    fn check_node(&self, node: usize) -> Result<()> {
        if node >= self.num_nodes {
            return Err(Error::InvalidInput(format!(
                "node {node} out of range for graph with {} nodes",
                self.num_nodes
            )));
        }
        Ok(())
    }

    /// Adds capacity from the source to `node` and from `node` to the sink.
    pub fn add_tweights(&mut self, node: usize, cap_source: f64, cap_sink: f64) -> Result<()> {
        self.check_node(node)?;
        // Only the difference matters for the cut; the common part is pushed
        // straight into the flow value.
        let common = cap_source.min(cap_sink);
        if common > 0.0 && common.is_finite() {
            self.flow += common;
        }
        let (s, t) = (cap_source - common.max(0.0), cap_sink - common.max(0.0));
        if s > 0.0 {
            self.push_pair(self.source(), node, s, 0.0)?;
        }
        if t > 0.0 {
            self.push_pair(node, self.sink(), t, 0.0)?;
        }
        Ok(())
    }

    pub fn add_edge(&mut self, i: usize, j: usize, cap: f64, rev_cap: f64) -> Result<()> {
        self.check_node(i)?;
        self.check_node(j)?;
        if i == j {
            return Ok(());
        }
        self.push_pair(i, j, cap, rev_cap)
    }

    fn build_adjacency(&mut self) -> Result<()> {
        let total = self.num_nodes + 2;
        let mut offsets = vec![0usize; total + 1];
        for (from, _) in &self.pending {
            offsets[from + 1] += 1;
        }
        for i in 0..total {
            offsets[i + 1] += offsets[i];
        }

        // position of each pending arc in the grouped array
        let mut cursor = offsets.clone();
        let mut position = Vec::new();
        position.try_reserve_exact(self.pending.len())?;
        for (from, _) in &self.pending {
            position.push(cursor[*from]);
            cursor[*from] += 1;
        }

        let mut arcs = Vec::new();
        arcs.try_reserve_exact(self.pending.len())?;
        arcs.resize(self.pending.len(), Arc { to: 0, cap: 0.0, rev: 0 });
        for (k, (_, arc)) in self.pending.iter().enumerate() {
            arcs[position[k]] = Arc {
                to: arc.to,
                cap: arc.cap,
                rev: position[arc.rev],
            };
        }

        self.arcs = arcs;
        self.offsets = offsets;
        Ok(())
    }

    fn bfs_levels(&mut self, eps: f64) -> bool {
        self.level.iter_mut().for_each(|l| *l = -1);
        let (s, t) = (self.source(), self.sink());
        let mut queue = VecDeque::new();
        self.level[s] = 0;
        queue.push_back(s);
        while let Some(u) = queue.pop_front() {
            for a in &self.arcs[self.offsets[u]..self.offsets[u + 1]] {
                if a.cap > eps && self.level[a.to] < 0 {
                    self.level[a.to] = self.level[u] + 1;
                    queue.push_back(a.to);
                }
            }
        }
        self.level[t] >= 0
    }

    /// One blocking flow using an explicit DFS stack and per-node arc cursors.
    fn blocking_flow(&mut self, eps: f64) -> f64 {
        let (s, t) = (self.source(), self.sink());
        let mut next: Vec<usize> = self.offsets[..self.offsets.len() - 1].to_vec();
        let mut total = 0.0;
        let mut path: Vec<usize> = Vec::new();

        loop {
            let u = path.last().map_or(s, |&arc| self.arcs[arc].to);
            if u == t {
                let pushed = path
                    .iter()
                    .map(|&arc| self.arcs[arc].cap)
                    .fold(f64::INFINITY, f64::min);
                for &arc in &path {
                    self.arcs[arc].cap -= pushed;
                    let rev = self.arcs[arc].rev;
                    self.arcs[rev].cap += pushed;
                }
                total += pushed;
                // retreat to the first saturated arc
                let cut = path.iter().position(|&arc| self.arcs[arc].cap <= eps).unwrap_or(0);
                path.truncate(cut);
                continue;
            }

            let end = self.offsets[u + 1];
            let mut advanced = false;
            while next[u] < end {
                let arc = self.arcs[next[u]];
                if arc.cap > eps && self.level[arc.to] == self.level[u] + 1 {
                    path.push(next[u]);
                    advanced = true;
                    break;
                }
                next[u] += 1;
            }

            if !advanced {
                if u == s {
                    break;
                }
                // dead end: prune the node and back up
                self.level[u] = -1;
                path.pop();
                if let Some(&arc) = path.last() {
                    let from = self.arcs[arc].to;
                    next[from] += 1;
                } else {
                    next[s] += 1;
                }
            }
        }
        total
    }

    /// Computes the maximum flow and the minimum-cut partition. Intended to
    /// be called once, after all edges are added.
    pub fn maxflow(&mut self) -> Result<f64> {
        self.build_adjacency()?;

        let max_cap = self.arcs.iter().map(|a| a.cap).fold(0.0f64, f64::max);
        let eps = (max_cap * 1e-12).max(1e-12);

        let mut phases = 0usize;
        while self.bfs_levels(eps) {
            let pushed = self.blocking_flow(eps);
            self.flow += pushed;
            phases += 1;
            if pushed <= 0.0 {
                break;
            }
        }

        // final residual reachability from the source
        self.bfs_levels(eps);
        self.source_side = self.level[..self.num_nodes].iter().map(|&l| l >= 0).collect();
        tracing::trace!(nodes = self.num_nodes, arcs = self.arcs.len(), phases, flow = self.flow, "max-flow done");
        Ok(self.flow)
    }

    /// Whether `node` is on the source side of the minimum cut. Only
    /// meaningful after [`FlowGraph::maxflow`].
    pub fn in_source_segment(&self, node: usize) -> bool {
        self.source_side.get(node).copied().unwrap_or(false)
    }
}
