//! Search node pool and open-list priority queue
//!
//! Queries allocate one node per visited polygon from a fixed-capacity
//! pool with an intrusive hash over polygon references. Parent pointers
//! are stored as pool indices offset by one so zero means "no parent",
//! which lets nodes be plain `Copy` data.

use crate::nav_mesh::PolyRef;
use tilenav_common::math::next_pow2;

/// Node is on the open list
pub const NODE_OPEN: u8 = 0x01;
/// Node has been expanded
pub const NODE_CLOSED: u8 = 0x02;

const NULL_IDX: u32 = u32::MAX;

/// One A* / Dijkstra search node
#[derive(Debug, Clone, Copy)]
pub struct Node {
    /// Position the node was reached at (portal midpoint or edge clamp)
    pub pos: [f32; 3],
    /// Cost from the start node
    pub cost: f32,
    /// Cost plus heuristic; the open list orders by this
    pub total: f32,
    /// Polygon this node represents
    pub id: PolyRef,
    /// Parent pool index plus one, zero when the node is a root
    pub pidx: u32,
    /// `NODE_OPEN` / `NODE_CLOSED`
    pub flags: u8,
}

impl Node {
    fn new(id: PolyRef) -> Self {
        Self {
            pos: [0.0; 3],
            cost: 0.0,
            total: 0.0,
            id,
            pidx: 0,
            flags: 0,
        }
    }
}

fn hash_ref(r: PolyRef) -> u32 {
    let folded = (r.0 ^ (r.0 >> 32)) as u32;
    folded ^ (folded >> 16)
}

/// Fixed-capacity node pool with a hash over polygon references
#[derive(Debug)]
pub struct NodePool {
    nodes: Vec<Node>,
    /// Bucket heads, indices into `nodes`
    first: Vec<u32>,
    /// Bucket chains, parallel to `nodes`
    next: Vec<u32>,
    max_nodes: usize,
    hash_mask: u32,
}

impl NodePool {
    /// Creates a pool holding at most `max_nodes` nodes
    pub fn new(max_nodes: usize) -> Self {
        let hash_size = next_pow2(((max_nodes / 4).max(1)) as u32).max(1);
        Self {
            nodes: Vec::with_capacity(max_nodes.min(1024)),
            first: vec![NULL_IDX; hash_size as usize],
            next: Vec::with_capacity(max_nodes.min(1024)),
            max_nodes,
            hash_mask: hash_size - 1,
        }
    }

    /// Drops all nodes, keeping the allocation
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.next.clear();
        self.first.fill(NULL_IDX);
    }

    /// Maximum node count
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Current node count
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Looks up the node for a polygon, if one was allocated
    pub fn find_node(&self, id: PolyRef) -> Option<u32> {
        let bucket = (hash_ref(id) & self.hash_mask) as usize;
        let mut i = self.first[bucket];
        while i != NULL_IDX {
            if self.nodes[i as usize].id == id {
                return Some(i);
            }
            i = self.next[i as usize];
        }
        None
    }

    /// Finds or allocates the node for a polygon. Returns `None` when the
    /// pool is exhausted.
    pub fn get_node(&mut self, id: PolyRef) -> Option<u32> {
        if let Some(i) = self.find_node(id) {
            return Some(i);
        }
        if self.nodes.len() >= self.max_nodes {
            return None;
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node::new(id));
        let bucket = (hash_ref(id) & self.hash_mask) as usize;
        self.next.push(self.first[bucket]);
        self.first[bucket] = idx;
        Some(idx)
    }

    /// Node by pool index
    pub fn node(&self, idx: u32) -> &Node {
        &self.nodes[idx as usize]
    }

    /// Mutable node by pool index
    pub fn node_mut(&mut self, idx: u32) -> &mut Node {
        &mut self.nodes[idx as usize]
    }

    /// Encodes a parent pointer for `Node::pidx`
    pub fn node_to_pidx(&self, idx: u32) -> u32 {
        idx + 1
    }

    /// Decodes `Node::pidx`; `None` for roots
    pub fn pidx_to_node(&self, pidx: u32) -> Option<u32> {
        if pidx == 0 {
            None
        } else {
            Some(pidx - 1)
        }
    }
}

/// Binary min-heap over node pool indices, keyed by `Node::total`
#[derive(Debug)]
pub struct NodeQueue {
    heap: Vec<u32>,
}

impl NodeQueue {
    /// Creates an empty queue with the given capacity hint
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
        }
    }

    /// Removes all entries
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Returns true if the queue holds no entries
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts a node index
    pub fn push(&mut self, idx: u32, pool: &NodePool) {
        self.heap.push(idx);
        self.bubble_up(self.heap.len() - 1, idx, pool);
    }

    /// Re-sorts a node whose total decreased
    pub fn modify(&mut self, idx: u32, pool: &NodePool) {
        for i in 0..self.heap.len() {
            if self.heap[i] == idx {
                self.bubble_up(i, idx, pool);
                return;
            }
        }
    }

    /// Removes and returns the node with the lowest total
    pub fn pop(&mut self, pool: &NodePool) -> Option<u32> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap[0];
        let last = self.heap.pop();
        if let Some(last) = last {
            if !self.heap.is_empty() {
                self.heap[0] = last;
                self.trickle_down(0, last, pool);
            }
        }
        Some(top)
    }

    fn bubble_up(&mut self, mut i: usize, idx: u32, pool: &NodePool) {
        let total = pool.node(idx).total;
        while i > 0 {
            let parent = (i - 1) / 2;
            if pool.node(self.heap[parent]).total <= total {
                break;
            }
            self.heap[i] = self.heap[parent];
            i = parent;
        }
        self.heap[i] = idx;
    }

    fn trickle_down(&mut self, mut i: usize, idx: u32, pool: &NodePool) {
        let total = pool.node(idx).total;
        let len = self.heap.len();
        loop {
            let mut child = i * 2 + 1;
            if child >= len {
                break;
            }
            if child + 1 < len
                && pool.node(self.heap[child + 1]).total < pool.node(self.heap[child]).total
            {
                child += 1;
            }
            if pool.node(self.heap[child]).total >= total {
                break;
            }
            self.heap[i] = self.heap[child];
            i = child;
        }
        self.heap[i] = idx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_allocates_and_finds() {
        let mut pool = NodePool::new(8);
        let a = pool.get_node(PolyRef(100)).unwrap();
        let b = pool.get_node(PolyRef(200)).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.get_node(PolyRef(100)), Some(a));
        assert_eq!(pool.find_node(PolyRef(200)), Some(b));
        assert_eq!(pool.find_node(PolyRef(300)), None);
        assert_eq!(pool.node_count(), 2);
    }

    #[test]
    fn pool_exhaustion() {
        let mut pool = NodePool::new(2);
        assert!(pool.get_node(PolyRef(1)).is_some());
        assert!(pool.get_node(PolyRef(2)).is_some());
        assert!(pool.get_node(PolyRef(3)).is_none());
        // Existing nodes stay reachable at capacity.
        assert!(pool.get_node(PolyRef(1)).is_some());
    }

    #[test]
    fn parent_encoding() {
        let mut pool = NodePool::new(4);
        let a = pool.get_node(PolyRef(1)).unwrap();
        let b = pool.get_node(PolyRef(2)).unwrap();
        pool.node_mut(b).pidx = pool.node_to_pidx(a);
        assert_eq!(pool.pidx_to_node(pool.node(b).pidx), Some(a));
        assert_eq!(pool.pidx_to_node(pool.node(a).pidx), None);
    }

    #[test]
    fn queue_orders_by_total() {
        let mut pool = NodePool::new(8);
        let mut queue = NodeQueue::new(8);
        let totals = [5.0f32, 1.0, 3.0, 4.0, 2.0];
        for (i, &t) in totals.iter().enumerate() {
            let idx = pool.get_node(PolyRef(i as u64 + 1)).unwrap();
            pool.node_mut(idx).total = t;
            queue.push(idx, &pool);
        }
        let mut out = Vec::new();
        while let Some(idx) = queue.pop(&pool) {
            out.push(pool.node(idx).total);
        }
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn queue_modify_reorders() {
        let mut pool = NodePool::new(4);
        let mut queue = NodeQueue::new(4);
        let a = pool.get_node(PolyRef(1)).unwrap();
        let b = pool.get_node(PolyRef(2)).unwrap();
        pool.node_mut(a).total = 10.0;
        pool.node_mut(b).total = 20.0;
        queue.push(a, &pool);
        queue.push(b, &pool);

        pool.node_mut(b).total = 5.0;
        queue.modify(b, &pool);
        assert_eq!(queue.pop(&pool), Some(b));
        assert_eq!(queue.pop(&pool), Some(a));
    }
}
