// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Cycle finding over partial relations.
//!
//! Partial relations are edges of a graph whose vertices are large
//! prime cofactors. A relation with a single large prime p is an edge
//! between p and the virtual vertex 1. The graph is kept acyclic: an
//! edge whose endpoints are already connected closes a cycle, and the
//! connecting path is removed and handed back so the caller can
//! multiply the relations along the cycle into a full relation (every
//! large prime on the cycle appears an even number of times).

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::relations::ExponentVector;
use crate::Uint;

/// The virtual vertex connecting single large prime relations.
pub const ROOT_VERTEX: u64 = 1;

/// A sieve report with one or two large prime cofactors.
/// For a single large prime, q is [`ROOT_VERTEX`].
#[derive(Clone, Debug)]
pub struct PartialRelation {
    pub x: Uint,
    pub ev: ExponentVector,
    pub p: u64,
    pub q: u64,
}

impl PartialRelation {
    fn other_end(&self, v: u64) -> u64 {
        if self.p == v {
            self.q
        } else {
            self.p
        }
    }
}

// Most vertices have a single incident edge, avoid allocating
// a vector for them.
enum Incidence {
    One(u32),
    Many(Vec<u32>),
}

pub enum InsertOutcome {
    Inserted,
    /// An edge with the same endpoints and the same exponent vector
    /// already exists. The relation is handed back.
    Duplicate(PartialRelation),
    /// The endpoints were already connected. The connecting path is
    /// removed from the graph and returned together with the closing
    /// relation (which is not inserted).
    Cycle(PartialRelation, Vec<PartialRelation>),
}

/// Edges live in a slab with a free list so that removed cycles can
/// be recycled without invalidating other edge ids.
#[derive(Default)]
pub struct CycleGraph {
    edges: Vec<Option<PartialRelation>>,
    free: Vec<u32>,
    n_edges: usize,
    adj: HashMap<u64, Incidence>,
}

impl CycleGraph {
    pub fn new() -> Self {
        CycleGraph::default()
    }

    pub fn n_edges(&self) -> usize {
        self.n_edges
    }

    pub fn n_vertices(&self) -> usize {
        self.adj.len()
    }

    fn edge(&self, id: u32) -> &PartialRelation {
        self.edges[id as usize].as_ref().unwrap()
    }

    /// Insert a partial relation, or close and extract the cycle it
    /// would create.
    pub fn insert_or_close(&mut self, r: PartialRelation) -> InsertOutcome {
        debug_assert!(r.p != r.q, "square cofactors are full relations");
        for &eid in self.incident(r.p) {
            let e = self.edge(eid);
            if e.other_end(r.p) == r.q && e.ev == r.ev {
                return InsertOutcome::Duplicate(r);
            }
        }
        if let Some(path) = self.find_path(r.p, r.q) {
            let mut removed = Vec::with_capacity(path.len());
            for eid in path {
                let e = self.edges[eid as usize].take().unwrap();
                self.detach(e.p, eid);
                self.detach(e.q, eid);
                self.free.push(eid);
                self.n_edges -= 1;
                removed.push(e);
            }
            return InsertOutcome::Cycle(r, removed);
        }
        let (p, q) = (r.p, r.q);
        let id = match self.free.pop() {
            Some(id) => {
                self.edges[id as usize] = Some(r);
                id
            }
            None => {
                self.edges.push(Some(r));
                (self.edges.len() - 1) as u32
            }
        };
        self.attach(p, id);
        self.attach(q, id);
        self.n_edges += 1;
        InsertOutcome::Inserted
    }

    fn attach(&mut self, v: u64, id: u32) {
        match self.adj.entry(v) {
            Entry::Vacant(e) => {
                e.insert(Incidence::One(id));
            }
            Entry::Occupied(mut e) => {
                let inc = e.get_mut();
                match *inc {
                    Incidence::One(first) => *inc = Incidence::Many(vec![first, id]),
                    Incidence::Many(ref mut ids) => ids.push(id),
                }
            }
        }
    }

    // Remove the edge id from the incidence of v, dropping the vertex
    // when no edge remains.
    fn detach(&mut self, v: u64, id: u32) {
        let Entry::Occupied(mut e) = self.adj.entry(v) else {
            debug_assert!(false, "detaching from an unknown vertex");
            return;
        };
        let mut downgrade = None;
        let remove = match e.get_mut() {
            Incidence::One(i) => {
                debug_assert!(*i == id);
                true
            }
            Incidence::Many(ids) => {
                ids.retain(|&i| i != id);
                if ids.len() == 1 {
                    downgrade = Some(ids[0]);
                }
                false
            }
        };
        if remove {
            e.remove();
        } else if let Some(only) = downgrade {
            *e.get_mut() = Incidence::One(only);
        }
    }

    fn incident(&self, v: u64) -> &[u32] {
        match self.adj.get(&v) {
            None => &[],
            Some(Incidence::One(id)) => std::slice::from_ref(id),
            Some(Incidence::Many(ids)) => ids,
        }
    }

    // The graph is a forest so the path between two connected
    // vertices is unique.
    fn find_path(&self, from: u64, to: u64) -> Option<Vec<u32>> {
        if !self.adj.contains_key(&from) || !self.adj.contains_key(&to) {
            return None;
        }
        // prev[v] = (previous vertex, edge used to reach v)
        let mut prev: HashMap<u64, (u64, u32)> = HashMap::new();
        prev.insert(from, (from, u32::MAX));
        let mut stack = vec![from];
        while let Some(v) = stack.pop() {
            for &eid in self.incident(v) {
                let w = self.edge(eid).other_end(v);
                if let Entry::Vacant(e) = prev.entry(w) {
                    e.insert((v, eid));
                    if w == to {
                        let mut path = vec![];
                        let mut cur = to;
                        while cur != from {
                            let (pv, pe) = prev[&cur];
                            path.push(pe);
                            cur = pv;
                        }
                        return Some(path);
                    }
                    stack.push(w);
                }
            }
        }
        None
    }

    /// The invariant maintained by [`insert_or_close`]: inserted edges
    /// never form a cycle.
    ///
    /// [`insert_or_close`]: CycleGraph::insert_or_close
    pub fn is_acyclic(&self) -> bool {
        let mut roots: HashMap<u64, u64> = HashMap::new();
        fn find(roots: &mut HashMap<u64, u64>, mut v: u64) -> u64 {
            while let Some(&r) = roots.get(&v) {
                if r == v {
                    break;
                }
                v = r;
            }
            v
        }
        for e in self.edges.iter().flatten() {
            let (rp, rq) = (find(&mut roots, e.p), find(&mut roots, e.q));
            if rp == rq {
                return false;
            }
            roots.insert(rp, rq);
            roots.insert(e.p, rq);
        }
        true
    }
}
