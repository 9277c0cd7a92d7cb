//! # Incremental Totalizer
//!
//! Binary adder tree totalizer encodings \[1\] that are built lazily and can be extended with new
//! inputs or tightened to higher bounds as in \[2\]. All networks live in a single [`TotDb`]
//! arena where nodes are addressed by [`NodeId`] and never freed, so extending a network can
//! reuse the outputs of its old root unchanged.
//!
//! An internal node over `n` inputs only materializes the outputs `o_1..o_k` with
//! `k = min(bound + 1, n)` of the network it belongs to. Raising the bound adds the missing
//! outputs and the clauses defining them, nothing that was emitted before is touched again.
//!
//! ## References
//!
//! - \[1\] Olivier Bailleux and Yacine Boufkhad: _Efficient CNF Encoding of Boolean Cardinality
//!   Constraints_, CP 2003.
//! - \[2\] Ruben Martins and Saurabh Joshi and Vasco Manquinho and Ines Lynce: _Incremental
//!   Cardinality Constraints for MaxSAT_, CP 2014.

use std::{cmp, fmt, ops::Index};

use rustsat::{
    encodings::CollectClauses,
    instances::ManageVars,
    types::{Clause, Lit},
};

use crate::{
    termination::{Error, Result},
    types::check_capacity,
    EncodingStats,
};

/// Index of a node in a [`TotDb`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Handle of a network in a [`TotDb`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(usize);

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net#{}", self.0)
    }
}

/// Which direction of the output definitions is encoded
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Semantics {
    /// `o_k` is implied by at least `k` true inputs
    #[default]
    If,
    /// `o_k` is equivalent to at least `k` true inputs
    IfAndOnlyIf,
}

impl Semantics {
    fn only_if(self) -> bool {
        self == Semantics::IfAndOnlyIf
    }
}

impl fmt::Display for Semantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Semantics::If => write!(f, "if"),
            Semantics::IfAndOnlyIf => write!(f, "iff"),
        }
    }
}

/// A node in the totalizer arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An input literal
    Leaf(Lit),
    /// A merge of two subtrees
    Internal {
        /// The materialized outputs, `outs[k-1]` is `o_k`
        outs: Vec<Lit>,
        /// The number of leaves below this node
        n_inputs: usize,
        /// The depth of the subtree
        depth: usize,
        left: NodeId,
        right: NodeId,
    },
}

impl Node {
    /// The number of leaves below the node
    pub fn n_inputs(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Internal { n_inputs, .. } => *n_inputs,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Internal { depth, .. } => *depth,
        }
    }

    /// The output literals materialized so far. A leaf is its own only output.
    pub fn outputs(&self) -> &[Lit] {
        match self {
            Node::Leaf(lit) => std::slice::from_ref(lit),
            Node::Internal { outs, .. } => outs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Network {
    inputs: Vec<Lit>,
    root: Option<NodeId>,
    bound: usize,
}

/// Arena of incremental totalizer networks
#[derive(Debug, Clone, Default)]
pub struct TotDb {
    nodes: Vec<Node>,
    nets: Vec<Network>,
    semantics: Semantics,
    n_clauses: usize,
    n_vars: u32,
}

impl Index<NodeId> for TotDb {
    type Output = Node;

    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index.0]
    }
}

impl TotDb {
    pub fn new(semantics: Semantics) -> Self {
        TotDb {
            semantics,
            ..Default::default()
        }
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    /// Creates a new network over `inputs` that is encoded far enough to enforce at most
    /// `bound` true inputs
    pub fn create<Col: CollectClauses>(
        &mut self,
        inputs: &[Lit],
        bound: usize,
        collector: &mut Col,
        ids: &mut dyn ManageVars,
    ) -> Result<NetId> {
        let net = NetId(self.nets.len());
        self.nets.push(Network {
            inputs: Vec::with_capacity(inputs.len()),
            root: None,
            bound,
        });
        self.extend(net, inputs, collector, ids)?;
        Ok(net)
    }

    /// Adds inputs to a network. The new inputs are collected in a fresh subtree that is merged
    /// with the old root, all existing nodes stay as they are.
    ///
    /// The optimizer itself never extends a network, every core gets a network of its own.
    pub fn extend<Col: CollectClauses>(
        &mut self,
        net: NetId,
        inputs: &[Lit],
        collector: &mut Col,
        ids: &mut dyn ManageVars,
    ) -> Result<()> {
        if inputs.is_empty() {
            return Ok(());
        }
        let subtree = self.build_tree(inputs);
        let root = match self.nets[net.0].root {
            None => subtree,
            Some(old_root) => self.insert_internal(old_root, subtree),
        };
        let network = &mut self.nets[net.0];
        network.root = Some(root);
        network.inputs.extend_from_slice(inputs);
        let bound = network.bound;
        self.encode(root, bound, collector, ids)
    }

    /// Raises the bound of a network, materializing the outputs needed to enforce it.
    /// Raising to the current bound does nothing, lowering the bound is an error.
    pub fn raise_bound<Col: CollectClauses>(
        &mut self,
        net: NetId,
        bound: usize,
        collector: &mut Col,
        ids: &mut dyn ManageVars,
    ) -> Result<()> {
        let network = &mut self.nets[net.0];
        if bound < network.bound {
            return Err(Error::InvalidBound {
                requested: bound,
                current: network.bound,
            });
        }
        if bound == network.bound {
            return Ok(());
        }
        network.bound = bound;
        let root = network.root;
        match root {
            Some(root) => self.encode(root, bound, collector, ids),
            None => Ok(()),
        }
    }

    /// Gets the literal `o_k` that is true if at least `k` inputs of the network are true.
    /// Only materialized outputs can be requested, i.e., `1 <= k <= n_outputs`.
    pub fn output_literal(&self, net: NetId, k: usize) -> Result<Lit> {
        let outs = self.outputs(net);
        if k == 0 || k > outs.len() {
            return Err(Error::InvalidBound {
                requested: k,
                current: outs.len(),
            });
        }
        Ok(outs[k - 1])
    }

    /// The materialized outputs of a network
    pub fn outputs(&self, net: NetId) -> &[Lit] {
        match self.nets[net.0].root {
            Some(root) => self[root].outputs(),
            None => &[],
        }
    }

    pub fn n_outputs(&self, net: NetId) -> usize {
        self.outputs(net).len()
    }

    /// The input literals of a network in insertion order
    pub fn inputs(&self, net: NetId) -> &[Lit] {
        &self.nets[net.0].inputs
    }

    pub fn n_inputs(&self, net: NetId) -> usize {
        self.nets[net.0].inputs.len()
    }

    pub fn bound(&self, net: NetId) -> usize {
        self.nets[net.0].bound
    }

    pub fn depth(&self, net: NetId) -> usize {
        self.nets[net.0].root.map_or(0, |root| self[root].depth())
    }

    pub fn n_networks(&self) -> usize {
        self.nets.len()
    }

    pub fn stats(&self) -> EncodingStats {
        EncodingStats {
            n_clauses: self.n_clauses,
            n_vars: self.n_vars,
            n_networks: self.nets.len(),
        }
    }

    fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn insert_internal(&mut self, left: NodeId, right: NodeId) -> NodeId {
        let n_inputs = self[left].n_inputs() + self[right].n_inputs();
        let depth = cmp::max(self[left].depth(), self[right].depth()) + 1;
        self.insert(Node::Internal {
            outs: vec![],
            n_inputs,
            depth,
            left,
            right,
        })
    }

    /// Builds a balanced subtree over the given literals without encoding it
    fn build_tree(&mut self, lits: &[Lit]) -> NodeId {
        debug_assert!(!lits.is_empty());
        if lits.len() == 1 {
            return self.insert(Node::Leaf(lits[0]));
        }
        let split = lits.len() / 2;
        let left = self.build_tree(&lits[..split]);
        let right = self.build_tree(&lits[split..]);
        self.insert_internal(left, right)
    }

    /// Recursively encodes a subtree far enough to enforce `bound`
    fn encode<Col: CollectClauses>(
        &mut self,
        id: NodeId,
        bound: usize,
        collector: &mut Col,
        ids: &mut dyn ManageVars,
    ) -> Result<()> {
        let (left, right, n_inputs, n_prev) = match &self[id] {
            Node::Leaf(_) => return Ok(()),
            Node::Internal {
                outs,
                n_inputs,
                left,
                right,
                ..
            } => (*left, *right, *n_inputs, outs.len()),
        };
        let target = cmp::min(bound + 1, n_inputs);
        if target <= n_prev {
            return Ok(());
        }

        self.encode(left, bound, collector, ids)?;
        self.encode(right, bound, collector, ids)?;

        check_capacity(&*ids, target - n_prev)?;
        let new_outs: Vec<Lit> = (n_prev..target).map(|_| ids.new_lit()).collect();
        self.n_vars += new_outs.len() as u32;
        if let Node::Internal { outs, .. } = &mut self.nodes[id.0] {
            outs.extend_from_slice(&new_outs);
        }

        let left_outs = self[left].outputs();
        let right_outs = self[right].outputs();
        let outs = self[id].outputs();
        let mut clauses = vec![];

        // at least i on the left and j on the right imply at least i + j
        for i in 0..=left_outs.len() {
            for j in 0..=right_outs.len() {
                let sum = i + j;
                if sum <= n_prev || sum > target {
                    continue;
                }
                let mut cl = Clause::new();
                if i > 0 {
                    cl.add(!left_outs[i - 1]);
                }
                if j > 0 {
                    cl.add(!right_outs[j - 1]);
                }
                cl.add(outs[sum - 1]);
                clauses.push(cl);
            }
        }

        if self.semantics.only_if() {
            // at most i on the left and j on the right imply at most i + j
            for i in 0..=left_outs.len() {
                for j in 0..=right_outs.len() {
                    let sum = i + j + 1;
                    if sum <= n_prev || sum > target {
                        continue;
                    }
                    let mut cl = Clause::new();
                    if i < left_outs.len() {
                        cl.add(left_outs[i]);
                    }
                    if j < right_outs.len() {
                        cl.add(right_outs[j]);
                    }
                    cl.add(!outs[sum - 1]);
                    clauses.push(cl);
                }
            }
        }

        self.n_clauses += clauses.len();
        collector.extend_clauses(clauses)?;
        Ok(())
    }
}
