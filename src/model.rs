//! The mutable program IR (spec §3, §4.2).
//!
//! A [`Model`] holds a set of [`Node`]s, a topological order over them, and
//! an undo log capable of reversing exactly the most recent mutation. A
//! separate, random-access snapshot map lets the SA optimizer stash and
//! restore whole states by name (spec §9: "keep them distinct; do not
//! emulate one with the other").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{OptError, Result};
use crate::rng::Rng;

pub type NodeId = u32;

/// One code-generation choice attached to a [`Node`]: a finite set of
/// values plus a flag marking whether the current value is currently
/// "hot" (measurably affects runtime, per spec §3/§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub name: String,
    pub choices: Vec<String>,
    pub current: usize,
    pub hot: bool,
}

impl Decision {
    pub fn new(name: impl Into<String>, choices: Vec<String>, current: usize, hot: bool) -> Self {
        assert!(!choices.is_empty(), "a decision needs a nonempty choice set");
        assert!(current < choices.len(), "current decision value out of range");
        Decision { name: name.into(), choices, current, hot }
    }

    pub fn value(&self) -> &str {
        &self.choices[self.current]
    }
}

/// One unit of the IR: an add-with-carry, a multiply, a load, a spill, ...
/// (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub deps: Vec<NodeId>,
    pub decisions: Vec<Decision>,
}

impl Node {
    pub fn new(id: NodeId, label: impl Into<String>, deps: Vec<NodeId>) -> Self {
        Node { id, label: label.into(), deps, decisions: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Back,
    Forward,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Back => write!(f, "back"),
            Direction::Forward => write!(f, "forward"),
        }
    }
}

/// What the most recent `mutate*` call did, for display and for the
/// mutation-log CSV (spec §3 "Mutation log").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    Permutation { node: NodeId, direction: Direction, walked: usize },
    Decision { node: NodeId, decision: usize, from: usize, to: usize },
    NoOp,
}

impl MutationRecord {
    /// `(permutation-details, decision-details)` columns for the mutation
    /// log CSV (spec §3): whichever half doesn't apply is empty.
    pub fn csv_details(&self) -> (String, String) {
        match self {
            MutationRecord::Permutation { node, direction, walked } => {
                (format!("node={node};dir={direction};walked={walked}"), String::new())
            }
            MutationRecord::Decision { node, decision, from, to } => {
                (String::new(), format!("node={node};decision={decision};from={from};to={to}"))
            }
            MutationRecord::NoOp => (String::new(), String::new()),
        }
    }
}

/// Sufficient information to reverse exactly one mutation.
#[derive(Debug, Clone)]
enum UndoEntry {
    Permutation { node: NodeId, from_pos: usize },
    Decision { node: NodeId, decision: usize, previous: usize },
    NoOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelState {
    order: Vec<NodeId>,
    decisions: HashMap<NodeId, Vec<Decision>>,
}

/// Losslessly round-trippable export of a [`Model`] (spec §4.2:
/// `import(export()) == identity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelExport {
    pub nodes: Vec<Node>,
    pub order: Vec<NodeId>,
}

pub struct Model {
    nodes: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
    snapshots: HashMap<String, ModelState>,
    undo: Option<UndoEntry>,
    last_record: MutationRecord,
}

impl Model {
    /// Build a `Model` from a set of nodes already in a valid topological
    /// order. Panics if `order` is not a permutation of `nodes`' ids or
    /// violates a dependency (programmer error — baselines are generated,
    /// not hand-typed).
    pub fn new(nodes: Vec<Node>) -> Self {
        let order: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        let map: HashMap<NodeId, Node> = nodes.into_iter().map(|n| (n.id, n)).collect();
        let model = Model {
            nodes: map,
            order,
            snapshots: HashMap::new(),
            undo: None,
            last_record: MutationRecord::NoOp,
        };
        debug_assert!(model.order_is_topological(&model.order), "initial order violates dependencies");
        model
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[&id]
    }

    /// Nodes in their current topological order — the shape persisted in
    /// `tested_incorrect.json` on a `MeasureIncorrect`/`MeasureInvalid`
    /// failure (spec §6).
    pub fn nodes_in_topological_order(&self) -> Vec<&Node> {
        self.order.iter().map(|id| &self.nodes[id]).collect()
    }

    fn position_of(&self, id: NodeId) -> usize {
        self.order.iter().position(|&x| x == id).expect("node id must be present in order")
    }

    fn order_is_topological(&self, order: &[NodeId]) -> bool {
        let mut pos = HashMap::with_capacity(order.len());
        for (i, &id) in order.iter().enumerate() {
            pos.insert(id, i);
        }
        for &id in order {
            let node = &self.nodes[&id];
            for &dep in &node.deps {
                if pos[&dep] >= pos[&id] {
                    return false;
                }
            }
        }
        true
    }

    /// The legal interval `[lo, hi]` node `id` may occupy without
    /// violating any dependency (spec §4.2): `lo` just past its latest
    /// predecessor, `hi` just before its earliest successor.
    fn legal_interval(&self, id: NodeId) -> (usize, usize) {
        let node = &self.nodes[&id];
        let lo = node
            .deps
            .iter()
            .map(|&dep| self.position_of(dep) + 1)
            .max()
            .unwrap_or(0);
        let hi = self
            .order
            .iter()
            .enumerate()
            .filter(|(_, &other)| self.nodes[&other].deps.contains(&id))
            .map(|(pos, _)| pos.saturating_sub(1))
            .min()
            .unwrap_or(self.order.len() - 1);
        (lo, hi)
    }

    fn move_node(&mut self, id: NodeId, to_pos: usize) {
        let from_pos = self.position_of(id);
        if from_pos == to_pos {
            return;
        }
        self.order.remove(from_pos);
        // Removing an earlier element shifts everything after it left by
        // one, so a target computed against the pre-removal vector that
        // lies past `from_pos` must be adjusted.
        let adjusted = if to_pos > from_pos { to_pos - 1 } else { to_pos };
        self.order.insert(adjusted.min(self.order.len()), id);
    }

    /// Slide a random node forward or backward within its legal interval
    /// (spec §4.2). Always succeeds; a no-op (`lo == hi`) still records an
    /// undo entry and a `walked == 0` record.
    pub fn mutate_permutation(&mut self, rng: &mut Rng) -> MutationRecord {
        let idx = rng.uniform_index(self.order.len());
        let id = self.order[idx];
        let (lo, hi) = self.legal_interval(id);
        let from_pos = idx;

        if lo >= hi {
            self.undo = Some(UndoEntry::NoOp);
            self.last_record = MutationRecord::NoOp;
            return self.last_record.clone();
        }

        let width = hi - lo;
        let mut steps = 1usize;
        while steps < width && rng.uniform_real() < 0.5 {
            steps += 1;
        }
        let forward = rng.coin_flip();
        let target = if forward {
            (from_pos + steps).min(hi)
        } else {
            from_pos.saturating_sub(steps).max(lo)
        };
        let walked = target.abs_diff(from_pos);
        let direction = if forward { Direction::Forward } else { Direction::Back };

        if walked == 0 {
            self.undo = Some(UndoEntry::NoOp);
            self.last_record = MutationRecord::NoOp;
            return self.last_record.clone();
        }

        self.move_node(id, target);
        self.undo = Some(UndoEntry::Permutation { node: id, from_pos });
        self.last_record = MutationRecord::Permutation { node: id, direction, walked };
        self.last_record.clone()
    }

    /// The CSV-loggable record of whatever `mutate_permutation`/
    /// `mutate_decision` did most recently.
    pub fn last_mutation_record(&self) -> &MutationRecord {
        &self.last_record
    }

    /// Flip a randomly chosen hot decision to a different value in its
    /// choice set. Returns `false` (and records nothing) if no decision is
    /// currently hot (spec §4.2).
    pub fn mutate_decision(&mut self, rng: &mut Rng) -> bool {
        let mut hot: Vec<(NodeId, usize)> = Vec::new();
        for id in &self.order {
            let node = &self.nodes[id];
            for (i, d) in node.decisions.iter().enumerate() {
                if d.hot {
                    hot.push((*id, i));
                }
            }
        }
        if hot.is_empty() {
            return false;
        }
        let (node_id, decision_idx) = hot[rng.uniform_index(hot.len())];
        let node = self.nodes.get_mut(&node_id).expect("node must exist");
        let decision = &mut node.decisions[decision_idx];
        let previous = decision.current;
        let next = if decision.choices.len() < 2 {
            // Nothing else to flip to; still a legal (degenerate) mutation.
            previous
        } else {
            let mut candidate = rng.uniform_index(decision.choices.len() - 1);
            if candidate >= previous {
                candidate += 1;
            }
            candidate
        };
        decision.current = next;
        self.undo = Some(UndoEntry::Decision { node: node_id, decision: decision_idx, previous });
        self.last_record =
            MutationRecord::Decision { node: node_id, decision: decision_idx, from: previous, to: next };
        true
    }

    /// Undo exactly the most recent mutation. Calling this with no pending
    /// mutation is a programmer error (`BadState`, spec §4.2/§7).
    pub fn revert_last_mutation(&mut self) -> Result<()> {
        match self.undo.take() {
            None => Err(OptError::BadState("revert_last_mutation called with no pending mutation".into())),
            Some(UndoEntry::NoOp) => Ok(()),
            Some(UndoEntry::Permutation { node, from_pos }) => {
                self.move_node(node, from_pos);
                Ok(())
            }
            Some(UndoEntry::Decision { node, decision, previous }) => {
                self.nodes.get_mut(&node).expect("node must exist").decisions[decision].current = previous;
                Ok(())
            }
        }
    }

    fn snapshot_state(&self) -> ModelState {
        let decisions = self.nodes.iter().map(|(id, n)| (*id, n.decisions.clone())).collect();
        ModelState { order: self.order.clone(), decisions }
    }

    /// Save a random-access, named snapshot of the current state.
    /// Independent of the undo log; multiple snapshots may coexist.
    pub fn save_snapshot(&mut self, id: impl Into<String>) {
        self.snapshots.insert(id.into(), self.snapshot_state());
    }

    /// Restore a previously saved snapshot by id.
    pub fn restore_snapshot(&mut self, id: &str) -> Result<()> {
        let state = self
            .snapshots
            .get(id)
            .cloned()
            .ok_or_else(|| OptError::BadState(format!("no snapshot named `{id}`")))?;
        self.order = state.order;
        for (node_id, decisions) in state.decisions {
            self.nodes.get_mut(&node_id).expect("snapshot node must exist").decisions = decisions;
        }
        self.undo = None;
        Ok(())
    }

    pub fn export(&self) -> ModelExport {
        ModelExport {
            nodes: self.order.iter().map(|id| self.nodes[id].clone()).collect(),
            order: self.order.clone(),
        }
    }

    pub fn import_from_export(export: ModelExport) -> Self {
        let mut model = Model::new(export.nodes);
        model.order = export.order;
        model
    }

    pub fn import(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let export: ModelExport = serde_json::from_str(&text)?;
        Ok(Model::import_from_export(export))
    }

    pub fn export_to_writer<W: std::io::Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.export())?;
        Ok(())
    }

    pub fn dump_json(&self, path: &std::path::Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.export_to_writer(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A -> B -> C, plus an independent D. Mirrors the teacher's
    /// `set_up_test_particles` helper pattern: one shared fixture builder
    /// feeding several focused assertions.
    fn chain_model() -> Model {
        let a = Node::new(0, "a", vec![]);
        let b = Node::new(1, "b", vec![0]);
        let c = Node::new(2, "c", vec![1]);
        let mut d = Node::new(3, "d", vec![]);
        d.decisions.push(Decision::new("reg_class", vec!["xmm".into(), "gpr".into()], 0, true));
        Model::new(vec![a, b, c, d])
    }

    #[test]
    fn initial_order_is_topological() {
        let model = chain_model();
        assert!(model.order_is_topological(model.order()));
    }

    #[test]
    fn mutate_permutation_preserves_topological_order() {
        let mut rng = Rng::new(1);
        let mut model = chain_model();
        for _ in 0..200 {
            model.mutate_permutation(&mut rng);
            assert!(model.order_is_topological(model.order()), "{:?}", model.order());
        }
    }

    #[test]
    fn chain_node_never_moves_out_of_its_slot() {
        // b depends on a and is depended on by c, so its legal interval is
        // exactly {1}: it can never move.
        let mut rng = Rng::new(2);
        let mut model = chain_model();
        for _ in 0..50 {
            model.mutate_permutation(&mut rng);
            let pos_b = model.order().iter().position(|&x| x == 1).unwrap();
            assert_eq!(pos_b, 1);
        }
    }

    #[test]
    fn revert_undoes_exactly_the_last_permutation() {
        let mut rng = Rng::new(3);
        let mut model = chain_model();
        let before = model.export();
        model.mutate_permutation(&mut rng);
        model.revert_last_mutation().unwrap();
        assert_eq!(model.export().order, before.order);
    }

    #[test]
    fn revert_with_no_pending_mutation_is_bad_state() {
        let mut model = chain_model();
        assert!(matches!(model.revert_last_mutation(), Err(OptError::BadState(_))));
    }

    #[test]
    fn mutate_decision_requires_a_hot_decision() {
        let a = Node::new(0, "a", vec![]);
        let mut model = Model::new(vec![a]);
        let mut rng = Rng::new(4);
        assert!(!model.mutate_decision(&mut rng));
    }

    #[test]
    fn mutate_decision_flips_to_a_different_value() {
        let mut model = chain_model();
        let mut rng = Rng::new(5);
        let before = model.node(3).decisions[0].current;
        assert!(model.mutate_decision(&mut rng));
        let after = model.node(3).decisions[0].current;
        assert_ne!(before, after);
    }

    #[test]
    fn revert_undoes_a_decision_mutation() {
        let mut model = chain_model();
        let mut rng = Rng::new(6);
        let before = model.node(3).decisions[0].current;
        model.mutate_decision(&mut rng);
        model.revert_last_mutation().unwrap();
        assert_eq!(model.node(3).decisions[0].current, before);
    }

    #[test]
    fn long_mutation_sequence_is_fully_reversible() {
        let mut rng = Rng::new(7);
        let mut model = chain_model();
        let initial = model.export();
        let mut kinds = Vec::new();
        for _ in 0..30 {
            if rng.coin_flip() {
                model.mutate_permutation(&mut rng);
                kinds.push(true);
            } else {
                if model.mutate_decision(&mut rng) {
                    kinds.push(false);
                } else {
                    continue;
                }
            }
        }
        for _ in &kinds {
            model.revert_last_mutation().unwrap();
        }
        // each mutate/revert pair is independent, so reverting every
        // recorded mutation exactly once restores the initial state.
        let current = model.export();
        assert_eq!(current.order, initial.order);
    }

    #[test]
    fn snapshot_save_and_restore_round_trips() {
        let mut rng = Rng::new(8);
        let mut model = chain_model();
        model.save_snapshot("s0");
        for _ in 0..10 {
            model.mutate_permutation(&mut rng);
        }
        model.restore_snapshot("s0").unwrap();
        let a = model.export();
        model.restore_snapshot("s0").unwrap();
        let b = model.export();
        assert_eq!(a.order, b.order);
    }

    #[test]
    fn restoring_unknown_snapshot_is_bad_state() {
        let mut model = chain_model();
        assert!(matches!(model.restore_snapshot("nope"), Err(OptError::BadState(_))));
    }

    #[test]
    fn import_export_round_trips_losslessly() {
        let model = chain_model();
        let exported = model.export();
        let mut buf = Vec::new();
        model.export_to_writer(&mut buf).unwrap();
        let reimported: ModelExport = serde_json::from_slice(&buf).unwrap();
        assert_eq!(reimported.order, exported.order);
        assert_eq!(reimported.nodes, exported.nodes);
    }

    #[test]
    fn multiple_snapshots_coexist_independently() {
        let mut rng = Rng::new(9);
        let mut model = chain_model();
        model.save_snapshot("start");
        model.mutate_decision(&mut rng);
        model.save_snapshot("after_one_decision");
        model.restore_snapshot("start").unwrap();
        assert_eq!(model.node(3).decisions[0].current, 0);
        model.restore_snapshot("after_one_decision").unwrap();
        assert_ne!(model.node(3).decisions[0].current, 0);
    }
}
