use std::collections::HashMap;

use anyhow::{bail, Result};
use common::div_or_zero;
use engine::PositionKey;
use log::{debug, info, warn};

use crate::{Edge, NodeId, PositionNode, PositionStats, PositionTree, TreeOptions};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub positions: usize,
    pub leaves: usize,
    pub unreliable: usize,
    pub best_move_edges: usize,
}

/// Turns corpus statistics into a tree of positions with move probabilities.
pub struct TreeBuilder {
    options: TreeOptions,
}

#[derive(Default)]
struct Observed {
    moves: Vec<(String, PositionKey, u64)>,
    best_move: Option<(String, PositionKey)>,
}

impl TreeBuilder {
    pub fn new(options: TreeOptions) -> Self {
        Self { options }
    }

    pub fn build(&self, stats: impl IntoIterator<Item = PositionStats>) -> Result<PositionTree> {
        let (tree, _) = self.build_with_summary(stats)?;
        Ok(tree)
    }

    pub fn build_with_summary(
        &self,
        stats: impl IntoIterator<Item = PositionStats>,
    ) -> Result<(PositionTree, BuildSummary)> {
        let mut order = Vec::new();
        let mut observed: HashMap<PositionKey, Observed> = HashMap::new();

        let mut ensure = |key: &PositionKey, observed: &mut HashMap<PositionKey, Observed>| {
            if !observed.contains_key(key) {
                order.push(key.clone());
                observed.insert(key.clone(), Observed::default());
            }
        };

        for record in stats {
            let key = PositionKey::normalize(&record.fen);
            ensure(&key, &mut observed);

            for m in record.moves {
                if m.count == 0 {
                    debug!("Skipping unplayed move {} in {}", m.action, key);
                    continue;
                }

                let child = PositionKey::normalize(&m.child);
                ensure(&child, &mut observed);

                // Records that only differ in the half-move clock are merged.
                if let Some(parent) = observed.get_mut(&key) {
                    match parent.moves.iter_mut().find(|(a, _, _)| *a == m.action) {
                        Some((_, _, count)) => *count += m.count,
                        None => parent.moves.push((m.action, child, m.count)),
                    }
                }
            }

            if let Some(best_move) = record.best_move {
                let child = PositionKey::normalize(&best_move.child);
                ensure(&child, &mut observed);

                if let Some(parent) = observed.get_mut(&key) {
                    parent.best_move.get_or_insert((best_move.action, child));
                }
            }
        }

        let ids = order
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), NodeId::from_usize(i)))
            .collect::<HashMap<_, _>>();

        let mut summary = BuildSummary {
            positions: order.len(),
            ..BuildSummary::default()
        };

        let mut nodes = Vec::with_capacity(order.len());
        for key in order {
            let observed = &observed[&key];
            let total_count = observed.moves.iter().map(|(_, _, c)| c).sum::<u64>();

            if total_count > 0 && total_count < self.options.reliability_floor {
                // A handful of games can make a line look decisive when one opponent blundered.
                warn!(
                    "Position observed only {} times, results may be unreliable: {}",
                    total_count, key
                );
                summary.unreliable += 1;
            }

            let weights = observed
                .moves
                .iter()
                .map(|(action, _, count)| self.weight(&key, action, *count))
                .collect::<Vec<_>>();
            let total_weight = weights.iter().sum::<f64>();

            let mut edges = observed
                .moves
                .iter()
                .zip(weights)
                .map(|((action, child, _), weight)| Edge {
                    action: action.clone(),
                    child: ids[child],
                    probability: div_or_zero(weight, total_weight),
                })
                .collect::<Vec<_>>();

            if total_count > 0 {
                if let Some((action, child)) = &observed.best_move {
                    if !edges.iter().any(|e| &e.action == action) {
                        edges.push(Edge {
                            action: action.clone(),
                            child: ids[child],
                            probability: 0.0,
                        });
                        summary.best_move_edges += 1;
                    }
                }
            }

            if edges.is_empty() {
                summary.leaves += 1;
            }

            nodes.push(PositionNode::new(key, edges, total_count));
        }

        let tree = PositionTree::new(nodes);
        check_acyclic(&tree)?;

        info!(
            "Built position tree: {} positions, {} leaves, {} unreliable, {} engine move edges",
            summary.positions, summary.leaves, summary.unreliable, summary.best_move_edges
        );

        Ok((tree, summary))
    }

    fn weight(&self, position: &PositionKey, action: &str, count: u64) -> f64 {
        let weight = count as f64 * self.options.multipliers.get(position, action);
        if self.options.player_strength != 0.0 {
            weight.powf(self.options.player_strength)
        } else {
            weight
        }
    }
}

fn check_acyclic(tree: &PositionTree) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Open,
        Done,
    }

    let mut marks = vec![Mark::New; tree.len()];
    for (root, _) in tree.iter() {
        if marks[root.as_usize()] != Mark::New {
            continue;
        }

        let mut stack = vec![(root, 0_usize)];
        marks[root.as_usize()] = Mark::Open;

        while let Some((id, next)) = stack.pop() {
            let edges = tree.get(id).edges();
            if next == edges.len() {
                marks[id.as_usize()] = Mark::Done;
                continue;
            }

            stack.push((id, next + 1));
            let child = edges[next].child;
            match marks[child.as_usize()] {
                Mark::Open => bail!("Position graph has a cycle through {}", tree.get(child).key()),
                Mark::New => {
                    marks[child.as_usize()] = Mark::Open;
                    stack.push((child, 0));
                }
                Mark::Done => {}
            }
        }
    }

    Ok(())
}
