use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use engine::PositionKey;
use serde::{Deserialize, Serialize};
use tree::{Edge, NodeId, PositionNode, PositionTree};

use super::{Action, BookMove, OpeningBook, Role, SuperBook};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LikelyLeaf {
    pub position: PositionKey,
    pub probability: f64,
}

/// An opponent reply that loses value relative to the opponent's best reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpponentError {
    pub position: PositionKey,
    pub action: String,
    pub weighted_loss: f64,
}

/// Where a repertoire ends up. Leaves are the unexpanded positions reached most often
/// when following the book, which makes them the best candidates for a longer evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookReport {
    pub leaves: Vec<LikelyLeaf>,
    pub errors: Vec<OpponentError>,
}

impl BookReport {
    /// Walks the tree from `root`, following the book's move wherever it has one and
    /// branching over every reply elsewhere. Transpositions are walked once per path.
    pub fn new(tree: &PositionTree, root: NodeId, book: &OpeningBook, limit: usize) -> Self {
        let mut best_moves = BTreeMap::<&PositionKey, &BookMove>::new();
        for book_move in book.iter() {
            let best = best_moves.entry(&book_move.position).or_insert(book_move);
            if book_move.value > best.value {
                *best = book_move;
            }
        }

        let mut walk = Walk {
            tree,
            best_moves,
            report: BookReport::default(),
        };
        walk.visit(root, 1.0);

        let mut report = walk.report;
        report
            .leaves
            .sort_by(|a, b| b.probability.total_cmp(&a.probability));
        report.leaves.truncate(limit);
        report
            .errors
            .sort_by(|a, b| b.weighted_loss.total_cmp(&a.weighted_loss));
        report.errors.truncate(limit);

        report
    }
}

struct Walk<'a> {
    tree: &'a PositionTree,
    best_moves: BTreeMap<&'a PositionKey, &'a BookMove>,
    report: BookReport,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, node: NodeId, probability: f64) {
        let tree = self.tree;
        let position = tree.get(node);
        if position.is_leaf() {
            self.report.leaves.push(LikelyLeaf {
                position: position.key().clone(),
                probability,
            });
            return;
        }

        if let Some(edge) = self.book_edge(position) {
            self.visit(edge.child, probability);
            return;
        }

        let values = position
            .edges()
            .iter()
            .map(|edge| {
                let child = tree.get(edge.child);
                self.best_moves.get(child.key()).map(|m| m.value)
            })
            .collect::<Vec<_>>();

        // Values are from the book owner's side, so the opponent's best reply is the lowest.
        let best_reply = values.iter().flatten().copied().reduce(f64::min);
        if let Some(best_reply) = best_reply {
            for (edge, value) in position.edges().iter().zip(&values) {
                if let Some(value) = value {
                    self.report.errors.push(OpponentError {
                        position: position.key().clone(),
                        action: edge.action.clone(),
                        weighted_loss: (value - best_reply) * probability * edge.probability,
                    });
                }
            }
        }

        for edge in position.edges() {
            self.visit(edge.child, probability * edge.probability);
        }
    }

    fn book_edge(&self, position: &'a PositionNode) -> Option<&'a Edge> {
        let book_move = self.best_moves.get(position.key())?;
        match &book_move.action {
            Action::Move(action) => position.edges().iter().find(|e| &e.action == action),
            Action::Prep(_) => None,
        }
    }
}

/// The book of one size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Repertoire {
    pub size: usize,
    pub total_value: f64,
    pub marginal_value: f64,
    pub moves: Vec<BookMove>,
}

/// Every repertoire of a superbook, ready to be written out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepertoireSeries {
    pub role: Role,
    pub starting_value: f64,
    pub best_size: usize,
    pub repertoires: Vec<Repertoire>,
}

impl RepertoireSeries {
    pub fn new(superbook: &SuperBook, role: Role) -> Self {
        let mut repertoires = Vec::with_capacity(superbook.size());
        let mut snapshots = superbook.snapshots();
        while let Some(book) = snapshots.advance() {
            let size = repertoires.len() + 1;
            repertoires.push(Repertoire {
                size,
                total_value: superbook.total_value(size),
                marginal_value: superbook.marginal_value(size),
                moves: book.iter().cloned().collect(),
            });
        }

        Self {
            role,
            starting_value: superbook.starting_value(),
            best_size: superbook.best_size(),
            repertoires,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create repertoire output {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write repertoire output {:?}", path))?;

        Ok(())
    }
}
