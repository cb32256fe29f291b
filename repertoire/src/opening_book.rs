use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use engine::PositionKey;
use serde::{Deserialize, Serialize};

use super::BookMove;

/// Moves added and removed when a repertoire grows by one size step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookDiff {
    pub added: Vec<BookMove>,
    pub removed: Vec<BookMove>,
}

impl BookDiff {
    pub fn new(added: Vec<BookMove>, removed: Vec<BookMove>) -> Self {
        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Count of generic preparation moves added minus those removed.
    pub fn net_prep(&self) -> isize {
        let added = self.added.iter().filter(|m| m.action.is_prep()).count() as isize;
        let removed = self.removed.iter().filter(|m| m.action.is_prep()).count() as isize;
        added - removed
    }
}

/// The set of moves memorized at one repertoire size.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningBook {
    moves: BTreeSet<BookMove>,
}

impl OpeningBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn contains(&self, book_move: &BookMove) -> bool {
        self.moves.contains(book_move)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookMove> {
        self.moves.iter()
    }

    pub fn insert(&mut self, book_move: BookMove) -> bool {
        self.moves.insert(book_move)
    }

    pub fn apply(&mut self, diff: &BookDiff) {
        for book_move in &diff.removed {
            self.moves.remove(book_move);
        }

        for book_move in &diff.added {
            self.moves.insert(book_move.clone());
        }
    }

    /// The diff that turns `previous` into `self`.
    pub fn diff_from(&self, previous: &OpeningBook) -> BookDiff {
        BookDiff {
            added: self.moves.difference(&previous.moves).cloned().collect(),
            removed: previous.moves.difference(&self.moves).cloned().collect(),
        }
    }
}

impl FromIterator<BookMove> for OpeningBook {
    fn from_iter<T: IntoIterator<Item = BookMove>>(iter: T) -> Self {
        Self {
            moves: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for OpeningBook {
    type Item = BookMove;
    type IntoIter = std::collections::btree_set::IntoIter<BookMove>;

    fn into_iter(self) -> Self::IntoIter {
        self.moves.into_iter()
    }
}

/// Book moves grouped by the position they are played in.
///
/// A position holds at most one concrete move but may accumulate any number of
/// preparation units alongside it.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MoveSet {
    by_position: BTreeMap<PositionKey, BTreeSet<BookMove>>,
}

impl MoveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_moves<'a>(moves: impl IntoIterator<Item = &'a BookMove>) -> Self {
        let mut set = Self::new();
        for book_move in moves {
            set.insert(book_move.clone());
        }

        set
    }

    pub fn len(&self) -> usize {
        self.by_position.values().map(|moves| moves.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_position.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookMove> {
        self.by_position.values().flatten()
    }

    pub fn contains(&self, book_move: &BookMove) -> bool {
        self.by_position
            .get(&book_move.position)
            .map_or(false, |moves| moves.contains(book_move))
    }

    fn insert(&mut self, book_move: BookMove) {
        self.by_position
            .entry(book_move.position.clone())
            .or_default()
            .insert(book_move);
    }

    /// Merges `other` in. A concrete move displaces everything at its position unless
    /// `multi` is set. Returns the moves that were added and displaced.
    pub fn add(&mut self, other: &MoveSet, update: bool, multi: bool) -> (MoveSet, MoveSet) {
        let mut added = MoveSet::new();
        let mut displaced = MoveSet::new();

        for book_move in other.iter() {
            match self.by_position.entry(book_move.position.clone()) {
                Entry::Occupied(mut entry) => {
                    if entry.get().contains(book_move) {
                        continue;
                    }

                    added.insert(book_move.clone());
                    if book_move.action.is_prep() || multi {
                        if update {
                            entry.get_mut().insert(book_move.clone());
                        }
                    } else {
                        for existing in entry.get() {
                            displaced.insert(existing.clone());
                        }

                        if update {
                            *entry.get_mut() = BTreeSet::from([book_move.clone()]);
                        }
                    }
                }
                Entry::Vacant(entry) => {
                    added.insert(book_move.clone());
                    if update {
                        entry.insert(BTreeSet::from([book_move.clone()]));
                    }
                }
            }
        }

        (added, displaced)
    }

    /// Removes the moves of `other` that are present. Returns what was removed.
    pub fn remove(&mut self, other: &MoveSet, update: bool) -> MoveSet {
        let mut removed = MoveSet::new();

        for book_move in other.iter() {
            if let Entry::Occupied(mut entry) = self.by_position.entry(book_move.position.clone()) {
                if entry.get().contains(book_move) {
                    removed.insert(book_move.clone());
                }

                if update {
                    entry.get_mut().remove(book_move);
                    if entry.get().is_empty() {
                        entry.remove();
                    }
                }
            }
        }

        removed
    }

    /// Applies a diff, first removing `discard` then adding `add`. Returns the effective
    /// additions and removals, which may differ from the requested ones.
    pub fn apply_diff(&mut self, add: &MoveSet, discard: &MoveSet, update: bool) -> (MoveSet, MoveSet) {
        let mut removed = self.remove(discard, update);
        let (added, displaced) = self.add(add, update, false);
        for book_move in displaced.iter() {
            removed.insert(book_move.clone());
        }

        (added, removed)
    }

    /// Combines two consecutive diffs into one equivalent diff.
    pub fn combine_diffs(
        add1: &MoveSet,
        discard1: &MoveSet,
        add2: &MoveSet,
        discard2: &MoveSet,
    ) -> (MoveSet, MoveSet) {
        let mut add = add1.clone();
        let mut discard = discard1.clone();

        discard.remove(add2, true);
        add.remove(discard2, true);
        discard.add(discard2, true, true);
        add.add(add2, true, false);

        (add, discard)
    }

    pub fn into_moves(self) -> Vec<BookMove> {
        self.by_position.into_values().flatten().collect()
    }
}
