use std::sync::Arc;

use anyhow::{Context, Result};
use engine::LeafEvaluator;
use tree::{NodeId, PositionNode, PositionTree};

use super::{
    aggregate, Action, BookMove, CacheKey, OpeningBook, RepertoireOptions, Role, RunStats,
    Sibling, SuperBook, SuperBookCache,
};

/// Computes superbooks over a position tree.
///
/// At a mover position the owner either memorizes one move there or spends the whole
/// budget deeper in the tree; at an opponent position the budget is shared among the
/// replies in proportion to how much each is worth.
pub struct Optimizer<'a, E> {
    tree: &'a PositionTree,
    evaluator: E,
    options: &'a RepertoireOptions,
    cache: &'a mut SuperBookCache,
    stats: RunStats,
}

impl<'a, E: LeafEvaluator> Optimizer<'a, E> {
    pub fn new(
        tree: &'a PositionTree,
        evaluator: E,
        options: &'a RepertoireOptions,
        cache: &'a mut SuperBookCache,
    ) -> Self {
        Self {
            tree,
            evaluator,
            options,
            cache,
            stats: RunStats::default(),
        }
    }

    /// Computes the superbook for `root` with the configured budget and optimism.
    pub fn build(&mut self, root: NodeId, role: Role) -> Result<Arc<SuperBook>> {
        self.stats = RunStats::default();

        let budget = self.options.budget;
        let optimism = self.options.optimism;
        let result = match role {
            Role::Mover => self.mover_book(root, budget, optimism),
            Role::Opponent => self.opponent_book(root, budget, optimism),
        };

        self.cache.advance_clock(self.stats.leaves);
        self.stats.log_summary();

        result
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn into_evaluator(self) -> E {
        self.evaluator
    }

    /// The superbook for a position where the repertoire's owner is to move.
    pub fn mover_book(&mut self, node: NodeId, budget: usize, optimism: f64) -> Result<Arc<SuperBook>> {
        let tree = self.tree;
        let position = tree.get(node);
        let key = CacheKey::new(position.key().clone(), budget, Role::Mover, optimism);

        if let Some(book) = self.cached(&key, position) {
            return Ok(book);
        }

        if position.is_leaf() {
            return self.leaf_book(position, budget, optimism, Role::Mover);
        }

        let books = position
            .edges()
            .iter()
            .map(|edge| self.opponent_book(edge.child, budget, -optimism))
            .collect::<Result<Vec<_>>>()?;

        let starting_value = position
            .edges()
            .iter()
            .zip(&books)
            .map(|(edge, book)| book.starting_value() * edge.probability)
            .sum::<f64>();

        let skip = self.aggregate(position, &books, budget)?;
        let choose = self.choose(position, &books, budget, starting_value)?;
        let book = Arc::new(self.merge(&skip, &choose, starting_value)?);

        self.store(key, &book, position);

        Ok(book)
    }

    /// The superbook for a position where the opponent is to move.
    pub fn opponent_book(&mut self, node: NodeId, budget: usize, optimism: f64) -> Result<Arc<SuperBook>> {
        let tree = self.tree;
        let position = tree.get(node);
        let key = CacheKey::new(position.key().clone(), budget, Role::Opponent, optimism);

        if let Some(book) = self.cached(&key, position) {
            return Ok(book);
        }

        if position.is_leaf() {
            return self.leaf_book(position, budget, optimism, Role::Opponent);
        }

        let books = position
            .edges()
            .iter()
            .map(|edge| self.mover_book(edge.child, budget, -optimism))
            .collect::<Result<Vec<_>>>()?;

        let book = Arc::new(self.aggregate(position, &books, budget)?);

        self.store(key, &book, position);

        Ok(book)
    }

    fn cached(&mut self, key: &CacheKey, position: &PositionNode) -> Option<Arc<SuperBook>> {
        if !self.cache.is_cacheable(position.total_count()) {
            return None;
        }

        let book = self.cache.get(key, self.stats.leaves);
        match book {
            Some(_) => self.stats.cache_hits += 1,
            None => self.stats.cache_misses += 1,
        }

        book
    }

    fn store(&mut self, key: CacheKey, book: &Arc<SuperBook>, position: &PositionNode) {
        if !self.cache.is_cacheable(position.total_count()) {
            return;
        }

        let evicted = self
            .cache
            .put(key, book.clone(), position.total_count(), self.stats.leaves);
        self.stats.cache_stores += 1;
        self.stats.evictions += evicted as u64;
    }

    fn leaf_book(
        &mut self,
        position: &PositionNode,
        budget: usize,
        optimism: f64,
        role: Role,
    ) -> Result<Arc<SuperBook>> {
        self.stats.record_leaf();

        let key = position.key();
        let value = match role {
            Role::Mover => self.evaluate(position, optimism)?,
            Role::Opponent => 1.0 - self.evaluate(position, -optimism)?,
        };

        let book = if self.options.include_placeholders {
            SuperBook::placeholder(key.clone(), value, budget, self.options.prep_value)
        } else {
            SuperBook::new(value)
        };

        Ok(Arc::new(book))
    }

    fn evaluate(&mut self, position: &PositionNode, optimism: f64) -> Result<f64> {
        let evaluation = self
            .evaluator
            .evaluate(position.key(), optimism)
            .with_context(|| format!("Failed to evaluate {}", position.key()))?;

        Ok(evaluation.value)
    }

    fn aggregate(&mut self, position: &PositionNode, books: &[Arc<SuperBook>], budget: usize) -> Result<SuperBook> {
        let siblings = position
            .edges()
            .iter()
            .zip(books)
            .map(|(edge, book)| Sibling::new(edge.probability, book))
            .collect::<Vec<_>>();

        aggregate(budget, &siblings, &self.options.estimate, &mut self.stats)
    }

    /// Books that memorize a move at `position` and then follow the chosen child's book.
    fn choose(
        &self,
        position: &PositionNode,
        books: &[Arc<SuperBook>],
        budget: usize,
        starting_value: f64,
    ) -> Result<SuperBook> {
        let estimate = &self.options.estimate;
        let mut output = SuperBook::new(starting_value);
        if budget == 0 {
            return Ok(output);
        }

        let played = |i: usize, value: f64| {
            BookMove::new(
                position.key().clone(),
                Action::Move(position.edges()[i].action.clone()),
                value,
            )
        };

        let Some((first, value)) = best_child(books, 0) else {
            return Ok(output);
        };

        let mut current = OpeningBook::from_iter([played(first, value)]);
        output.push(current.diff_from(&OpeningBook::new()), value, estimate)?;

        let mut cursors = books.iter().map(|b| b.snapshots()).collect::<Vec<_>>();
        for k in 1..budget {
            for cursor in cursors.iter_mut() {
                cursor.advance();
            }

            let Some((best, value)) = best_child(books, k) else {
                break;
            };

            let mut next = cursors[best].book().clone();
            next.insert(played(best, value));

            output.push(next.diff_from(&current), value, estimate)?;
            current = next;
        }

        Ok(output)
    }

    /// Takes, at each size, whichever of skipping or choosing is worth more. Ties keep
    /// the side taken at the previous size, starting with skipping. A size that would be
    /// worth less than the previous one keeps the previous book.
    fn merge(&self, skip: &SuperBook, choose: &SuperBook, starting_value: f64) -> Result<SuperBook> {
        let estimate = &self.options.estimate;
        let mut output = SuperBook::new(starting_value);
        let mut skip_cursor = skip.snapshots();
        let mut choose_cursor = choose.snapshots();
        let mut current = OpeningBook::new();
        let mut current_value = starting_value;
        let mut chose = false;

        for k in 1..=skip.size().max(choose.size()) {
            let skip_book = skip_cursor.advance().map(|b| (b, skip.total_value(k)));
            let choose_book = choose_cursor.advance().map(|b| (b, choose.total_value(k)));

            let ((book, value), choosing) = match (skip_book, choose_book) {
                (Some(s), Some(c)) if s.1 > c.1 || (s.1 == c.1 && !chose) => (s, false),
                (_, Some(c)) => (c, true),
                (Some(s), None) => (s, false),
                (None, None) => break,
            };

            if value < current_value {
                output.push(Default::default(), current_value, estimate)?;
                continue;
            }

            output.push(book.diff_from(&current), value, estimate)?;
            current = book.clone();
            current_value = value;
            chose = choosing;
        }

        Ok(output)
    }
}

/// The child whose book of size `k` is worth the most, preferring the earliest on ties.
fn best_child(books: &[Arc<SuperBook>], k: usize) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, book) in books.iter().enumerate() {
        if book.size() < k {
            continue;
        }

        let value = book.total_value(k);
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((i, value));
        }
    }

    best
}
