use serde::{Deserialize, Serialize};

use crate::practice::{MoveCategory, PracticeMove};

/// Summary counters of a finished practice session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub total_moves: u32,
    pub book_moves: u32,
    pub best_moves: u32,
    pub good_moves: u32,
    pub inaccuracies: u32,
    pub mistakes: u32,
    pub blunders: u32,
    pub accuracy_percentage: f64,
}

impl Stats {
    /// Moves that count as correct: book (including `repertoire`), best and good.
    pub fn correct_moves(&self) -> u32 {
        self.book_moves + self.best_moves + self.good_moves
    }
}

/// Fold classified moves into [`Stats`].
///
/// Pure and order-independent, so stored stats can be recomputed from the
/// stored moves at any time.
pub fn reduce<'a, I>(moves: I) -> Stats
where
    I: IntoIterator<Item = &'a PracticeMove>,
{
    let mut stats = Stats::default();
    for mv in moves {
        stats.total_moves += 1;
        match mv.category {
            MoveCategory::Book | MoveCategory::Repertoire => stats.book_moves += 1,
            MoveCategory::Best => stats.best_moves += 1,
            MoveCategory::Good => stats.good_moves += 1,
            MoveCategory::Inaccuracy => stats.inaccuracies += 1,
            MoveCategory::Mistake => stats.mistakes += 1,
            MoveCategory::Blunder => stats.blunders += 1,
        }
    }
    if stats.total_moves > 0 {
        stats.accuracy_percentage =
            f64::from(stats.correct_moves()) / f64::from(stats.total_moves) * 100.0;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mv(ply: u32, category: MoveCategory) -> PracticeMove {
        PracticeMove {
            ply,
            fen_before: String::new(),
            fen_after: String::new(),
            user_move: "e4".into(),
            expected_move: None,
            category,
            eval_before: 0,
            eval_after: 0,
            centipawn_loss: 0,
        }
    }

    #[test]
    fn test_reduce_empty() {
        let stats = reduce(std::iter::empty::<&PracticeMove>());
        assert_eq!(stats, Stats::default());
        assert_eq!(stats.accuracy_percentage, 0.0);
    }

    #[test]
    fn test_reduce_book_mistake_best() {
        let moves = vec![
            mv(1, MoveCategory::Book),
            mv(2, MoveCategory::Mistake),
            mv(3, MoveCategory::Best),
        ];
        let stats = reduce(&moves);
        assert_eq!(stats.total_moves, 3);
        assert_eq!(stats.book_moves, 1);
        assert_eq!(stats.best_moves, 1);
        assert_eq!(stats.mistakes, 1);
        assert!((stats.accuracy_percentage - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_repertoire_counts_as_book() {
        let stats = reduce(&[mv(1, MoveCategory::Repertoire), mv(2, MoveCategory::Mistake)]);
        assert_eq!(stats.book_moves, 1);
        assert_eq!(stats.mistakes, 1);
        assert_eq!(stats.accuracy_percentage, 50.0);
    }

    #[test]
    fn test_all_blunders_is_zero_accuracy() {
        let stats = reduce(&[mv(1, MoveCategory::Blunder), mv(2, MoveCategory::Inaccuracy)]);
        assert_eq!(stats.blunders, 1);
        assert_eq!(stats.inaccuracies, 1);
        assert_eq!(stats.accuracy_percentage, 0.0);
    }

    fn category() -> impl Strategy<Value = MoveCategory> {
        prop::sample::select(MoveCategory::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn counters_add_up(categories in prop::collection::vec(category(), 0..64)) {
            let moves: Vec<_> = categories
                .iter()
                .enumerate()
                .map(|(i, c)| mv(i as u32 + 1, *c))
                .collect();
            let stats = reduce(&moves);
            let counted = stats.book_moves + stats.best_moves + stats.good_moves
                + stats.inaccuracies + stats.mistakes + stats.blunders;
            prop_assert_eq!(stats.total_moves as usize, moves.len());
            prop_assert_eq!(counted, stats.total_moves);
            prop_assert!((0.0..=100.0).contains(&stats.accuracy_percentage));
            prop_assert!(!stats.accuracy_percentage.is_nan());
        }

        #[test]
        fn order_does_not_matter(categories in prop::collection::vec(category(), 1..32)) {
            let moves: Vec<_> = categories.iter().map(|c| mv(1, *c)).collect();
            let mut reversed = moves.clone();
            reversed.reverse();
            prop_assert_eq!(reduce(&moves), reduce(&reversed));
        }

        #[test]
        fn relabelling_book_as_repertoire_is_invisible(
            categories in prop::collection::vec(category(), 0..32)
        ) {
            let original: Vec<_> = categories.iter().map(|c| mv(1, *c)).collect();
            let relabelled: Vec<_> = categories
                .iter()
                .map(|c| match c {
                    MoveCategory::Book => mv(1, MoveCategory::Repertoire),
                    other => mv(1, *other),
                })
                .collect();
            prop_assert_eq!(reduce(&original), reduce(&relabelled));
        }
    }
}
