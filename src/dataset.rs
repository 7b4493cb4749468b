//! Random access to single training examples.
//!
//! A [`WindowDataset`] wraps a finished [`SessionTable`] and splits each
//! `hist_num + 1` window into the history the model sees, the action it
//! should predict and, in step mode, the next history.
use std::sync::Arc;

use session::{Row, RowSignal, SessionTable};
use {ItemId, UserId};

/// Raised by [`WindowDataset::get`] for indices past the end.
#[derive(Debug, Fail, PartialEq)]
#[fail(display = "Index {} out of range for dataset of length {}.", index, len)]
pub struct IndexError {
    /// Requested index.
    pub index: usize,
    /// Dataset length.
    pub len: usize,
}

/// How a dataset is meant to be iterated.
///
/// Both profiles produce identical examples; they differ only in the
/// order and width of the batches built on top of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// Reshuffled every epoch.
    Train,
    /// Fixed order, batches twice as wide.
    Eval,
}

impl Profile {
    /// Whether iteration order is randomised.
    pub fn shuffle(&self) -> bool {
        match *self {
            Profile::Train => true,
            Profile::Eval => false,
        }
    }

    /// Multiplier applied to the configured batch size.
    pub fn batch_multiplier(&self) -> usize {
        match *self {
            Profile::Train => 1,
            Profile::Eval => 2,
        }
    }
}

/// A single example, borrowing its item slices from the table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Example<'a> {
    /// Example carrying an immediate reward and terminal flag.
    Step {
        /// Owning user.
        user: UserId,
        /// The `hist_num` items before the action.
        item: &'a [ItemId],
        /// The item to predict.
        action: ItemId,
        /// Reward of the action.
        reward: f32,
        /// Whether the action closes a session.
        done: bool,
        /// History after taking the action.
        next_item: &'a [ItemId],
    },
    /// Example carrying a discounted return-to-go.
    Return {
        /// Owning user.
        user: UserId,
        /// The `hist_num` items before the action.
        item: &'a [ItemId],
        /// The item to predict.
        action: ItemId,
        /// Discounted return from the action onwards.
        return_to_go: f32,
    },
}

impl<'a> Example<'a> {
    fn from_row(row: Row<'a>, hist_num: usize) -> Self {
        let item = &row.window[..hist_num];
        let action = row.window[hist_num];

        match row.signal {
            RowSignal::Step { reward, done } => Example::Step {
                user: row.user_id,
                item: item,
                action: action,
                reward: reward,
                done: done,
                next_item: &row.window[1..],
            },
            RowSignal::Return { return_to_go } => Example::Return {
                user: row.user_id,
                item: item,
                action: action,
                return_to_go: return_to_go,
            },
        }
    }

    /// Owning user.
    pub fn user(&self) -> UserId {
        match *self {
            Example::Step { user, .. } | Example::Return { user, .. } => user,
        }
    }

    /// History items.
    pub fn item(&self) -> &'a [ItemId] {
        match *self {
            Example::Step { item, .. } | Example::Return { item, .. } => item,
        }
    }

    /// Action item.
    pub fn action(&self) -> ItemId {
        match *self {
            Example::Step { action, .. } | Example::Return { action, .. } => action,
        }
    }
}

/// Indexed, read-only view over a session table.
///
/// Cloning is cheap: clones share the underlying table.
#[derive(Clone, Debug)]
pub struct WindowDataset {
    table: Arc<SessionTable>,
    profile: Profile,
}

impl WindowDataset {
    /// Wrap a table with an explicit profile.
    pub fn new<T: Into<Arc<SessionTable>>>(table: T, profile: Profile) -> Self {
        WindowDataset {
            table: table.into(),
            profile: profile,
        }
    }

    /// Wrap a table for shuffled training iteration.
    pub fn train<T: Into<Arc<SessionTable>>>(table: T) -> Self {
        WindowDataset::new(table, Profile::Train)
    }

    /// Wrap a table for ordered evaluation.
    pub fn eval<T: Into<Arc<SessionTable>>>(table: T) -> Self {
        WindowDataset::new(table, Profile::Eval)
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether there are no examples.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// History items per example.
    pub fn hist_num(&self) -> usize {
        self.table.hist_num()
    }

    /// Whether examples carry returns.
    pub fn has_return(&self) -> bool {
        self.table.has_return()
    }

    /// Iteration profile.
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// The wrapped table.
    pub fn table(&self) -> &SessionTable {
        &self.table
    }

    /// Example at `index`.
    pub fn get(&self, index: usize) -> Result<Example, IndexError> {
        let hist_num = self.hist_num();

        self.table
            .get(index)
            .map(|row| Example::from_row(row, hist_num))
            .ok_or_else(|| IndexError {
                index: index,
                len: self.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;

    use super::*;
    use config::SessionConfig;
    use data::UserConsumed;
    use session::{build_return_session, build_session};
    use PAD_ITEM;

    fn tables() -> (SessionTable, SessionTable) {
        let train = UserConsumed::from_items(vec![(1, vec![10, 11, 12]), (2, vec![20])]);
        let test = UserConsumed::from_items(vec![(1, vec![13])]);
        let config = SessionConfig::new(2, 2).gamma(0.5);

        (
            build_session(&config, &train, &test, true, None).unwrap(),
            build_return_session(&config, &train, &test, false, None).unwrap(),
        )
    }

    #[test]
    fn step_examples_split_the_window() {
        let (table, _) = tables();
        let dataset = WindowDataset::train(table);

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.profile(), Profile::Train);

        for index in 0..dataset.len() {
            let window = dataset.table().get(index).unwrap().window;

            match dataset.get(index).unwrap() {
                Example::Step {
                    item,
                    action,
                    next_item,
                    ..
                } => {
                    assert_eq!(item, &window[..2]);
                    assert_eq!(action, window[2]);
                    assert_eq!(next_item, &window[1..]);
                    assert_eq!(&item[1..], &next_item[..1]);
                }
                Example::Return { .. } => panic!("Expected a step example."),
            }
        }

        assert_eq!(
            dataset.get(1).unwrap(),
            Example::Step {
                user: 1,
                item: &[PAD_ITEM, 10],
                action: 11,
                reward: 1.0,
                done: false,
                next_item: &[10, 11],
            }
        );
    }

    #[test]
    fn return_examples() {
        let (_, table) = tables();
        let dataset = WindowDataset::eval(table);

        assert!(dataset.has_return());
        assert_eq!(dataset.profile(), Profile::Eval);
        assert_eq!(
            dataset.get(0).unwrap(),
            Example::Return {
                user: 1,
                item: &[11, 12],
                action: 13,
                return_to_go: 1.0,
            }
        );
    }

    #[test]
    fn out_of_range() {
        let (table, _) = tables();
        let dataset = WindowDataset::eval(table);

        assert_eq!(dataset.get(4), Err(IndexError { index: 4, len: 4 }));
    }

    #[test]
    fn concurrent_reads() {
        let (table, _) = tables();
        let dataset = WindowDataset::train(table);

        let actions: Vec<ItemId> = (0..1000)
            .into_par_iter()
            .map(|x| dataset.get(x % dataset.len()).unwrap().action())
            .collect();

        for (idx, &action) in actions.iter().enumerate() {
            assert_eq!(action, dataset.get(idx % 4).unwrap().action());
        }
    }

    #[test]
    fn profiles() {
        assert!(Profile::Train.shuffle());
        assert!(!Profile::Eval.shuffle());
        assert_eq!(Profile::Eval.batch_multiplier(), 2);
    }
}
