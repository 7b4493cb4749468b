//! Fixed-width batches over window datasets.
//!
//! [`build_dataloader`] is the usual entry point: it builds the train and
//! evaluation tables from the same inputs and wraps them in a shuffled
//! training loader and an ordered evaluation loader.
use std::sync::Arc;

use ndarray::{Array1, Array2, ShapeError};
use rand;
use rand::prng::XorShiftRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use config::{ConfigError, LoaderConfig, SessionConfig};
use data::{SessionEnds, UserConsumed};
use dataset::{Example, IndexError, WindowDataset};
use session::{build_return_session, build_session, SessionError, SessionTable};
use {ItemId, UserId};

/// Errors raised while assembling a batch.
#[derive(Debug, Fail)]
pub enum BatchError {
    /// A row could not be fetched.
    #[fail(display = "{}", _0)]
    Index(#[cause] IndexError),
    /// Gathered columns did not fit the batch shape.
    #[fail(display = "Unable to shape batch: {}", _0)]
    Shape(#[cause] ShapeError),
}

impl From<IndexError> for BatchError {
    fn from(err: IndexError) -> Self {
        BatchError::Index(err)
    }
}

impl From<ShapeError> for BatchError {
    fn from(err: ShapeError) -> Self {
        BatchError::Shape(err)
    }
}

/// Per-row signals of a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchSignals {
    /// Reward, done flag and next history of every row.
    Step {
        /// Rewards, `(batch,)`.
        rewards: Array1<f32>,
        /// Done flags, `(batch,)`.
        dones: Array1<bool>,
        /// Next histories, `(batch, hist_num)`.
        next_items: Array2<ItemId>,
    },
    /// Return-to-go of every row.
    Return {
        /// Returns, `(batch,)`.
        returns: Array1<f32>,
    },
}

/// A batch of examples laid out as arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// Users, `(batch,)`.
    pub users: Array1<UserId>,
    /// Histories, `(batch, hist_num)`.
    pub items: Array2<ItemId>,
    /// Actions, `(batch,)`.
    pub actions: Array1<ItemId>,
    /// Training signals.
    pub signals: BatchSignals,
}

impl Batch {
    fn from_examples(
        examples: &[Example],
        hist_num: usize,
        has_return: bool,
    ) -> Result<Self, BatchError> {
        let num_rows = examples.len();

        let mut users = Vec::with_capacity(num_rows);
        let mut items = Vec::with_capacity(num_rows * hist_num);
        let mut actions = Vec::with_capacity(num_rows);
        let mut values = Vec::with_capacity(num_rows);
        let mut dones = Vec::new();
        let mut next_items = Vec::new();

        for example in examples {
            users.push(example.user());
            items.extend_from_slice(example.item());
            actions.push(example.action());

            match *example {
                Example::Step {
                    reward,
                    done,
                    next_item,
                    ..
                } => {
                    values.push(reward);
                    dones.push(done);
                    next_items.extend_from_slice(next_item);
                }
                Example::Return { return_to_go, .. } => values.push(return_to_go),
            }
        }

        let signals = if has_return {
            BatchSignals::Return {
                returns: Array1::from_vec(values),
            }
        } else {
            BatchSignals::Step {
                rewards: Array1::from_vec(values),
                dones: Array1::from_vec(dones),
                next_items: Array2::from_shape_vec((num_rows, hist_num), next_items)?,
            }
        };

        Ok(Batch {
            users: Array1::from_vec(users),
            items: Array2::from_shape_vec((num_rows, hist_num), items)?,
            actions: Array1::from_vec(actions),
            signals: signals,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.users.len() == 0
    }
}

fn seeded_rng(seed: Option<u64>) -> XorShiftRng {
    match seed {
        Some(seed) => {
            let mut bytes = [0u8; 16];

            for (idx, byte) in bytes.iter_mut().enumerate() {
                *byte = (seed >> (8 * (idx % 8))) as u8;
            }

            XorShiftRng::from_seed(bytes)
        }
        None => XorShiftRng::from_seed(rand::thread_rng().gen()),
    }
}

/// Start a rayon pool for gathering rows; `None` when `n_workers` is zero.
pub fn worker_pool(n_workers: usize) -> Result<Option<Arc<ThreadPool>>, ConfigError> {
    if n_workers == 0 {
        return Ok(None);
    }

    ThreadPoolBuilder::new()
        .num_threads(n_workers)
        .build()
        .map(|pool| Some(Arc::new(pool)))
        .map_err(|err| ConfigError::WorkerPool {
            n_workers: n_workers,
            reason: err.to_string(),
        })
}

/// Produces batches from a [`WindowDataset`] according to its profile.
///
/// Training loaders draw a fresh permutation of the rows every time
/// [`iter_batches`](#method.iter_batches) is called; evaluation loaders
/// always yield rows in table order. The last batch of an epoch may be
/// smaller than the batch size.
#[derive(Debug)]
pub struct WindowLoader {
    dataset: WindowDataset,
    batch_size: usize,
    order: Vec<usize>,
    rng: XorShiftRng,
    pool: Option<Arc<ThreadPool>>,
}

impl WindowLoader {
    /// Build a loader over `dataset`. The effective batch size is
    /// `batch_size` scaled by the dataset profile's multiplier.
    pub fn new(dataset: WindowDataset, batch_size: usize) -> Result<Self, ConfigError> {
        if batch_size < 1 {
            return Err(ConfigError::InvalidBatchSize);
        }

        let batch_size = batch_size * dataset.profile().batch_multiplier();
        let order = (0..dataset.len()).collect();

        Ok(WindowLoader {
            dataset: dataset,
            batch_size: batch_size,
            order: order,
            rng: seeded_rng(None),
            pool: None,
        })
    }

    /// Fix the shuffle seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = seeded_rng(Some(seed));
        self
    }

    /// Gather rows on `pool` instead of the calling thread.
    pub fn pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// The underlying dataset.
    pub fn dataset(&self) -> &WindowDataset {
        &self.dataset
    }

    /// Effective batch width.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of rows per epoch.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the loader yields nothing.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        (self.len() + self.batch_size - 1) / self.batch_size
    }

    /// Iterate over one epoch of batches.
    pub fn iter_batches(&mut self) -> BatchIterator {
        if self.dataset.profile().shuffle() {
            self.rng.shuffle(&mut self.order);
        }

        BatchIterator {
            loader: self,
            idx: 0,
        }
    }

    fn gather(&self, indices: &[usize]) -> Result<Batch, BatchError> {
        let fetch = |&idx: &usize| self.dataset.get(idx);

        let examples = match self.pool {
            Some(ref pool) => {
                pool.install(|| indices.par_iter().map(fetch).collect::<Result<Vec<_>, _>>())
            }
            None => indices.iter().map(fetch).collect::<Result<Vec<_>, _>>(),
        }?;

        Batch::from_examples(
            &examples,
            self.dataset.hist_num(),
            self.dataset.has_return(),
        )
    }
}

/// Iterator over the batches of one epoch.
#[derive(Debug)]
pub struct BatchIterator<'a> {
    loader: &'a WindowLoader,
    idx: usize,
}

impl<'a> Iterator for BatchIterator<'a> {
    type Item = Result<Batch, BatchError>;
    fn next(&mut self) -> Option<Self::Item> {
        let order = &self.loader.order;

        if self.idx >= order.len() {
            return None;
        }

        let start = self.idx;
        let stop = (self.idx + self.loader.batch_size).min(order.len());

        self.idx = stop;

        Some(self.loader.gather(&order[start..stop]))
    }
}

type BuildFn = fn(
    &SessionConfig,
    &UserConsumed,
    &UserConsumed,
    bool,
    Option<&SessionEnds>,
) -> Result<SessionTable, SessionError>;

/// Build the training and evaluation loaders.
///
/// Training windows come from `train_consumed`; evaluation windows predict
/// each user's first test item. Both loaders share one worker pool when
/// `n_workers` is positive.
pub fn build_dataloader(
    config: &LoaderConfig,
    train_consumed: &UserConsumed,
    test_consumed: &UserConsumed,
    train_sess_end: Option<&SessionEnds>,
    test_sess_end: Option<&SessionEnds>,
) -> Result<(WindowLoader, WindowLoader), SessionError> {
    config.validate()?;

    let session = config.session();
    let build: BuildFn = if config.returns() {
        build_return_session
    } else {
        build_session
    };

    let train_table = build(session, train_consumed, test_consumed, true, train_sess_end)?;
    let test_table = build(session, train_consumed, test_consumed, false, test_sess_end)?;

    let mut train_loader = WindowLoader::new(WindowDataset::train(train_table), config.batch_size())?;
    let mut test_loader = WindowLoader::new(WindowDataset::eval(test_table), config.batch_size())?;

    if let Some(seed) = config.shuffle_seed() {
        train_loader = train_loader.seed(seed);
    }

    if let Some(pool) = worker_pool(config.workers())? {
        train_loader = train_loader.pool(pool.clone());
        test_loader = test_loader.pool(pool);
    }

    debug!(
        "Train loader: {} rows in {} batches; eval loader: {} rows in {} batches.",
        train_loader.len(),
        train_loader.num_batches(),
        test_loader.len(),
        test_loader.num_batches()
    );

    Ok((train_loader, test_loader))
}
