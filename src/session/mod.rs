//! Session building.
//!
//! Turns per-user consumption sequences into a flat [`SessionTable`] of
//! fixed-width windows: one row per (user, cut point), each holding the
//! `hist_num` items preceding the action followed by the action itself.
//!
//! Training tables have one cut point per train item. Evaluation tables
//! have one cut point per user, at the user's first test item, using the
//! whole train history as context.
//!
//! The episode horizon of a training table is the end of the train segment;
//! for an evaluation table it is the end of the full history. The last step
//! of the horizon is always terminal, and in [`SessionMode::Interval`] so is
//! every step named by a session-end marker.
use std::collections::BTreeSet;
use std::iter;

use rayon::prelude::*;

use config::{ConfigError, SessionConfig, SessionMode};
use data::{SessionEnds, UserConsumed};
use {ItemId, UserId};

mod returns;
mod table;

pub use self::returns::discounted_returns;
pub use self::table::{Row, RowSignal, SessionTable, SessionTableIterator, Signals, TableError};

/// Errors raised while building a session table.
#[derive(Debug, Fail, PartialEq)]
pub enum SessionError {
    /// Invalid configuration or inputs.
    #[fail(display = "{}", _0)]
    Config(#[cause] ConfigError),
    /// The assembled columns are inconsistent.
    #[fail(display = "{}", _0)]
    Table(#[cause] TableError),
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::Config(err)
    }
}

impl From<TableError> for SessionError {
    fn from(err: TableError) -> Self {
        SessionError::Table(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum SignalKind {
    Step,
    Return,
}

/// Rows contributed by a single user.
#[derive(Debug, Default)]
struct UserBlock {
    num_rows: usize,
    items: Vec<ItemId>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
}

/// Build a table of reward/done windows.
///
/// With `train` set, every train item of every user becomes an action;
/// otherwise each user with test items contributes one window whose action
/// is their first test item. Markers in `sess_end` are only consulted in
/// [`SessionMode::Interval`].
pub fn build_session(
    config: &SessionConfig,
    train_consumed: &UserConsumed,
    test_consumed: &UserConsumed,
    train: bool,
    sess_end: Option<&SessionEnds>,
) -> Result<SessionTable, SessionError> {
    build(
        config,
        train_consumed,
        test_consumed,
        train,
        sess_end,
        SignalKind::Step,
    )
}

/// Build a table of return-to-go windows.
///
/// Windows are chosen exactly as in [`build_session`]; each row carries the
/// discount-weighted sum of rewards from its action to the end of the
/// action's session instead of a reward and done flag.
pub fn build_return_session(
    config: &SessionConfig,
    train_consumed: &UserConsumed,
    test_consumed: &UserConsumed,
    train: bool,
    sess_end: Option<&SessionEnds>,
) -> Result<SessionTable, SessionError> {
    build(
        config,
        train_consumed,
        test_consumed,
        train,
        sess_end,
        SignalKind::Return,
    )
}

fn build(
    config: &SessionConfig,
    train_consumed: &UserConsumed,
    test_consumed: &UserConsumed,
    train: bool,
    sess_end: Option<&SessionEnds>,
    kind: SignalKind,
) -> Result<SessionTable, SessionError> {
    config.validate()?;

    let users: Vec<UserId> = train_consumed
        .user_ids()
        .chain(test_consumed.user_ids())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    validate_inputs(config, &users, train_consumed, test_consumed, sess_end)?;

    let blocks: Vec<UserBlock> = users
        .par_iter()
        .map(|&user_id| {
            let markers = match (config.session_mode(), sess_end) {
                (SessionMode::Interval, Some(ends)) => ends.get(user_id),
                _ => None,
            };

            user_block(
                config,
                user_id,
                train_consumed,
                test_consumed,
                train,
                markers,
                kind,
            )
        })
        .collect();

    let num_rows: usize = blocks.iter().map(|x| x.num_rows).sum();
    let mut user_column = Vec::with_capacity(num_rows);
    let mut items = Vec::with_capacity(num_rows * (config.hist_num() + 1));
    let mut rewards = Vec::with_capacity(num_rows);
    let mut dones = Vec::with_capacity(num_rows);

    for (&user_id, block) in users.iter().zip(blocks.into_iter()) {
        user_column.extend(iter::repeat(user_id).take(block.num_rows));
        items.extend(block.items);
        rewards.extend(block.rewards);
        dones.extend(block.dones);
    }

    let signals = match kind {
        SignalKind::Step => Signals::Step {
            rewards: rewards,
            dones: dones,
        },
        SignalKind::Return => Signals::Return { returns: rewards },
    };

    let table = SessionTable::new(config.hist_num(), user_column, items, signals)?;

    info!(
        "Built {} {} windows for {} users (hist_num {}, mode {:?}).",
        table.len(),
        if train { "train" } else { "eval" },
        users.len(),
        config.hist_num(),
        config.session_mode()
    );

    Ok(table)
}

fn history_len(
    user_id: UserId,
    train_consumed: &UserConsumed,
    test_consumed: &UserConsumed,
) -> usize {
    train_consumed.get(user_id).map_or(0, |x| x.len())
        + test_consumed.get(user_id).map_or(0, |x| x.len())
}

fn validate_inputs(
    config: &SessionConfig,
    users: &[UserId],
    train_consumed: &UserConsumed,
    test_consumed: &UserConsumed,
    sess_end: Option<&SessionEnds>,
) -> Result<(), ConfigError> {
    if users.len() > config.n_users() {
        return Err(ConfigError::TooManyUsers {
            expected: config.n_users(),
            found: users.len(),
        });
    }

    let pad_item = config.padding();

    for consumed in &[train_consumed, test_consumed] {
        for (&user_id, sequence) in consumed.iter() {
            if sequence.items().contains(&pad_item) {
                return Err(ConfigError::PadCollision {
                    user_id: user_id,
                    pad_item: pad_item,
                });
            }
        }
    }

    if let Some(ends) = sess_end {
        for (&user_id, positions) in ends.iter() {
            let len = history_len(user_id, train_consumed, test_consumed);

            if let Some(&position) = positions.iter().next_back() {
                if position >= len {
                    return Err(ConfigError::MarkerOutOfRange {
                        user_id: user_id,
                        position: position,
                        history_len: len,
                    });
                }
            }
        }
    }

    Ok(())
}

fn user_block(
    config: &SessionConfig,
    user_id: UserId,
    train_consumed: &UserConsumed,
    test_consumed: &UserConsumed,
    train: bool,
    markers: Option<&BTreeSet<usize>>,
    kind: SignalKind,
) -> UserBlock {
    let hist_num = config.hist_num();
    let pad_item = config.padding();

    let train_sequence = train_consumed.get(user_id);
    let test_sequence = test_consumed.get(user_id);

    let train_len = train_sequence.map_or(0, |x| x.len());
    let test_len = test_sequence.map_or(0, |x| x.len());

    let mut history: Vec<ItemId> = Vec::with_capacity(train_len + test_len);
    let mut rewards: Vec<f32> = Vec::with_capacity(train_len + test_len);

    for sequence in train_sequence.iter().chain(test_sequence.iter()) {
        history.extend_from_slice(sequence.items());
        rewards.extend_from_slice(sequence.rewards());
    }

    let (horizon, cut_points) = if train {
        (train_len, 0..train_len)
    } else if test_len > 0 {
        (history.len(), train_len..train_len + 1)
    } else {
        (history.len(), 0..0)
    };

    if cut_points.len() == 0 {
        return UserBlock::default();
    }

    let dones: Vec<bool> = (0..horizon)
        .map(|position| {
            position + 1 == horizon || markers.map_or(false, |x| x.contains(&position))
        })
        .collect();

    let returns = match kind {
        SignalKind::Return => Some(discounted_returns(
            &rewards[..horizon],
            &dones,
            config.discount(),
        )),
        SignalKind::Step => None,
    };

    let mut block = UserBlock {
        num_rows: cut_points.len(),
        items: Vec::with_capacity(cut_points.len() * (hist_num + 1)),
        rewards: Vec::with_capacity(cut_points.len()),
        dones: Vec::with_capacity(cut_points.len()),
    };

    for position in cut_points {
        let start = position.saturating_sub(hist_num);
        let num_padding = hist_num - (position - start);

        block.items.extend(iter::repeat(pad_item).take(num_padding));
        block.items.extend_from_slice(&history[start..=position]);

        match returns {
            Some(ref returns) => block.rewards.push(returns[position]),
            None => {
                block.rewards.push(rewards[position]);
                block.dones.push(dones[position]);
            }
        }
    }

    debug!(
        "User {} contributes {} windows ({} train, {} test items).",
        user_id, block.num_rows, train_len, test_len
    );

    block
}
