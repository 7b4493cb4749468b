//! Interaction records and per-user consumption sequences.
//!
//! Raw `(user, item, timestamp, reward)` records are grouped into
//! [`UserConsumed`] sequences ordered by time, which is the form the
//! session builder consumes. [`temporal_split`] carves each user's
//! sequence into a train prefix and a test suffix.
use std::cmp::Ordering;
use std::collections::{btree_map, BTreeMap, BTreeSet, HashMap};

use super::{ItemId, Timestamp, UserId};

/// Reward assigned to an interaction when the caller supplies none.
pub const DEFAULT_REWARD: f32 = 1.0;

fn default_reward() -> f32 {
    DEFAULT_REWARD
}

/// Errors arising from malformed interaction data.
#[derive(Debug, Fail, PartialEq)]
pub enum DataError {
    /// Items and rewards for a user have different lengths.
    #[fail(
        display = "User {} has {} items but {} rewards.",
        user_id, num_items, num_rewards
    )]
    RewardLengthMismatch {
        /// Offending user.
        user_id: UserId,
        /// Number of items supplied.
        num_items: usize,
        /// Number of rewards supplied.
        num_rewards: usize,
    },
    /// Test fraction outside `[0, 1]`.
    #[fail(display = "Test fraction must lie in [0, 1], got {}.", _0)]
    InvalidTestFraction(f32),
}

/// A single user-item interaction.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Interaction {
    user_id: UserId,
    item_id: ItemId,
    timestamp: Timestamp,
    #[serde(default = "default_reward")]
    reward: f32,
}

impl Interaction {
    /// Build a new interaction carrying the default reward.
    pub fn new(user_id: UserId, item_id: ItemId, timestamp: Timestamp) -> Self {
        Interaction {
            user_id: user_id,
            item_id: item_id,
            timestamp: timestamp,
            reward: DEFAULT_REWARD,
        }
    }

    /// Attach an explicit reward to the interaction.
    pub fn with_reward(mut self, reward: f32) -> Self {
        self.reward = reward;
        self
    }

    /// The interacting user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
    /// The consumed item.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }
    /// When the interaction happened.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
    /// Per-step reward signal.
    pub fn reward(&self) -> f32 {
        self.reward
    }
}

/// An unordered collection of interactions.
#[derive(Clone, Debug)]
pub struct Interactions {
    num_users: usize,
    num_items: usize,
    interactions: Vec<Interaction>,
}

impl Interactions {
    /// Empty collection with a known shape.
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Interactions {
            num_users: num_users,
            num_items: num_items,
            interactions: Vec::new(),
        }
    }

    /// Add an interaction, growing the shape if needed.
    pub fn push(&mut self, interaction: Interaction) {
        self.num_users = self.num_users.max(interaction.user_id() + 1);
        self.num_items = self.num_items.max(interaction.item_id() + 1);
        self.interactions.push(interaction);
    }

    /// Underlying records.
    pub fn data(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Group records by user, ordering each user's records by timestamp.
    pub fn to_consumed(&self) -> UserConsumed {
        UserConsumed::from(self)
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// `(num_users, num_items)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_items)
    }
}

impl From<Vec<Interaction>> for Interactions {
    fn from(data: Vec<Interaction>) -> Interactions {
        let num_users = data.iter().map(|x| x.user_id()).max().map_or(0, |x| x + 1);
        let num_items = data.iter().map(|x| x.item_id()).max().map_or(0, |x| x + 1);

        Interactions {
            num_users: num_users,
            num_items: num_items,
            interactions: data,
        }
    }
}

fn cmp_timestamp(x: &Interaction, y: &Interaction) -> Ordering {
    let uid_comparison = x.user_id().cmp(&y.user_id());

    if uid_comparison == Ordering::Equal {
        x.timestamp().cmp(&y.timestamp())
    } else {
        uid_comparison
    }
}

/// One user's chronological items with their parallel rewards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserSequence {
    items: Vec<ItemId>,
    rewards: Vec<f32>,
}

impl UserSequence {
    /// Items in consumption order.
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    /// Rewards, one per item.
    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    /// Number of interactions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the user has no interactions.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push(&mut self, item_id: ItemId, reward: f32) {
        self.items.push(item_id);
        self.rewards.push(reward);
    }
}

/// Items consumed by each user, keyed and iterated in ascending user order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserConsumed {
    users: BTreeMap<UserId, UserSequence>,
}

impl UserConsumed {
    /// An empty mapping.
    pub fn new() -> Self {
        UserConsumed::default()
    }

    /// Build from item sequences alone; every interaction gets the default reward.
    pub fn from_items<I>(sequences: I) -> Self
    where
        I: IntoIterator<Item = (UserId, Vec<ItemId>)>,
    {
        let users = sequences
            .into_iter()
            .map(|(user_id, items)| {
                let rewards = vec![DEFAULT_REWARD; items.len()];
                (
                    user_id,
                    UserSequence {
                        items: items,
                        rewards: rewards,
                    },
                )
            })
            .collect();

        UserConsumed { users: users }
    }

    /// Set a user's sequence, replacing any previous one.
    pub fn insert(
        &mut self,
        user_id: UserId,
        items: Vec<ItemId>,
        rewards: Vec<f32>,
    ) -> Result<(), DataError> {
        if items.len() != rewards.len() {
            return Err(DataError::RewardLengthMismatch {
                user_id: user_id,
                num_items: items.len(),
                num_rewards: rewards.len(),
            });
        }

        self.users.insert(
            user_id,
            UserSequence {
                items: items,
                rewards: rewards,
            },
        );

        Ok(())
    }

    /// Append a single interaction to the end of a user's sequence.
    pub fn push(&mut self, user_id: UserId, item_id: ItemId, reward: f32) {
        self.users
            .entry(user_id)
            .or_insert_with(UserSequence::default)
            .push(item_id, reward);
    }

    /// A user's sequence, if they have one.
    pub fn get(&self, user_id: UserId) -> Option<&UserSequence> {
        self.users.get(&user_id)
    }

    /// Iterate over `(user, sequence)` pairs in ascending user order.
    pub fn iter(&self) -> btree_map::Iter<UserId, UserSequence> {
        self.users.iter()
    }

    /// Users present in the mapping, ascending.
    pub fn user_ids<'a>(&'a self) -> impl Iterator<Item = UserId> + 'a {
        self.users.keys().cloned()
    }

    /// Number of users present.
    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    /// Total number of interactions across users.
    pub fn num_interactions(&self) -> usize {
        self.users.values().map(|x| x.len()).sum()
    }

    /// Largest item id consumed, if any.
    pub fn max_item(&self) -> Option<ItemId> {
        self.users
            .values()
            .filter_map(|x| x.items.iter().max())
            .max()
            .cloned()
    }
}

impl<'a> From<&'a Interactions> for UserConsumed {
    fn from(interactions: &Interactions) -> UserConsumed {
        let mut data = interactions.data().to_owned();

        // Stable, so ties keep insertion order.
        data.sort_by(cmp_timestamp);

        let mut consumed = UserConsumed::new();

        for datum in &data {
            consumed.push(datum.user_id(), datum.item_id(), datum.reward());
        }

        consumed
    }
}

/// Split every user's sequence in time: the last `test_fraction` of their
/// interactions go to the test mapping, the rest to the train mapping.
///
/// Users with at least two interactions always contribute at least one test
/// item when `test_fraction` is positive. A user whose whole sequence lands
/// on one side has no entry on the other.
pub fn temporal_split(
    consumed: &UserConsumed,
    test_fraction: f32,
) -> Result<(UserConsumed, UserConsumed), DataError> {
    if !(test_fraction >= 0.0 && test_fraction <= 1.0) {
        return Err(DataError::InvalidTestFraction(test_fraction));
    }

    let mut train = UserConsumed::new();
    let mut test = UserConsumed::new();

    for (&user_id, sequence) in consumed.iter() {
        let len = sequence.len();
        let mut num_test = (len as f32 * test_fraction) as usize;

        if test_fraction > 0.0 && len >= 2 {
            num_test = num_test.max(1);
        }

        let cutoff = len - num_test.min(len);

        for (idx, &item_id, &reward) in izip!(0.., &sequence.items, &sequence.rewards) {
            if idx < cutoff {
                train.push(user_id, item_id, reward);
            } else {
                test.push(user_id, item_id, reward);
            }
        }
    }

    Ok((train, test))
}

/// Per-user session-end markers: 0-based positions in the user's combined
/// `train ++ test` history whose action closes a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionEnds {
    ends: HashMap<UserId, BTreeSet<usize>>,
}

impl SessionEnds {
    /// No markers for anyone.
    pub fn new() -> Self {
        SessionEnds::default()
    }

    /// Mark `position` as a session end for `user_id`.
    pub fn insert(&mut self, user_id: UserId, position: usize) {
        self.ends
            .entry(user_id)
            .or_insert_with(BTreeSet::new)
            .insert(position);
    }

    /// Markers for a user.
    pub fn get(&self, user_id: UserId) -> Option<&BTreeSet<usize>> {
        self.ends.get(&user_id)
    }

    /// Whether no markers are set.
    pub fn is_empty(&self) -> bool {
        self.ends.values().all(|x| x.is_empty())
    }

    /// Iterate over `(user, markers)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &BTreeSet<usize>)> {
        self.ends.iter()
    }
}

impl<I: IntoIterator<Item = usize>> ::std::iter::FromIterator<(UserId, I)> for SessionEnds {
    fn from_iter<T: IntoIterator<Item = (UserId, I)>>(iter: T) -> Self {
        let mut ends = SessionEnds::new();

        for (user_id, positions) in iter {
            for position in positions {
                ends.insert(user_id, position);
            }
        }

        ends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_consumed_orders_by_user_then_time() {
        let interactions = Interactions::from(vec![
            Interaction::new(1, 7, 30),
            Interaction::new(0, 3, 5),
            Interaction::new(1, 5, 10).with_reward(0.5),
            Interaction::new(1, 6, 20),
        ]);

        assert_eq!(interactions.shape(), (2, 8));

        let consumed = interactions.to_consumed();

        assert_eq!(consumed.num_users(), 2);
        assert_eq!(consumed.get(0).unwrap().items(), &[3]);
        assert_eq!(consumed.get(1).unwrap().items(), &[5, 6, 7]);
        assert_eq!(consumed.get(1).unwrap().rewards(), &[0.5, 1.0, 1.0]);
        assert_eq!(consumed.max_item(), Some(7));
    }

    #[test]
    fn empty_interactions_have_empty_shape() {
        let interactions = Interactions::from(Vec::new());

        assert_eq!(interactions.shape(), (0, 0));
        assert_eq!(interactions.to_consumed().num_interactions(), 0);
    }

    #[test]
    fn insert_rejects_mismatched_rewards() {
        let mut consumed = UserConsumed::new();

        assert_eq!(
            consumed.insert(4, vec![1, 2], vec![1.0]),
            Err(DataError::RewardLengthMismatch {
                user_id: 4,
                num_items: 2,
                num_rewards: 1
            })
        );
        assert!(consumed.get(4).is_none());
    }

    #[test]
    fn temporal_split_keeps_suffix_for_test() {
        let consumed = UserConsumed::from_items(vec![
            (0, vec![1, 2, 3, 4, 5]),
            (1, vec![9, 8]),
            (2, vec![7]),
        ]);

        let (train, test) = temporal_split(&consumed, 0.2).unwrap();

        assert_eq!(train.get(0).unwrap().items(), &[1, 2, 3, 4]);
        assert_eq!(test.get(0).unwrap().items(), &[5]);
        assert_eq!(train.get(1).unwrap().items(), &[9]);
        assert_eq!(test.get(1).unwrap().items(), &[8]);
        assert_eq!(train.get(2).unwrap().items(), &[7]);
        assert!(test.get(2).is_none());
        assert_eq!(
            train.num_interactions() + test.num_interactions(),
            consumed.num_interactions()
        );
    }

    #[test]
    fn temporal_split_rejects_bad_fraction() {
        let consumed = UserConsumed::new();

        assert!(temporal_split(&consumed, 1.5).is_err());
        assert!(temporal_split(&consumed, ::std::f32::NAN).is_err());
    }

    #[test]
    fn session_ends_collect() {
        let ends: SessionEnds = vec![(1, vec![5, 10]), (2, vec![])].into_iter().collect();

        assert_eq!(ends.get(1).unwrap().len(), 2);
        assert!(ends.get(2).is_none());
        assert!(!ends.is_empty());
        assert!(SessionEnds::new().is_empty());
    }
}
