//! Configuration for session building and loading.
//!
//! Both configs follow the same pattern: `new` fills in defaults,
//! consuming setters override them, and `validate` rejects bad values
//! before any work is done.
use std::io::Read;
use std::str::FromStr;

use failure;
use serde_json;

use super::{ItemId, PAD_ITEM};

/// Discount factor used when none is configured.
pub const DEFAULT_GAMMA: f32 = 0.99;

/// Largest accepted history length.
pub const MAX_HIST_NUM: usize = 1 << 16;

/// Configuration errors. These are always raised before building starts.
#[derive(Debug, Fail, PartialEq)]
pub enum ConfigError {
    /// `hist_num` must lie in `1..=MAX_HIST_NUM`.
    #[fail(display = "History length must lie between 1 and 65536, got {}.", _0)]
    InvalidHistNum(usize),
    /// Session mode string not recognised.
    #[fail(display = "Unknown session mode: {:?}.", _0)]
    UnknownSessionMode(String),
    /// Discount factor outside `(0, 1]`.
    #[fail(display = "Discount factor must lie in (0, 1], got {}.", _0)]
    InvalidGamma(f32),
    /// Batch size must be positive.
    #[fail(display = "Batch size must be at least 1.")]
    InvalidBatchSize,
    /// The inputs hold more distinct users than configured.
    #[fail(display = "Expected at most {} users, found {}.", expected, found)]
    TooManyUsers {
        /// Configured number of users.
        expected: usize,
        /// Distinct users in the inputs.
        found: usize,
    },
    /// A real item collides with the padding id.
    #[fail(display = "User {} consumed the reserved padding item {}.", user_id, pad_item)]
    PadCollision {
        /// Offending user.
        user_id: usize,
        /// Padding id.
        pad_item: ItemId,
    },
    /// A session-end marker points past the user's history.
    #[fail(
        display = "Session end {} for user {} is outside a history of length {}.",
        position, user_id, history_len
    )]
    MarkerOutOfRange {
        /// Offending user.
        user_id: usize,
        /// Marker position.
        position: usize,
        /// Length of the user's combined history.
        history_len: usize,
    },
    /// A rayon pool for loader workers could not be created.
    #[fail(display = "Unable to start {} loader workers: {}.", n_workers, reason)]
    WorkerPool {
        /// Requested worker count.
        n_workers: usize,
        /// Underlying error message.
        reason: String,
    },
}

/// How session boundaries are determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// The whole history is a single session.
    One,
    /// Every session-end marker closes a session.
    Interval,
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::One
    }
}

impl FromStr for SessionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one" => Ok(SessionMode::One),
            "interval" => Ok(SessionMode::Interval),
            other => Err(ConfigError::UnknownSessionMode(other.to_owned())),
        }
    }
}

fn validate_gamma(gamma: f32) -> Result<(), ConfigError> {
    if gamma > 0.0 && gamma <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidGamma(gamma))
    }
}

/// Parameters of the session builder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    n_users: usize,
    hist_num: usize,
    #[serde(default)]
    sess_mode: SessionMode,
    #[serde(default = "default_gamma")]
    gamma: f32,
    #[serde(default = "default_pad_item")]
    pad_item: ItemId,
}

fn default_gamma() -> f32 {
    DEFAULT_GAMMA
}

fn default_pad_item() -> ItemId {
    PAD_ITEM
}

impl SessionConfig {
    /// Build a new configuration for `n_users` users and windows of
    /// `hist_num` history items.
    pub fn new(n_users: usize, hist_num: usize) -> Self {
        SessionConfig {
            n_users: n_users,
            hist_num: hist_num,
            sess_mode: SessionMode::One,
            gamma: DEFAULT_GAMMA,
            pad_item: PAD_ITEM,
        }
    }

    /// Set the session mode.
    pub fn sess_mode(mut self, sess_mode: SessionMode) -> Self {
        self.sess_mode = sess_mode;
        self
    }

    /// Set the discount factor used in return mode.
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the id used to left-pad short windows.
    pub fn pad_item(mut self, pad_item: ItemId) -> Self {
        self.pad_item = pad_item;
        self
    }

    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hist_num < 1 || self.hist_num > MAX_HIST_NUM {
            return Err(ConfigError::InvalidHistNum(self.hist_num));
        }

        validate_gamma(self.gamma)
    }

    /// Configured number of users.
    pub fn n_users(&self) -> usize {
        self.n_users
    }

    /// History items per window; windows hold `hist_num + 1` items.
    pub fn hist_num(&self) -> usize {
        self.hist_num
    }

    /// Session mode.
    pub fn session_mode(&self) -> SessionMode {
        self.sess_mode
    }

    /// Discount factor.
    pub fn discount(&self) -> f32 {
        self.gamma
    }

    /// Padding id.
    pub fn padding(&self) -> ItemId {
        self.pad_item
    }
}

/// Parameters of the train and evaluation loaders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    session: SessionConfig,
    batch_size: usize,
    #[serde(default)]
    n_workers: usize,
    #[serde(default)]
    compute_return: bool,
    #[serde(default)]
    seed: Option<u64>,
}

impl LoaderConfig {
    /// Build loader parameters on top of a session configuration.
    pub fn new(session: SessionConfig, batch_size: usize) -> Self {
        LoaderConfig {
            session: session,
            batch_size: batch_size,
            n_workers: 0,
            compute_return: false,
            seed: None,
        }
    }

    /// Read a JSON configuration and validate it.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, failure::Error> {
        let config: LoaderConfig = serde_json::from_reader(reader)?;
        config.validate()?;

        Ok(config)
    }

    /// Number of extra threads used to gather batches; 0 gathers inline.
    pub fn n_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        self
    }

    /// Emit discounted returns instead of reward and done flags.
    pub fn compute_return(mut self, compute_return: bool) -> Self {
        self.compute_return = compute_return;
        self
    }

    /// Seed for the training shuffle.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;

        if self.batch_size < 1 {
            return Err(ConfigError::InvalidBatchSize);
        }

        Ok(())
    }

    /// The session builder configuration.
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Training batch width.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Worker count.
    pub fn workers(&self) -> usize {
        self.n_workers
    }

    /// Whether return mode is on.
    pub fn returns(&self) -> bool {
        self.compute_return
    }

    /// Shuffle seed, if fixed.
    pub fn shuffle_seed(&self) -> Option<u64> {
        self.seed
    }
}
