#![deny(missing_docs)]
//! # sbrl
//!
//! `sbrl` prepares per-user interaction histories for training sequential
//! and reinforcement-learning recommenders. Given the items each user has
//! consumed, it builds fixed-width session windows: a history prefix, the
//! action to predict, and either an immediate reward with a terminal flag
//! or a discounted return-to-go.
//!
//! ## Example
//! Build a shuffled training loader and an ordered evaluation loader:
//!
//! ```rust
//! # extern crate sbrl;
//! use sbrl::config::{LoaderConfig, SessionConfig};
//! use sbrl::data::UserConsumed;
//! use sbrl::loader::build_dataloader;
//!
//! let train = UserConsumed::from_items(vec![(1, vec![10, 11, 12]), (2, vec![20])]);
//! let test = UserConsumed::from_items(vec![(1, vec![13])]);
//!
//! let config = LoaderConfig::new(SessionConfig::new(2, 2), 32).seed(42);
//! let (mut train_loader, eval_loader) =
//!     build_dataloader(&config, &train, &test, None, None).unwrap();
//!
//! for batch in train_loader.iter_batches() {
//!     let batch = batch.unwrap();
//!     assert_eq!(batch.items.shape()[1], 2);
//! }
//!
//! assert_eq!(train_loader.len(), 4);
//! assert_eq!(eval_loader.len(), 1);
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate failure;
#[macro_use]
extern crate itertools;
#[macro_use]
extern crate log;
extern crate ndarray;
extern crate rand;
extern crate rayon;
extern crate serde;
extern crate serde_json;

pub mod config;
pub mod data;
pub mod dataset;
pub mod loader;
pub mod session;

/// Alias for user indices.
pub type UserId = usize;
/// Alias for item indices.
pub type ItemId = usize;
/// Alias for timestamps.
pub type Timestamp = usize;

/// Default id used to left-pad windows of users with short histories.
/// It never collides with a real item as long as item ids are dense.
pub const PAD_ITEM: ItemId = ::std::usize::MAX;
