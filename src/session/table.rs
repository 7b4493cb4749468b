use {ItemId, UserId};

/// Errors raised when the columns of a table disagree.
#[derive(Debug, Fail, PartialEq)]
pub enum TableError {
    /// Tables need at least one history item per window.
    #[fail(display = "History length must be at least 1.")]
    EmptyHistory,
    /// A column does not describe the same number of rows as `users`.
    #[fail(
        display = "Column {} has {} entries, expected {}.",
        column, found, expected
    )]
    LengthMismatch {
        /// Name of the offending column.
        column: &'static str,
        /// Expected number of entries.
        expected: usize,
        /// Actual number of entries.
        found: usize,
    },
}

/// Per-row training signals.
#[derive(Clone, Debug, PartialEq)]
pub enum Signals {
    /// Immediate reward and terminal flag for every row.
    Step {
        /// Reward of each row's action.
        rewards: Vec<f32>,
        /// Whether each row's action closes a session.
        dones: Vec<bool>,
    },
    /// Discounted return-to-go for every row.
    Return {
        /// Return-to-go from each row's action.
        returns: Vec<f32>,
    },
}

/// Signal of a single row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RowSignal {
    /// Immediate reward and terminal flag.
    Step {
        /// Reward of the action.
        reward: f32,
        /// Whether the action closes a session.
        done: bool,
    },
    /// Discounted return-to-go.
    Return {
        /// Return-to-go from the action.
        return_to_go: f32,
    },
}

/// A single row of a [`SessionTable`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Row<'a> {
    /// Owning user.
    pub user_id: UserId,
    /// `hist_num + 1` items; the last one is the action.
    pub window: &'a [ItemId],
    /// Training signal.
    pub signal: RowSignal,
}

/// Immutable, column-oriented table of session windows.
///
/// Windows are stored back to back in a single buffer with a stride
/// of `hist_num + 1`. Every column is checked to describe the same
/// number of rows when the table is constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionTable {
    hist_num: usize,
    users: Vec<UserId>,
    items: Vec<ItemId>,
    signals: Signals,
}

impl SessionTable {
    /// Assemble a table from its columns.
    pub fn new(
        hist_num: usize,
        users: Vec<UserId>,
        items: Vec<ItemId>,
        signals: Signals,
    ) -> Result<Self, TableError> {
        if hist_num < 1 {
            return Err(TableError::EmptyHistory);
        }

        let num_rows = users.len();

        let check = |column: &'static str, expected: usize, found: usize| {
            if expected == found {
                Ok(())
            } else {
                Err(TableError::LengthMismatch {
                    column: column,
                    expected: expected,
                    found: found,
                })
            }
        };

        check("item", num_rows * (hist_num + 1), items.len())?;

        match signals {
            Signals::Step {
                ref rewards,
                ref dones,
            } => {
                check("reward", num_rows, rewards.len())?;
                check("done", num_rows, dones.len())?;
            }
            Signals::Return { ref returns } => {
                check("return", num_rows, returns.len())?;
            }
        }

        Ok(SessionTable {
            hist_num: hist_num,
            users: users,
            items: items,
            signals: signals,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// History items per window.
    pub fn hist_num(&self) -> usize {
        self.hist_num
    }

    /// Items per window, including the action.
    pub fn window_len(&self) -> usize {
        self.hist_num + 1
    }

    /// Whether rows carry returns rather than reward and done flags.
    pub fn has_return(&self) -> bool {
        match self.signals {
            Signals::Return { .. } => true,
            Signals::Step { .. } => false,
        }
    }

    /// User column.
    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    /// Signal columns.
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Row `idx`, or `None` past the end.
    pub fn get(&self, idx: usize) -> Option<Row> {
        if idx >= self.len() {
            return None;
        }

        let stride = self.window_len();
        let signal = match self.signals {
            Signals::Step {
                ref rewards,
                ref dones,
            } => RowSignal::Step {
                reward: rewards[idx],
                done: dones[idx],
            },
            Signals::Return { ref returns } => RowSignal::Return {
                return_to_go: returns[idx],
            },
        };

        Some(Row {
            user_id: self.users[idx],
            window: &self.items[idx * stride..(idx + 1) * stride],
            signal: signal,
        })
    }

    /// Iterate over rows in order.
    pub fn iter(&self) -> SessionTableIterator {
        SessionTableIterator {
            table: self,
            idx: 0,
        }
    }
}

/// Iterator over the rows of a [`SessionTable`].
#[derive(Clone, Debug)]
pub struct SessionTableIterator<'a> {
    table: &'a SessionTable,
    idx: usize,
}

impl<'a> Iterator for SessionTableIterator<'a> {
    type Item = Row<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        let value = self.table.get(self.idx);

        self.idx += 1;

        value
    }
}
