//! Day scheduling: which customer node runs next and when the day ends.
use rand::Rng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{DEFAULT_DAY_LENGTH, RANDOM_NODE_TOKEN};
use crate::rng::{CountingRng, RngStreams};

const DEFAULT_DAYS_DATA: &str = include_str!("../assets/days.json");

/// Errors raised when the day table violates its invariants.
#[derive(Debug, Error, PartialEq)]
pub enum DayConfigError {
    #[error("day table contains no days")]
    NoDays,
    #[error("day length must be positive")]
    ZeroDayLength,
    #[error("day length of {0} seconds is out of range")]
    DayLengthOutOfRange(f64),
    #[error("day {day} has an empty random pool")]
    EmptyRandomPool { day: usize },
    #[error("day {day} has no terminal node")]
    MissingEndNode { day: usize },
    #[error("day {day} has a blank node at sequence position {position}")]
    BlankSequenceEntry { day: usize, position: usize },
    #[error("day {day} has a blank node in its random pool")]
    BlankPoolEntry { day: usize },
    #[error("day {day} does not exist (table has {count} days)")]
    UnknownDay { day: usize, count: usize },
    #[error("day table is not valid JSON: {0}")]
    Malformed(String),
}

/// Static per-day configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayDefinition {
    /// Authored node order; `random` entries draw from the pool.
    #[serde(default)]
    pub sequence: Vec<String>,
    /// Filler encounters used for `random` entries and after the sequence.
    pub random: Vec<String>,
    /// Node run once the day's time budget is spent.
    pub end_node: String,
}

impl DayDefinition {
    /// Check the invariants for the day at `day` in its table.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self, day: usize) -> Result<(), DayConfigError> {
        if self.end_node.trim().is_empty() {
            return Err(DayConfigError::MissingEndNode { day });
        }
        // The sequence always runs out eventually, so every day needs filler.
        if self.random.is_empty() {
            return Err(DayConfigError::EmptyRandomPool { day });
        }
        if let Some(position) = self.sequence.iter().position(|n| n.trim().is_empty()) {
            return Err(DayConfigError::BlankSequenceEntry { day, position });
        }
        if self.random.iter().any(|n| n.trim().is_empty()) {
            return Err(DayConfigError::BlankPoolEntry { day });
        }
        Ok(())
    }
}

/// The complete day table as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayConfig {
    #[serde(default = "DayConfig::default_day_length_secs")]
    pub day_length_secs: f64,
    pub days: Vec<DayDefinition>,
}

impl DayConfig {
    const fn default_day_length_secs() -> f64 {
        DEFAULT_DAY_LENGTH.as_secs_f64()
    }

    /// Parse a day table from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DayConfigError::Malformed`] if the JSON does not describe a day table.
    pub fn from_json(json: &str) -> Result<Self, DayConfigError> {
        serde_json::from_str(json).map_err(|err| DayConfigError::Malformed(err.to_string()))
    }

    /// The table bundled with the game.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bundled asset is corrupt.
    pub fn load_from_static() -> Result<Self, DayConfigError> {
        Self::from_json(DEFAULT_DAYS_DATA)
    }

    #[must_use]
    pub fn with_day_length(mut self, length: Duration) -> Self {
        self.day_length_secs = length.as_secs_f64();
        self
    }

    /// Validate every day and the shared time budget.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), DayConfigError> {
        if self.days.is_empty() {
            return Err(DayConfigError::NoDays);
        }
        self.day_length()?;
        for (index, day) in self.days.iter().enumerate() {
            day.validate(index)?;
        }
        Ok(())
    }

    /// The time budget of every day.
    ///
    /// # Errors
    ///
    /// Returns an error unless the length is positive and fits a [`Duration`].
    pub fn day_length(&self) -> Result<Duration, DayConfigError> {
        let secs = self.day_length_secs;
        if secs.is_nan() || secs <= 0.0 {
            return Err(DayConfigError::ZeroDayLength);
        }
        Duration::try_from_secs_f64(secs).map_err(|_| DayConfigError::DayLengthOutOfRange(secs))
    }
}

/// Validated day table whose random pools were shuffled once at startup.
///
/// Replaying a day hands out the same pool order; only a new `Calendar`
/// reshuffles.
#[derive(Debug, Clone)]
pub struct Calendar {
    days: Vec<DayDefinition>,
    day_length: Duration,
    streams: RngStreams,
}

impl Calendar {
    /// Validate `config` and shuffle each pool with the seed's shuffle stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: DayConfig, streams: RngStreams) -> Result<Self, DayConfigError> {
        let mut rng = streams.shuffle();
        let calendar = Self::with_shuffle(config, streams, &mut rng)?;
        log::trace!("pool shuffle used {} draws", rng.draws());
        Ok(calendar)
    }

    /// Like [`Calendar::new`] but with an explicit shuffle source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_shuffle<R: Rng + ?Sized>(
        config: DayConfig,
        streams: RngStreams,
        shuffle: &mut R,
    ) -> Result<Self, DayConfigError> {
        config.validate()?;
        let day_length = config.day_length()?;
        let mut days = config.days;
        for day in &mut days {
            day.random.shuffle(shuffle);
        }
        log::debug!("calendar ready with {} days (seed {})", days.len(), streams.seed());
        Ok(Self {
            days,
            day_length,
            streams,
        })
    }

    /// Bundled day table shuffled with `seed`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bundled asset is corrupt.
    pub fn load_default(seed: u64) -> Result<Self, DayConfigError> {
        Self::new(DayConfig::load_from_static()?, RngStreams::from_user_seed(seed))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.days.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    #[must_use]
    pub const fn day_length(&self) -> Duration {
        self.day_length
    }

    /// The shuffled definition of day `index`.
    #[must_use]
    pub fn definition(&self, index: usize) -> Option<&DayDefinition> {
        self.days.get(index)
    }

    /// Start day `index` with a fresh cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DayConfigError::UnknownDay`] if `index` is out of range.
    pub fn day(&self, index: usize) -> Result<Day, DayConfigError> {
        let definition = self
            .days
            .get(index)
            .cloned()
            .ok_or(DayConfigError::UnknownDay {
                day: index,
                count: self.days.len(),
            })?;
        Ok(Day::new(
            index,
            definition,
            self.day_length,
            self.streams.day(index),
        ))
    }
}

/// Direction of money across the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlipKind {
    Deposit,
    Withdrawal,
}

/// A transaction slip handed over by a customer and accepted by the teller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSlip {
    pub account: u32,
    pub amount_cents: i64,
    pub kind: SlipKind,
    #[serde(default)]
    pub customer: Option<String>,
}

/// A single day in progress.
#[derive(Debug, Clone)]
pub struct Day {
    index: usize,
    definition: DayDefinition,
    day_length: Duration,
    cursor: usize,
    slips: Vec<DepositSlip>,
    rng: CountingRng<SmallRng>,
}

impl Day {
    /// Build a day directly from a definition, keeping its pool order as given.
    ///
    /// Callers are expected to have validated `definition`; a day with an
    /// empty pool answers with its terminal node instead of panicking.
    #[must_use]
    pub const fn new(
        index: usize,
        definition: DayDefinition,
        day_length: Duration,
        rng: CountingRng<SmallRng>,
    ) -> Self {
        Self {
            index,
            definition,
            day_length,
            cursor: 0,
            slips: Vec::new(),
            rng,
        }
    }

    /// Next node to run given the time already spent on this day.
    ///
    /// Once `elapsed` reaches the day length the terminal node is returned and
    /// the cursor stays put; otherwise the cursor advances by exactly one.
    pub fn next(&mut self, elapsed: Duration) -> &str {
        if self.is_over(elapsed) {
            return &self.definition.end_node;
        }
        let position = self.cursor;
        self.cursor = self.cursor.saturating_add(1);

        let sequence = &self.definition.sequence;
        let pool = &self.definition.random;
        if pool.is_empty() && sequence.get(position).is_none_or(|n| is_random_token(n)) {
            log::warn!("day {} has no random pool; ending early", self.index);
            return &self.definition.end_node;
        }

        match sequence.get(position) {
            Some(node) if is_random_token(node) => {
                let pick = self.rng.gen_range(0..pool.len());
                &pool[pick]
            }
            Some(node) => node,
            None => {
                let offset = position - sequence.len();
                if offset < pool.len() {
                    &pool[offset]
                } else {
                    let pick = self.rng.gen_range(0..pool.len());
                    &pool[pick]
                }
            }
        }
    }

    #[must_use]
    pub fn is_over(&self, elapsed: Duration) -> bool {
        elapsed >= self.day_length
    }

    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn day_length(&self) -> Duration {
        self.day_length
    }

    #[must_use]
    pub fn terminal_node(&self) -> &str {
        &self.definition.end_node
    }

    #[must_use]
    pub const fn definition(&self) -> &DayDefinition {
        &self.definition
    }

    /// Record a slip the teller accepted. Validation belongs to the caller.
    pub fn accept_slip(&mut self, slip: DepositSlip) {
        self.slips.push(slip);
    }

    #[must_use]
    pub fn slips(&self) -> &[DepositSlip] {
        &self.slips
    }
}

fn is_random_token(node: &str) -> bool {
    node.eq_ignore_ascii_case(RANDOM_NODE_TOKEN)
}
