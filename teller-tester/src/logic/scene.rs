//! Frame loop that plays whole days the way the game scene would.
use anyhow::{Context, Result};
use clap::ValueEnum;
use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use teller_game::dialogue::Stage;
use teller_game::{
    Calendar, CommandErrorPolicy, CountingRng, DayConfig, DaySession, DepositSlip,
    DialogueOption, DialogueProgram, DialogueRunner, Portrait, RngStreams, RunnerConfig,
    SessionEvent, Variables,
};

use super::host::{SceneHost, TranscriptEntry};

/// Simulated frame duration (60 fps).
pub const FRAME: Duration = Duration::from_micros(16_667);
/// How long the frame thread waits for the dialogue thread per frame.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on frames per day, far beyond any authored day.
const MAX_FRAMES_PER_DAY: u32 = 2_000_000;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("dialogue thread did not settle within {timeout:?} during node {node}")]
    Stalled { node: String, timeout: Duration },
    #[error("day {day} did not end after {frames} frames")]
    FrameLimit { day: usize, frames: u32 },
}

/// How the simulated player answers option prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OptionPolicy {
    /// First selectable option.
    #[default]
    First,
    /// Last selectable option.
    Last,
    /// Uniformly among selectable options.
    Random,
}

impl OptionPolicy {
    /// Index to select. Falls back to 0 when nothing is selectable so the
    /// runner reports the dead end.
    pub fn choose<R: Rng + ?Sized>(self, options: &[DialogueOption], rng: &mut R) -> usize {
        let available: Vec<usize> = options
            .iter()
            .filter(|o| o.available)
            .map(|o| o.index)
            .collect();
        let pick = match self {
            Self::First => available.first().copied(),
            Self::Last => available.last().copied(),
            Self::Random if available.is_empty() => None,
            Self::Random => Some(available[rng.gen_range(0..available.len())]),
        };
        pick.unwrap_or(0)
    }
}

/// Everything a play-through needs besides the seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayPlan {
    /// Day indices played in order; variables carry over between them.
    pub days: Vec<usize>,
    pub chars_per_frame: usize,
    pub option_policy: OptionPolicy,
    /// Overrides the bundled day length.
    pub day_length: Option<Duration>,
    pub command_errors: CommandErrorPolicy,
}

impl Default for PlayPlan {
    fn default() -> Self {
        Self {
            days: vec![0],
            chars_per_frame: 2,
            option_policy: OptionPolicy::First,
            day_length: None,
            command_errors: CommandErrorPolicy::AbortNode,
        }
    }
}

impl PlayPlan {
    #[must_use]
    pub fn with_days(mut self, days: Vec<usize>) -> Self {
        self.days = days;
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: OptionPolicy) -> Self {
        self.option_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_day_length(mut self, length: Duration) -> Self {
        self.day_length = Some(length);
        self
    }

    #[must_use]
    pub const fn with_chars_per_frame(mut self, chars: usize) -> Self {
        self.chars_per_frame = chars;
        self
    }
}

/// One node as the scene saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub started_frame: u32,
    pub portrait: Option<Portrait>,
    /// `None` while running; the error text if it failed.
    pub error: Option<String>,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub index: usize,
    pub terminal_node: String,
    pub nodes: Vec<NodeRecord>,
    pub frames: u32,
    pub slips: Vec<DepositSlip>,
    pub failure: Option<String>,
}

impl DaySummary {
    /// Whether the terminal node ran to completion.
    #[must_use]
    pub fn reached_terminal(&self) -> bool {
        self.nodes
            .last()
            .is_some_and(|n| n.name == self.terminal_node && n.finished && n.error.is_none())
    }

    pub fn customers(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes
            .iter()
            .filter(|n| n.name.starts_with("Random") || n.name == "OldMan")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaySummary {
    pub seed: u64,
    pub days: Vec<DaySummary>,
    pub variables: Variables,
    pub transcript: Vec<TranscriptEntry>,
    pub sounds: Vec<String>,
}

impl PlaySummary {
    /// Short stable fingerprint of the transcript.
    #[must_use]
    pub fn transcript_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.transcript {
            hasher.update(entry.render().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize()[..8]
            .iter()
            .fold(String::with_capacity(16), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            })
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.transcript.iter().filter_map(|entry| match entry {
            TranscriptEntry::Line { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Play every day in `plan` with `seed`.
///
/// # Errors
///
/// Fails if the bundled data does not load, a node cannot be started, or the
/// dialogue thread stops responding.
pub fn play(plan: &PlayPlan, seed: u64, program: Arc<DialogueProgram>) -> Result<PlaySummary> {
    let mut config = DayConfig::load_from_static().context("loading bundled day table")?;
    if let Some(length) = plan.day_length {
        config = config.with_day_length(length);
    }
    let streams = RngStreams::from_user_seed(seed);
    let mut option_rng = streams.options();
    let calendar = Calendar::new(config, streams).context("building calendar")?;

    let runner_config = RunnerConfig {
        command_errors: plan.command_errors,
        seed,
        ..RunnerConfig::default()
    };
    let mut runner = DialogueRunner::new(
        program,
        SceneHost::new(plan.chars_per_frame),
        Variables::new(),
        runner_config,
    );

    let mut days = Vec::with_capacity(plan.days.len());
    for &index in &plan.days {
        let day = calendar
            .day(index)
            .with_context(|| format!("scheduling day {index}"))?;
        let mut session = DaySession::new(day, runner);
        let summary = play_day(&mut session, plan.option_policy, &mut option_rng)?;
        log::info!(
            "seed {seed} day {index}: {} nodes in {} frames",
            summary.nodes.len(),
            summary.frames
        );
        let ended_early = summary.failure.is_some();
        days.push(summary);
        runner = session.into_parts().1;
        if ended_early {
            break;
        }
    }

    let (transcript, sounds) = runner.with_stage(|stage| {
        (
            std::mem::take(&mut stage.host.ledger.transcript),
            std::mem::take(&mut stage.host.ledger.sounds),
        )
    });
    Ok(PlaySummary {
        seed,
        days,
        variables: runner.variables(),
        transcript,
        sounds,
    })
}

fn play_day(
    session: &mut DaySession<SceneHost>,
    policy: OptionPolicy,
    rng: &mut CountingRng<SmallRng>,
) -> Result<DaySummary> {
    let mut nodes: Vec<NodeRecord> = Vec::new();
    let mut frames: u32 = 0;
    loop {
        if !session.runner().wait_until_settled(SETTLE_TIMEOUT) {
            let node = session.runner().current_node().unwrap_or_default();
            return Err(SceneError::Stalled {
                node,
                timeout: SETTLE_TIMEOUT,
            }
            .into());
        }
        session
            .runner()
            .with_stage(|stage| present_frame(stage, policy, rng));

        match session.update(FRAME * frames)? {
            SessionEvent::Idle => {}
            SessionEvent::NodeStarted(name) => {
                let portrait = session.runner_mut().portrait();
                nodes.push(NodeRecord {
                    name,
                    started_frame: frames,
                    portrait,
                    error: None,
                    finished: false,
                });
            }
            SessionEvent::NodeFinished { node, outcome } => {
                if let Some(record) = nodes.last_mut()
                    && record.name == node
                {
                    record.finished = true;
                    record.error = outcome.err().map(|err| err.to_string());
                }
                let slips = session
                    .runner()
                    .with_stage(|stage| std::mem::take(&mut stage.host.ledger.slips));
                for slip in slips {
                    session.day_mut().accept_slip(slip);
                }
            }
            SessionEvent::DayOver => break,
        }

        frames += 1;
        if frames >= MAX_FRAMES_PER_DAY {
            return Err(SceneError::FrameLimit {
                day: session.day().index(),
                frames,
            }
            .into());
        }
    }

    Ok(DaySummary {
        index: session.day().index(),
        terminal_node: session.day().terminal_node().to_string(),
        nodes,
        frames,
        slips: session.day().slips().to_vec(),
        failure: session.failure().map(ToString::to_string),
    })
}

/// One frame of presentation: type the bubble, or answer pending options.
fn present_frame(
    stage: &mut Stage<SceneHost>,
    policy: OptionPolicy,
    rng: &mut CountingRng<SmallRng>,
) {
    if stage.pending_line().is_some() {
        let done = stage.host.bubble.as_mut().is_none_or(|bubble| bubble.advance());
        if done {
            stage.host.bubble = None;
            stage.finish_line();
        }
        return;
    }
    let Some(options) = stage.pending_options() else {
        return;
    };
    let index = policy.choose(options, rng);
    let text = options
        .get(index)
        .map(|o| o.text.clone())
        .unwrap_or_default();
    stage.host.chose(text);
    stage.select_option(index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use teller_game::Line;

    fn option(index: usize, available: bool) -> DialogueOption {
        DialogueOption {
            index,
            line: Line::new(format!("o{index}")),
            text: format!("option {index}"),
            available,
        }
    }

    #[test]
    fn policies_skip_unavailable_options() {
        let options = [option(0, false), option(1, true), option(2, true), option(3, false)];
        let mut rng = SmallRng::seed_from_u64(9);
        assert_eq!(OptionPolicy::First.choose(&options, &mut rng), 1);
        assert_eq!(OptionPolicy::Last.choose(&options, &mut rng), 2);
        for _ in 0..20 {
            let pick = OptionPolicy::Random.choose(&options, &mut rng);
            assert!(pick == 1 || pick == 2);
        }
        let none = [option(0, false)];
        assert_eq!(OptionPolicy::Random.choose(&none, &mut rng), 0);
    }

    #[test]
    fn short_day_reaches_its_terminal_node() {
        let program = Arc::new(DialogueProgram::load_default().unwrap());
        let plan = PlayPlan::default()
            .with_day_length(Duration::from_secs(20))
            .with_chars_per_frame(8);
        let summary = play(&plan, 11, program).unwrap();
        let day = &summary.days[0];
        assert_eq!(day.nodes[0].name, "Manager_Day1");
        assert!(day.reached_terminal(), "{:?}", day.nodes);
        assert!(day.failure.is_none());
        assert!(summary.lines().all(|line| line != "ERROR"));
        assert_eq!(day.slips.len(), day.customers().count());
    }

    #[test]
    fn oversized_day_length_is_an_error() {
        let program = Arc::new(DialogueProgram::load_default().unwrap());
        let plan = PlayPlan::default().with_day_length(Duration::from_secs(u64::MAX));
        let err = play(&plan, 1, program).unwrap_err();
        assert!(format!("{err:#}").contains("out of range"), "{err:#}");
    }

    #[test]
    fn digest_is_stable_for_a_seed() {
        let program = Arc::new(DialogueProgram::load_default().unwrap());
        let plan = PlayPlan::default()
            .with_day_length(Duration::from_secs(15))
            .with_policy(OptionPolicy::Random)
            .with_chars_per_frame(8);
        let first = play(&plan, 5, Arc::clone(&program)).unwrap();
        let second = play(&plan, 5, program).unwrap();
        assert_eq!(first.transcript_digest(), second.transcript_digest());
        assert_eq!(first.transcript_digest().len(), 16);
    }
}
