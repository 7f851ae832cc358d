use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;

use teller_game::dialogue::CommandSet;
use teller_game::{
    Calendar, Command, CommandError, DaySession, DepositSlip, DialogueHost, DialogueOption,
    DialogueProgram, DialogueRunner, PresentedLine, RunnerConfig, SessionEvent, SlipKind,
    Variables,
};
use twox_hash::XxHash64;

const TIME_PER_CUSTOMER: Duration = Duration::from_secs(20);

#[derive(Default)]
struct Ledger {
    slips: Vec<DepositSlip>,
    sounds: Vec<String>,
}

struct Teller {
    transcript: Vec<String>,
    ledger: Ledger,
    commands: CommandSet<Ledger>,
}

impl Teller {
    fn new() -> Self {
        let commands = CommandSet::new()
            .with("slip", |ledger: &mut Ledger, cmd: &Command, vars: &mut Variables| {
                let kind = match cmd.args().first().map(String::as_str) {
                    Some("deposit") => SlipKind::Deposit,
                    Some("withdrawal") => SlipKind::Withdrawal,
                    _ => return Err(CommandError::invalid(cmd.name(), "expected slip kind")),
                };
                let dollars = cmd.number_arg(1)?;
                ledger.slips.push(DepositSlip {
                    account: vars.number("$served") as u32,
                    amount_cents: (dollars * 100.0).round() as i64,
                    kind,
                    customer: None,
                });
                Ok(())
            })
            .with("play_sound", |ledger: &mut Ledger, cmd: &Command, _: &mut Variables| {
                ledger.sounds.push(cmd.args().join(" "));
                Ok(())
            });
        Self {
            transcript: Vec::new(),
            ledger: Ledger::default(),
            commands,
        }
    }
}

impl DialogueHost for Teller {
    fn on_node_start(&mut self, node: &str) {
        self.transcript.push(format!("> {node}"));
    }

    fn on_line(&mut self, line: &PresentedLine) {
        self.transcript.push(line.text.clone());
    }

    fn on_options(&mut self, options: &[DialogueOption]) {
        let texts: Vec<&str> = options.iter().map(|o| o.text.as_str()).collect();
        self.transcript.push(format!("? {}", texts.join(" | ")));
    }

    fn on_command(&mut self, command: &Command, vars: &mut Variables) -> Result<(), CommandError> {
        self.commands.dispatch(&mut self.ledger, command, vars)
    }
}

struct Played {
    nodes: Vec<String>,
    transcript: Vec<String>,
    slips: Vec<DepositSlip>,
    sounds: Vec<String>,
    variables: Variables,
}

fn play_day(seed: u64, index: usize) -> Played {
    let calendar = Calendar::load_default(seed).unwrap();
    let day = calendar.day(index).unwrap();
    let program = Arc::new(DialogueProgram::load_default().unwrap());
    let config = RunnerConfig {
        seed,
        ..RunnerConfig::default()
    };
    let runner = DialogueRunner::new(program, Teller::new(), Variables::new(), config);
    let mut session = DaySession::new(day, runner);

    let mut nodes = Vec::new();
    loop {
        let elapsed = TIME_PER_CUSTOMER * u32::try_from(nodes.len()).unwrap();
        assert!(session.runner().wait_until_settled(Duration::from_secs(5)));
        session.runner().with_stage(|stage| {
            if stage.pending_line().is_some() {
                stage.finish_line();
            } else if let Some(options) = stage.pending_options() {
                let pick = options.iter().position(|o| o.available).unwrap();
                stage.select_option(pick);
            }
        });
        match session.update(elapsed).unwrap() {
            SessionEvent::Idle => std::thread::yield_now(),
            SessionEvent::NodeStarted(node) => nodes.push(node),
            SessionEvent::NodeFinished { node, outcome } => {
                assert!(outcome.is_ok(), "{node}: {outcome:?}");
                let slips = session
                    .runner()
                    .with_stage(|stage| std::mem::take(&mut stage.host.ledger.slips));
                for slip in slips {
                    session.day_mut().accept_slip(slip);
                }
            }
            SessionEvent::DayOver => break,
        }
    }

    let (day, runner) = session.into_parts();
    let (transcript, sounds) = runner.with_stage(|stage| {
        (
            stage.host.transcript.clone(),
            stage.host.ledger.sounds.clone(),
        )
    });
    Played {
        nodes,
        transcript,
        slips: day.slips().to_vec(),
        sounds,
        variables: runner.variables(),
    }
}

fn digest(lines: &[String]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    for line in lines {
        hasher.write(line.as_bytes());
        hasher.write_u8(b'\n');
    }
    hasher.finish()
}

#[test]
fn first_day_follows_the_authored_sequence() {
    let played = play_day(0xC0FFEE, 0);
    assert_eq!(played.nodes.len(), 10);
    assert_eq!(played.nodes[0], "Manager_Day1");
    assert_eq!(played.nodes[4], "drone");
    assert_eq!(played.nodes[7], "OldMan");
    assert_eq!(played.nodes[9], "Manager_Day1_End");
    for node in [1, 2, 3, 5, 6, 8] {
        assert!(played.nodes[node].starts_with("Random"), "{}", played.nodes[node]);
    }

    assert_eq!(played.variables.number("$served"), 7.0);
    assert_eq!(played.slips.len(), 7);
    assert_eq!(played.sounds, vec!["buzz"]);
    assert!(
        played
            .transcript
            .iter()
            .any(|line| line == "That's closing time. You served 7 customers today.")
    );
    assert!(!played.transcript.iter().any(|line| line == "ERROR"));
}

#[test]
fn same_seed_replays_the_same_day() {
    let first = play_day(42, 0);
    let second = play_day(42, 0);
    assert_eq!(first.nodes, second.nodes);
    assert_eq!(digest(&first.transcript), digest(&second.transcript));
    assert_eq!(first.slips, second.slips);
}

#[test]
fn second_day_draws_only_from_the_pool() {
    let played = play_day(7, 1);
    let (last, customers) = played.nodes.split_last().unwrap();
    assert_eq!(last, "Manager_Day2_End");
    assert_eq!(customers.len(), 9);
    assert!(customers.iter().all(|node| node.starts_with("Random")));
    assert_eq!(played.transcript.last().unwrap(), "Thanks for playing.");
}
