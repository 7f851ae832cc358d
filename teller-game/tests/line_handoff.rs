use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use teller_game::dialogue::{Instruction, Node, Program, StringEntry, StringTable};
use teller_game::{
    Command, CommandError, DialogueError, DialogueHost, DialogueOption, DialogueProgram,
    DialogueRunner, PresentedLine, RunnerConfig, RunnerState, Variables,
};

const SETTLE: Duration = Duration::from_secs(5);
const PRESENT_FOR: Duration = Duration::from_millis(30);

#[derive(Default)]
struct Bubble {
    shown: Vec<(String, Instant)>,
    options: Vec<DialogueOption>,
}

impl DialogueHost for Bubble {
    fn on_line(&mut self, line: &PresentedLine) {
        self.shown.push((line.text.clone(), Instant::now()));
    }

    fn on_options(&mut self, options: &[DialogueOption]) {
        self.options = options.to_vec();
    }

    fn on_command(&mut self, command: &Command, _vars: &mut Variables) -> Result<(), CommandError> {
        Err(CommandError::Unknown(command.name().to_string()))
    }
}

fn line(id: &str) -> Instruction {
    Instruction::Line {
        id: id.to_string(),
        substitutions: Default::default(),
    }
}

fn runner() -> DialogueRunner<Bubble> {
    let chatter = Node::new("Chatter", vec![line("a"), line("b"), line("c")]);
    let choose = Node::new(
        "Choose",
        vec![
            Instruction::AddOption {
                id: "a".to_string(),
                target: "end".to_string(),
                substitutions: Default::default(),
                condition: None,
            },
            Instruction::ShowOptions,
            Instruction::Label {
                name: "end".to_string(),
            },
        ],
    );
    let program = Program::from_nodes(vec![chatter, choose]).unwrap();
    let strings = StringTable::from_entries(
        "en_US",
        ["a", "b", "c"].map(|id| {
            (
                id.to_string(),
                StringEntry {
                    text: id.to_uppercase(),
                    tags: Default::default(),
                },
            )
        }),
    );
    DialogueRunner::new(
        Arc::new(DialogueProgram::new(program, strings)),
        Bubble::default(),
        Variables::new(),
        RunnerConfig::default(),
    )
}

#[test]
fn next_line_waits_for_the_previous_one_to_finish() {
    let mut runner = runner();
    runner.start_node("Chatter").unwrap();

    let mut finished_at = Vec::new();
    while runner.wait_until_settled(SETTLE) && runner.state() == RunnerState::Waiting {
        let shown = runner.with_stage(|stage| stage.host.shown.len());
        thread::sleep(PRESENT_FOR);
        runner.with_stage(|stage| {
            assert_eq!(stage.host.shown.len(), shown, "line handed over early");
            finished_at.push(Instant::now());
            assert!(stage.finish_line());
        });
    }
    runner.join().unwrap().unwrap();

    let shown = runner.with_stage(|stage| stage.host.shown.clone());
    let texts: Vec<&str> = shown.iter().map(|(text, _)| text.as_str()).collect();
    assert_eq!(texts, ["A", "B", "C"]);
    for (next, finished) in shown.iter().skip(1).zip(&finished_at) {
        assert!(next.1 >= *finished);
    }
}

#[test]
fn cancel_from_another_thread_releases_a_pending_choice() {
    let mut runner = runner();
    runner.start_node("Choose").unwrap();
    assert!(runner.wait_until_settled(SETTLE));
    assert_eq!(runner.with_stage(|stage| stage.host.options.len()), 1);

    thread::scope(|scope| {
        scope.spawn(|| runner.cancel());
    });
    assert_eq!(runner.join(), Some(Err(DialogueError::Cancelled)));
    assert_eq!(runner.state(), RunnerState::Stopped);

    runner.start_node("Choose").unwrap();
    assert!(runner.wait_until_settled(SETTLE));
    assert!(runner.select_option(0));
    assert_eq!(runner.join(), Some(Ok(())));
}

#[test]
fn invalid_choice_fails_the_node() {
    let mut runner = runner();
    runner.start_node("Choose").unwrap();
    assert!(runner.wait_until_settled(SETTLE));
    assert!(runner.select_option(3));
    let outcome = runner.join().unwrap();
    assert!(matches!(
        outcome,
        Err(DialogueError::InvalidOption { index: 3, count: 1, .. })
    ));
}
