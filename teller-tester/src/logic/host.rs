//! Headless stand-in for the game scene: a typewriter text bubble and the
//! teller's commands.
use serde::{Deserialize, Serialize};
use teller_game::{
    Command, CommandError, CommandSet, DepositSlip, DialogueHost, DialogueOption, PresentedLine,
    SlipKind, Variables,
};

/// Frames a fully typed line stays on screen before it counts as read.
pub const READ_HOLD_FRAMES: u32 = 45;

/// One row of what the player would have seen or heard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Node { name: String },
    Line { text: String, last_line: bool },
    Options { texts: Vec<String> },
    Chose { text: String },
    Sound { name: String },
}

impl TranscriptEntry {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Node { name } => format!("> {name}"),
            Self::Line { text, .. } => text.clone(),
            Self::Options { texts } => format!("? {}", texts.join(" | ")),
            Self::Chose { text } => format!("* {text}"),
            Self::Sound { name } => format!("~ {name}"),
        }
    }
}

/// Text revealed a few characters per frame, then held for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    chars: usize,
    shown: usize,
    chars_per_frame: usize,
    hold: u32,
}

impl Bubble {
    #[must_use]
    pub fn new(text: &str, chars_per_frame: usize) -> Self {
        Self {
            chars: text.chars().count(),
            shown: 0,
            chars_per_frame: chars_per_frame.max(1),
            hold: READ_HOLD_FRAMES,
        }
    }

    /// Advance one frame. Returns true once the text is fully shown and read.
    pub fn advance(&mut self) -> bool {
        if self.shown < self.chars {
            self.shown = (self.shown + self.chars_per_frame).min(self.chars);
            return false;
        }
        if self.hold > 0 {
            self.hold -= 1;
            return false;
        }
        true
    }
}

/// Side effects of script commands.
#[derive(Debug, Default)]
pub struct Ledger {
    pub slips: Vec<DepositSlip>,
    pub sounds: Vec<String>,
    pub transcript: Vec<TranscriptEntry>,
}

fn teller_commands() -> CommandSet<Ledger> {
    CommandSet::new()
        .with("slip", |ledger: &mut Ledger, cmd: &Command, vars: &mut Variables| {
            let kind = match cmd.args().first().map(String::as_str) {
                Some("deposit") => SlipKind::Deposit,
                Some("withdrawal") => SlipKind::Withdrawal,
                Some(other) => {
                    return Err(CommandError::invalid(
                        cmd.name(),
                        format!("unknown slip kind {other}"),
                    ));
                }
                None => return Err(CommandError::invalid(cmd.name(), "missing slip kind")),
            };
            let dollars = cmd.number_arg(1)?;
            if !dollars.is_finite() || dollars < 0.0 {
                return Err(CommandError::invalid(cmd.name(), "amount must be positive"));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let account = vars.number("$served").max(0.0) as u32;
            #[allow(clippy::cast_possible_truncation)]
            let amount_cents = (dollars * 100.0).round() as i64;
            ledger.slips.push(DepositSlip {
                account,
                amount_cents,
                kind,
                customer: cmd.args().get(2).cloned(),
            });
            Ok(())
        })
        .with("play_sound", |ledger: &mut Ledger, cmd: &Command, _: &mut Variables| {
            let name = cmd
                .args()
                .first()
                .ok_or_else(|| CommandError::invalid(cmd.name(), "missing sound name"))?;
            ledger.sounds.push(name.clone());
            ledger.transcript.push(TranscriptEntry::Sound { name: name.clone() });
            Ok(())
        })
}

/// The scene's half of the dialogue contract.
#[derive(Debug)]
pub struct SceneHost {
    pub bubble: Option<Bubble>,
    pub ledger: Ledger,
    chars_per_frame: usize,
    commands: CommandSet<Ledger>,
}

impl SceneHost {
    #[must_use]
    pub fn new(chars_per_frame: usize) -> Self {
        Self {
            bubble: None,
            ledger: Ledger::default(),
            chars_per_frame,
            commands: teller_commands(),
        }
    }

    /// Record the player's choice.
    pub fn chose(&mut self, text: String) {
        self.ledger.transcript.push(TranscriptEntry::Chose { text });
    }
}

impl DialogueHost for SceneHost {
    fn on_node_start(&mut self, node: &str) {
        self.ledger.transcript.push(TranscriptEntry::Node {
            name: node.to_string(),
        });
    }

    fn on_line(&mut self, line: &PresentedLine) {
        self.bubble = Some(Bubble::new(&line.text, self.chars_per_frame));
        self.ledger.transcript.push(TranscriptEntry::Line {
            text: line.text.clone(),
            last_line: line.last_line,
        });
    }

    fn on_options(&mut self, options: &[DialogueOption]) {
        self.bubble = None;
        self.ledger.transcript.push(TranscriptEntry::Options {
            texts: options.iter().map(|o| o.text.clone()).collect(),
        });
    }

    fn on_command(&mut self, command: &Command, vars: &mut Variables) -> Result<(), CommandError> {
        self.commands.dispatch(&mut self.ledger, command, vars)
    }

    fn on_node_complete(&mut self, _node: &str) {
        self.bubble = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bubble_types_then_holds() {
        let mut bubble = Bubble::new("hello", 2);
        assert!(!bubble.advance());
        assert!(!bubble.advance());
        assert!(!bubble.advance());
        assert_eq!(bubble.shown, 5);
        for _ in 0..READ_HOLD_FRAMES {
            assert!(!bubble.advance());
        }
        assert!(bubble.advance());
    }

    #[test]
    fn slip_command_records_a_slip() {
        let mut host = SceneHost::new(1);
        let mut vars = Variables::new();
        vars.insert("$served", 3);
        let cmd = Command::parse("slip withdrawal 12.5 \"Mrs Pike\"").unwrap();
        host.on_command(&cmd, &mut vars).unwrap();
        let slip = &host.ledger.slips[0];
        assert_eq!(slip.account, 3);
        assert_eq!(slip.amount_cents, 1250);
        assert_eq!(slip.kind, SlipKind::Withdrawal);
        assert_eq!(slip.customer.as_deref(), Some("Mrs Pike"));
    }

    #[test]
    fn bad_commands_are_rejected() {
        let mut host = SceneHost::new(1);
        let mut vars = Variables::new();
        for text in ["slip refund 3", "slip deposit", "frobnicate now"] {
            let cmd = Command::parse(text).unwrap();
            assert!(host.on_command(&cmd, &mut vars).is_err(), "{text}");
        }
        assert!(host.ledger.slips.is_empty());
    }

    #[test]
    fn sounds_land_in_the_transcript() {
        let mut host = SceneHost::new(1);
        let cmd = Command::parse("play_sound buzz").unwrap();
        host.on_command(&cmd, &mut Variables::new()).unwrap();
        assert_eq!(host.ledger.sounds, vec!["buzz"]);
        assert_eq!(host.ledger.transcript[0].render(), "~ buzz");
    }
}
