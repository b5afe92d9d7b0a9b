//! Steps and the commands they run.
//!
//! A [`Step`] is one unit of work inside a job: either a fully-known tool
//! invocation, a command derived from facts parsed out of the previous
//! step's output, or a local cut-list write. Steps render to and parse
//! from single text lines so the queue snapshot can store a whole chain
//! in one string field.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cutlist::CutListSpec;
use crate::derive::DeriveRule;

/// Errors from parsing command lines or step directives.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command line")]
    Empty,

    #[error("unbalanced quoting in command line: {0}")]
    Unparsable(String),

    #[error("invalid step directive: {0}")]
    Directive(#[from] serde_json::Error),
}

/// One external tool invocation: executable name plus ordered arguments.
///
/// The program is resolved against `PATH` at run time; nothing here
/// validates flag semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Create a command from a program name and arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a shell-style command line.
    pub fn parse_line(line: &str) -> Result<Self, CommandError> {
        let words =
            shell_words::split(line).map_err(|_| CommandError::Unparsable(line.to_string()))?;
        let mut iter = words.into_iter();
        let program = iter.next().ok_or(CommandError::Empty)?;
        Ok(Self {
            program,
            args: iter.collect(),
        })
    }

    /// Render back to a shell-quoted command line.
    pub fn to_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.clone());
        words.extend(self.args.iter().cloned());
        shell_words::join(words.iter().map(String::as_str))
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The input file argument, i.e. the value following `-i`, if any.
    ///
    /// Used to probe a total duration for percent reporting.
    pub fn input_path(&self) -> Option<&str> {
        self.args
            .windows(2)
            .find(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

/// What the executor extracts from a step's output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Elapsed-time tokens, reported as a percentage.
    #[default]
    Progress,
    /// Silence/scene markers, accumulated as analysis facts.
    Analysis,
}

/// The work a step performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// A fully-known command, runnable as-is.
    Run { command: ToolCommand },
    /// A command materialized from the previous step's analysis facts.
    Derive { rule: DeriveRule },
    /// A local file write rendering the cut-list document from facts.
    WriteCutList { spec: CutListSpec },
}

/// One step of a job's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: StepAction,
    #[serde(default)]
    pub collect: OutputKind,
}

impl Step {
    /// A plain command step reporting percent progress.
    pub fn run(command: ToolCommand) -> Self {
        Self {
            action: StepAction::Run { command },
            collect: OutputKind::Progress,
        }
    }

    /// A command step whose output is scanned for analysis facts.
    pub fn analyze(command: ToolCommand) -> Self {
        Self {
            action: StepAction::Run { command },
            collect: OutputKind::Analysis,
        }
    }

    /// A dependent step materialized from prior facts.
    pub fn derive(rule: DeriveRule) -> Self {
        Self {
            action: StepAction::Derive { rule },
            collect: OutputKind::Progress,
        }
    }

    /// A cut-list write step.
    pub fn write_cut_list(spec: CutListSpec) -> Self {
        Self {
            action: StepAction::WriteCutList { spec },
            collect: OutputKind::Progress,
        }
    }

    /// Whether this step's concrete work depends on earlier output.
    pub fn is_dependent(&self) -> bool {
        matches!(
            self.action,
            StepAction::Derive { .. } | StepAction::WriteCutList { .. }
        )
    }

    /// Render the step as one snapshot line.
    ///
    /// A plain progress-collecting `Run` step renders as its shell
    /// command line; anything else becomes a one-line JSON directive.
    /// [`Step::parse_line`] tells the two apart by the leading `{`.
    pub fn render_line(&self) -> Result<String, CommandError> {
        match (&self.action, self.collect) {
            (StepAction::Run { command }, OutputKind::Progress) => Ok(command.to_line()),
            _ => Ok(serde_json::to_string(self)?),
        }
    }

    /// Parse one snapshot line back into a step.
    pub fn parse_line(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        if line.starts_with('{') {
            Ok(serde_json::from_str(line)?)
        } else {
            Ok(Step::run(ToolCommand::parse_line(line)?))
        }
    }
}
