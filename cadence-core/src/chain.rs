//! Resolved command chains, as produced by a command grammar.
//!
//! A [`ContextChain`] is the sequence of stages one parsed command passes
//! through: zero or more redirect stages followed by exactly one terminal
//! [`Stage::Execute`]. Chains are built with [`ContextChain::build`]:
//!
//! ```rust
//! use cadence_core::chain::ContextChain;
//!
//! let chain = ContextChain::<String>::build("as everyone say hi")
//!     .fork(|name| Ok(vec![format!("{name}-a"), format!("{name}-b")]))
//!     .execute(|name| Ok(i32::try_from(name.len()).unwrap_or(i32::MAX)));
//! assert!(!chain.is_terminal());
//! assert!(chain.next_stage().is_some_and(|next| next.is_terminal()));
//! ```

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::CommandError;
use crate::exec::{CustomCommandExecutor, CustomModifierExecutor};
use crate::source::ExecutionSource;

/// A terminal command that returns an integer result.
pub trait Command<S>: 'static {
    /// Runs this command for `source`.
    fn run(&self, source: &S) -> Result<i32, CommandError>;
}

impl<S, F> Command<S> for F
where
    F: Fn(&S) -> Result<i32, CommandError> + 'static,
{
    fn run(&self, source: &S) -> Result<i32, CommandError> {
        self(source)
    }
}

/// Maps one source to zero or more sources.
pub trait RedirectModifier<S>: 'static {
    /// Returns the sources that replace `source`.
    fn apply(&self, source: &S) -> Result<Vec<S>, CommandError>;
}

impl<S, F> RedirectModifier<S> for F
where
    F: Fn(&S) -> Result<Vec<S>, CommandError> + 'static,
{
    fn apply(&self, source: &S) -> Result<Vec<S>, CommandError> {
        self(source)
    }
}

/// How a non-terminal stage transforms its sources.
pub enum Redirect<S> {
    /// Sources pass through unchanged.
    Passthrough,
    /// Each source is replaced by the sources a modifier returns.
    Modifier(Arc<dyn RedirectModifier<S>>),
    /// Resolution of the rest of the chain is handed to a custom executor.
    Custom(Arc<dyn CustomModifierExecutor<S>>),
}

impl<S> Clone for Redirect<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Passthrough => Self::Passthrough,
            Self::Modifier(modifier) => Self::Modifier(modifier.clone()),
            Self::Custom(custom) => Self::Custom(custom.clone()),
        }
    }
}

/// What a terminal stage runs.
pub enum Executable<S> {
    /// A command returning an integer result.
    Command(Arc<dyn Command<S>>),
    /// A custom executor with access to the scheduler.
    Custom(Arc<dyn CustomCommandExecutor<S>>),
}

impl<S> Clone for Executable<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Command(command) => Self::Command(command.clone()),
            Self::Custom(custom) => Self::Custom(custom.clone()),
        }
    }
}

/// One stage of a [`ContextChain`].
pub enum Stage<S> {
    /// A redirect stage.
    Modify {
        /// Whether this stage's context was produced by a fork.
        forked: bool,
        /// How this stage transforms its sources.
        redirect: Redirect<S>,
    },
    /// The terminal stage.
    Execute(Executable<S>),
}

impl<S> Clone for Stage<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Modify { forked, redirect } => Self::Modify {
                forked: *forked,
                redirect: redirect.clone(),
            },
            Self::Execute(executable) => Self::Execute(executable.clone()),
        }
    }
}

impl<S> Debug for Stage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modify { forked, redirect } => f
                .debug_struct("Modify")
                .field("forked", forked)
                .field(
                    "redirect",
                    &match redirect {
                        Redirect::Passthrough => "passthrough",
                        Redirect::Modifier(_) => "modifier",
                        Redirect::Custom(_) => "custom",
                    },
                )
                .finish(),
            Self::Execute(Executable::Command(_)) => f.write_str("Execute(command)"),
            Self::Execute(Executable::Custom(_)) => f.write_str("Execute(custom)"),
        }
    }
}

/// A cursor into the stages of one parsed command.
///
/// Cloning a chain is cheap: the stages are shared and only the position is
/// copied.
pub struct ContextChain<S> {
    input: Arc<str>,
    stages: Arc<[Stage<S>]>,
    position: usize,
}

impl<S> ContextChain<S> {
    /// Starts building a chain for the command text `input`.
    pub fn build(input: impl Into<Arc<str>>) -> ChainBuilder<S> {
        ChainBuilder {
            input: input.into(),
            stages: Vec::new(),
        }
    }

    /// Returns the command text this chain was parsed from.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Returns the shared command text.
    #[must_use]
    pub fn shared_input(&self) -> Arc<str> {
        self.input.clone()
    }

    /// Returns the current stage.
    #[must_use]
    pub fn stage(&self) -> &Stage<S> {
        &self.stages[self.position]
    }

    /// Returns true if the current stage is the terminal execute stage.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.stage(), Stage::Execute(_))
    }

    /// Returns true if the current stage's context was produced by a fork.
    #[must_use]
    pub fn is_forked(&self) -> bool {
        matches!(self.stage(), Stage::Modify { forked: true, .. })
    }

    /// Returns a chain positioned at the following stage, or `None` if this
    /// is the terminal stage.
    #[must_use]
    pub fn next_stage(&self) -> Option<Self> {
        (self.position + 1 < self.stages.len()).then(|| Self {
            input: self.input.clone(),
            stages: self.stages.clone(),
            position: self.position + 1,
        })
    }
}

impl<S> ContextChain<S>
where
    S: ExecutionSource,
{
    /// Runs the current stage's redirect for `source`.
    ///
    /// A passthrough stage returns `source` itself. Custom modifiers cannot be
    /// run this way and return [`CommandError::Unsupported`].
    pub fn run_modifier(&self, source: &S) -> Result<Vec<S>, CommandError> {
        match self.stage() {
            Stage::Modify {
                redirect: Redirect::Passthrough,
                ..
            } => Ok(vec![source.clone()]),
            Stage::Modify {
                redirect: Redirect::Modifier(modifier),
                ..
            } => modifier.apply(source),
            Stage::Modify {
                redirect: Redirect::Custom(_),
                ..
            }
            | Stage::Execute(_) => Err(CommandError::Unsupported),
        }
    }

    /// Runs the terminal command for `source`, reporting the outcome to the
    /// source's callback.
    pub fn run_executable(&self, source: &S) -> Result<i32, CommandError> {
        let Stage::Execute(Executable::Command(command)) = self.stage() else {
            return Err(CommandError::Unsupported);
        };
        match command.run(source) {
            Ok(result) => {
                source.callback().on_success(result);
                Ok(result)
            }
            Err(err) => {
                source.callback().on_failure();
                Err(err)
            }
        }
    }
}

impl<S> Clone for ContextChain<S> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            stages: self.stages.clone(),
            position: self.position,
        }
    }
}

impl<S> Debug for ContextChain<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextChain")
            .field("input", &self.input)
            .field("stages", &self.stages)
            .field("position", &self.position)
            .finish()
    }
}

/// Builds a [`ContextChain`]. Finishing requires a terminal stage.
pub struct ChainBuilder<S> {
    input: Arc<str>,
    stages: Vec<Stage<S>>,
}

impl<S> ChainBuilder<S> {
    /// Adds a stage that passes its sources through unchanged.
    #[must_use]
    pub fn redirect(mut self) -> Self {
        self.stages.push(Stage::Modify {
            forked: false,
            redirect: Redirect::Passthrough,
        });
        self
    }

    /// Adds a non-forking modifier stage.
    #[must_use]
    pub fn modify<F>(self, modifier: F) -> Self
    where
        F: Fn(&S) -> Result<Vec<S>, CommandError> + 'static,
    {
        self.stage(false, Redirect::Modifier(Arc::new(modifier)))
    }

    /// Adds a forking modifier stage.
    #[must_use]
    pub fn fork<F>(self, modifier: F) -> Self
    where
        F: Fn(&S) -> Result<Vec<S>, CommandError> + 'static,
    {
        self.stage(true, Redirect::Modifier(Arc::new(modifier)))
    }

    /// Adds a stage resolved by a custom modifier executor.
    #[must_use]
    pub fn custom(self, forked: bool, modifier: impl CustomModifierExecutor<S>) -> Self {
        self.stage(forked, Redirect::Custom(Arc::new(modifier)))
    }

    /// Adds a redirect stage.
    #[must_use]
    pub fn stage(mut self, forked: bool, redirect: Redirect<S>) -> Self {
        self.stages.push(Stage::Modify { forked, redirect });
        self
    }

    /// Finishes the chain with `command` as its terminal stage.
    pub fn execute<F>(self, command: F) -> ContextChain<S>
    where
        F: Fn(&S) -> Result<i32, CommandError> + 'static,
    {
        self.finish(Executable::Command(Arc::new(command)))
    }

    /// Finishes the chain with a custom executor as its terminal stage.
    pub fn execute_custom(self, executor: impl CustomCommandExecutor<S>) -> ContextChain<S> {
        self.finish(Executable::Custom(Arc::new(executor)))
    }

    /// Finishes the chain with `executable` as its terminal stage.
    pub fn finish(mut self, executable: Executable<S>) -> ContextChain<S> {
        self.stages.push(Stage::Execute(executable));
        ContextChain {
            input: self.input,
            stages: self.stages.into(),
            position: 0,
        }
    }
}
