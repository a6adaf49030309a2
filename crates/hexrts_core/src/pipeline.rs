//! Command intake: decoding, the validate/execute contract, and the
//! bounded command history used for replays.
//!
//! The executor is the single entry point for player input. Commands
//! arrive either as typed [`Command`] values or as JSON payloads from
//! the outside; JSON that fails to decode is a hard
//! [`GameError::CommandDecode`], while a well-formed command the rules
//! refuse comes back as [`CommandOutcome::Rejected`]. Only applied
//! commands enter the history ring, so replaying the ring against the
//! same starting state reproduces the same sequence of batches.

use std::collections::VecDeque;

use tracing::debug;

use crate::combat::CombatResolver;
use crate::command::{self, Command, CommandEnvelope, CommandId, CommandRejection};
use crate::error::{GameError, Result};
use crate::events::{ChangeBuilder, StateChangeBatch};
use crate::player::PlayerId;
use crate::state::GameState;

/// Applied commands kept for replay before the oldest is dropped.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// What became of a submitted command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The command ran; these changes were applied.
    Applied(StateChangeBatch),
    /// The command was refused; nothing changed.
    Rejected(CommandRejection),
}

impl CommandOutcome {
    /// Whether the command was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Decodes, validates, executes, and remembers player commands.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    next_raw: u64,
    capacity: usize,
    history: VecDeque<CommandEnvelope>,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    /// Create an executor with the default history capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an executor keeping at most `capacity` applied commands.
    #[must_use]
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            next_raw: 1,
            capacity,
            history: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    /// Submit a typed command on behalf of `player`.
    ///
    /// Runs the full validate-then-execute contract: a rejected
    /// command leaves the state byte-for-byte unchanged and does not
    /// enter the history.
    pub fn submit(
        &mut self,
        state: &mut GameState,
        combat: &mut CombatResolver,
        player: PlayerId,
        command: Command,
    ) -> CommandOutcome {
        let mut changes = ChangeBuilder::new();
        match command::execute(state, combat, player, &command, &mut changes) {
            Ok(()) => {
                let id = CommandId(self.next_raw);
                self.next_raw += 1;
                let tick = state.tick();
                self.remember(CommandEnvelope {
                    id,
                    tick,
                    player,
                    command,
                });
                CommandOutcome::Applied(changes.into_batch(tick, Some(id)))
            }
            Err(rejection) => {
                debug!(%player, %rejection, "command rejected");
                CommandOutcome::Rejected(rejection)
            }
        }
    }

    /// Submit a JSON-encoded command payload.
    ///
    /// # Errors
    /// Returns [`GameError::CommandDecode`] if the payload is not a
    /// well-formed command; rule refusals come back as
    /// [`CommandOutcome::Rejected`] instead.
    pub fn submit_json(
        &mut self,
        state: &mut GameState,
        combat: &mut CombatResolver,
        player: PlayerId,
        payload: &str,
    ) -> Result<CommandOutcome> {
        let command: Command = serde_json::from_str(payload)
            .map_err(|e| GameError::CommandDecode(e.to_string()))?;
        Ok(self.submit(state, combat, player, command))
    }

    /// Applied commands still in the ring, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &CommandEnvelope> {
        self.history.iter()
    }

    /// Serialize the history ring for replay tooling.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if serialization fails.
    pub fn export_replay(&self) -> Result<Vec<u8>> {
        let envelopes: Vec<&CommandEnvelope> = self.history.iter().collect();
        serde_json::to_vec(&envelopes).map_err(|e| GameError::CorruptState(e.to_string()))
    }

    /// Decode a replay produced by [`export_replay`].
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] on malformed bytes.
    ///
    /// [`export_replay`]: Self::export_replay
    pub fn import_replay(bytes: &[u8]) -> Result<Vec<CommandEnvelope>> {
        serde_json::from_slice(bytes).map_err(|e| GameError::CorruptState(e.to_string()))
    }

    fn remember(&mut self, envelope: CommandEnvelope) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(envelope);
    }
}
