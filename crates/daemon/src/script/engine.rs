// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script execution.
//!
//! Runs a token's command stream in order: resolves mappings first, fires
//! the `before_media_start` hook ahead of media-launching commands (outside
//! hook context only), and splices commands a command returns into the
//! stream immediately after itself. A history row is recorded for every
//! run, successful or not.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::config::Config;
use crate::platform::{LaunchTarget, SharedPlatform, StopIntent};
use crate::playlist::Playlist;
use crate::repo::{ScanHistoryEntry, UserRepo};
use crate::state::State;
use crate::token::Token;

use super::{mappings, parse_script, CommandResult, ScriptCommand};

/// Longest `**delay` a script may request.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Result of a full script run, as seen by the queue worker.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub media_changed: bool,
    /// A command replaced the active playlist; `playlist` carries the new
    /// value (`None` means cleared).
    pub playlist_changed: bool,
    pub playlist: Option<Playlist>,
}

pub struct ScriptEngine {
    config: Arc<Config>,
    platform: SharedPlatform,
    state: Arc<State>,
    user_repo: Arc<dyn UserRepo>,
    clock: SharedClock,
    /// Software-token channel: tokens that changed media (and didn't come
    /// from the API) are forwarded here for the reader manager.
    lsq_tx: mpsc::Sender<Token>,
}

impl ScriptEngine {
    pub fn new(
        config: Arc<Config>,
        platform: SharedPlatform,
        state: Arc<State>,
        user_repo: Arc<dyn UserRepo>,
        clock: SharedClock,
        lsq_tx: mpsc::Sender<Token>,
    ) -> Self {
        Self { config, platform, state, user_repo, clock, lsq_tx }
    }

    /// Execute a token end to end: mapping resolution, command stream,
    /// history row. `playlist` is the controller context for playlist
    /// commands.
    pub async fn run_token(
        &self,
        token: &Token,
        playlist: Option<Playlist>,
    ) -> anyhow::Result<ExecOutcome> {
        let mut token = token.clone();

        let db_mappings = match self.user_repo.enabled_mappings() {
            Ok(m) => m,
            Err(e) => {
                warn!("mapping lookup failed, continuing without: {e}");
                Vec::new()
            }
        };
        if let Some(script) = mappings::resolve(
            &token,
            &db_mappings,
            &self.config.mappings,
            self.platform.as_ref(),
        ) {
            debug!(uid = token.uid.as_str(), "mapping override applied");
            token.text = script;
        }

        let text = token.text.clone();
        let outcome = self.run_script(&mut token, text, playlist, false).await;

        let entry = ScanHistoryEntry {
            time: self.clock.now(),
            kind: token.kind.clone(),
            uid: token.uid.clone(),
            text: token.text.clone(),
            data: token.data.clone(),
            success: outcome.is_ok(),
        };
        if let Err(e) = self.user_repo.add_history(entry) {
            warn!("history row skipped: {e}");
        }

        outcome
    }

    /// Run a hook script (before_media_start, before_exit). Hook context
    /// suppresses nested hook invocation.
    pub async fn run_hook(&self, text: &str) -> anyhow::Result<()> {
        let mut token = Token::synthetic(crate::token::TokenSource::Hook, text, self.clock.now());
        let script = token.text.clone();
        self.run_script(&mut token, script, None, true).await?;
        Ok(())
    }

    /// Execute a parsed command stream. Boxed for recursion (hooks run
    /// through the same path).
    fn run_script<'a>(
        &'a self,
        token: &'a mut Token,
        text: String,
        mut playlist: Option<Playlist>,
        in_hook: bool,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExecOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let mut commands = parse_script(&text);
            let mut outcome = ExecOutcome::default();
            let mut index = 0;

            while index < commands.len() {
                let command = commands[index].clone();

                if command.is_media_launch() && !in_hook {
                    if let Some(hook) = self.config.before_media_start_hook.clone() {
                        let target = launch_target(&command);
                        debug!(
                            path = target.path.as_str(),
                            "running before_media_start hook"
                        );
                        let mut hook_token = Token::synthetic(
                            crate::token::TokenSource::Hook,
                            hook.clone(),
                            self.clock.now(),
                        );
                        self.run_script(&mut hook_token, hook, playlist.clone(), true).await?;
                    }
                }

                let result = self.execute_command(token, &command, &mut playlist).await?;

                if result.media_changed {
                    outcome.media_changed = true;
                    if !token.from_api {
                        let _ = self.lsq_tx.send(token.clone()).await;
                    }
                }
                if result.playlist_changed {
                    outcome.playlist_changed = true;
                    playlist = result.playlist.clone();
                    outcome.playlist = result.playlist;
                }
                if result.untrusted {
                    token.untrusted = true;
                }
                if !result.new_commands.is_empty() {
                    let tail = commands.split_off(index + 1);
                    commands.extend(result.new_commands);
                    commands.extend(tail);
                }

                index += 1;
            }

            Ok(outcome)
        })
    }

    async fn execute_command(
        &self,
        token: &Token,
        command: &ScriptCommand,
        playlist: &mut Option<Playlist>,
    ) -> anyhow::Result<CommandResult> {
        match command.name.as_str() {
            name if name == "launch" || name.starts_with("launch.") => {
                let target = launch_target(command);
                self.platform.launch_media(&self.config, &self.state, &target)?;
                Ok(CommandResult { media_changed: true, ..CommandResult::default() })
            }
            "stop" => {
                self.platform.stop_active_launcher(&self.state, StopIntent::User)?;
                Ok(CommandResult::default())
            }
            "input.keyboard" => {
                self.platform.keyboard_press(&command.args)?;
                Ok(CommandResult::default())
            }
            "delay" => {
                let ms: u64 = command.args.trim().parse()?;
                let dur = Duration::from_millis(ms).min(MAX_DELAY);
                self.clock.sleep(dur).await;
                Ok(CommandResult::default())
            }
            "playlist.next" | "playlist.previous" | "playlist.play" | "playlist.pause" => {
                let current = playlist.clone().or_else(|| self.state.active_playlist());
                let Some(mut pl) = current else {
                    debug!(command = command.name.as_str(), "no active playlist, ignoring");
                    return Ok(CommandResult::default());
                };
                match command.name.as_str() {
                    "playlist.next" => pl.advance(),
                    "playlist.previous" => pl.step_back(),
                    "playlist.play" => pl.playing = true,
                    _ => pl.playing = false,
                }
                Ok(CommandResult {
                    playlist_changed: true,
                    playlist: Some(pl),
                    ..CommandResult::default()
                })
            }
            "playlist.stop" => Ok(CommandResult {
                playlist_changed: true,
                playlist: None,
                ..CommandResult::default()
            }),
            _ => self.platform.execute_command(token, command),
        }
    }
}

/// Derive the launch target from a launch command's arguments.
fn launch_target(command: &ScriptCommand) -> LaunchTarget {
    // `launch.<launcher>:path` pins a launcher; plain `launch:path` lets the
    // platform pick.
    let launcher_id = command.name.strip_prefix("launch.").map(str::to_owned);
    LaunchTarget { path: command.args.clone(), system_id: None, launcher_id }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
