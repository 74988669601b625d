// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applies the pending stdout/stderr path slots once a writable filesystem
//! becomes available (§3 "Pending redirections", §4.1 filesystem-change
//! event).

use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::engine::{Engine, EngineEvent};

/// Watches a single anchor path (the socket's parent directory: once it
/// exists, the filesystem under it is writable) and forwards one
/// `PendingRedirectsReady` event per change, coalescing bursts the way the
/// single global filesystem-change source in §4.1 does.
pub fn spawn_watcher(anchor: &Path, events: mpsc::Sender<EngineEvent>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = events.try_send(EngineEvent::PendingRedirectsReady);
        }
    })?;
    watcher.watch(anchor, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Re-open stdout/stderr against the pending paths, if any, and clear them.
/// Applied exactly once per filesystem-change event, matching the "applied
/// on the next filesystem-change event" rule.
pub fn apply(engine: &mut Engine) {
    if let Some(path) = engine.pending_stdout.take() {
        redirect(1, &path);
    }
    if let Some(path) = engine.pending_stderr.take() {
        redirect(2, &path);
    }
}

fn redirect(target_fd: i32, path: &Path) {
    use std::os::unix::io::AsRawFd;
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            if let Err(e) = nix::unistd::dup2(file.as_raw_fd(), target_fd) {
                warn!(?path, error = %e, "failed to apply pending redirect");
            }
        }
        Err(e) => warn!(?path, error = %e, "failed to open pending redirect target"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Identity;

    #[test]
    fn apply_clears_pending_slots() {
        let (events, _rx) = mpsc::channel(16);
        let mut engine = Engine::new(Identity::PerUser { uid: 501 }, events);
        let dir = tempfile::tempdir().unwrap();
        engine.pending_stdout = Some(dir.path().join("out.log"));
        apply(&mut engine);
        assert!(engine.pending_stdout.is_none());
    }
}
