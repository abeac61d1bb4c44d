use anyhow::Result;
use log::{info, warn};
use std::process::{Command, Stdio};

use crate::config::Profile;
use crate::stability::ConfirmedEvent;

/// Route one confirmed event to its configured outputs: the daemon log and,
/// when a speech command is bound and commands are allowed, a spawned
/// speaker process. The spawn is fire-and-forget; a slow synthesizer must
/// not hold up the frame pipeline.
pub fn dispatch_event(evt: &ConfirmedEvent, profile: &Profile) -> Result<()> {
    info!(
        "confirmed sign: '{}' ({}%)",
        evt.label,
        (evt.confidence * 100.0).round()
    );

    let Some(cmd) = profile.speech.command.as_deref() else {
        return Ok(());
    };
    if !profile.meta.allow_commands {
        // validate_profile rejects this combination; double-checked here
        // because profiles can be swapped at runtime.
        warn!("speech.command configured but commands are not allowed; skipping");
        return Ok(());
    }

    match Command::new(cmd)
        .arg(&evt.label)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => info!("speaking via {cmd} (pid={})", child.id()),
        Err(e) => warn!("failed to spawn speech command {cmd}: {e}"),
    }
    Ok(())
}
