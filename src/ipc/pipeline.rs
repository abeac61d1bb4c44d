//! The feed pipeline: one socket client streaming observation frames
//! through a detection session, confirmed events streaming back.

use anyhow::Result;
use log::{info, warn};
use std::{
    io::{BufRead, Write},
    os::unix::net::UnixStream,
    sync::{Arc, atomic::Ordering, mpsc},
    thread,
};

use super::dispatch::dispatch_event;
use super::server::Shared;
use crate::error::DetectError;
use crate::session::{Frame, ObservationSource};
use crate::stability::ConfirmedEvent;

/// NDJSON frame reader over any buffered input. EOF ends the stream; a
/// malformed line is an invalid observation for that frame only.
pub struct LineSource<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> ObservationSource for LineSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>, DetectError> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .map_err(|e| DetectError::SourceUnavailable(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str::<Frame>(trimmed)
                .map(Some)
                .map_err(|e| DetectError::InvalidObservation(format!("bad frame json: {e}")));
        }
    }
}

/// Drive one feed connection. The socket peer is the observation source;
/// events go to the peer and to phrase dispatch via a writer thread, so the
/// session loop never blocks on output.
pub fn run_feed<R: BufRead>(reader: R, mut stream: UnixStream, shared: &Arc<Shared>) -> Result<()> {
    // Exactly one active session per daemon.
    if shared.feeding.swap(true, Ordering::SeqCst) {
        let err = DetectError::AlreadyActive;
        writeln!(
            stream,
            "{}",
            serde_json::json!({"ok": false, "error": err.to_string()})
        )?;
        return Ok(());
    }

    let result = feed_inner(reader, &mut stream, shared);
    shared.feeding.store(false, Ordering::SeqCst);
    result
}

fn feed_inner<R: BufRead>(reader: R, stream: &mut UnixStream, shared: &Arc<Shared>) -> Result<()> {
    let profile = { shared.cfg.lock().unwrap().profile.clone() };
    let mut session = profile.session();
    let mut source = LineSource::new(reader);

    writeln!(stream, "{}", serde_json::json!({"ok": true, "data": "feed started"}))?;
    info!("feed: session started");

    let (tx, rx) = mpsc::channel::<ConfirmedEvent>();
    let out = stream.try_clone()?;
    let writer_profile = profile.clone();
    let writer = thread::spawn(move || {
        let mut out = out;
        for evt in rx {
            if let Err(e) = dispatch_event(&evt, &writer_profile) {
                warn!("dispatch failed: {e}");
            }
            let line = serde_json::json!({"ok": true, "event": evt});
            if writeln!(out, "{line}").is_err() {
                // Peer went away; drain and let the session notice the
                // closed socket on its next read.
                break;
            }
        }
    });

    let run = session.run(&mut source, &tx, &shared.shutdown);
    drop(tx);
    let _ = writer.join();

    match run {
        Ok(()) => info!("feed: session ended"),
        Err(ref e) => warn!("feed: session aborted: {e}"),
    }
    session.cleanup();
    Ok(())
}
