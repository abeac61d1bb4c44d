use anyhow::Result;
use log::{error, info, warn};
use notify::{RecursiveMode, Watcher};
use signal_hook::{consts::{SIGINT, SIGTERM}, iterator::Signals};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use super::pipeline::run_feed;
use super::runtime::socket_path;
use crate::config::{self, DaemonConfigState};

/// State shared between the accept loop, client threads and the feed
/// pipeline.
pub struct Shared {
    pub cfg: Mutex<DaemonConfigState>,
    /// Raised while a feed connection owns the detection session.
    pub feeding: AtomicBool,
    pub shutdown: AtomicBool,
}

pub fn run_daemon() -> Result<()> {
    let sock = socket_path();
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    listener.set_nonblocking(true)?;
    info!("daemon: listening on {}", sock.display());

    let cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);
    let watch = config::watch_paths(&cfg);
    let shared = Arc::new(Shared {
        cfg: Mutex::new(cfg),
        feeding: AtomicBool::new(false),
        shutdown: AtomicBool::new(false),
    });

    // SIGINT/SIGTERM raise the shutdown flag; the loop below cleans up the
    // socket file before exiting.
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    {
        let shared = shared.clone();
        thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("received signal {sig}; shutting down");
                shared.shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    // Profile edits reload automatically.
    let (wtx, wrx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = wtx.send(res);
    })?;
    for p in &watch {
        if let Err(e) = watcher.watch(p, RecursiveMode::NonRecursive) {
            warn!("watch {} failed: {e}", p.display());
        }
    }

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        match listener.accept() {
            Ok((stream, _)) => {
                let shared = shared.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, &shared) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }

        while let Ok(evt) = wrx.try_recv() {
            match evt {
                Ok(evt) if evt.paths.iter().any(|p| config::is_profile_path(p)) => {
                    let mut cfg = shared.cfg.lock().unwrap();
                    match cfg.reload() {
                        Ok(()) => info!("profile '{}' reloaded (file changed)", cfg.active_name),
                        Err(e) => warn!("profile reload failed, keeping last good: {e}"),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("profile watcher error: {e}"),
            }
        }
    }

    let _ = std::fs::remove_file(&sock);
    info!("daemon: stopped");
    Ok(())
}

fn handle_client(stream: UnixStream, shared: &Arc<Shared>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    // The feed op hands the whole connection to the pipeline.
    if op == "feed" {
        return run_feed(reader, stream, shared);
    }

    let mut stream = stream;
    let resp = match op {
        "status" => {
            let cfg = shared.cfg.lock().unwrap();
            serde_json::json!({"ok": true, "data": {
                "active_profile": cfg.active_name,
                "detecting": shared.feeding.load(Ordering::SeqCst),
                "socket": socket_path(),
            }})
        }
        "reload" => {
            let mut cfg = shared.cfg.lock().unwrap();
            match cfg.reload() {
                Ok(()) => {
                    serde_json::json!({"ok": true, "data": {"active_profile": cfg.active_name}})
                }
                Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
            }
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            let mut cfg = shared.cfg.lock().unwrap();
            match cfg.set_active(name) {
                Ok(()) => {
                    serde_json::json!({"ok": true, "data": {"active_profile": cfg.active_name}})
                }
                Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
            }
        }
        "list" => {
            let cfg = shared.cfg.lock().unwrap();
            serde_json::json!({"ok": true, "data": {
                "profiles": cfg.list_profiles(),
                "active": cfg.active_name,
            }})
        }
        "doctor" => {
            let cfg = shared.cfg.lock().unwrap();
            serde_json::json!({"ok": true, "data": cfg.doctor_report()})
        }
        "shutdown" => {
            shared.shutdown.store(true, Ordering::SeqCst);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };

    writeln!(stream, "{resp}")?;
    Ok(())
}
