use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    fs::File,
    io::{self, BufRead, BufReader, Write},
    net::Shutdown,
    os::unix::net::UnixStream,
    process::Command,
    sync::{atomic::AtomicBool, mpsc},
    thread,
};

use crate::config::DaemonConfigState;
use crate::ipc;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::server::run_daemon();
    }

    if env::args().len() == 1 || pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("signctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"shutdown"}))?;
            print_response(&r);
            Ok(())
        }

        Some("status") => {
            let r = ipc::client_request(serde_json::json!({"op":"status"}))?;
            print_response(&r);
            Ok(())
        }

        Some("reload") => {
            let r = ipc::client_request(serde_json::json!({"op":"reload"}))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: signctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("list") => {
            let r = ipc::client_request(serde_json::json!({"op":"list"}))?;
            print_response(&r);
            Ok(())
        }

        Some("doctor") => {
            let r = ipc::client_request(serde_json::json!({"op":"doctor"}))?;
            print_response(&r);
            Ok(())
        }

        Some("classify") => {
            let path: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: signctl classify <frames.ndjson>"))?;
            classify_file(&path)
        }

        Some("feed") => {
            let path: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: signctl feed <frames.ndjson|->"))?;
            feed_daemon(&path)
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Offline run: classify an NDJSON frame capture without the daemon and
/// print each confirmed event as a JSON line.
fn classify_file(path: &str) -> Result<()> {
    let file = File::open(path).map_err(|e| anyhow!("failed to open {path}: {e}"))?;
    let cfg = DaemonConfigState::load_or_install_default()?;
    let mut session = cfg.profile.session();
    let mut source = ipc::pipeline::LineSource::new(BufReader::new(file));

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        let stdout = io::stdout();
        for evt in rx {
            let mut out = stdout.lock();
            let _ = writeln!(out, "{}", serde_json::json!(evt));
        }
    });

    let cancel = AtomicBool::new(false);
    let result = session.run(&mut source, &tx, &cancel);
    drop(tx);
    let _ = printer.join();
    session.cleanup();
    result.map_err(|e| anyhow!("classification failed: {e}"))
}

/// Stream frames to the running daemon and print everything it sends back.
fn feed_daemon(path: &str) -> Result<()> {
    let sock = ipc::runtime::socket_path();
    if !sock.exists() {
        return Err(anyhow!(
            "signctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    writeln!(stream, "{}", serde_json::json!({"op": "feed"}))?;

    let reader = BufReader::new(stream.try_clone()?);
    let printer = thread::spawn(move || {
        for line in reader.lines().map_while(Result::ok) {
            println!("{line}");
        }
    });

    if path == "-" {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            writeln!(stream, "{}", line?)?;
        }
    } else {
        let file = File::open(path).map_err(|e| anyhow!("failed to open {path}: {e}"))?;
        for line in BufReader::new(file).lines() {
            writeln!(stream, "{}", line?)?;
        }
    }
    stream.shutdown(Shutdown::Write)?;
    let _ = printer.join();
    Ok(())
}

fn print_help() {
    println!(
        r#"signctl — sign-language gesture detection daemon

USAGE:
  signctl help [command]            Show general or command-specific help
  signctl start                     Start the daemon
  signctl stop                      Stop the daemon
  signctl status                    Show daemon state
  signctl reload                    Reload active profile
  signctl use <name>                Switch active profile
  signctl list                      List profiles
  signctl doctor                    Diagnose socket/profile setup
  signctl classify <file>           Classify an NDJSON frame capture offline
  signctl feed <file|->             Stream frames to the running daemon

FRAMES (one JSON object per line):
  {{"landmarks": [[x,y], ...21 points]}}   hand-pose observation
  {{"motion": 123.4}}                      pixel-motion magnitude fallback
  {{}}                                     frame with no hand

TIPS:
  - Profiles: ~/.config/signctl/profiles
  - Active profile pointer: ~/.config/signctl/active
  - Edit phrases in the active profile; the daemon reloads automatically
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: signctl start\nStarts the background daemon."),
        "stop" => println!("usage: signctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: signctl status\nShows active profile, detection state and socket path."
        ),
        "reload" => println!(
            "usage: signctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: signctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: signctl list\nLists available profiles."),
        "doctor" => println!(
            "usage: signctl doctor\nChecks the socket, profiles and speech-command gating."
        ),
        "classify" => println!(
            "usage: signctl classify <frames.ndjson>\nRuns the detection pipeline over a capture \
             file without a daemon and prints confirmed events."
        ),
        "feed" => println!(
            "usage: signctl feed <frames.ndjson|->\nStreams frames to the running daemon; \
             confirmed events are printed as they fire."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
