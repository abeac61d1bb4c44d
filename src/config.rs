use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::motion::{MotionBin, MotionClassifier, default_bins};
use crate::rules::{self, RuleTable, default_rules};
use crate::session::DetectionSession;
use crate::stability;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

/// Knobs for the classification and debounce core. Omitted fields fall back
/// to the built-in constants.
#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// Debounce window capacity (bounded FIFO of recent candidate labels).
    #[serde(default = "default_window")]
    pub window: usize,
    /// Occurrences-in-window needed to confirm a landmark candidate.
    #[serde(default = "default_landmark_confirm")]
    pub landmark_confirm: usize,
    /// Occurrences-in-window needed to confirm a motion candidate.
    #[serde(default = "default_motion_confirm")]
    pub motion_confirm: usize,
    /// Confidence attached to every landmark-rule match.
    #[serde(default = "default_landmark_confidence")]
    pub landmark_confidence: f32,
    /// Tip-to-tip distance for the proximity rule, normalized units.
    #[serde(default = "default_proximity")]
    pub proximity: f32,
}

fn default_window() -> usize {
    stability::DEFAULT_WINDOW
}
fn default_landmark_confirm() -> usize {
    stability::LANDMARK_CONFIRM
}
fn default_motion_confirm() -> usize {
    stability::MOTION_CONFIRM
}
fn default_landmark_confidence() -> f32 {
    rules::LANDMARK_CONFIDENCE
}
fn default_proximity() -> f32 {
    rules::PROXIMITY_THRESHOLD
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            window: default_window(),
            landmark_confirm: default_landmark_confirm(),
            motion_confirm: default_motion_confirm(),
            landmark_confidence: default_landmark_confidence(),
            proximity: default_proximity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Speech {
    /// Command the dispatcher pipes confirmed phrases to, e.g. "espeak".
    /// Requires meta.allow_commands.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Replacement motion bins; empty means the built-in table.
    #[serde(default)]
    pub motion_bins: Vec<MotionBin>,
    #[serde(default)]
    pub speech: Speech,
    /// Gesture key -> phrase overrides for the built-in vocabulary.
    #[serde(default)]
    pub phrases: HashMap<String, String>,
}

impl Profile {
    pub fn rule_table(&self) -> RuleTable {
        RuleTable::new(
            default_rules(),
            self.thresholds.landmark_confidence,
            self.thresholds.proximity,
        )
        .with_phrases(&self.phrases)
    }

    pub fn motion_bins(&self) -> Vec<MotionBin> {
        if self.motion_bins.is_empty() {
            default_bins()
        } else {
            self.motion_bins.clone()
        }
    }

    pub fn session(&self) -> DetectionSession {
        DetectionSession::new(
            self.rule_table(),
            MotionClassifier::new(self.motion_bins()),
            self.thresholds.window,
            self.thresholds.landmark_confirm,
            self.thresholds.motion_confirm,
        )
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> PathBuf {
    let home = UserDirs::new().unwrap().home_dir().to_path_buf();
    home.join(".config").join("signctl")
}

fn profiles_dir() -> PathBuf {
    config_dir().join("profiles")
}

fn active_ptr_path() -> PathBuf {
    config_dir().join("active")
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir();
        let profdir = profiles_dir();
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = active_ptr_path();
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = Self::load_profile(&active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.profile = Self::load_profile(&self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.reload()?;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    fn load_profile(name: &str) -> Result<Profile> {
        let path = profiles_dir().join(format!("{name}.toml"));
        let txt = fs::read_to_string(&path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        parse_profile(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let sock = crate::ipc::runtime::socket_path();
        serde_json::json!({
            "user": whoami::username(),
            "socket": sock,
            "daemon_running": sock.exists(),
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "profiles": self.list_profiles(),
            "allow_commands": self.profile.meta.allow_commands,
            "speech_command": self.profile.speech.command,
            "hints": {
                "feed": "stream NDJSON frames with `signctl feed <file|->`",
                "offline": "classify a capture without the daemon: `signctl classify <file>`"
            }
        })
    }
}

pub fn parse_profile(txt: &str) -> Result<Profile> {
    let profile: Profile = toml::from_str(txt)?;
    validate_profile(&profile)?;
    Ok(profile)
}

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if th.window == 0 {
        return Err(anyhow!("thresholds.window must be at least 1"));
    }
    for (name, confirm) in [
        ("landmark_confirm", th.landmark_confirm),
        ("motion_confirm", th.motion_confirm),
    ] {
        if confirm == 0 || confirm > th.window {
            return Err(anyhow!(
                "thresholds.{name} must be in 1..=window ({})",
                th.window
            ));
        }
    }
    if !(0.0..=1.0).contains(&th.landmark_confidence) || th.landmark_confidence == 0.0 {
        return Err(anyhow!("thresholds.landmark_confidence must be in (0,1]"));
    }
    if !(0.0..1.0).contains(&th.proximity) || th.proximity == 0.0 {
        return Err(anyhow!(
            "thresholds.proximity must be in (0,1) normalized units"
        ));
    }

    for (i, bin) in p.motion_bins.iter().enumerate() {
        if bin.low < 0.0 || bin.high.is_some_and(|h| h <= bin.low) {
            return Err(anyhow!("motion_bins: '{}' has an empty interval", bin.label));
        }
        if !(0.0..=1.0).contains(&bin.confidence) || bin.confidence == 0.0 {
            return Err(anyhow!(
                "motion_bins: '{}' confidence must be in (0,1]",
                bin.label
            ));
        }
        if let Some(other) = p.motion_bins[i + 1..].iter().find(|o| bin.overlaps(o)) {
            return Err(anyhow!(
                "motion_bins: '{}' overlaps '{}'",
                bin.label,
                other.label
            ));
        }
    }

    let known: Vec<&str> = default_rules().iter().map(|r| r.kind.key()).collect();
    for (k, v) in &p.phrases {
        if !known.contains(&k.as_str()) {
            return Err(anyhow!("phrases: unknown gesture key '{}'", k));
        }
        if v.trim().is_empty() {
            return Err(anyhow!("phrases: '{}' has an empty phrase", k));
        }
    }

    if p.speech.command.is_some() && !p.meta.allow_commands {
        return Err(anyhow!(
            "speech.command is set but meta.allow_commands=false"
        ));
    }
    Ok(())
}

/// Watch the profiles directory and the active pointer; used by the daemon
/// for automatic reload on edit.
pub fn watch_paths(state: &DaemonConfigState) -> Vec<PathBuf> {
    vec![state.profiles_dir.clone(), state.active_ptr.clone()]
}

pub fn is_profile_path(p: &Path) -> bool {
    p.extension().map(|e| e == "toml").unwrap_or(false) || p.file_name().is_some_and(|n| n == "active")
}
