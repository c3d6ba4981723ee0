use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::oracles::DEFAULT_LABEL_MODEL;
use crate::pipeline::PipelineConfig;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

pub const SEGMENT_URL_ENV: &str = "DIAGRAM_AR_SEGMENT_URL";
pub const LABEL_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const LABEL_KEY_ENVS: [&str; 2] = ["DIAGRAM_AR_LABEL_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub segment_url: Option<String>,
    pub segment_timeout_secs: u64,
    pub label_model: String,
    pub label_base_url: Option<String>,
    pub label_prompt: Option<String>,
    pub label_timeout_secs: u64,
    pub server_addr: String,
    pub upload_dir: PathBuf,
    pub extract_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            segment_url: None,
            segment_timeout_secs: 60,
            label_model: DEFAULT_LABEL_MODEL.to_string(),
            label_base_url: None,
            label_prompt: None,
            label_timeout_secs: 30,
            server_addr: "127.0.0.1:8000".to_string(),
            upload_dir: PathBuf::from("uploads"),
            extract_timeout_secs: 120,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    pipeline: Option<toml::Table>,
    segmentation: Option<SegmentationSettings>,
    labeling: Option<LabelingSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentationSettings {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LabelingSettings {
    model: Option<String>,
    base_url: Option<String>,
    prompt: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    upload_dir: Option<String>,
    extract_timeout_secs: Option<u64>,
    max_upload_bytes: Option<usize>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    load_settings_in(Path::new("."), extra_path)
}

fn load_settings_in(workdir: &Path, extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let mut pipeline = toml::Table::new();
    ensure_home_settings_file()?;

    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse built-in settings")?;
    settings.merge(defaults, &mut pipeline);

    let mut ordered_paths = vec![
        workdir.join("settings.toml"),
        workdir.join("settings.local.toml"),
    ];

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed, &mut pipeline);
        }
    }

    settings.pipeline = toml::Value::Table(pipeline)
        .try_into()
        .with_context(|| "invalid [pipeline] settings")?;
    settings.pipeline.validate()?;
    settings.apply_env(|name| std::env::var(name).ok());
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile, pipeline: &mut toml::Table) {
        if let Some(table) = incoming.pipeline {
            pipeline.extend(table);
        }
        if let Some(segmentation) = incoming.segmentation {
            if let Some(url) = non_empty(segmentation.url) {
                self.segment_url = Some(url);
            }
            if let Some(secs) = segmentation.timeout_secs.filter(|secs| *secs > 0) {
                self.segment_timeout_secs = secs;
            }
        }
        if let Some(labeling) = incoming.labeling {
            if let Some(model) = non_empty(labeling.model) {
                self.label_model = model;
            }
            if let Some(base_url) = non_empty(labeling.base_url) {
                self.label_base_url = Some(base_url);
            }
            if let Some(prompt) = non_empty(labeling.prompt) {
                self.label_prompt = Some(prompt);
            }
            if let Some(secs) = labeling.timeout_secs.filter(|secs| *secs > 0) {
                self.label_timeout_secs = secs;
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_empty(server.addr) {
                self.server_addr = addr;
            }
            if let Some(dir) = non_empty(server.upload_dir) {
                self.upload_dir = PathBuf::from(dir);
            }
            if let Some(secs) = server.extract_timeout_secs.filter(|secs| *secs > 0) {
                self.extract_timeout_secs = secs;
            }
            if let Some(bytes) = server.max_upload_bytes.filter(|bytes| *bytes > 0) {
                self.max_upload_bytes = bytes;
            }
        }
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = non_empty(lookup(SEGMENT_URL_ENV)) {
            self.segment_url = Some(url);
        }
        if let Some(url) = non_empty(lookup(LABEL_BASE_URL_ENV)) {
            self.label_base_url = Some(url);
        }
    }
}

pub fn resolve_label_key() -> Option<String> {
    LABEL_KEY_ENVS
        .iter()
        .find_map(|name| non_empty(std::env::var(name).ok()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, commented_template())
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

// The seeded home file must not pin defaults over the working-directory layers.
fn commented_template() -> String {
    DEFAULT_SETTINGS_TOML
        .lines()
        .map(|line| {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                line.to_string()
            } else {
                format!("# {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".diagram-ar"))
        }
    })
}
