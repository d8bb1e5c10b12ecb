// src/utils/progress_bars/progress_config.rs
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const BAR_CHARS: &str = "█▉▊▋▌▍▎▏  ";

/// Progress display settings, read from `PROGRESS_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressConfig {
    pub enabled: bool,
    /// Per-domain group bars under the run spinner
    pub detailed: bool,
    pub refresh_rate_ms: u64,
    pub show_memory: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
            refresh_rate_ms: 100,
            show_memory: true,
        }
    }
}

fn env_or<T: FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl ProgressConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_or("PROGRESS_ENABLED", defaults.enabled),
            detailed: env_or("PROGRESS_DETAILED", defaults.detailed),
            refresh_rate_ms: env_or("PROGRESS_REFRESH_RATE_MS", defaults.refresh_rate_ms),
            show_memory: env_or("PROGRESS_SHOW_MEMORY", defaults.show_memory),
        }
    }

    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        self.enabled.then(MultiProgress::new)
    }

    /// The container handed to the domain stages, if they should draw bars.
    pub fn stage_progress(&self, multi: Option<&MultiProgress>) -> Option<MultiProgress> {
        if self.should_show_detailed() {
            multi.cloned()
        } else {
            None
        }
    }

    /// Run-level spinner ticking at the configured refresh rate.
    pub fn run_spinner(&self, multi: Option<&MultiProgress>, message: &str) -> Option<ProgressBar> {
        let multi = multi?;
        let spinner = multi.add(ProgressBar::new_spinner());
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(self.refresh_rate_ms.max(10)));
        spinner.set_message(message.to_string());
        Some(spinner)
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }
}

/// Bar for one reconciliation stage; hidden when there is nothing to draw on.
pub fn stage_bar(multi: Option<&MultiProgress>, emoji: &str, len: u64, label: &str) -> ProgressBar {
    let Some(multi) = multi else {
        return ProgressBar::hidden();
    };
    let template = format!(
        "  {} [{{elapsed_precise}}] {{bar:30.cyan/blue}} {{pos}}/{{len}} {}",
        emoji, label
    );
    let style = ProgressStyle::default_bar()
        .template(&template)
        .map(|s| s.progress_chars(BAR_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = multi.add(ProgressBar::new(len));
    bar.set_style(style);
    bar
}
