use chrono::{Duration, FixedOffset, NaiveTime, Offset, Utc};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::{parse_time_of_day, parse_utc_offset, DEFAULT_REFERENCE_OFFSET};

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_LEDGER_RETENTION_DAYS: u32 = 30;

pub const MAX_TICK_INTERVAL_SECS: u64 = 86_400;
pub const MAX_DISPATCH_TIMEOUT_SECS: u64 = 600;
/// Ten years; larger values keep everything and are capped here.
pub const MAX_LEDGER_RETENTION_DAYS: u32 = 3650;

/// Top-level config (nudge.toml + NUDGE_* env overrides).
///
/// Every section and field has a default, so a partial or empty file
/// merges with the built-in values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    /// Master switch. When false the scheduler ticks but never evaluates.
    pub enabled: bool,
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub policy: PolicyConfig,
    pub greetings: GreetingsConfig,
    pub persona: PersonaConfig,
    pub providers: ProvidersConfig,
    pub channels: ChannelsConfig,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: DatabaseConfig::default(),
            schedule: ScheduleConfig::default(),
            policy: PolicyConfig::default(),
            greetings: GreetingsConfig::default(),
            persona: PersonaConfig::default(),
            providers: ProvidersConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tick_interval_secs: u64,
    /// Fixed UTC offset used for day keys, quiet hours, weekdays and greetings.
    pub reference_offset: String,
    /// Ledger entries older than this many days are pruned once per day.
    pub ledger_retention_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            reference_offset: DEFAULT_REFERENCE_OFFSET.to_string(),
            ledger_retention_days: DEFAULT_LEDGER_RETENTION_DAYS,
        }
    }
}

impl ScheduleConfig {
    /// Tick period in `1..=MAX_TICK_INTERVAL_SECS` seconds.
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_interval_secs.clamp(1, MAX_TICK_INTERVAL_SECS))
    }

    pub fn retention_days(&self) -> u32 {
        self.ledger_retention_days.clamp(1, MAX_LEDGER_RETENTION_DAYS)
    }

    /// Parsed reference offset; an invalid value falls back to the default.
    pub fn offset(&self) -> FixedOffset {
        match parse_utc_offset(&self.reference_offset) {
            Ok(o) => o,
            Err(e) => {
                warn!(value = %self.reference_offset, error = %e, "bad reference_offset, using default");
                parse_utc_offset(DEFAULT_REFERENCE_OFFSET).unwrap_or_else(|_| Utc.fix())
            }
        }
    }
}

/// How many notifications one task may receive per calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameTaskFrequency {
    Once,
    Twice,
    Custom,
    Unlimited,
}

/// How often an already-past-due task may be re-notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverdueFrequency {
    Once,
    Hourly,
    TwiceDaily,
    Daily,
}

impl OverdueFrequency {
    /// Minimum spacing between overdue notifications. `None` means never repeat.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            OverdueFrequency::Once => None,
            OverdueFrequency::Hourly => Some(Duration::hours(1)),
            OverdueFrequency::TwiceDaily => Some(Duration::hours(12)),
            OverdueFrequency::Daily => Some(Duration::hours(24)),
        }
    }
}

/// Notification timing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub quiet_hours_enabled: bool,
    /// "HH:MM"; may be later than `quiet_hours_end` to span midnight.
    pub quiet_hours_start: String,
    pub quiet_hours_end: String,
    /// 0 = Sunday … 6 = Saturday.
    pub allowed_weekdays: Vec<u8>,
    pub min_interval_minutes: u32,
    /// Lead time used for tasks whose own `notify_before_minutes` is zero.
    pub reminder_lead_minutes: u32,
    /// When false, past-due tasks never produce Overdue events.
    pub overdue_enabled: bool,
    pub daily_limit_enabled: bool,
    pub daily_limit_count: u32,
    pub same_task_frequency: SameTaskFrequency,
    pub same_task_custom_limit: u32,
    pub overdue_frequency: OverdueFrequency,
    pub follow_up_enabled: bool,
    pub follow_up_interval_minutes: u32,
    pub follow_up_max_count: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            quiet_hours_enabled: true,
            quiet_hours_start: "23:00".to_string(),
            quiet_hours_end: "07:00".to_string(),
            allowed_weekdays: vec![0, 1, 2, 3, 4, 5, 6],
            min_interval_minutes: 5,
            reminder_lead_minutes: 60,
            overdue_enabled: true,
            daily_limit_enabled: false,
            daily_limit_count: 10,
            same_task_frequency: SameTaskFrequency::Unlimited,
            same_task_custom_limit: 5,
            overdue_frequency: OverdueFrequency::Daily,
            follow_up_enabled: true,
            follow_up_interval_minutes: 30,
            follow_up_max_count: 3,
        }
    }
}

impl PolicyConfig {
    /// Per-task daily cap implied by `same_task_frequency`. `None` is unbounded.
    pub fn same_task_cap(&self) -> Option<u32> {
        match self.same_task_frequency {
            SameTaskFrequency::Once => Some(1),
            SameTaskFrequency::Twice => Some(2),
            SameTaskFrequency::Custom => Some(self.same_task_custom_limit),
            SameTaskFrequency::Unlimited => None,
        }
    }

    /// Parsed quiet-hours window, or `None` when disabled or unparseable.
    pub fn quiet_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        if !self.quiet_hours_enabled {
            return None;
        }
        match (
            parse_time_of_day(&self.quiet_hours_start),
            parse_time_of_day(&self.quiet_hours_end),
        ) {
            (Ok(start), Ok(end)) => Some((start, end)),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "quiet hours ignored: unparseable window");
                None
            }
        }
    }
}

/// The three daily greeting timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingsConfig {
    pub morning_enabled: bool,
    pub morning_time: String,
    pub noon_enabled: bool,
    pub noon_time: String,
    pub evening_enabled: bool,
    pub evening_time: String,
}

impl Default for GreetingsConfig {
    fn default() -> Self {
        Self {
            morning_enabled: false,
            morning_time: "08:00".to_string(),
            noon_enabled: false,
            noon_time: "12:00".to_string(),
            evening_enabled: false,
            evening_time: "18:00".to_string(),
        }
    }
}

impl GreetingsConfig {
    /// Enabled slots with their parsed fire time. Bad times are skipped with a warning.
    pub fn enabled_slots(&self) -> Vec<(crate::reminder::GreetingSlot, NaiveTime)> {
        use crate::reminder::GreetingSlot;

        let entries = [
            (GreetingSlot::Morning, self.morning_enabled, &self.morning_time),
            (GreetingSlot::Noon, self.noon_enabled, &self.noon_time),
            (GreetingSlot::Evening, self.evening_enabled, &self.evening_time),
        ];
        entries
            .into_iter()
            .filter(|(_, enabled, _)| *enabled)
            .filter_map(|(slot, _, time)| match parse_time_of_day(time) {
                Ok(t) => Some((slot, t)),
                Err(e) => {
                    warn!(slot = %slot, error = %e, "greeting disabled: bad time");
                    None
                }
            })
            .collect()
    }
}

/// Voice used for generated messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Built-in id (`companion`, `secretary`, `cheerful-junior`, `butler`,
    /// `plain`) or the id of an entry in `custom`.
    pub active: String,
    /// Use a canned persona line instead of the remediation warning on
    /// non-network provider failures.
    pub prefer_canned_fallback: bool,
    /// Optional JSON-lines knowledge-graph file used to enrich prompts.
    pub memory_file: Option<String>,
    pub custom: Vec<CustomPersonaConfig>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            active: "companion".to_string(),
            prefer_canned_fallback: false,
            memory_file: None,
            custom: Vec::new(),
        }
    }
}

/// User-defined persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPersonaConfig {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    /// Extra instructions appended to task reminder prompts.
    #[serde(default)]
    pub reminder_instructions: Option<String>,
    /// Extra instructions appended to greeting prompts.
    #[serde(default)]
    pub greeting_instructions: Option<String>,
}

/// Which generation provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSelection {
    /// First provider with a credential, in priority order.
    Auto,
    Claude,
    Gemini,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub selection: ProviderSelection,
    /// Upper bound for a single generation attempt.
    pub timeout_secs: u64,
    pub claude: ProviderEntry,
    pub gemini: ProviderEntry,
    pub openai: ProviderEntry,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            selection: ProviderSelection::Auto,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            claude: ProviderEntry::with_model("claude-sonnet-4-20250514"),
            gemini: ProviderEntry::with_model("gemini-2.0-flash"),
            openai: ProviderEntry::with_model("gpt-4.1-mini"),
        }
    }
}

/// Credential and model for one provider. An empty or missing key means
/// the provider is not configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderEntry {
    fn with_model(model: &str) -> Self {
        Self {
            api_key: None,
            model: model.to_string(),
            base_url: None,
        }
    }

    /// The trimmed credential, if one is configured.
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Upper bound for a single channel send.
    pub dispatch_timeout_secs: u64,
    pub discord: Option<DiscordConfig>,
    pub desktop: DesktopConfig,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            discord: None,
            desktop: DesktopConfig::default(),
        }
    }
}

impl ChannelsConfig {
    pub fn dispatch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch_timeout_secs.clamp(1, MAX_DISPATCH_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// Recipient user id (snowflake).
    pub user_id: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub enabled: bool,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn bool_true() -> bool {
    true
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.nudge/nudge.db", home)
}

pub fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.nudge/nudge.toml", home)
}

impl NudgeConfig {
    /// Load config from a TOML file with NUDGE_* env var overrides.
    ///
    /// Nested keys use a double underscore: `NUDGE_POLICY__MIN_INTERVAL_MINUTES=10`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let mut cfg: Self = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("NUDGE_").split("__"))
            .extract()
            .map_err(|e| crate::error::NudgeError::Config(e.to_string()))?;
        cfg.clamp_limits();
        Ok(cfg)
    }

    /// Pull out-of-range timing values back into their supported range.
    fn clamp_limits(&mut self) {
        let schedule = &mut self.schedule;
        let tick = schedule.tick_interval().as_secs();
        if tick != schedule.tick_interval_secs {
            warn!(value = schedule.tick_interval_secs, using = tick, "tick_interval_secs out of range");
            schedule.tick_interval_secs = tick;
        }
        let retention = schedule.retention_days();
        if retention != schedule.ledger_retention_days {
            warn!(value = schedule.ledger_retention_days, using = retention, "ledger_retention_days out of range");
            schedule.ledger_retention_days = retention;
        }
        let timeout = self.channels.dispatch_timeout().as_secs();
        if timeout != self.channels.dispatch_timeout_secs {
            warn!(value = self.channels.dispatch_timeout_secs, using = timeout, "dispatch_timeout_secs out of range");
            self.channels.dispatch_timeout_secs = timeout;
        }
    }

    /// Like [`load`](Self::load) but a corrupt file yields the built-in defaults.
    pub fn load_or_default(config_path: Option<&str>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Config load failed ({}), using defaults", e);
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_merges_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[policy]\nmin_interval_minutes = 10\nsame_task_frequency = \"twice\"\n"
        )
        .unwrap();
        let cfg = NudgeConfig::load(file.path().to_str()).unwrap();
        assert_eq!(cfg.policy.min_interval_minutes, 10);
        assert_eq!(cfg.policy.same_task_cap(), Some(2));
        // Untouched fields keep their defaults.
        assert_eq!(cfg.policy.follow_up_max_count, 3);
        assert_eq!(cfg.schedule.tick_interval_secs, 60);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy\nthis is = = not toml").unwrap();
        let cfg = NudgeConfig::load_or_default(file.path().to_str());
        assert!(cfg.enabled);
        assert_eq!(cfg.policy.min_interval_minutes, 5);
    }

    #[test]
    fn same_task_caps() {
        let mut p = PolicyConfig::default();
        assert_eq!(p.same_task_cap(), None);
        p.same_task_frequency = SameTaskFrequency::Once;
        assert_eq!(p.same_task_cap(), Some(1));
        p.same_task_frequency = SameTaskFrequency::Custom;
        p.same_task_custom_limit = 7;
        assert_eq!(p.same_task_cap(), Some(7));
    }

    #[test]
    fn overdue_intervals() {
        assert_eq!(OverdueFrequency::Once.interval(), None);
        assert_eq!(OverdueFrequency::Hourly.interval(), Some(Duration::minutes(60)));
        assert_eq!(OverdueFrequency::TwiceDaily.interval(), Some(Duration::hours(12)));
        assert_eq!(OverdueFrequency::Daily.interval(), Some(Duration::hours(24)));
    }

    #[test]
    fn unparseable_quiet_hours_disable_window() {
        let p = PolicyConfig {
            quiet_hours_start: "late".to_string(),
            ..PolicyConfig::default()
        };
        assert!(p.quiet_window().is_none());
    }

    #[test]
    fn greeting_slots_skip_bad_times() {
        let g = GreetingsConfig {
            morning_enabled: true,
            noon_enabled: true,
            noon_time: "noon".to_string(),
            ..GreetingsConfig::default()
        };
        let slots = g.enabled_slots();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].0, crate::reminder::GreetingSlot::Morning);
    }

    #[test]
    fn provider_credential_ignores_blank_keys() {
        let entry = ProviderEntry {
            api_key: Some("   ".to_string()),
            ..ProviderEntry::default()
        };
        assert!(entry.credential().is_none());
    }

    #[test]
    fn out_of_range_timings_are_clamped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[schedule]\ntick_interval_secs = 9223372036854775807\nledger_retention_days = 4000000000\n\n[channels]\ndispatch_timeout_secs = 0\n"
        )
        .unwrap();
        let cfg = NudgeConfig::load(file.path().to_str()).unwrap();
        assert_eq!(cfg.schedule.tick_interval_secs, MAX_TICK_INTERVAL_SECS);
        assert_eq!(cfg.schedule.ledger_retention_days, MAX_LEDGER_RETENTION_DAYS);
        assert_eq!(cfg.channels.dispatch_timeout_secs, 1);
    }
}
