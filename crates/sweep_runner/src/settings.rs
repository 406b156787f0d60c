use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use region_sweep::{InconclusivePolicy, ProbeSettings, SweepConfig};

/// Operator configuration read from the environment
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Search keyword (`SEARCH_KEYWORD`)
    pub keyword: String,
    /// Region group or "all" (`SEARCH_CITY`)
    pub region_selector: String,
    /// Region catalog file (`CITY_CODES_PATH`)
    pub city_codes_path: PathBuf,
    /// Seen-set file (`SEEN_PATH`)
    pub seen_path: PathBuf,
    /// Requested concurrent checks (`SWEEP_CONCURRENCY`)
    pub concurrency: usize,
    /// Scheduler tuning
    pub sweep: SweepConfig,
    /// Probe adapter tuning
    pub probe: ProbeSettings,
    /// Pause between repeated sweeps; `None` runs once (`SWEEP_INTERVAL_SECS`)
    pub interval: Option<Duration>,
    /// Bot token and chat id (`TG_TOKEN`, `TG_ID`)
    pub telegram: Option<TelegramCredentials>,
}

/// Telegram bot credentials
#[derive(Clone)]
pub struct TelegramCredentials {
    /// Bot API token
    pub token: String,
    /// Destination chat
    pub chat_id: String,
}

impl std::fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl RunnerSettings {
    /// Read settings from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, treating blank values as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let keyword = get("SEARCH_KEYWORD").unwrap_or_else(|| "아이폰".to_string());
        let region_selector = get("SEARCH_CITY").unwrap_or_else(|| "서울특별시".to_string());

        let concurrency = parse::<usize>(&get, "SWEEP_CONCURRENCY")?.unwrap_or(1);
        if concurrency == 0 {
            bail!("SWEEP_CONCURRENCY must be at least 1");
        }

        let mut sweep = SweepConfig::default();
        if let Some(max) = parse::<usize>(&get, "SWEEP_MAX_CONCURRENCY")? {
            sweep.max_concurrency = max;
        }
        if let Some(ms) = parse::<u64>(&get, "CHECK_DELAY_MS")? {
            sweep.check_delay = Duration::from_millis(ms);
        }
        if let Some(every) = parse::<usize>(&get, "PROGRESS_EVERY")? {
            sweep.progress_every = every;
        }
        sweep.checkpoint_every = parse::<usize>(&get, "CHECKPOINT_EVERY")?;

        let mut probe = ProbeSettings::default();
        if let Some(template) = get("SEARCH_URL_TEMPLATE") {
            probe.url_template = template;
        }
        if let Some(ms) = parse::<u64>(&get, "PROBE_TIMEOUT_MS")? {
            probe.timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = parse::<u32>(&get, "PROBE_RETRIES")? {
            probe.max_retries = retries;
        }
        if parse_flag(&get, "INCONCLUSIVE_AS_FOUND")? {
            probe.inconclusive = InconclusivePolicy::TreatAsFound;
        }

        let interval = parse::<u64>(&get, "SWEEP_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let telegram = match (get("TG_TOKEN"), get("TG_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramCredentials { token, chat_id }),
            _ => None,
        };

        Ok(Self {
            keyword,
            region_selector,
            city_codes_path: get("CITY_CODES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("city_codes.json")),
            seen_path: get("SEEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("seen.txt")),
            concurrency,
            sweep,
            probe,
            interval,
            telegram,
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: '{}'", key, value))
        })
        .transpose()
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match get(key).map(|value| value.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("Invalid value for {}: '{}'", key, value),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<RunnerSettings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunnerSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();

        assert_eq!(settings.keyword, "아이폰");
        assert_eq!(settings.region_selector, "서울특별시");
        assert_eq!(settings.city_codes_path, PathBuf::from("city_codes.json"));
        assert_eq!(settings.seen_path, PathBuf::from("seen.txt"));
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.sweep.max_concurrency, 4);
        assert_eq!(settings.probe.timeout, Duration::from_secs(2));
        assert_eq!(settings.probe.inconclusive, InconclusivePolicy::TreatAsError);
        assert!(settings.interval.is_none());
        assert!(settings.telegram.is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("SEARCH_KEYWORD", "자전거"),
            ("SEARCH_CITY", "전국"),
            ("SWEEP_CONCURRENCY", "3"),
            ("SWEEP_MAX_CONCURRENCY", "8"),
            ("PROBE_TIMEOUT_MS", "1500"),
            ("CHECK_DELAY_MS", "0"),
            ("PROGRESS_EVERY", "10"),
            ("CHECKPOINT_EVERY", "5"),
            ("PROBE_RETRIES", "2"),
            ("INCONCLUSIVE_AS_FOUND", "true"),
            ("SWEEP_INTERVAL_SECS", "600"),
            ("TG_TOKEN", "123:abc"),
            ("TG_ID", "42"),
        ])
        .unwrap();

        assert_eq!(settings.keyword, "자전거");
        assert_eq!(settings.region_selector, "전국");
        assert_eq!(settings.concurrency, 3);
        assert_eq!(settings.sweep.max_concurrency, 8);
        assert_eq!(settings.sweep.check_delay, Duration::ZERO);
        assert_eq!(settings.sweep.progress_every, 10);
        assert_eq!(settings.sweep.checkpoint_every, Some(5));
        assert_eq!(settings.probe.timeout, Duration::from_millis(1500));
        assert_eq!(settings.probe.max_retries, 2);
        assert_eq!(settings.probe.inconclusive, InconclusivePolicy::TreatAsFound);
        assert_eq!(settings.interval, Some(Duration::from_secs(600)));

        let telegram = settings.telegram.unwrap();
        assert_eq!(telegram.chat_id, "42");
        assert!(!format!("{:?}", telegram).contains("123:abc"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(settings(&[("SWEEP_CONCURRENCY", "zero")]).is_err());
        assert!(settings(&[("SWEEP_CONCURRENCY", "0")]).is_err());
        assert!(settings(&[("INCONCLUSIVE_AS_FOUND", "maybe")]).is_err());
    }

    #[test]
    fn test_telegram_requires_both_values() {
        let settings = settings(&[("TG_TOKEN", "123:abc"), ("TG_ID", "  ")]).unwrap();

        assert!(settings.telegram.is_none());
    }
}
