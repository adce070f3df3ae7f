/// Server configuration read from the environment (and `.env`).
use std::path::PathBuf;
use std::time::Duration;

use ytm4a_fetcher::ytdlp::DEFAULT_FORMAT;
use ytm4a_shared::feed::DEFAULT_POLL_INTERVAL;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    /// Where artifacts are written until they are handed off.
    pub download_dir: PathBuf,
    pub ytdlp_bin: String,
    pub ytdlp_format: String,
    pub ffmpeg_location: Option<PathBuf>,
    pub poll_interval: Duration,
    /// Abandoned terminal jobs older than this are swept. `None` keeps them forever.
    pub job_retention: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparsable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let retention_secs = number("JOB_RETENTION_SECS", 0);

        Self {
            api_host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: lookup("API_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(8081),
            download_dir: lookup("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            ytdlp_bin: lookup("YTDLP_BIN").unwrap_or_else(|| "yt-dlp".to_string()),
            ytdlp_format: lookup("YTDLP_FORMAT").unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            ffmpeg_location: lookup("FFMPEG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            poll_interval: Duration::from_millis(number(
                "POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL.as_millis() as u64,
            ))
            .max(Duration::from_millis(10)),
            job_retention: (retention_secs > 0).then(|| Duration::from_secs(retention_secs)),
            sweep_interval: Duration::from_secs(number("SWEEP_INTERVAL_SECS", 300).max(1)),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.bind_addr(), "0.0.0.0:8081");
        assert_eq!(config.download_dir, std::env::temp_dir());
        assert_eq!(config.ytdlp_bin, "yt-dlp");
        assert_eq!(config.ytdlp_format, DEFAULT_FORMAT);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert!(config.job_retention.is_none());
        assert!(config.ffmpeg_location.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("API_PORT", "9000"),
            ("DOWNLOAD_DIR", "/data/audio"),
            ("POLL_INTERVAL_MS", "250"),
            ("JOB_RETENTION_SECS", "3600"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin"),
        ]);
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.download_dir, PathBuf::from("/data/audio"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.job_retention, Some(Duration::from_secs(3600)));
        assert_eq!(config.ffmpeg_location, Some(PathBuf::from("/opt/ffmpeg/bin")));
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = config(&[("API_PORT", "eighty"), ("POLL_INTERVAL_MS", "-5")]);
        assert_eq!(config.api_port, 8081);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
    }
}
