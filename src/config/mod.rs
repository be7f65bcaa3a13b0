use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::from_path(default_config_path())
    }

    /// Defaults, then `config_path` if it exists, then the environment.
    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let mut map = default_map();

        // Read .promptrunrc if exists
        if config_path.exists() {
            read_rc_file(&config_path, &mut map);
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(normalize_key(&k), v);
            }
        }

        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        // ENV first
        if let Ok(v) = env::var(format!("PROMPTRUN_{key}")) {
            return Some(v);
        }
        if let Ok(v) = env::var(key) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn log_path(&self) -> PathBuf {
        self.get_path("LOG_PATH")
            .unwrap_or_else(|| env::temp_dir().join("promptrun.log"))
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.get_u64("TUI_TICK_MS").filter(|ms| *ms > 0).unwrap_or(16)
    }
}

fn read_rc_file(path: &Path, map: &mut HashMap<String, String>) {
    let Ok(file) = fs::File::open(path) else {
        return;
    };
    let reader = BufReader::new(file);
    for line in reader.lines().map_while(Result::ok) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(normalize_key(k.trim()), v.trim().to_string());
        }
    }
}

const KEYS: &[&str] = &[
    "TIMER_CEILING_MS",
    "GRACE_DELAY_MS",
    "YIELD_INTERVAL",
    "MAX_CALL_DEPTH",
    "MIRROR_TRANSCRIPT",
    "LOG_LEVEL",
    "LOG_PATH",
    "TUI_TICK_MS",
];

fn is_config_key(k: &str) -> bool {
    // Accept known keys or PROMPTRUN_* for forward-compat
    KEYS.contains(&k) || k.starts_with("PROMPTRUN_")
}

/// `PROMPTRUN_GRACE_DELAY_MS` and `GRACE_DELAY_MS` name the same setting.
fn normalize_key(k: &str) -> String {
    k.strip_prefix("PROMPTRUN_").unwrap_or(k).to_string()
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("promptrun").join(".promptrunrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    // Paths
    m.insert(
        "LOG_PATH".into(),
        env::temp_dir().join("promptrun.log").to_string_lossy().into_owned(),
    );

    // Numbers
    m.insert("TIMER_CEILING_MS".into(), "30000".into());
    m.insert("GRACE_DELAY_MS".into(), "100".into());
    m.insert("YIELD_INTERVAL".into(), "1000".into());
    m.insert("MAX_CALL_DEPTH".into(), "256".into());
    m.insert("TUI_TICK_MS".into(), "16".into());

    // Strings
    m.insert("LOG_LEVEL".into(), "warn".into());

    // Bools as strings
    m.insert("MIRROR_TRANSCRIPT".into(), "false".into());

    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rc_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".promptrunrc");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "# engine limits").unwrap();
        writeln!(file, "TIMER_CEILING_MS = 5000").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "PROMPTRUN_MIRROR_TRANSCRIPT=yes").unwrap();
        drop(file);

        let cfg = Config::from_path(&path);
        assert_eq!(cfg.get_u64("TIMER_CEILING_MS"), Some(5000));
        assert!(cfg.get_bool("MIRROR_TRANSCRIPT"));
        assert_eq!(cfg.get_u64("MAX_CALL_DEPTH"), Some(256));
        assert_eq!(cfg.config_path, path);
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::from_path(dir.path().join("absent"));
        assert_eq!(cfg.get_u64("YIELD_INTERVAL"), Some(1000));
        assert_eq!(cfg.tick_interval_ms(), 16);
        assert!(cfg.log_path().ends_with("promptrun.log"));
    }
}
