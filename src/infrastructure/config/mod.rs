//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub adapters: AdaptersConfig,
    pub jm: JmConfig,
    pub poke: PokeConfig,
    pub gscore: GsCoreConfig,
    pub rela: RelaConfig,
    pub zan: ZanConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
    /// User ids treated as admins by every plugin
    pub admins: Vec<String>,
    pub log_level: LogLevel,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "plugbot".to_string(),
            prefix: "/".to_string(),
            admins: Vec::new(),
            log_level: LogLevel::Simple,
        }
    }
}

/// `simple` logs key events only, `detailed` adds per-step diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    #[default]
    Simple,
    Detailed,
}

impl LogLevel {
    /// Default `tracing` directive for this level
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Simple => "info",
            LogLevel::Detailed => "debug",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdaptersConfig {
    pub telegram: Option<TelegramConfig>,
    pub console: Option<ConsoleConfig>,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            telegram: Some(TelegramConfig {
                enabled: false,
                token: None,
            }),
            console: Some(ConsoleConfig { enabled: true }),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
}

/// Comic download plugin settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct JmConfig {
    pub enabled: bool,
    pub download_dir: PathBuf,
    /// Artifacts are named `<file_prefix>_<id>.pdf`
    pub file_prefix: String,
    /// `<= 0` means no limit
    pub max_concurrent_tasks: i64,
    /// `<= 0` means no deadline
    pub task_timeout_minutes: i64,
    /// `<= 0` means no ceiling
    pub max_file_size_mb: f64,
    pub keep_images: bool,
    pub keep_pdf: bool,
    pub send_progress_message: bool,
    /// Comma-separated user ids; empty allows everyone
    pub whitelist_users: String,
    /// Comma-separated group ids; empty allows every group
    pub whitelist_groups: String,
    pub private_only: bool,
    pub private_only_group_message: String,
    pub downloader: DownloaderOptions,
}

impl Default for JmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            download_dir: PathBuf::from("./jm_downloads"),
            file_prefix: "jm".to_string(),
            max_concurrent_tasks: 2,
            task_timeout_minutes: 10,
            max_file_size_mb: 0.0,
            keep_images: false,
            keep_pdf: false,
            send_progress_message: true,
            whitelist_users: String::new(),
            whitelist_groups: String::new(),
            private_only: false,
            private_only_group_message: "全部私聊功能已开启！".to_string(),
            downloader: DownloaderOptions::default(),
        }
    }
}

impl JmConfig {
    /// Absolute download directory, created if missing
    pub fn resolve_download_dir(&self) -> Result<PathBuf, ConfigError> {
        let dir = if self.download_dir.as_os_str().is_empty() {
            PathBuf::from("./jm_downloads")
        } else {
            self.download_dir.clone()
        };
        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()
                .map_err(|e| ConfigError::InvalidValue(format!("current dir: {}", e)))?
                .join(dir)
        };
        std::fs::create_dir_all(&dir)
            .map_err(|e| ConfigError::InvalidValue(format!("download-dir {}: {}", dir.display(), e)))?;
        Ok(dir)
    }
}

/// Options passed through to the external comic downloader
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DownloaderOptions {
    /// Path to the `jmcomic` executable; looked up on PATH when unset
    pub binary: Option<PathBuf>,
    pub proxy: String,
    /// Per-request timeout in seconds
    pub timeout: u64,
    pub client_impl: String,
    pub retry_times: u32,
    pub download_cache: bool,
    pub image_decode: bool,
    pub image_suffix: String,
    pub concurrent_images: u32,
    pub concurrent_photos: u32,
    pub dir_rule: String,
    pub normalize_zh: String,
    pub enable_log: bool,
    pub cookies_avs: String,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            binary: None,
            proxy: String::new(),
            timeout: 60,
            client_impl: "html".to_string(),
            retry_times: 5,
            download_cache: true,
            image_decode: true,
            image_suffix: String::new(),
            concurrent_images: 30,
            concurrent_photos: 8,
            dir_rule: "Bd/Ptitle".to_string(),
            normalize_zh: String::new(),
            enable_log: false,
            cookies_avs: String::new(),
        }
    }
}

/// Poke plugin settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PokeConfig {
    pub enabled: bool,
    pub poke_max_times: u32,
    /// Seconds between consecutive pokes
    pub poke_interval: f64,
    pub cooldown_seconds: f64,
    /// Probability of joining in when someone else is poked
    pub follow_poke_th: f64,
    pub poke_back_probability: f64,
    pub text_reply_probability: f64,
    pub face_reply_probability: f64,
    pub poke_back_reply_list: String,
    pub text_reply_list: String,
    pub face_ids: String,
    pub poke_others_reply_list: String,
    pub poke_me_reply_list: String,
}

impl Default for PokeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poke_max_times: 3,
            poke_interval: 0.0,
            cooldown_seconds: 3.0,
            follow_poke_th: 0.1,
            poke_back_probability: 0.3,
            text_reply_probability: 0.6,
            face_reply_probability: 0.5,
            poke_back_reply_list: String::new(),
            text_reply_list: String::new(),
            face_ids: String::new(),
            poke_others_reply_list: String::new(),
            poke_me_reply_list: String::new(),
        }
    }
}

/// Friend and group management settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RelaConfig {
    pub enabled: bool,
    /// Group that receives approval notices; admins get them privately when empty
    pub manage_group: String,
    /// Mutes longer than this many seconds make the bot leave
    pub max_ban_duration: u64,
    /// Groups the bot refuses to stay in
    pub group_blacklist: Vec<String>,
    /// Users the bot will not share a group with
    pub mutual_blacklist: Vec<String>,
    pub max_group_capacity: usize,
    /// Forward a group's recent messages to the admins after notable events
    pub auto_check_messages: bool,
    /// Seconds to wait before checking a newly joined group
    pub new_group_check_delay: u64,
    pub enable_auto_approve: bool,
    /// Friend requests whose comment contains this are accepted automatically
    pub auto_approve_keyword: String,
    /// Persists the group blacklist when set
    pub blacklist_file: Option<PathBuf>,
}

impl Default for RelaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manage_group: String::new(),
            max_ban_duration: 86400,
            group_blacklist: Vec::new(),
            mutual_blacklist: Vec::new(),
            max_group_capacity: 100,
            auto_check_messages: false,
            new_group_check_delay: 600,
            enable_auto_approve: false,
            auto_approve_keyword: String::new(),
            blacklist_file: None,
        }
    }
}

/// Profile like settings; replies may use `{username}` and `{total_likes}`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ZanConfig {
    pub enabled: bool,
    pub success_responses: Vec<String>,
    pub limit_responses: Vec<String>,
    pub stranger_responses: Vec<String>,
    pub permission_responses: Vec<String>,
    pub enable_white_list_groups: bool,
    pub white_list_groups: Vec<String>,
}

impl Default for ZanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            success_responses: vec!["给{username}点了{total_likes}个赞~".to_string()],
            limit_responses: vec!["今天已经给{username}赞过啦，明天再来吧".to_string()],
            stranger_responses: vec!["加个好友再来找我点赞吧".to_string()],
            permission_responses: vec!["{username}没有开放点赞权限哦".to_string()],
            enable_white_list_groups: false,
            white_list_groups: Vec::new(),
        }
    }
}

/// gscore relay settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GsCoreConfig {
    pub enabled: bool,
    pub bot_id: String,
    pub host: String,
    pub port: u16,
    /// Where files sent by the core are stored before delivery
    pub file_dir: PathBuf,
    pub reconnect: ReconnectConfig,
}

impl Default for GsCoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_id: "plugbot".to_string(),
            host: "localhost".to_string(),
            port: 8765,
            file_dir: PathBuf::from("./gscore_files"),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl GsCoreConfig {
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws/{}", self.host, self.port, self.bot_id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ReconnectConfig {
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    /// `0` retries forever
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            max_delay_secs: 60,
            max_attempts: 30,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.bot.admins.iter().any(|a| a == user_id)
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if let Some(ref mut tg) = config.adapters.telegram {
                tg.token = Some(token);
                tg.enabled = true;
            }
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            config.bot.prefix = prefix;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = Config::from_yaml("jm:\n  max-concurrent-tasks: 4\n").unwrap();
        assert_eq!(config.jm.max_concurrent_tasks, 4);
        assert_eq!(config.jm.task_timeout_minutes, 10);
        assert_eq!(config.jm.file_prefix, "jm");
        assert_eq!(config.jm.downloader.client_impl, "html");
        assert_eq!(config.bot.prefix, "/");
        assert!(!config.gscore.enabled);
        assert_eq!(config.rela.max_ban_duration, 86400);
        assert!(!config.zan.success_responses.is_empty());
    }

    #[test]
    fn test_rela_and_zan_lists_parse() {
        let yaml = "rela:\n  group-blacklist: ['1', '2']\n  manage-group: '99'\nzan:\n  enable-white-list-groups: true\n  white-list-groups: ['5']\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.rela.group_blacklist, vec!["1", "2"]);
        assert_eq!(config.rela.manage_group, "99");
        assert!(config.zan.enable_white_list_groups);
        assert_eq!(config.zan.white_list_groups, vec!["5"]);
    }

    #[test]
    fn test_round_trips_through_yaml() {
        let mut config = Config::default();
        config.bot.admins = vec!["1".into()];
        config.jm.whitelist_users = "1, 2".into();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("whitelist-users"));
        let back = Config::from_yaml(&yaml).unwrap();
        assert_eq!(back.jm.whitelist_users, "1, 2");
        assert!(back.is_admin("1"));
        assert!(!back.is_admin("2"));
    }

    #[test]
    fn test_log_level_parses() {
        let config = Config::from_yaml("bot:\n  log-level: detailed\n").unwrap();
        assert_eq!(config.bot.log_level, LogLevel::Detailed);
        assert_eq!(config.bot.log_level.directive(), "debug");
    }

    #[test]
    fn test_ws_url() {
        let gs = GsCoreConfig {
            host: "10.0.0.2".into(),
            port: 8765,
            bot_id: "abc".into(),
            ..GsCoreConfig::default()
        };
        assert_eq!(gs.ws_url(), "ws://10.0.0.2:8765/ws/abc");
    }

    #[test]
    fn test_resolve_download_dir_creates_it() {
        let tmp = tempfile::tempdir().unwrap();
        let jm = JmConfig {
            download_dir: tmp.path().join("nested/out"),
            ..JmConfig::default()
        };
        let dir = jm.resolve_download_dir().unwrap();
        assert!(dir.is_dir());
    }
}
