use std::{collections::HashMap, fs};

#[derive(Debug, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3001".into(),
        }
    }
}

/// Resolves the server URL: command-line flag, then `AUDIT_SERVER_URL`,
/// then `audit-cli.toml` in the working directory, then the default.
pub fn load_settings(flag_server_url: Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("audit-cli.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("server_url") {
                settings.server_url = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("AUDIT_SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = flag_server_url {
        settings.server_url = v;
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_default_file_env_and_flag_in_order() {
        use std::{
            env,
            time::{SystemTime, UNIX_EPOCH},
        };

        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let temp_root = env::temp_dir().join(format!("audit-cli-config-{nonce}"));
        fs::create_dir_all(&temp_root).expect("temp dir");
        let original_dir = env::current_dir().expect("cwd");
        env::set_current_dir(&temp_root).expect("enter temp dir");

        if env::var("AUDIT_SERVER_URL").is_err() {
            assert_eq!(load_settings(None), Settings::default());
        }

        fs::write("audit-cli.toml", "server_url = \"http://from-file:4000\"\n")
            .expect("config file");
        if env::var("AUDIT_SERVER_URL").is_err() {
            assert_eq!(load_settings(None).server_url, "http://from-file:4000");
        }

        env::set_var("AUDIT_SERVER_URL", "http://from-env:5000");
        let with_env = load_settings(None);
        let with_flag = load_settings(Some("http://from-flag:6000".into()));
        env::remove_var("AUDIT_SERVER_URL");

        assert_eq!(with_env.server_url, "http://from-env:5000");
        assert_eq!(with_flag.server_url, "http://from-flag:6000");

        env::set_current_dir(original_dir).expect("restore cwd");
        fs::remove_dir_all(temp_root).expect("cleanup");
    }

    #[test]
    fn flag_overrides_everything_else() {
        let settings = load_settings(Some("http://audit.example:9000".into()));
        assert_eq!(settings.server_url, "http://audit.example:9000");
    }
}
