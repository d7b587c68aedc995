//! CLI argument parsing for the server binary (spec §4.8 "CLI"). Hand-rolled
//! over `std::env::args()`, matching the rest of the workspace's
//! no-framework-for-small-surfaces style.

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_WEB_ROOT: &str = "../web";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub http_port: u16,
    pub web_root: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { http_port: DEFAULT_HTTP_PORT, web_root: DEFAULT_WEB_ROOT.to_string() }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingValue(&'static str),
    InvalidPort(String),
    Unknown(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingValue(flag) => write!(f, "missing value for {flag}"),
            ConfigError::InvalidPort(v) => write!(f, "invalid port: {v}"),
            ConfigError::Unknown(a) => write!(f, "unrecognized argument: {a}"),
        }
    }
}

impl ServerConfig {
    /// Parse `--http-port|--port|-p <u16>` and `--web-root <path>`, each
    /// defaulting when absent (8080, `../web`).
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, ConfigError> {
        let mut cfg = ServerConfig::default();
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--http-port" | "--port" | "-p" => {
                    let value = iter.next().ok_or(ConfigError::MissingValue("port"))?;
                    cfg.http_port = value.parse().map_err(|_| ConfigError::InvalidPort(value))?;
                }
                "--web-root" => {
                    cfg.web_root = iter.next().ok_or(ConfigError::MissingValue("web-root"))?;
                }
                other => return Err(ConfigError::Unknown(other.to_string())),
            }
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_args() {
        let cfg = ServerConfig::parse(Vec::<String>::new()).unwrap();
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn accepts_all_three_port_spellings() {
        for flag in ["--http-port", "--port", "-p"] {
            let cfg = ServerConfig::parse(vec![flag.to_string(), "9100".to_string()]).unwrap();
            assert_eq!(cfg.http_port, 9100);
        }
    }

    #[test]
    fn parses_web_root() {
        let cfg = ServerConfig::parse(vec!["--web-root".to_string(), "/srv/www".to_string()]).unwrap();
        assert_eq!(cfg.web_root, "/srv/www");
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(matches!(
            ServerConfig::parse(vec!["--port".to_string(), "abc".to_string()]),
            Err(ConfigError::InvalidPort(_))
        ));
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(matches!(ServerConfig::parse(vec!["--bogus".to_string()]), Err(ConfigError::Unknown(_))));
    }
}
