use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerProperties {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default = "default_motd")]
    pub motd: String,
    #[serde(default)]
    pub online_mode: bool,
    #[serde(default = "default_brand")]
    pub brand: String,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    25565
}

fn default_max_players() -> u32 {
    20
}

fn default_motd() -> String {
    "A Basalt Server".into()
}

fn default_brand() -> String {
    "basalt".into()
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_players: default_max_players(),
            motd: default_motd(),
            online_mode: false,
            brand: default_brand(),
        }
    }
}

impl ServerProperties {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let properties: ServerProperties = toml::from_str(&contents)?;
            Ok(properties)
        } else {
            tracing::info!("no properties file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let props = ServerProperties::default();
        assert_eq!(props.port, 25565);
        assert!(!props.online_mode);
    }

    #[test]
    fn test_partial_file() {
        let props: ServerProperties =
            toml::from_str("online_mode = true\nmotd = \"hub\"").unwrap();
        assert!(props.online_mode);
        assert_eq!(props.motd, "hub");
        assert_eq!(props.max_players, 20);
    }
}
