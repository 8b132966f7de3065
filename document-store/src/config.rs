use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum DocumentStoreConfig {
    Memory,
    /// A SQLite database file, created on first use.
    Sqlite { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_store_config() {
        let config: DocumentStoreConfig = serde_yaml::from_str(
            r#"
            type: sqlite
            path: /var/lib/appbridge/documents.db
            "#,
        )
        .unwrap();
        assert_eq!(
            config,
            DocumentStoreConfig::Sqlite {
                path: "/var/lib/appbridge/documents.db".into()
            }
        );

        let config: DocumentStoreConfig = serde_yaml::from_str("type: memory").unwrap();
        assert_eq!(config, DocumentStoreConfig::Memory);

        assert!(serde_yaml::from_str::<DocumentStoreConfig>("type: mongo").is_err());
        assert!(serde_yaml::from_str::<DocumentStoreConfig>("type: sqlite").is_err());
    }
}
