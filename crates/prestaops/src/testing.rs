//! Fixtures shared by unit tests.

use std::path::PathBuf;

use crate::config::{Credentials, DatabaseConfig, SshTarget};

pub(crate) fn sample_credentials() -> Credentials {
    Credentials {
        ssh: SshTarget {
            user: "deploy".into(),
            host: "old.example.com".into(),
        },
        source_path: "/var/www/shop".into(),
        source: DatabaseConfig {
            host: "127.0.0.1".into(),
            port: 3306,
            user: "src".into(),
            password: "source-secret".into(),
            database: "shop_prod".into(),
        },
        destination: DatabaseConfig {
            host: "localhost".into(),
            port: 3306,
            user: "dst".into(),
            password: "dest-secret".into(),
            database: "shop_staging".into(),
        },
        destination_path: PathBuf::from("/srv/shop"),
        table_prefix: "ps_".into(),
        prestashop_version: "8.1.2".into(),
        htaccess_template: None,
    }
}
