//! Access to the destination shop's URL and configuration tables.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder};
use tracing::{debug, info};

use super::domain::ShopDomainRecord;
use crate::config::DatabaseConfig;
use crate::error::Result;

/// Configuration values written when SSL enforcement is turned off.
pub const SSL_OFF_SETTINGS: &[(&str, &str)] = &[
    ("PS_SSL_ENABLED", "0"),
    ("PS_SSL_ENABLED_EVERYWHERE", "0"),
    ("PS_COOKIE_SAMESITE", "Lax"),
];

/// Destination tables touched by site configuration.
#[async_trait]
pub trait ShopUrlStore: Send {
    /// All shop URL records.
    async fn fetch_shop_urls(&mut self) -> Result<Vec<ShopDomainRecord>>;

    /// Write [`SSL_OFF_SETTINGS`].
    async fn disable_ssl(&mut self) -> Result<()>;

    /// Persist the domain and URI columns of `record`, keyed by its id.
    async fn update_shop_url(&mut self, record: &ShopDomainRecord) -> Result<()>;
}

/// Store backed by a direct connection to the destination database.
pub struct MysqlShopUrlStore {
    conn: Conn,
    prefix: String,
}

impl MysqlShopUrlStore {
    /// Open a single short-lived connection.
    pub async fn connect(config: &DatabaseConfig, prefix: &str) -> Result<Self> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            .init(vec!["SET NAMES utf8mb4"]);

        let conn = Conn::new(opts).await?;
        info!(
            "Connected to destination database: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.conn.disconnect().await?;
        Ok(())
    }

    fn table(&self, name: &str) -> String {
        format!("`{}{}`", self.prefix, name)
    }
}

#[async_trait]
impl ShopUrlStore for MysqlShopUrlStore {
    async fn fetch_shop_urls(&mut self) -> Result<Vec<ShopDomainRecord>> {
        let sql = format!(
            "SELECT id_shop_url, domain, domain_ssl, physical_uri, virtual_uri FROM {} ORDER BY id_shop_url",
            self.table("shop_url")
        );
        let records = self
            .conn
            .query_map(
                sql,
                |(id, domain, domain_ssl, physical_uri, virtual_uri): (
                    u32,
                    String,
                    String,
                    String,
                    String,
                )| ShopDomainRecord {
                    id,
                    domain,
                    domain_ssl,
                    physical_uri,
                    virtual_uri,
                },
            )
            .await?;

        debug!("Fetched {} shop URL records", records.len());
        Ok(records)
    }

    async fn disable_ssl(&mut self) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET value = :value WHERE name = :name",
            self.table("configuration")
        );
        for (name, value) in SSL_OFF_SETTINGS {
            self.conn
                .exec_drop(&sql, params! { "name" => *name, "value" => *value })
                .await?;
        }
        Ok(())
    }

    async fn update_shop_url(&mut self, record: &ShopDomainRecord) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET domain = :domain, domain_ssl = :domain_ssl, \
             physical_uri = :physical_uri, virtual_uri = :virtual_uri \
             WHERE id_shop_url = :id",
            self.table("shop_url")
        );
        self.conn
            .exec_drop(
                &sql,
                params! {
                    "domain" => record.domain.as_str(),
                    "domain_ssl" => record.domain_ssl.as_str(),
                    "physical_uri" => record.physical_uri.as_str(),
                    "virtual_uri" => record.virtual_uri.as_str(),
                    "id" => record.id,
                },
            )
            .await?;
        Ok(())
    }
}
