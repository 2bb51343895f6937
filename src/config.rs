use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::store::{MemoryStore, MongoStore, Store};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_sse_heartbeat")]
    sse_heartbeat: u64,
}

fn default_sse_heartbeat() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sse_heartbeat: default_sse_heartbeat(),
        }
    }
}

impl Config {
    /// Interval between keep-alive comments on event streams.
    /// Configured via `SSE_HEARTBEAT`, in seconds.
    pub fn sse_heartbeat(&self) -> Duration {
        Duration::from_secs(self.sse_heartbeat)
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the store fairing and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which store backs the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Mongodb,
    /// Keep everything in memory; nothing survives a restart.
    Memory,
}

/// Configuration for the document store.
#[derive(Deserialize)]
struct StoreConfig {
    #[serde(default)]
    store: StoreKind,
    // secrets
    db_uri: Option<String>,
    #[serde(default = "default_db_name")]
    db_name: String,
}

fn default_db_name() -> String {
    "livepoll".to_string()
}

/// A fairing that loads the store config, connects to the database if there
/// is one, and places the resulting [`Store`] into managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Document store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let store: Store = match config.store {
            StoreKind::Memory => {
                info!("Using an in-memory store, nothing will be persisted");
                Arc::new(MemoryStore::new())
            }
            StoreKind::Mongodb => {
                let db_uri = match config.db_uri {
                    Some(db_uri) => db_uri,
                    None => {
                        error!("`db_uri` must be set to use MongoDB");
                        return Err(rocket);
                    }
                };
                info!("Loaded database config, connecting...");
                match MongoStore::connect(&db_uri, &config.db_name).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
        };
        info!("...store online!");

        // Manage the state.
        rocket = rocket.manage(store).manage(config.store);
        Ok(rocket)
    }
}

#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;

    #[test]
    fn defaults() {
        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.sse_heartbeat(), Duration::from_secs(15));

        let config: StoreConfig = Figment::new().extract().unwrap();
        assert_eq!(config.store, StoreKind::Mongodb);
        assert_eq!(config.db_uri, None);
        assert_eq!(config.db_name, "livepoll");
    }

    #[test]
    fn overrides() {
        let figment = Figment::new()
            .merge(Serialized::default("sse_heartbeat", 3))
            .merge(Serialized::default("store", "memory"))
            .merge(Serialized::default("db_name", "polls"));
        let config: Config = figment.extract().unwrap();
        assert_eq!(config.sse_heartbeat(), Duration::from_secs(3));
        let config: StoreConfig = figment.extract().unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.db_name, "polls");
    }

    #[rocket::async_test]
    async fn memory_store_needs_no_database() {
        let figment = Figment::from(rocket::Config::default()).merge(("store", "memory"));
        let rocket = rocket::custom(figment)
            .attach(ConfigFairing)
            .attach(StoreFairing)
            .ignite()
            .await
            .unwrap();
        assert!(rocket.state::<Store>().is_some());
        assert_eq!(rocket.state::<StoreKind>(), Some(&StoreKind::Memory));
        assert!(rocket.state::<Config>().is_some());
    }

    #[rocket::async_test]
    async fn mongodb_store_needs_a_uri() {
        let figment = Figment::from(rocket::Config::default()).merge(("store", "mongodb"));
        match rocket::custom(figment).attach(StoreFairing).ignite().await {
            Ok(_) => panic!("Ignited without a database"),
            Err(e) => assert!(matches!(e.kind(), rocket::error::ErrorKind::FailedFairings(_))),
        }
    }
}
