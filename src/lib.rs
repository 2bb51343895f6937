#[macro_use]
extern crate rocket;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, StoreFairing};
use crate::logging::LoggerFairing;

pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod mutator;
pub mod participant;
pub mod results;
pub mod session;
pub mod store;

pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
}

/// A server on an in-memory store, with a client to talk to it.
#[cfg(test)]
async fn client_and_store() -> (rocket::local::asynchronous::Client, store::MemoryStore) {
    let memory = store::MemoryStore::new();
    let store: store::Store = std::sync::Arc::new(memory.clone());
    let rocket = rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .manage(store);
    let client = rocket::local::asynchronous::Client::tracked(rocket)
        .await
        .unwrap();
    (client, memory)
}
