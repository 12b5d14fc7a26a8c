#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::{
    config::{ConfigFairing, DatabaseFairing, NotifierFairing, VotingBoothFairing},
    logging::LoggerFairing,
    voting::VotingBooth,
};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod store;
pub mod voting;

pub use config::Config;

/// The production server: configuration, MongoDB, and notifications are all
/// set up from the Rocket figment during ignition.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(NotifierFairing)
        .attach(VotingBoothFairing)
}

/// A server around an already assembled [`VotingBooth`], e.g. one backed by
/// [`MemoryStore`](store::MemoryStore).
pub fn rocket_for_booth(booth: VotingBooth, config: Config) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .manage(config)
        .manage(booth)
}

/// Enable logging for the crate under test.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(["evote_backend"], None, None);
}

/// Connect to the test MongoDB deployment and create a fresh database for one test.
#[cfg(test)]
pub(crate) async fn mongo_test_setup() -> (store::MongoStore, mongodb::Database) {
    init_test_logging();

    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    let client = mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("Could not connect to test database");
    let db = client.database(&format!("test{}", rand::random::<u32>()));
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Could not create indexes");
    (store::MongoStore::new(client, db.clone()), db)
}

/// A server over the given MongoDB store, with notifications only logged.
#[cfg(test)]
pub(crate) fn rocket_for_store(store: store::MongoStore) -> Rocket<Build> {
    use std::sync::Arc;

    let config = Config::example();
    let booth = VotingBooth::from_config(Arc::new(store), Arc::new(notify::LogNotifier), &config);
    rocket_for_booth(booth, config)
}
