use evote_backend::Config;
use log::{error, info, LevelFilter};
use rocket::Error as RocketError;
use thiserror::Error;

/// Errors that are critical to the entire server.
#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    RocketError(#[from] RocketError),
    #[error("Server ignited without a vote casting configuration")]
    MissingConfig,
}

async fn run() -> Result<(), Error> {
    info!("Configuring vote casting server...");
    let rocket = evote_backend::build().ignite().await?;
    let config = rocket.state::<Config>().ok_or(Error::MissingConfig)?;
    info!(
        "Votes commit within {:?}; confirmations {} (timeout {:?})",
        config.commit_timeout(),
        if config.notifications() { "sent by SMS" } else { "logged only" },
        config.notify_timeout(),
    );
    info!(
        "Accepting votes on {}:{}",
        rocket.config().address,
        rocket.config().port
    );
    // Disable rocket logging from now on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    let _ = rocket.launch().await?;
    Ok(())
}

#[rocket::main]
async fn main() {
    // Set up logging.
    log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
        .expect("Failed to initialise logging");
    info!("Initialised logging");

    // Launch server.
    if let Err(err) = run().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
