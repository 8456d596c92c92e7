use clap::Parser;
use harbinger::{v4::SessionState, Args, ClientConfig, HarbingerError, Negotiator};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), HarbingerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig::try_from(args)?;

    tracing::info!(
        "Opening packet socket on interface '{}' for {} session(s)...",
        config.interface,
        config.count
    );

    // A socket that cannot be opened ends the process before anything is sent.
    let mut negotiator = Negotiator::new(&config)?;
    let sessions = negotiator.run().await?;

    let mut requested = 0;
    for session in &sessions {
        match session.state {
            SessionState::RequestSent => {
                requested += 1;
                tracing::info!(
                    "xid={:#010x} mac={}: requested {} from {}",
                    session.xid,
                    session.client_mac,
                    session
                        .offered_address
                        .map_or_else(|| "?".to_string(), |a| a.to_string()),
                    session
                        .server_identifier
                        .map_or_else(|| "?".to_string(), |a| a.to_string()),
                );
            }
            state => tracing::warn!(
                "xid={:#010x} mac={}: {:?} after {} Discover(s)",
                session.xid,
                session.client_mac,
                state,
                session.attempts
            ),
        }
    }

    tracing::info!("{} of {} session(s) sent a Request", requested, sessions.len());
    Ok(())
}
