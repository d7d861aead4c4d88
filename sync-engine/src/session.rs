//! Session setup for both ends.
//!
//! The local end initiates: it creates an offer, posts it to the signaling
//! endpoint and completes the channel from the answer. The remote end
//! responds: it waits for the offer, answers it and waits for the channel to
//! open. Everything after that is the watch loop or the apply loop.

use sync_channel::{ChannelProvider, PeerChannel, TcpProvider};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::local::{FsNotifier, LocalWatcher};
use crate::remote::RemoteApplier;
use crate::signaling::{signal_offer, SignalingServer};

/// Initiator handshake: offer, signal, complete.
pub async fn initiate<P: ChannelProvider>(provider: &P, url: &str) -> Result<P::Channel> {
    let offer = provider.create_offer().await?;
    let answer = signal_offer(url, &offer).await?;
    let channel = provider.complete(&answer).await?;
    debug!("Handshake complete as initiator on '{}'", channel.label());
    Ok(channel)
}

/// Responder handshake: take the first offer from `server`, answer it, open.
pub async fn respond<P: ChannelProvider>(
    provider: &P,
    server: &mut SignalingServer,
) -> Result<P::Channel> {
    let pending = server.next_offer().await?;
    let answer = provider.create_answer(pending.offer()).await?;
    pending.respond(answer)?;
    let channel = provider.open().await?;
    debug!("Handshake complete as responder on '{}'", channel.label());
    Ok(channel)
}

/// Run the local end until the notifier stops.
pub async fn run_local(config: &Config) -> Result<()> {
    let (notifier, stream) = FsNotifier::new()?;

    let provider = TcpProvider::new(config.local_provider_config());
    let channel = initiate(&provider, &config.signaling.dial_url()).await?;

    let mut watcher = LocalWatcher::new(&config.watch, notifier, channel);
    let registered = watcher.register_tree();
    info!("Watching {} directories", registered);

    let summary = watcher.run(stream).await;
    info!(
        "Watch loop handled {} notifications, {} notifier errors",
        summary.notifications, summary.errors
    );
    Ok(())
}

/// Run the remote end until the local end closes the channel.
///
/// Returns the number of events received.
pub async fn run_remote(config: &Config) -> Result<u64> {
    let mut server = SignalingServer::bind(&config.signaling.bind_address()).await?;

    let provider = TcpProvider::new(config.channel.provider_config());
    let channel = respond(&provider, &mut server).await?;

    let applier = RemoteApplier::new(&config.remote.root);
    info!("Applying events under {}", applier.root().display());
    Ok(applier.run(&channel).await?)
}
