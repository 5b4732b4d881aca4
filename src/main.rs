use anyhow::Context;
use clap::Parser;
use log::info;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::task::JoinSet;

use drtp::{Cli, DrtpError, Mode, Receiver, Sender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let logger = drtp::logger::init().context("installing logger")?;

    let res = tokio::select! {
        res = run(args) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(())
        }
    };

    logger.shutdown().await;
    res
}

/// Spawn the requested ends and wait for all of them. Dropping the set on
/// error or interrupt aborts whatever is still running.
async fn run(args: Cli) -> anyhow::Result<()> {
    let mode = args.mode();
    let mut tasks: JoinSet<Result<(), DrtpError>> = JoinSet::new();

    // bound before the client starts so its SYN has somewhere to land
    if mode.receives() {
        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
        let mut receiver = Receiver::bind(bind, args.receiver_config())
            .await
            .with_context(|| format!("binding {bind}"))?;
        info!(
            "DRTP server on {}, writing to {}",
            receiver.local_addr()?,
            args.output_path().display()
        );

        if mode == Mode::Both {
            tasks.spawn(async move { receiver.accept().await.map(|_| ()) });
        } else {
            tasks.spawn(async move { receiver.serve().await });
        }
    }

    if mode.sends() {
        let sender = Sender::bind(
            args.client_bind_addr(),
            args.server_addr(),
            args.sender_config(),
        )
        .await
        .context("binding client socket")?;
        let filename = args.filename.clone();
        info!("sending {} to {}", filename.display(), args.server_addr());

        tasks.spawn(async move { sender.send_file(filename).await.map(|_| ()) });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.context("protocol task panicked")??;
    }
    Ok(())
}
