mod cli;
mod console;
mod measurement;
mod telemetry;

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use conductor_session::{SessionClient, SessionConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::cli::Cli;
use crate::console::{ConsoleHandler, Input};

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init()?;

    let config = cli
        .session_config()
        .context("invalid session configuration")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: SessionConfig) -> Result<()> {
    info!(address = %config.address, user = %config.user_label, "starting conductor chat");

    let (mut client, mut events) =
        SessionClient::builder(config, ConsoleHandler::new(io::stdout())).build();
    client.handler_mut().welcome();
    client.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(event) = events.recv() => client.handle_event(event),
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match Input::parse(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Message(text) => {
                        let id = client.send_message(text);
                        client.handler_mut().message_sent(id);
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    let measurement = client.handler().measurement();
    info!(
        requests_sent = measurement.requests_sent(),
        initial_responses = measurement.initial_responses(),
        history = client.history().len(),
        "closing session"
    );
    client.close();
    Ok(())
}
