//! Admin console
//!
//! A plain text protocol on the admin port. Commands match by unique
//! case-insensitive prefix, so `st`, `STAT`, and `status` all work:
//!
//! ```text
//! HELP            list commands
//! STATUS          one-shot server and handler report
//! POLL            repeat STATUS every interval until more input arrives
//! INTERVAL <n>    set the poll interval in seconds
//! QUIT            close the console
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::Result;

use super::context::ServerContext;

const COMMANDS: [&str; 5] = ["help", "status", "poll", "interval", "quit"];

const HELP_TEXT: &str = "commands: HELP STATUS POLL INTERVAL <secs> QUIT\r\n\
                         any unique prefix works, case-insensitive\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    Status,
    Poll,
    Interval(u64),
    Quit,
}

/// Parse one console line by unique case-insensitive prefix
pub fn parse_command(line: &str) -> Option<AdminCommand> {
    let mut words = line.split_whitespace();
    let word = words.next()?.to_ascii_lowercase();

    let mut matches = COMMANDS.iter().filter(|c| c.starts_with(&word));
    let command = matches.next()?;
    if matches.next().is_some() {
        return None; // ambiguous prefix
    }

    match *command {
        "help" => Some(AdminCommand::Help),
        "status" => Some(AdminCommand::Status),
        "poll" => Some(AdminCommand::Poll),
        "interval" => words.next()?.parse().ok().map(AdminCommand::Interval),
        "quit" => Some(AdminCommand::Quit),
        _ => None,
    }
}

pub async fn run(ctx: Arc<ServerContext>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind(ctx.config.admin_addr()).await?;
    tracing::info!(addr = %ctx.config.admin_addr(), "admin listening");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        tracing::info!(peer = %peer, "admin connection");

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(err) = handle_console(ctx, stream).await {
                tracing::debug!(error = %err, "admin console ended");
            }
        });
    }
}

async fn handle_console(ctx: Arc<ServerContext>, stream: TcpStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let mut interval = Duration::from_secs(5);
    let mut polling = false;

    loop {
        let line = if polling {
            tokio::select! {
                line = lines.next_line() => {
                    polling = false;
                    line?
                }
                _ = tokio::time::sleep(interval) => {
                    let report = status_report(&ctx).await;
                    writer.write_all(report.as_bytes()).await?;
                    continue;
                }
            }
        } else {
            lines.next_line().await?
        };

        let line = match line {
            Some(line) => line,
            None => return Ok(()),
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(AdminCommand::Help) => writer.write_all(HELP_TEXT.as_bytes()).await?,
            Some(AdminCommand::Status) => {
                let report = status_report(&ctx).await;
                writer.write_all(report.as_bytes()).await?;
            }
            Some(AdminCommand::Poll) => polling = true,
            Some(AdminCommand::Interval(secs)) => {
                interval = Duration::from_secs(secs.max(1));
                writer
                    .write_all(format!("interval {} secs\r\n", interval.as_secs()).as_bytes())
                    .await?;
            }
            Some(AdminCommand::Quit) => return Ok(()),
            None => writer.write_all(b"unknown command; try HELP\r\n").await?,
        }
    }
}

async fn status_report(ctx: &ServerContext) -> String {
    let mut report = ctx.stats.snapshot().report();
    let summaries = ctx.registry.summaries().await;
    report.push_str(&format!("handlers: {}\r\n", summaries.len()));
    for entry in summaries {
        report.push_str(&format!(
            "  {} {}: {} clients, {} streams, idle {}s\r\n",
            entry.key.protocol.name(),
            entry.key.path,
            entry.clients,
            entry.streams,
            entry.idle_secs,
        ));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_command_names() {
        assert_eq!(parse_command("help"), Some(AdminCommand::Help));
        assert_eq!(parse_command("status"), Some(AdminCommand::Status));
        assert_eq!(parse_command("poll"), Some(AdminCommand::Poll));
        assert_eq!(parse_command("quit"), Some(AdminCommand::Quit));
    }

    #[test]
    fn test_unique_prefix_matches() {
        assert_eq!(parse_command("st"), Some(AdminCommand::Status));
        assert_eq!(parse_command("q"), Some(AdminCommand::Quit));
        assert_eq!(parse_command("h"), Some(AdminCommand::Help));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(parse_command("STATUS"), Some(AdminCommand::Status));
        assert_eq!(parse_command("Poll"), Some(AdminCommand::Poll));
        assert_eq!(parse_command("QuIt"), Some(AdminCommand::Quit));
    }

    #[test]
    fn test_interval_takes_argument() {
        assert_eq!(parse_command("interval 30"), Some(AdminCommand::Interval(30)));
        assert_eq!(parse_command("int 7"), Some(AdminCommand::Interval(7)));
        assert_eq!(parse_command("interval"), None);
        assert_eq!(parse_command("interval soon"), None);
    }

    #[test]
    fn test_unknown_and_empty_rejected() {
        assert_eq!(parse_command("restart"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   "), None);
    }
}
