//! ssdb-cli - Issue a single command against an SSDB server
//!
//! This is the entry point of the command-line client. It connects lazily,
//! sends one command, prints the reply and exits.

use anyhow::Context;
use ssdb_client::{Client, ClientConfig, Error, Reply, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

/// Command-line configuration
struct Config {
    /// Server host
    host: String,
    /// Server port
    port: u16,
    /// Seconds to wait for a reply
    timeout: Option<u64>,
    /// Log protocol activity
    verbose: bool,
    /// Command name followed by its parameters
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: None,
            verbose: false,
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--timeout" | "-t" => {
                    if i + 1 < args.len() {
                        let secs = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid timeout");
                            std::process::exit(1);
                        });
                        config.timeout = Some(secs);
                        i += 2;
                    } else {
                        eprintln!("Error: --timeout requires a value");
                        std::process::exit(1);
                    }
                }
                "--verbose" => {
                    config.verbose = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-V" => {
                    println!("ssdb-cli version {}", ssdb_client::VERSION);
                    std::process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
                _ => {
                    // Everything from the command name on is passed through
                    config.command = args[i..].to_vec();
                    break;
                }
            }
        }

        if config.command.is_empty() {
            eprintln!("Error: no command given");
            print_help();
            std::process::exit(1);
        }

        config
    }

    fn reply_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.host.clone(), self.port);
        match self.reply_timeout() {
            Some(limit) => config.with_timeout(limit),
            None => config,
        }
    }
}

/// Issues one command and waits for its reply, for at most `limit` if set.
async fn call_with_timeout(
    client: &Client,
    command: &str,
    params: &[String],
    limit: Option<Duration>,
) -> anyhow::Result<ssdb_client::Result<Reply>> {
    let reply = client.call(command, params);
    match limit {
        Some(limit) => tokio::time::timeout(limit, reply).await.with_context(|| {
            format!(
                "no reply from {} within {}s",
                client.config().address(),
                limit.as_secs()
            )
        }),
        None => Ok(reply.await),
    }
}

fn print_help() {
    println!(
        r#"
ssdb-cli - Send a command to an SSDB server

USAGE:
    ssdb-cli [OPTIONS] <COMMAND> [ARGS...]

OPTIONS:
    -h, --host <HOST>       Server host (default: 127.0.0.1)
    -p, --port <PORT>       Server port (default: 8888)
    -t, --timeout <SECS>    Give up after SECS seconds without a reply (default: wait)
        --verbose           Log protocol activity to stderr
    -V, --version           Print version information
        --help              Print this help message

EXAMPLES:
    ssdb-cli set name Ariz
    ssdb-cli get name
    ssdb-cli -p 8889 hgetall user:1
    ssdb-cli zrange scores 0 10
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let level = if config.verbose {
        Level::TRACE
    } else {
        Level::WARN
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let client = Client::new(config.client_config());
    let (command, params) = config
        .command
        .split_first()
        .context("no command given")?;

    debug!(server = %client.config().address(), command = %command, "Issuing command");
    let result = call_with_timeout(&client, command, params, config.reply_timeout()).await;
    // One command per run
    let _ = client.quit();
    let result = result?;

    match result {
        Ok(Reply::Value(value)) => {
            println!("{}", value);
            Ok(())
        }
        Ok(Reply::NotFound { .. }) => {
            println!("(not found)");
            Ok(())
        }
        Err(e @ (Error::Transport(_) | Error::Abandoned)) => {
            Err(e).with_context(|| format!("could not reach {}", client.config().address()))
        }
        Err(e) => {
            eprintln!("(error) {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accepts the connection and never answers
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let client = Client::new(ClientConfig::new("127.0.0.1", port));
        let params = vec!["k".to_string()];
        let limit = Some(Duration::from_millis(200));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            call_with_timeout(&client, "get", &params, limit),
        )
        .await
        .expect("call was not bounded by its timeout");

        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("no reply from 127.0.0.1:"));
        server.abort();
    }

    #[tokio::test]
    async fn test_reply_within_timeout() {
        use ssdb_client::protocol::Response;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await.unwrap();
            let reply = Response::with_status("ok", ["v"]).serialize();
            stream.write_all(&reply).await.unwrap();
        });

        let client = Client::new(ClientConfig::new("127.0.0.1", port));
        let params = vec!["k".to_string()];
        let reply = call_with_timeout(&client, "get", &params, Some(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        let value = reply.into_option().unwrap();
        assert_eq!(value.as_str(), Some("v"));
    }
}
