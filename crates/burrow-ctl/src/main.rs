//! burrow-ctl: query a rendezvous server from the command line.

use anyhow::{Context, Result};

use burrow_client::RendezvousClient;
use burrow_core::config::BurrowConfig;

mod cmd;

use cmd::fingerprint::{cmd_fingerprint, cmd_logout};
use cmd::lookup::{cmd_peer, cmd_providers, cmd_server_id};

fn print_usage() {
    eprintln!("burrow-ctl: query a Burrow rendezvous server");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  burrow-ctl [--server <url>] [--secret <secret>] <command>");
    eprintln!();
    eprintln!("COMMANDS:");
    eprintln!("  server-id              Relay peer id published by the server");
    eprintln!("  peer <id>              Addresses registered for a peer");
    eprintln!("  providers <name>       Peers registered under a group name (\"relay\" for relays)");
    eprintln!("  fingerprint <fp>       Peer id behind a fingerprint");
    eprintln!("  logout <fp>            Remove a fingerprint mapping");
    eprintln!();
    eprintln!("Defaults for --server and --secret come from the burrowd config file.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Config supplies defaults; a missing file is fine.
    let config = BurrowConfig::load().unwrap_or_default();
    let mut server = config.rendezvous.server_url;
    let mut secret = config.rendezvous.secret;

    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--server" => {
                i += 1;
                server = args.get(i).context("--server requires a value")?.clone();
            }
            "--secret" => {
                i += 1;
                secret = args.get(i).context("--secret requires a value")?.clone();
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    let client = RendezvousClient::lookup_only(&server, &secret);

    match remaining.as_slice() {
        ["server-id"] | []            => cmd_server_id(&client).await,
        ["peer", id]                  => cmd_peer(&client, id).await,
        ["providers", name]           => cmd_providers(&client, name).await,
        ["fingerprint", fp]           => cmd_fingerprint(&client, fp).await,
        ["logout", fp]                => cmd_logout(&client, fp).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
