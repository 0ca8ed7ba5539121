//! Interactive mode. One client and one router live for the whole session,
//! so a sign-in carries over to later commands.

use crate::app::AppState;
use crate::{commands, Commands};
use anyhow::bail;
use clap::Parser;
use route_guard::Router;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(clap::Subcommand, Debug)]
enum ShellCommand {
    /// Navigate to a page, as a link click would
    Go { path: String },
    /// Print the current page
    Where,
    /// Leave the shell
    #[command(alias = "quit")]
    Exit,
    #[command(flatten)]
    Auth(Commands),
}

pub async fn run(state: &AppState) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        state.settled().await;
        print!("{}> ", state.router.current_path());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let words = match split_words(&line) {
            Ok(words) => words,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        if words.is_empty() {
            continue;
        }

        let parsed = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Help and usage errors both land here.
                let _ = e.print();
                continue;
            }
        };

        match parsed.command {
            ShellCommand::Exit => break,
            ShellCommand::Where => println!("{}", state.router.current_path()),
            ShellCommand::Go { path } => state.router.push(&path),
            ShellCommand::Auth(Commands::Shell) => eprintln!("Already in a shell"),
            ShellCommand::Auth(command) => {
                if let Err(e) = commands::run(state, command).await {
                    eprintln!("error: {:#}", e);
                }
            }
        }
    }

    Ok(())
}

/// Split a line on whitespace, keeping double-quoted runs together.
fn split_words(line: &str) -> anyhow::Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quoted {
        bail!("Unterminated quote");
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
