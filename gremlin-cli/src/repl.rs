//! Interactive REPL.

use crate::commands;
use colored::Colorize;
use gremlin_client::Conn;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const HELP_TEXT: &str = r#"
Every line is evaluated as a Gremlin query, e.g. g.V().count()

Console commands:
  :help, :h                     Show this help
  :bindings <json>              Set bindings for the following queries
  :clear                        Clear bindings
  :quit, :exit, :q              Exit the REPL
"#;

/// What the loop does after a line.
enum Action {
    Print(String),
    Quit,
}

pub async fn run(conn: &Conn, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "gremlin console".bold().cyan());
    println!("{} {}", "Connected to".green(), url);

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".gremlin_history"))
        .unwrap_or_else(|_| ".gremlin_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type ':help' for available commands.\n");

    let mut bindings: Option<String> = None;
    loop {
        let prompt = format!("{} ", "gremlin>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_line(conn, line, &mut bindings).await {
                    Ok(Action::Print(output)) => println!("{}\n", output),
                    Ok(Action::Quit) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }

                if conn.is_closed() {
                    println!("{}", "Server connection lost.".red());
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    let _ = conn.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_line(
    conn: &Conn,
    line: &str,
    bindings: &mut Option<String>,
) -> Result<Action, Box<dyn std::error::Error>> {
    let Some(command) = line.strip_prefix(':') else {
        let rsp = commands::eval(conn, line, bindings.as_deref()).await?;
        return Ok(Action::Print(commands::format_response(&rsp)));
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map(|(name, arg)| (name, arg.trim()))
        .unwrap_or((command, ""));

    match name.to_lowercase().as_str() {
        "help" | "h" | "?" => Ok(Action::Print(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(Action::Quit),

        "bindings" | "b" => {
            if arg.is_empty() {
                return Ok(Action::Print(match bindings {
                    Some(current) => current.clone(),
                    None => "No bindings".yellow().to_string(),
                }));
            }
            commands::parse_bindings(arg)?;
            *bindings = Some(arg.to_string());
            Ok(Action::Print("Bindings set".green().to_string()))
        }

        "clear" => {
            *bindings = None;
            Ok(Action::Print("Bindings cleared".green().to_string()))
        }

        _ => Ok(Action::Print(format!(
            "Unknown command: :{}. Type ':help' for help.",
            name
        ))),
    }
}
