mod minutes;
mod scopes;
mod serve;

use anyhow::{Result, anyhow};
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Service")
        .command("serve", "Start the HTTP API")
        .text("--host <host>            Bind address (default: 127.0.0.1)")
        .text("--port <port>            Bind port (default: 3001)")
        .print();

    GuideSection::new("Tools")
        .command("minutes", "Generate meeting minutes from a notes file")
        .text("--file <path>            Meeting notes or transcript")
        .text("--json                   Print minutes and parsed fields as JSON")
        .command("scopes", "Check an access token for Graph permissions")
        .text("--require <scope>        Scope to require (repeatable)")
        .print();

    GuideSection::new("Configuration")
        .text("Settings are read from config.toml in the data directory,")
        .text("then environment variables (AZURE_CLIENT_ID, OPENAI_API_KEY, ...).")
        .text("CONSULTFLOW_DATA_DIR overrides the data directory (~/.consultflow).")
        .print();

    println!(
        " {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("consultflow").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Serve {
        host: Option<String>,
        port: Option<u16>,
    },
    Minutes {
        file: String,
        json: bool,
    },
    Scopes {
        token: String,
        required: Vec<String>,
    },
    Help,
}

/// Value following a flag at `args[i]`, or an error naming the flag.
fn flag_value<'a>(args: &'a [String], i: usize) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} requires a value", args[i]))
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> Result<Command> {
    let mut host = None;
    let mut port = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                host = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--port" | "-p" => {
                let raw = flag_value(args, i)?;
                port = Some(
                    raw.parse()
                        .map_err(|_| anyhow!("Invalid port '{}'", raw))?,
                );
                i += 2;
            }
            other => return Err(anyhow!("Unknown option for serve: {}", other)),
        }
    }
    Ok(Command::Serve { host, port })
}

pub(crate) fn parse_minutes_flags(args: &[String], start: usize) -> Result<Command> {
    let mut file = None;
    let mut json = false;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--file" | "-f" => {
                file = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--json" => {
                json = true;
                i += 1;
            }
            other => return Err(anyhow!("Unknown option for minutes: {}", other)),
        }
    }
    let file = file.ok_or_else(|| anyhow!("--file is required for minutes"))?;
    Ok(Command::Minutes { file, json })
}

pub(crate) fn parse_scopes_flags(args: &[String], start: usize) -> Result<Command> {
    let mut token = None;
    let mut required = Vec::new();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--require" | "-r" => {
                required.push(flag_value(args, i)?.to_string());
                i += 2;
            }
            value if token.is_none() && !value.starts_with("--") => {
                token = Some(value.to_string());
                i += 1;
            }
            other => return Err(anyhow!("Unexpected argument for scopes: {}", other)),
        }
    }
    let token = token.ok_or_else(|| anyhow!("An access token is required for scopes"))?;
    Ok(Command::Scopes { token, required })
}

pub(crate) fn parse_command(args: &[String]) -> Result<Command> {
    match args.get(1).map(String::as_str) {
        None | Some("help") | Some("--help") | Some("-h") => Ok(Command::Help),
        Some("serve") => parse_serve_flags(args, 2),
        Some("minutes") => parse_minutes_flags(args, 2),
        Some("scopes") => parse_scopes_flags(args, 2),
        Some(other) => Err(anyhow!("Unknown command: {}", other)),
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(e) => {
            print_error(&e.to_string());
            print_help();
            return Err(anyhow!("Invalid arguments"));
        }
    };

    match command {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Serve { host, port } => serve::run_serve(host, port).await,
        Command::Minutes { file, json } => minutes::run_minutes(&file, json).await,
        Command::Scopes { token, required } => scopes::run_scopes(&token, &required),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        std::iter::once("consultflow")
            .chain(parts.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn no_arguments_means_help() {
        assert_eq!(parse_command(&args(&[])).unwrap(), Command::Help);
        assert_eq!(parse_command(&args(&["--help"])).unwrap(), Command::Help);
    }

    #[test]
    fn serve_flags_override_host_and_port() {
        assert_eq!(
            parse_command(&args(&["serve", "--host", "0.0.0.0", "--port", "8080"])).unwrap(),
            Command::Serve {
                host: Some("0.0.0.0".into()),
                port: Some(8080),
            }
        );
        assert_eq!(
            parse_command(&args(&["serve"])).unwrap(),
            Command::Serve {
                host: None,
                port: None
            }
        );
    }

    #[test]
    fn serve_rejects_bad_port_and_dangling_flag() {
        let err = parse_command(&args(&["serve", "--port", "http"])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid port 'http'");
        let err = parse_command(&args(&["serve", "--host"])).unwrap_err();
        assert_eq!(err.to_string(), "--host requires a value");
    }

    #[test]
    fn minutes_requires_file() {
        assert!(parse_command(&args(&["minutes"])).is_err());
        assert_eq!(
            parse_command(&args(&["minutes", "--file", "notes.txt", "--json"])).unwrap(),
            Command::Minutes {
                file: "notes.txt".into(),
                json: true
            }
        );
    }

    #[test]
    fn scopes_collects_repeated_requirements() {
        assert_eq!(
            parse_command(&args(&[
                "scopes",
                "eyJ.abc.def",
                "--require",
                "Mail.Send",
                "-r",
                "User.Read"
            ]))
            .unwrap(),
            Command::Scopes {
                token: "eyJ.abc.def".into(),
                required: vec!["Mail.Send".into(), "User.Read".into()],
            }
        );
        assert!(parse_command(&args(&["scopes"])).is_err());
    }

    #[test]
    fn unknown_command_is_an_error() {
        let err = parse_command(&args(&["deploy"])).unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: deploy");
    }
}
