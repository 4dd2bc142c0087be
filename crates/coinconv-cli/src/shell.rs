//! Interactive shell.
//!
//! While the shell runs it follows the shared token: another coinconv
//! process signing out (or the token expiring) ends this session too.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use coinconv_core::converter::swap;
use coinconv_core::CurrencyCode;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::commands;
use crate::context::AppContext;

/// How often the durable slot is checked for changes made by other processes
const DURABLE_POLL_INTERVAL: Duration = Duration::from_secs(2);

const HELP: &str = "\
Commands:
  login [email] [--remember]   sign in
  logout                       sign out
  whoami                       show the signed-in user
  status                       session and cache state
  convert <amount> [from to]   convert using the current pair
  pair <from> <to>             set the current pair
  swap                         exchange the pair's currencies
  rates [--refresh]            list exchange rates
  help                         this text
  quit                         leave the shell";

type Input = Lines<BufReader<tokio::io::Stdin>>;

/// What the loop does after a command
enum Next {
    Continue,
    Quit,
}

fn print_prompt(pair: (CurrencyCode, CurrencyCode)) {
    print!("{}→{}> ", pair.0, pair.1);
    let _ = std::io::stdout().flush();
}

async fn ask<R: AsyncRead + Unpin>(
    lines: &mut Lines<BufReader<R>>,
    label: &str,
    default: Option<&str>,
) -> Result<String> {
    match default {
        Some(value) => print!("{} [{}]: ", label, value),
        None => print!("{}: ", label),
    }
    let _ = std::io::stdout().flush();

    let answer = lines.next_line().await?.unwrap_or_default();
    let answer = answer.trim();
    if answer.is_empty() {
        return default
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("{} is required", label));
    }
    Ok(answer.to_string())
}

/// Prompt once on stdin, outside the shell
pub async fn prompt_line(label: &str, default: Option<&str>) -> Result<String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    ask(&mut lines, label, default).await
}

fn parse_pair(from: &str, to: &str) -> Result<(CurrencyCode, CurrencyCode)> {
    Ok((from.parse()?, to.parse()?))
}

async fn login(ctx: &mut AppContext, lines: &mut Input, args: &[&str]) -> Result<()> {
    let remember = args.contains(&"--remember") || ctx.config.remember_by_default;
    let email = match args.iter().find(|a| !a.starts_with("--")) {
        Some(email) => email.to_string(),
        None => {
            let last = ctx.config.last_email.clone();
            ask(lines, "Email", last.as_deref()).await?
        }
    };
    // The shell keeps an unremembered token until it exits, no hint needed
    commands::login(ctx, &email, remember, false).await
}

async fn dispatch(
    ctx: &mut AppContext,
    lines: &mut Input,
    pair: &mut (CurrencyCode, CurrencyCode),
    command: &str,
    args: &[&str],
) -> Result<Next> {
    match (command, args) {
        ("quit" | "exit", _) => return Ok(Next::Quit),
        ("help" | "?", _) => println!("{}", HELP),
        ("login", args) => login(ctx, lines, args).await?,
        ("logout", _) => commands::logout(ctx),
        ("whoami", _) => commands::whoami(ctx, false).await?,
        ("status", _) => commands::status(ctx),
        ("rates", args) => commands::rates(ctx, args.contains(&"--refresh")).await,
        ("swap", _) => {
            *pair = swap(pair.0, pair.1);
            println!("Now converting {} to {}", pair.0, pair.1);
        }
        ("pair", [from, to]) => {
            *pair = parse_pair(from, to)?;
            println!("Now converting {} to {}", pair.0, pair.1);
        }
        ("convert", [amount]) => {
            commands::convert(ctx, parse_amount(amount)?, pair.0, pair.1, false).await?
        }
        ("convert", [amount, from, to]) => {
            let (from, to) = parse_pair(from, to)?;
            commands::convert(ctx, parse_amount(amount)?, from, to, false).await?
        }
        ("pair" | "convert", _) => println!("Wrong arguments, see `help`"),
        (other, _) => println!("Unknown command `{}`, see `help`", other),
    }
    Ok(Next::Continue)
}

fn parse_amount(raw: &str) -> Result<f64> {
    raw.replace(',', "")
        .parse()
        .map_err(|_| anyhow::anyhow!("Not an amount: {}", raw))
}

pub async fn run(ctx: &mut AppContext) -> Result<()> {
    let listener = ctx.session.spawn_storage_listener();
    let watcher = ctx
        .storage
        .spawn_durable_watcher(&ctx.config.storage_key, DURABLE_POLL_INTERVAL);
    let mut updates = ctx.session.subscribe();
    let mut lines: Input = BufReader::new(tokio::io::stdin()).lines();

    let mut pair = (CurrencyCode::Usd, CurrencyCode::Ves);
    let mut signed_in = ctx.session.is_authenticated();

    match ctx.session.claims() {
        Some(claims) => println!(
            "Signed in as {}. Type `help` for commands.",
            claims.display_name()
        ),
        None => println!("Not signed in. Type `help` for commands."),
    }

    loop {
        print_prompt(pair);

        let line = tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_signed_in = updates.borrow_and_update().is_authenticated;
                if signed_in && !now_signed_in {
                    println!();
                    println!("Session ended.");
                }
                signed_in = now_signed_in;
                continue;
            }
            line = lines.next_line() => line?,
        };

        // EOF
        let Some(line) = line else {
            println!();
            break;
        };

        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            continue;
        };

        match dispatch(ctx, &mut lines, &mut pair, command, args).await {
            Ok(Next::Quit) => break,
            Ok(Next::Continue) => {}
            Err(e) => println!("Error: {}", e),
        }
        // Changes made by this command were already reported by it
        signed_in = ctx.session.is_authenticated();
        updates.mark_unchanged();
    }

    listener.abort();
    watcher.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_accepts_grouping() {
        assert_eq!(parse_amount("1,250.5").expect("amount"), 1250.5);
        assert!(parse_amount("ten").is_err());
    }

    #[test]
    fn test_parse_pair() {
        let pair = parse_pair("eur", "USDT").expect("known codes");
        assert_eq!(pair, (CurrencyCode::Eur, CurrencyCode::Usdt));
        assert!(parse_pair("USD", "GBP").is_err());
    }

    #[tokio::test]
    async fn test_ask_uses_default_on_empty_answer() {
        let input: &[u8] = b"\nuser@example.com\n";
        let mut lines = BufReader::new(input).lines();
        assert_eq!(
            ask(&mut lines, "Email", Some("last@example.com")).await.expect("default"),
            "last@example.com"
        );
        assert_eq!(
            ask(&mut lines, "Email", None).await.expect("answer"),
            "user@example.com"
        );
        assert!(ask(&mut lines, "Email", None).await.is_err());
    }
}
