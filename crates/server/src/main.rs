mod config;
mod play;
mod tui;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tilenet::{NetError, Session, SessionConfig};

use config::{HostArgs, JoinArgs, LocalArgs};
use play::{Clock, RunLimit, SleepDriver};
use tui::Tui;

#[derive(Parser)]
#[command(name = "tilenet")]
#[command(about = "Host, join or play a tile game session")]
struct Cli {
    #[arg(short, long, global = true, help = "JSON session config")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Log to stderr instead of drawing a status screen")]
    headless: bool,

    #[arg(long, global = true, default_value_t = 0, help = "Stop after this many seconds (0 runs until quit)")]
    duration: u64,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn draws_tui(&self) -> bool {
        !self.headless && !matches!(self.command, Command::Local(_))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Accept clients and serve levels
    Host(HostArgs),
    /// Connect to a host
    Join(JoinArgs),
    /// Play without networking
    Local(LocalArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref())?;
    let limit = RunLimit::from_secs(cli.duration);
    let clock = Clock::new();

    // Local play never draws the status screen
    if !cli.draws_tui() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match &cli.command {
        Command::Host(args) => {
            args.apply(&mut config)?;
            let level = args.level.as_ref().and_then(|path| path.to_str());
            let mut session = Session::host(config.clone(), level)?;
            run(&mut session, &config, clock, limit, cli.headless)
        }
        Command::Join(args) => {
            args.apply(&mut config)?;
            if cli.headless {
                let mut driver = SleepDriver::new(clock, config.timings.frame);
                let mut session = Session::join(config.clone(), &args.address, &mut driver)?;
                return play::run_headless(&mut session, clock, config.timings.frame, limit);
            }

            let mut tui = Tui::new()?;
            let joined = tui.join(config.clone(), &args.address, clock);
            let result = match joined {
                Ok(mut session) => {
                    tui.state_mut().log_info(format!("Joined {}", args.address));
                    tui.run(&mut session, clock, limit)
                }
                Err(e) => Err(e.into()),
            };
            tui.restore()?;
            report_abort(result)
        }
        Command::Local(args) => {
            args.player.apply(&mut config)?;
            let mut session = Session::local(config.clone(), &args.level);
            log::info!("Local {} game on {}", session.mode().kind(), args.level);
            play::run_headless(&mut session, clock, config.timings.frame, limit)
        }
    }
}

fn run(session: &mut Session, config: &SessionConfig, clock: Clock, limit: RunLimit, headless: bool) -> Result<()> {
    if headless {
        return play::run_headless(session, clock, config.timings.frame, limit);
    }

    let mut tui = Tui::new()?;
    tui.state_mut().log_info(format!("Hosting {} game on port {}", config.mode, config.port));
    let result = tui.run(session, clock, limit);
    tui.restore()?;
    result
}

/// A wait the user backed out of is not a failure.
fn report_abort(result: Result<()>) -> Result<()> {
    match result {
        Err(e) => match e.downcast_ref::<NetError>() {
            Some(net) if net.is_user_abort() => {
                eprintln!("Join {}", net);
                Ok(())
            }
            _ => Err(e),
        },
        ok => ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_play_logs_to_stderr() {
        let local = Cli::try_parse_from(["tilenet", "local", "LEVEL1.000"]).unwrap();
        assert!(!local.draws_tui());

        let host = Cli::try_parse_from(["tilenet", "host", "--dedicated"]).unwrap();
        assert!(host.draws_tui());

        let headless = Cli::try_parse_from(["tilenet", "host", "--headless"]).unwrap();
        assert!(!headless.draws_tui());
    }
}
