//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Swallow.
//
// Swallow is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Swallow is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Swallow. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::support::config::MailerConfig;
use crate::support::sysexits::*;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Compose a message and send it.
    ///
    /// The exit status follows sysexits.h: 0 if every recipient was
    /// accepted, EX_TEMPFAIL (75) if only some were, and EX_UNAVAILABLE (69)
    /// if the server could not be reached or refused everyone.
    Send(SendSubcommand),
    /// Compose a message and write it to standard output without sending
    /// it.
    Render(ComposeOptions),
}

#[derive(StructOpt)]
pub(super) struct ComposeOptions {
    /// The configuration file [default: ./swallow.toml if it exists]
    #[structopt(long, parse(from_os_str))]
    pub(super) config: Option<PathBuf>,

    /// The sender, as `address` or `Name <address>`.
    #[structopt(long, short)]
    pub(super) from: String,

    /// Add a recipient. Can be passed multiple times.
    #[structopt(long, short, number_of_values(1))]
    pub(super) to: Vec<String>,

    /// Add a carbon-copy recipient. Can be passed multiple times.
    #[structopt(long, number_of_values(1))]
    pub(super) cc: Vec<String>,

    /// Add a blind carbon-copy recipient. Can be passed multiple times.
    #[structopt(long, number_of_values(1))]
    pub(super) bcc: Vec<String>,

    #[structopt(long, short, default_value = "")]
    pub(super) subject: String,

    /// File holding the plain text body. "-" reads standard input.
    #[structopt(long, short, parse(from_os_str), default_value = "-")]
    pub(super) body: PathBuf,

    /// File holding an HTML alternative to the plain text body.
    #[structopt(long, parse(from_os_str))]
    pub(super) html: Option<PathBuf>,

    /// Attach this file. Can be passed multiple times.
    #[structopt(long, short, parse(from_os_str), number_of_values(1))]
    pub(super) attach: Vec<PathBuf>,
}

#[derive(StructOpt)]
pub(super) struct SendSubcommand {
    #[structopt(flatten)]
    pub(super) compose: ComposeOptions,

    /// Prompt for the SMTP password instead of taking it from the
    /// configuration.
    #[structopt(long)]
    pub(super) prompt_password: bool,

    /// Send a separate copy to each To recipient.
    #[structopt(long)]
    pub(super) batch: bool,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    match cmd {
        Command::Send(cmd) => {
            let (config, config_dir) = load_config(cmd.compose.config.as_deref());
            init_logging(&config_dir);
            super::send::send(config, cmd);
        }
        Command::Render(cmd) => {
            let (config, _) = load_config(cmd.config.as_deref());
            init_simple_log();
            super::send::render(config, cmd);
        }
    }
}

/// Load the configuration, returning it and the directory it came from.
fn load_config(path: Option<&Path>) -> (MailerConfig, PathBuf) {
    let path = match path {
        Some(path) => path.to_owned(),
        None => {
            let default = PathBuf::from("swallow.toml");
            if !default.is_file() {
                return (MailerConfig::default(), PathBuf::from("."));
            }
            default
        }
    };

    let config_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_owned);

    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => die!(EX_CONFIG, "Error reading '{}': {}", path.display(), e),
    };

    match toml::from_str(&text) {
        Ok(config) => (config, config_dir),
        Err(e) => die!(
            EX_CONFIG,
            "Error in config file at '{}': {}",
            path.display(),
            e
        ),
    }
}

fn init_logging(config_dir: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        init_simple_log();
        return;
    }

    let log_config_file = config_dir.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            die!(
                EX_CONFIG,
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        let logger = match syslog::unix(formatter) {
            Ok(logger) => logger,
            Err(e) => die!(EX_UNAVAILABLE, "Failed to connect to syslog: {}", e),
        };
        if let Err(e) =
            log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
                .map(|_| log::set_max_level(log::LevelFilter::Info))
        {
            die!(EX_SOFTWARE, "Failed to initialise logging: {}", e);
        }
    }
}

fn init_simple_log() {
    use log4rs::append::console::{ConsoleAppender, Target};
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} [{l}] {m}{n}")))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(log::LevelFilter::Info));

    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("Failed to initialise logging: {}", e);
            }
        }
        Err(e) => eprintln!("Bad logging configuration: {}", e),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn logging_toml_uses_file_deserializers() {
        let raw: log4rs::file::RawConfig = toml::from_str(
            "[appenders.stderr]\n\
             kind = \"console\"\n\
             [root]\n\
             level = \"info\"\n\
             appenders = [\"stderr\"]\n",
        )
        .unwrap();
        let (appenders, errors) =
            raw.appenders_lossy(&log4rs::file::Deserializers::new());
        assert!(errors.is_empty());
        assert_eq!(1, appenders.len());
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("swallow.toml");
        fs::write(&path, "[transport]\nkind = \"null\"\n").unwrap();
        let (config, config_dir) = load_config(Some(&path));
        assert_eq!(
            crate::support::config::TransportKind::Null,
            config.transport.kind
        );
        assert_eq!(dir.path(), config_dir);
    }
}
