//! Print information about the lines of GPIO chips.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use linedev::{Chip, Direction, Drive, LineInfo};

#[derive(Parser)]
#[command(name = "gpioinfo")]
#[command(
    about = "Print information about all lines of the specified GPIO chip(s) (or all gpiochips if none are specified)."
)]
struct Cli {
    /// Chip paths or names, e.g. gpiochip0 or /dev/gpiochip0.
    chips: Vec<PathBuf>,

    /// Display the version and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.version {
        println!("gpioinfo (linedev) {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    let chips = if cli.chips.is_empty() {
        match linedev::chips() {
            Ok(cc) => cc,
            Err(e) => {
                eprintln!("gpioinfo: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        cli.chips
    };

    let mut failed = false;
    for path in chips {
        let chip = match Chip::open(&path, []) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("gpioinfo: {e}");
                failed = true;
                continue;
            }
        };
        println!("{} - {} lines:", chip.name(), chip.num_lines());
        for offset in 0..chip.num_lines() {
            match chip.line_info(offset) {
                Ok(info) => print!("{}", format_line(&info)),
                Err(e) => {
                    eprintln!("gpioinfo: {e}");
                    failed = true;
                }
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn format_line(info: &LineInfo) -> String {
    let name = if info.name.is_empty() {
        "unnamed"
    } else {
        &info.name
    };
    let consumer = if info.used {
        let consumer = if info.consumer.is_empty() {
            "kernel"
        } else {
            &info.consumer
        };
        if consumer.contains(' ') {
            format!("\"{consumer}\"")
        } else {
            consumer.to_string()
        }
    } else {
        "unused".to_string()
    };
    let direction = match info.config.direction {
        Some(Direction::Output) => "output",
        _ => "input",
    };
    let active = if info.config.active_low == Some(true) {
        "active-low"
    } else {
        "active-high"
    };
    let mut attrs = Vec::new();
    if info.used {
        attrs.push("used".to_string());
    }
    match info.config.drive {
        Some(Drive::OpenDrain) => attrs.push("open-drain".to_string()),
        Some(Drive::OpenSource) => attrs.push("open-source".to_string()),
        _ => {}
    }
    match info.config.bias {
        Some(linedev::Bias::PullUp) => attrs.push("pull-up".to_string()),
        Some(linedev::Bias::PullDown) => attrs.push("pull-down".to_string()),
        Some(linedev::Bias::Disabled) => attrs.push("bias-disabled".to_string()),
        None => {}
    }
    if let Some(period) = info.config.debounce {
        attrs.push(format!("debounce-period={period:?}"));
    }
    let attrs = if attrs.is_empty() {
        String::new()
    } else {
        format!("[{}]", attrs.join(" "))
    };
    format!(
        "\tline {:>3}:{:>12}{:>12}{:>8}{:>13}{}\n",
        info.offset, name, consumer, direction, active, attrs
    )
}
