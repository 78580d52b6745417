//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `streeek_core` linkage.
//! - Preview upcoming occurrences of a recurrence rule in the local zone.

use chrono::Local;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use streeek_core::{next_for_rule, RecurrenceRule, WeekdaySet};

#[derive(Parser, Debug)]
#[command(
    name = "streeek_cli",
    about = "Preview when a weekly reminder rule fires next",
    version
)]
struct Cli {
    /// ISO weekday numbers, Monday = 1 (e.g. 1,3,5)
    #[arg(default_value = "1,3,5", value_parser = parse_days)]
    days: WeekdaySet,

    /// Local time of day as HH:MM
    #[arg(default_value = "08:00", value_parser = parse_time)]
    time: (u8, u8),

    /// Number of occurrences to print
    #[arg(long, short = 'n', default_value_t = 3)]
    count: usize,
}

impl Cli {
    fn rule(&self) -> Result<RecurrenceRule, String> {
        let (hour, minute) = self.time;
        RecurrenceRule::new(self.days, hour, minute).map_err(|err| err.to_string())
    }
}

fn main() {
    let cli = Cli::parse();
    println!("streeek_core ping={}", streeek_core::ping());
    println!("streeek_core version={}", streeek_core::core_version());

    match cli.rule() {
        Ok(rule) => print_preview(&rule, cli.count),
        Err(err) => Cli::command().error(ErrorKind::ValueValidation, err).exit(),
    }
}

fn parse_days(value: &str) -> Result<WeekdaySet, String> {
    let numbers = value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| format!("`{part}` is not a weekday number"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    WeekdaySet::from_iso_numbers(&numbers).map_err(|err| err.to_string())
}

fn parse_time(value: &str) -> Result<(u8, u8), String> {
    let (hour, minute) = value
        .split_once(':')
        .ok_or_else(|| format!("`{value}` is not HH:MM"))?;
    let hour = hour
        .parse::<u8>()
        .map_err(|_| format!("`{hour}` is not an hour"))?;
    let minute = minute
        .parse::<u8>()
        .map_err(|_| format!("`{minute}` is not a minute"))?;
    Ok((hour, minute))
}

fn print_preview(rule: &RecurrenceRule, count: usize) {
    println!(
        "rule days={} time={:02}:{:02}",
        rule.repeat_days(),
        rule.hour(),
        rule.minute()
    );

    let mut from = Local::now();
    for _ in 0..count {
        match next_for_rule(rule, &from) {
            Ok(next) => {
                println!("next={}", next.to_rfc3339());
                from = next;
            }
            Err(err) => {
                println!("next=none error={err}");
                break;
            }
        }
    }
}
