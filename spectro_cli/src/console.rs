//! Line-oriented command console.
//!
//! One command per line; every command answers with zero or more data lines
//! followed by `OK`, or a single `ERR <KIND> <message>` line.

use std::io::{self, BufRead, Write};

use spectro_core::{Orchestrator, SpectroError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start(u32),
    Stop(u32),
    Steps(u16),
    Settle(u16, u8),
    Voltage(u32),
    Pga(bool),
    Autorange(bool),
    Feedback(u32),
    Sweep(u8),
    Halt,
    Single(u8, u32),
    Temp,
    Cal(u32),
    Status,
    Raw,
    Polar,
    Port,
    Get(Field),
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Start,
    Stop,
    Steps,
    Increment,
    Settle,
    Voltage,
    Pga,
    Autorange,
    Feedback,
    TwoPoint,
    Port,
}

impl Field {
    fn parse(s: &str) -> Result<Self, String> {
        Ok(match s {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "steps" => Self::Steps,
            "increment" => Self::Increment,
            "settle" => Self::Settle,
            "voltage" => Self::Voltage,
            "pga" => Self::Pga,
            "autorange" => Self::Autorange,
            "feedback" => Self::Feedback,
            "twopoint" => Self::TwoPoint,
            "port" => Self::Port,
            other => return Err(format!("unknown field '{other}'")),
        })
    }
}

const HELP: &str = "\
start <hz> | stop <hz> | steps <n> | settle <cycles> <1|2|4>
voltage <mv> | pga <0|1> | autorange <0|1> | feedback <ohms>
sweep <port> | halt | single <port> <hz> | temp | cal <ohms>
status | raw | polar | port | get <field> | help | quit";

fn arg<T: std::str::FromStr>(args: &[&str], i: usize, name: &str) -> Result<T, String> {
    let raw = args.get(i).ok_or_else(|| format!("missing <{name}>"))?;
    raw.parse()
        .map_err(|_| format!("bad <{name}> '{raw}'"))
}

fn flag(args: &[&str], name: &str) -> Result<bool, String> {
    match arg::<u8>(args, 0, name)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(format!("<{name}> must be 0 or 1")),
    }
}

impl ConsoleCommand {
    /// Parse one console line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut words = line.split_whitespace();
        let verb = words.next()?.to_ascii_lowercase();
        let args: Vec<&str> = words.collect();
        Some(Self::from_words(&verb, &args))
    }

    fn from_words(verb: &str, a: &[&str]) -> Result<Self, String> {
        Ok(match verb {
            "start" => Self::Start(arg(a, 0, "hz")?),
            "stop" => Self::Stop(arg(a, 0, "hz")?),
            "steps" => Self::Steps(arg(a, 0, "n")?),
            "settle" => Self::Settle(arg(a, 0, "cycles")?, arg(a, 1, "mult")?),
            "voltage" => Self::Voltage(arg(a, 0, "mv")?),
            "pga" => Self::Pga(flag(a, "x5")?),
            "autorange" => Self::Autorange(flag(a, "on")?),
            "feedback" => Self::Feedback(arg(a, 0, "ohms")?),
            "sweep" => Self::Sweep(arg(a, 0, "port")?),
            "halt" => Self::Halt,
            "single" => Self::Single(arg(a, 0, "port")?, arg(a, 1, "hz")?),
            "temp" => Self::Temp,
            "cal" => Self::Cal(arg(a, 0, "ohms")?),
            "status" => Self::Status,
            "raw" => Self::Raw,
            "polar" => Self::Polar,
            "port" => Self::Port,
            "get" => Self::Get(Field::parse(a.first().copied().unwrap_or_default())?),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}'")),
        })
    }
}

fn get_field(orch: &Orchestrator, field: Field) -> String {
    match field {
        Field::Start => orch.start_frequency().to_string(),
        Field::Stop => orch.stop_frequency().to_string(),
        Field::Steps => orch.increments().to_string(),
        Field::Increment => orch.increment_hz().to_string(),
        Field::Settle => {
            let (cycles, mult) = orch.settling_cycles();
            format!("{cycles} {}", mult.factor())
        }
        Field::Voltage => orch.voltage_range().to_string(),
        Field::Pga => u8::from(orch.pga().factor() == 5).to_string(),
        Field::Autorange => u8::from(orch.autorange()).to_string(),
        Field::Feedback => orch.feedback().to_string(),
        Field::TwoPoint => u8::from(orch.two_point()).to_string(),
        Field::Port => orch.port().to_string(),
    }
}

/// Execute one command, returning the data lines to print before `OK`.
pub fn execute(orch: &mut Orchestrator, cmd: &ConsoleCommand) -> Result<Vec<String>, SpectroError> {
    let mut lines = Vec::new();
    match *cmd {
        ConsoleCommand::Start(hz) => orch.set_start_frequency(hz)?,
        ConsoleCommand::Stop(hz) => orch.set_stop_frequency(hz)?,
        ConsoleCommand::Steps(n) => orch.set_increments(n)?,
        ConsoleCommand::Settle(cycles, mult) => orch.set_settling_cycles(cycles, mult)?,
        ConsoleCommand::Voltage(mv) => orch.set_voltage_range(mv)?,
        ConsoleCommand::Pga(x5) => orch.set_pga(x5)?,
        ConsoleCommand::Autorange(on) => orch.set_autorange(on)?,
        ConsoleCommand::Feedback(ohms) => orch.set_feedback(ohms)?,
        ConsoleCommand::Sweep(port) => orch.start_sweep(port)?,
        ConsoleCommand::Halt => orch.stop_sweep(),
        ConsoleCommand::Single(port, hz) => {
            let p = orch.measure_single_frequency(port, hz)?;
            lines.push(format!("{},{:.3},{:.3}", p.frequency_hz, p.magnitude_ohms, p.phase_deg));
        }
        ConsoleCommand::Temp => lines.push(format!("{:.2}", orch.measure_temperature()?)),
        ConsoleCommand::Cal(ohms) => orch.calibrate(ohms)?,
        ConsoleCommand::Status => lines.push(orch.status().to_string()),
        ConsoleCommand::Raw => lines.extend(
            orch.data_raw()
                .iter()
                .map(|s| format!("{},{},{}", s.frequency_hz, s.real, s.imag)),
        ),
        ConsoleCommand::Polar => lines.extend(
            orch.data_polar()
                .iter()
                .map(|p| format!("{},{:.3},{:.3}", p.frequency_hz, p.magnitude_ohms, p.phase_deg)),
        ),
        ConsoleCommand::Port => lines.push(orch.port().to_string()),
        ConsoleCommand::Get(field) => lines.push(get_field(orch, field)),
        ConsoleCommand::Help => lines.extend(HELP.lines().map(str::to_string)),
        ConsoleCommand::Quit => {}
    }
    Ok(lines)
}

/// Serve commands from `input` until EOF or `quit`.
pub fn run<R: BufRead, W: Write>(orch: &mut Orchestrator, input: R, mut out: W) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        let cmd = match ConsoleCommand::parse(&line) {
            None => continue,
            Some(Ok(cmd)) => cmd,
            Some(Err(msg)) => {
                writeln!(out, "ERR PARSE {msg}")?;
                out.flush()?;
                continue;
            }
        };
        tracing::debug!(?cmd, "console command");
        match execute(orch, &cmd) {
            Ok(lines) => {
                for l in lines {
                    writeln!(out, "{l}")?;
                }
                writeln!(out, "OK")?;
            }
            Err(e) => {
                tracing::warn!(error = %e, ?cmd, "console command rejected");
                writeln!(out, "ERR {} {e}", e.kind())?;
            }
        }
        out.flush()?;
        if cmd == ConsoleCommand::Quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn orch() -> Orchestrator {
        let board = spectro_hardware::SimBoard::new();
        Orchestrator::builder()
            .with_converter(board.converter())
            .with_router(board.router())
            .build()
            .unwrap()
    }

    fn session(orch: &mut Orchestrator, script: &str) -> Vec<String> {
        let mut out = Vec::new();
        run(orch, script.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap().lines().map(str::to_string).collect()
    }

    #[rstest]
    #[case("start 1000", ConsoleCommand::Start(1_000))]
    #[case("SETTLE 15 4", ConsoleCommand::Settle(15, 4))]
    #[case("  single 3 25000 ", ConsoleCommand::Single(3, 25_000))]
    #[case("pga 1", ConsoleCommand::Pga(true))]
    #[case("get twopoint", ConsoleCommand::Get(Field::TwoPoint))]
    #[case("?", ConsoleCommand::Help)]
    fn parses_commands(#[case] line: &str, #[case] expected: ConsoleCommand) {
        assert_eq!(ConsoleCommand::parse(line), Some(Ok(expected)));
    }

    #[rstest]
    #[case("start")]
    #[case("start abc")]
    #[case("pga 2")]
    #[case("single 3")]
    #[case("get nothing")]
    #[case("frobnicate")]
    fn rejects_malformed_lines(#[case] line: &str) {
        assert!(matches!(ConsoleCommand::parse(line), Some(Err(_))));
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(ConsoleCommand::parse("   "), None);
        assert_eq!(ConsoleCommand::parse("# note"), None);
    }

    #[test]
    fn settings_round_trip_through_get() {
        let mut o = orch();
        let out = session(
            &mut o,
            "stop 20000\nstart 10000\nsteps 10\nget start\nget stop\nget steps\nsettle 20 2\nget settle\n",
        );
        assert_eq!(
            out,
            ["OK", "OK", "OK", "10000", "OK", "20000", "OK", "10", "OK", "OK", "20 2", "OK"]
        );
    }

    #[test]
    fn rejections_report_error_kind() {
        let mut o = orch();
        let out = session(&mut o, "start 500\nsweep 12\nbogus\n");
        assert!(out[0].starts_with("ERR ARG "), "{out:?}");
        assert!(out[1].starts_with("ERR ARG "), "{out:?}");
        assert!(out[2].starts_with("ERR PARSE "), "{out:?}");
    }

    #[test]
    fn autorange_ignores_pga_and_feedback() {
        let mut o = orch();
        let out = session(&mut o, "autorange 1\npga 1\nfeedback 100\nget pga\nget autorange\n");
        assert_eq!(out, ["OK", "OK", "OK", "0", "OK", "1", "OK"]);
    }

    #[test]
    fn quit_stops_reading() {
        let mut o = orch();
        let out = session(&mut o, "port\nquit\nport\n");
        assert_eq!(out, ["0", "OK", "OK"]);
    }

    #[test]
    fn help_lists_commands() {
        let mut o = orch();
        let out = session(&mut o, "help\n");
        assert_eq!(out.last().map(String::as_str), Some("OK"));
        assert!(out.iter().any(|l| l.contains("single <port> <hz>")));
    }
}
