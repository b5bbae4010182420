use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};

use gaitsense::audio::{CuePlayer, LogCuePlayer, ToneCuePlayer};
use gaitsense::config::{AppConfig, ConfigManager, SourceKind};
use gaitsense::export::{AnalyticsLog, CsvSessionExporter};
use gaitsense::logger;
use gaitsense::recorder::{LiveSnapshot, MonotonicClock, RecorderHandle, RecorderState};
use gaitsense::sensor::{MqttSampleSource, SampleSource, SimulatedSource};
use gaitsense::types::{RecorderError, SessionMetadata};
use gaitsense::utils::format_elapsed;

/// 控制台命令
#[derive(Debug, PartialEq)]
enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Status,
    Export(String),
    Discard(Option<String>),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Err(String::new());
    };
    let rest: Vec<&str> = parts.collect();

    match word.to_lowercase().as_str() {
        "start" => Ok(Command::Start),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "stop" => Ok(Command::Stop),
        "status" => Ok(Command::Status),
        "export" => match rest.first() {
            Some(participant) => Ok(Command::Export(participant.to_string())),
            None => Err("usage: export <participant_id>".to_string()),
        },
        "discard" => Ok(Command::Discard(if rest.is_empty() { None } else { Some(rest.join(" ")) })),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}', type 'help'", other)),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start                  countdown, then start recording");
    println!("  pause | resume         pause or resume the current trial");
    println!("  stop                   finish the trial");
    println!("  status                 show live statistics");
    println!("  export <participant>   write CSV + JSON for the finished trial");
    println!("  discard [reason]       drop the trial and start over");
    println!("  quit");
}

fn print_snapshot(snapshot: &LiveSnapshot) {
    println!(
        "[{}] {} samples={} elapsed={} hz={:.1} |a|={:.3} cadence={:.0} spm",
        snapshot.state,
        snapshot.session_id,
        snapshot.sample_count,
        format_elapsed(snapshot.stats.elapsed),
        snapshot.stats.measured_hz,
        snapshot.stats.avg_accel_norm,
        snapshot.stats.cadence_spm,
    );
}

fn load_config() -> Result<AppConfig, gaitsense::ConfigError> {
    match env::args().nth(1) {
        Some(path) => {
            let manager = ConfigManager::load_from_file(&path)?;
            info!("Configuration loaded from {}", path);
            Ok(manager.get_config().clone())
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(ConfigManager::new().get_config().clone())
        }
    }
}

fn build_source(config: &AppConfig) -> Box<dyn SampleSource> {
    match config.source.kind {
        SourceKind::Simulated => Box::new(SimulatedSource::new(config.source.simulated.clone())),
        SourceKind::Mqtt => Box::new(MqttSampleSource::new(config.source.mqtt.clone())),
    }
}

fn build_cues(config: &AppConfig) -> Box<dyn CuePlayer> {
    if config.recorder.beeps {
        Box::new(ToneCuePlayer::new())
    } else {
        Box::new(LogCuePlayer)
    }
}

/// 状态变化时在控制台打印一行
fn spawn_state_monitor(handle: &RecorderHandle) -> Result<(), RecorderError> {
    let snapshots = handle.subscribe_snapshots()?;
    thread::Builder::new()
        .name("state-monitor".to_string())
        .spawn(move || {
            let mut last_state: Option<RecorderState> = None;
            for snapshot in snapshots.iter() {
                if last_state != Some(snapshot.state) {
                    print_snapshot(&snapshot);
                    last_state = Some(snapshot.state);
                }
            }
        })?;
    Ok(())
}

/// 每次试验前重新准备，获得新的会话编号，然后开始倒计时
fn start_trial(handle: &RecorderHandle, config: &AppConfig) -> Result<RecorderState, RecorderError> {
    handle.prepare(config.recorder.target_hz, config.recorder.beeps)?;
    handle.begin_countdown()
}

fn run_console(handle: &RecorderHandle, config: &AppConfig, analytics: Option<&AnalyticsLog>) -> Result<(), RecorderError> {
    let stdin = io::stdin();
    print_help();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                if !message.is_empty() {
                    println!("{}", message);
                }
                continue;
            }
        };

        match command {
            Command::Start => {
                if handle.latest().state == RecorderState::Finished {
                    println!("Trial finished: export or discard it first");
                    continue;
                }
                if handle.latest().state != RecorderState::Idle {
                    println!("Trial already running");
                    continue;
                }
                let state = start_trial(handle, config)?;
                if state == RecorderState::Idle {
                    println!("Sensor unavailable, still idle");
                }
            }
            Command::Pause => {
                handle.pause()?;
            }
            Command::Resume => {
                handle.resume()?;
            }
            Command::Stop => {
                handle.stop()?;
            }
            Command::Status => print_snapshot(&handle.snapshot()?),
            Command::Export(participant) => {
                let metadata = SessionMetadata::new(&participant, "", config.recorder.target_hz);
                match handle.export(metadata) {
                    Ok((artifact, report)) => {
                        println!("Saved {} ({} rows)", artifact.csv_path.display(), artifact.rows);
                        println!(
                            "Quality: {} - {:.2} Hz, {:.1}% dropped, {:.1} s",
                            report.score, report.measured_hz, report.dropped_pct, report.duration_real
                        );
                    }
                    Err(RecorderError::Export(e)) => println!("Export failed: {}", e),
                    Err(e) => return Err(e),
                }
            }
            Command::Discard(reason) => {
                handle.discard()?;
                if let Some(analytics) = analytics {
                    let reason = reason.unwrap_or_default();
                    if let Err(e) = analytics.log("test_discarded", &[("reason", reason.as_str())]) {
                        warn!("Failed to append analytics log: {}", e);
                    }
                }
            }
            Command::Help => print_help(),
            Command::Quit => break,
        }
    }

    Ok(())
}

fn main() {
    logger::init_logger();
    info!("GaitSense starting");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let analytics = config
        .export
        .analytics_log
        .then(|| AnalyticsLog::new(config.get_base_directory()));
    if let Some(analytics) = &analytics {
        if let Err(e) = analytics.log("app_open", &[]) {
            warn!("Failed to append analytics log: {}", e);
        }
    }

    let mut handle = match RecorderHandle::spawn(
        config.recorder.clone(),
        &config.channels,
        Arc::new(MonotonicClock::new()),
        build_source(&config),
        build_cues(&config),
        Box::new(CsvSessionExporter::from_config(&config)),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start recorder: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = spawn_state_monitor(&handle) {
        warn!("State monitor unavailable: {}", e);
    }

    if let Err(e) = run_console(&handle, &config, analytics.as_ref()) {
        error!("Recorder stopped unexpectedly: {}", e);
    }

    handle.shutdown();
    info!("GaitSense exited");
}
