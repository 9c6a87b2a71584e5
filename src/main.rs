use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use lumina_live::audio::{
    AudioFrame, AudioInput, AudioOutput, CpalInput, CpalOutput, PlaybackScheduler,
};
use lumina_live::config::file::config_file_path;
use lumina_live::{Config, Devices, StatusSnapshot, VoiceSession, VoiceStatus};

/// Lumina - real-time voice companion
#[derive(Parser)]
#[command(name = "lumina", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Talk with Lumina (default)
    Live,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output through the playback scheduler
    TestSpeaker,
    /// Print the config file path
    ConfigPath,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lumina_live=info",
        1 => "info,lumina_live=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load();
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Live) {
        Command::Live => run_live(&config).await,
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::TestSpeaker => test_speaker(&config).await,
        Command::ConfigPath => {
            match config_file_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("no config directory available"),
            }
            Ok(())
        }
    }
}

/// Run voice sessions until the user ends one or declines a retry
async fn run_live(config: &Config) -> anyhow::Result<()> {
    let devices = Devices::system(config)?;
    let mut input = spawn_stdin_lines();
    let mut stdin_open = true;

    println!("Lumina Live");
    println!("Type `m` + Enter to toggle the mic, `q` + Enter or Ctrl-C to end the session.\n");

    loop {
        let session = VoiceSession::from_config(config, devices.clone());
        let handle = session.handle();
        let mut watcher = handle.clone();
        let mut watching = true;
        let mut task = tokio::spawn(session.run());

        let outcome = loop {
            tokio::select! {
                result = &mut task => break result?,
                snapshot = watcher.changed(), if watching => match snapshot {
                    Some(snapshot) => print_status(&snapshot),
                    None => watching = false,
                },
                line = input.recv(), if stdin_open => match line.as_deref().map(str::trim) {
                    Some("m") => handle.toggle_mic(),
                    Some("q") => handle.close(),
                    Some(_) => {}
                    None => stdin_open = false,
                },
                _ = tokio::signal::ctrl_c() => handle.close(),
            }
        };

        if outcome.status != VoiceStatus::Error {
            println!("Session ended.");
            return Ok(());
        }

        print_status(&outcome);
        if !stdin_open {
            return Ok(());
        }

        println!("Retry? [Y/n]");
        let answer = tokio::select! {
            line = input.recv() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        match answer {
            Some(answer) if !answer.trim().eq_ignore_ascii_case("n") => {}
            _ => return Ok(()),
        }
    }
}

fn print_status(snapshot: &StatusSnapshot) {
    match (&snapshot.status, &snapshot.error) {
        (VoiceStatus::Error, Some(message)) => println!("[{}] {message}", snapshot.status),
        (VoiceStatus::Connected, _) if !snapshot.mic_enabled => {
            println!("[{}] {} (mic muted)", snapshot.status, snapshot.status.label());
        }
        _ => println!("[{}] {}", snapshot.status, snapshot.status.label()),
    }
}

/// Forward stdin lines to a channel
fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Test microphone input through the capture pipeline
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let rate = config.audio.capture_sample_rate;
    let mut capture = CpalInput.open(rate, config.audio.frame_size)?;

    let (tx, rx) = std::sync::mpsc::channel::<Vec<f32>>();
    capture.start(Box::new(move |frame| {
        let _ = tx.send(frame);
    }))?;

    println!("Sample rate: {rate} Hz, frame size: {}", config.audio.frame_size);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let frames: Vec<Vec<f32>> = rx.try_iter().collect();
        let samples: Vec<f32> = frames.iter().flatten().copied().collect();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] frames: {:2} | RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            frames.len(),
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with three back-to-back tones
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear three rising tones, one second each, with no gaps\n");

    let rate = config.audio.playback_sample_rate;
    let mut playback = PlaybackScheduler::new(CpalOutput.open(rate)?);

    for frequency in [440.0_f32, 554.37, 659.25] {
        let frame = tone(frequency, rate);
        if let Some(scheduled) = playback.enqueue(&frame)? {
            println!(
                "{frequency:>7.2} Hz scheduled at frames {}..{}",
                scheduled.start, scheduled.end
            );
        }
    }

    tokio::time::sleep(playback.queued_duration() + Duration::from_millis(300)).await;
    playback.close();

    println!("\n---");
    println!("If you heard the tones, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// One second of sine at 30% volume
fn tone(frequency: f32, sample_rate: u32) -> AudioFrame {
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();
    AudioFrame::from_f32(&samples, sample_rate)
}
