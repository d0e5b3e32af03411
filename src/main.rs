use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use snapsight::ai::openai_vision::OpenAiVisionClient;
use snapsight::capture::still::StillImageBackend;
use snapsight::capture::{CameraBackend, CameraSetting};
use snapsight::credential::FileCredentialStore;
use snapsight::presenter::{ConsolePresenter, LogSpeechSink};
use snapsight::session::{CaptureOrigin, Collaborators, ControllerConfig, SessionCommand};
use snapsight::voice::console::LineRecognizerFactory;
use snapsight::{Session, SessionHandle, Settings};

/// Capture a frame, ask a vision model about it, hear the answer.
#[derive(Parser, Debug)]
#[command(name = "snapsight", version, about)]
struct Cli {
    /// Image file exposed as a camera device (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Use monitors as capture devices instead of image files
    #[cfg(feature = "screen-capture")]
    #[arg(long)]
    screen: bool,

    /// API key; stored for later runs
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Settings file (TOML)
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Start the auto-capture loop right away
    #[arg(long)]
    auto: bool,
}

const HELP: &str = "Type a phrase containing the trigger word, or a command: \
:snap :auto :stop :listen :mute :devices :device <id> :zoom <x> :key <token> :clear :quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path)?;
    log::info!("Settings loaded from {}", settings_path.display());

    let camera = camera_backend(&cli);
    let recognizers = LineRecognizerFactory::new();
    let vision = OpenAiVisionClient::new(settings.provider_config())?;

    let deps = Collaborators {
        camera: Arc::clone(&camera),
        recognizers: Some(Arc::new(recognizers.clone())),
        vision: Arc::new(vision),
        credentials: Arc::new(FileCredentialStore::new(FileCredentialStore::default_path())),
        presenter: Arc::new(ConsolePresenter),
        speech: Arc::new(LogSpeechSink),
    };

    let session = Session::new(ControllerConfig::from(&settings), deps);
    let handle = session.handle();
    let session_task = tokio::spawn(session.run());

    if let Some(key) = cli.key {
        handle.send(SessionCommand::SetCredential(key));
    }
    if cli.auto {
        handle.send(SessionCommand::StartAutoLoop);
    }
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix(':') {
            Some(command) => {
                if !dispatch(command, &handle, camera.as_ref()).await {
                    break;
                }
            }
            None => {
                if !recognizers.feed(line) {
                    println!("Not listening. Use :listen, or :snap to capture.");
                }
            }
        }
    }

    handle.shutdown();
    session_task.await?;
    Ok(())
}

fn camera_backend(cli: &Cli) -> Arc<dyn CameraBackend> {
    #[cfg(feature = "screen-capture")]
    if cli.screen {
        return Arc::new(snapsight::capture::screen::ScreenBackend);
    }
    Arc::new(StillImageBackend::new(cli.images.clone()))
}

/// Returns false when the operator asked to quit.
async fn dispatch(command: &str, handle: &SessionHandle, camera: &dyn CameraBackend) -> bool {
    let (verb, arg) = match command.split_once(' ') {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (command, ""),
    };
    let command = match verb {
        "snap" => SessionCommand::TriggerCapture(CaptureOrigin::Manual),
        "auto" => SessionCommand::StartAutoLoop,
        "stop" => SessionCommand::StopAutoLoop,
        "listen" => SessionCommand::StartListening,
        "mute" => SessionCommand::StopListening,
        "device" if !arg.is_empty() => SessionCommand::SelectDevice(arg.to_string()),
        "key" if !arg.is_empty() => SessionCommand::SetCredential(arg.to_string()),
        "clear" => SessionCommand::ClearCredential,
        "zoom" => match arg.parse::<f64>() {
            Ok(z) => SessionCommand::ApplySetting(CameraSetting::Zoom(z)),
            Err(_) => {
                println!("usage: :zoom <factor>");
                return true;
            }
        },
        "devices" => {
            match camera.enumerate().await {
                Ok(devices) => {
                    for d in devices {
                        println!("{}\t{}{}", d.id, d.label, if d.rear_facing { " (rear)" } else { "" });
                    }
                }
                Err(e) => println!("Camera error: {}", e),
            }
            return true;
        }
        "quit" | "q" => return false,
        _ => {
            println!("{}", HELP);
            return true;
        }
    };
    handle.send(command)
}
