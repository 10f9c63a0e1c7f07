//! selfie_gate - terminal front end for the consent → selfie → code flow
//!
//! Interactive by default: commands are read from stdin, one per line.
//! With `--accept-all --email <addr>` the whole flow runs unattended and the
//! exit code reflects the outcome.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use selfie_gate::{
    build_flow,
    ui::{EventRenderer, Ui},
    CaptureError, ConsentItem, FlowController, FlowError, FlowState, GateConfig,
    HttpRegistrationService, RegistrationService, SubmissionState,
};

#[derive(Parser, Debug)]
#[command(
    name = "selfie_gate",
    version,
    about = "Consent-gated selfie capture and code issuance"
)]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "SELFIE_GATE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend base URL, overrides the config file.
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Camera URL (stub://, http(s)://, /dev/videoN), overrides the config file.
    #[arg(long, value_name = "URL")]
    camera: Option<String>,

    /// Output mode: auto, plain, or pretty.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,

    /// Never draw a spinner, even on a terminal.
    #[arg(long)]
    no_spinner: bool,

    /// Accept every consent item and run the flow without prompts.
    #[arg(long, requires = "email")]
    accept_all: bool,

    /// Email address used by the unattended run.
    #[arg(long, value_name = "ADDR")]
    email: Option<String>,

    /// Query the backend health endpoint before starting.
    #[arg(long)]
    check_backend: bool,

    /// Capture attempts while the camera warms up (unattended run).
    #[arg(long, default_value_t = 10)]
    capture_attempts: u32,
}

enum Input {
    Line(String),
    Eof,
    Interrupt,
}

const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(200);

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = GateConfig::load_from(args.config.as_deref())?;
    if let Some(url) = &args.backend_url {
        cfg.backend.base_url = url.clone();
    }
    if let Some(camera) = &args.camera {
        cfg.camera.url = camera.clone();
    }
    cfg.validate()?;

    if args.check_backend {
        check_backend(&cfg)?;
    }

    let is_tty = std::io::stderr().is_terminal();
    let ui = Ui::from_args(Some(args.ui.as_str()), is_tty, args.no_spinner);

    let mut flow = build_flow(&cfg)?;
    let events = flow.subscribe();
    let renderer = thread::Builder::new()
        .name("event-renderer".into())
        .spawn(move || {
            let mut renderer = EventRenderer::new(ui);
            for event in events {
                renderer.handle(&event);
            }
        })?;

    let (tx, rx) = mpsc::channel();
    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Input::Interrupt);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let code = match (args.accept_all, args.email.as_deref()) {
        (true, Some(email)) => run_unattended(&mut flow, email, args.capture_attempts, &rx)
            .unwrap_or_else(|err| {
                log::error!("flow aborted: {:#}", err);
                ExitCode::FAILURE
            }),
        _ => {
            spawn_stdin_reader(tx)?;
            run_interactive(&mut flow, &rx)?
        }
    };

    flow.close();
    drop(flow);
    if renderer.join().is_err() {
        log::warn!("event renderer panicked");
    }
    Ok(code)
}

fn check_backend(cfg: &GateConfig) -> Result<()> {
    let service = HttpRegistrationService::new(&cfg.backend.base_url, cfg.backend.timeout)?;
    let health = service
        .health()
        .map_err(|e| anyhow!("backend {} is not healthy: {}", cfg.backend.base_url, e))?;
    log::info!(
        "backend {} reports status={} timestamp={}",
        cfg.backend.base_url,
        health.status,
        health.timestamp.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn spawn_stdin_reader(tx: Sender<Input>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Input::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        log::warn!("stdin read failed: {}", err);
                        break;
                    }
                }
            }
            let _ = tx.send(Input::Eof);
        })?;
    Ok(())
}

fn interrupted(rx: &Receiver<Input>) -> bool {
    rx.try_iter().any(|input| matches!(input, Input::Interrupt))
}

fn run_unattended<S: RegistrationService>(
    flow: &mut FlowController<S>,
    email: &str,
    attempts: u32,
    rx: &Receiver<Input>,
) -> Result<ExitCode> {
    for item in ConsentItem::ALL {
        flow.set_consent(item, true)?;
    }
    flow.accept()?;

    let mut remaining = attempts.max(1);
    loop {
        if interrupted(rx) {
            log::info!("interrupted, releasing camera");
            return Ok(ExitCode::from(130));
        }
        match flow.capture() {
            Ok(snapshot) => {
                log::info!(
                    "captured {}x{} snapshot {}",
                    snapshot.width,
                    snapshot.height,
                    snapshot.fingerprint()
                );
                break;
            }
            Err(FlowError::Capture(CaptureError::NotReady { .. })) if remaining > 1 => {
                remaining -= 1;
                thread::sleep(CAPTURE_RETRY_DELAY);
            }
            Err(err) => return Err(err.into()),
        }
    }

    flow.set_email(email);
    let outcome = flow.submit()?;
    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &SubmissionState) -> ExitCode {
    match outcome {
        SubmissionState::Succeeded { .. } => ExitCode::SUCCESS,
        other if other.is_partial_success() => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

const HELP: &str = "\
commands:
  status             show the current step
  toggle <item>      flip a consent item (policy, terms, emails, cookies)
  accept             grant consent and start the camera
  retry              retry the camera after it was refused
  capture            take the selfie
  retake             discard the selfie and restart the camera
  email <address>    set the email address
  submit             send the selfie and email
  reset              start over
  quit               exit";

fn run_interactive<S: RegistrationService>(
    flow: &mut FlowController<S>,
    rx: &Receiver<Input>,
) -> Result<ExitCode> {
    eprintln!("{HELP}");
    print_status(flow);
    for input in rx {
        let line = match input {
            Input::Line(line) => line,
            Input::Eof => break,
            Input::Interrupt => {
                log::info!("interrupted, releasing camera");
                return Ok(ExitCode::from(130));
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let result = match command {
            "help" => {
                eprintln!("{HELP}");
                Ok(())
            }
            "status" => {
                print_status(flow);
                Ok(())
            }
            "toggle" => match rest.parse::<ConsentItem>() {
                Ok(item) => flow.toggle_consent(item).map_err(anyhow::Error::from),
                Err(err) => Err(err),
            },
            "accept" => flow.accept().map(drop).map_err(anyhow::Error::from),
            "retry" => flow.retry_camera().map(drop).map_err(anyhow::Error::from),
            "capture" => flow.capture().map(drop).map_err(anyhow::Error::from),
            "retake" => flow.retake().map(drop).map_err(anyhow::Error::from),
            "email" => {
                flow.set_email(rest);
                Ok(())
            }
            "submit" => flow.submit().map(drop).map_err(anyhow::Error::from),
            "reset" => flow.reset().map_err(anyhow::Error::from),
            "quit" | "exit" => break,
            other => Err(anyhow!("unknown command '{}', try 'help'", other)),
        };
        match result {
            Ok(()) => {
                if command == "toggle" || command == "accept" {
                    print_status(flow);
                }
            }
            Err(err) if has_notice(&err) => log::debug!("{}: {}", command, err),
            Err(err) => eprintln!("! {}", err),
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Camera, capture and validation failures already reach the renderer as notices.
fn has_notice(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<FlowError>() {
        Some(FlowError::InvalidTransition { .. }) | None => false,
        Some(FlowError::Submit(_)) => false,
        Some(_) => true,
    }
}

fn print_status<S: RegistrationService>(flow: &FlowController<S>) {
    let state = flow.state();
    eprintln!("step {}/4: {}", state.step().number(), state.step().label());
    if state == FlowState::Consenting {
        for (item, accepted) in flow.consent().items().iter() {
            let mark = if accepted { "x" } else { " " };
            eprintln!("  [{}] {:<8} {}", mark, item.key(), item.label());
        }
        if flow.consent().is_granted() {
            eprintln!("  consent granted, camera refused: use 'retry'");
        }
    }
    if let Some(snapshot) = flow.snapshot() {
        eprintln!(
            "  selfie: {}x{} {} ({})",
            snapshot.width,
            snapshot.height,
            snapshot.format.mime(),
            snapshot.fingerprint()
        );
    }
    if !flow.email().is_empty() {
        eprintln!("  email: {}", selfie_gate::email::mask_email(flow.email().value()));
    }
}
