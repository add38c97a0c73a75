use color_eyre::Result;
use padbind::{BindingTarget, Callback, Gamepad, GamepadOptions, Modifiers, PlayerSlot};
use tokio::task::LocalSet;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;

    let options = GamepadOptions::load_or_default();
    info!("Using options: {:?}", options);

    let local = LocalSet::new();
    local.run_until(run(options)).await
}

async fn run(options: GamepadOptions) -> Result<()> {
    let gamepad = Gamepad::with_gilrs(options);
    if !gamepad.is_enabled() {
        warn!("No gamepad support on this system, nothing to do");
        return Ok(());
    }

    register_logging_listeners(&gamepad);
    gamepad.bind_vibration("button-start", Modifiers::pressed(), 200)?;

    let mut connected = gamepad.connected();
    tokio::task::spawn_local(async move {
        while connected.changed().await.is_ok() {
            let now_connected = *connected.borrow_and_update();
            info!("Any gamepad connected: {}", now_connected);
        }
    });

    let running = gamepad.start()?;
    info!("Polling gamepads, press Ctrl+C to quit");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let stopped = running.stop().await;
    info!("Final stats: {:?}", stopped.last_stats());
    Ok(())
}

/// Logs press and release of every button and stick direction for every player
fn register_logging_listeners(gamepad: &Gamepad) {
    let logger = Callback::new(|event| {
        info!(
            "{} {} {}{} on device {} ({})",
            event.player,
            event.button,
            event.action,
            if event.repeated { " (repeat)" } else { "" },
            event.device.index,
            event.device.name
        );
        Ok(())
    });

    let controls = gamepad
        .options()
        .button_mapping
        .iter()
        .map(String::as_str)
        .chain(padbind::mapping::POSITIVE_AXIS_NAMES)
        .chain(padbind::mapping::NEGATIVE_AXIS_NAMES)
        .collect::<Vec<_>>();

    for player in PlayerSlot::all() {
        let key = format!("{}:{}", player, controls.join("+"));
        for modifiers in [Modifiers::repeating(), Modifiers::released()] {
            if let Err(e) = gamepad.bind(&key, modifiers, &BindingTarget::handler(logger.clone())) {
                warn!("Could not bind logging listener for {}: {}", player, e);
            }
        }
    }

    info!(
        "Registered {} logging listeners",
        controls.len() * PlayerSlot::all().count() * 2
    );
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
