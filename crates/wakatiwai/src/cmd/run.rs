use std::sync::OnceLock;

use tracing::info;
use wakatiwai_object::{
    IdleEngine, ObjectRegistry, Session, SessionConfig, Shutdown, ShutdownFlag,
};

use crate::cmd::{parse_duration, stdio_channel, RunArgs};
use crate::exit::{engine_error, registry_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: RunArgs) -> CliResult<i32> {
    let extra = args.bridge.object_ids()?;
    let interval = parse_duration(&args.interval)?;
    let mut channel = stdio_channel(args.bridge.channel_config()?)?;

    let registry = ObjectRegistry::bootstrap(&extra, &mut channel)
        .map_err(|err| registry_error("object registration failed", err))?;
    info!(
        name = %args.bridge.name,
        objects = registry.len(),
        "client started"
    );

    let shutdown = ShutdownFlag::new();
    install_signal_handlers(&shutdown)?;

    let config = SessionConfig {
        loop_interval: interval,
        ..SessionConfig::default()
    };
    let mut session = Session::with_config(
        channel,
        IdleEngine::new(interval),
        registry,
        shutdown,
        config,
    );

    match session.run() {
        Ok(Shutdown::Abandon) => info!("stopped without deregistration"),
        Ok(_) => info!("stopped"),
        Err(err) => return Err(engine_error("session failed", err)),
    }
    Ok(SUCCESS)
}

static TERMINATE: OnceLock<ShutdownFlag> = OnceLock::new();

/// SIGINT stops with deregistration, SIGTERM stops without it.
fn install_signal_handlers(shutdown: &ShutdownFlag) -> CliResult<()> {
    let interrupt = shutdown.clone();
    ctrlc::set_handler(move || interrupt.request(Shutdown::Deregister)).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })?;

    TERMINATE
        .set(shutdown.clone())
        .map_err(|_| CliError::new(INTERNAL, "SIGTERM handler already installed"))?;
    let handler = on_sigterm as extern "C" fn(libc::c_int);
    // SAFETY: the handler only performs atomic operations on an initialized static.
    let previous = unsafe { libc::signal(libc::SIGTERM, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        return Err(CliError::new(
            INTERNAL,
            format!(
                "signal handler setup failed: {}",
                std::io::Error::last_os_error()
            ),
        ));
    }
    Ok(())
}

extern "C" fn on_sigterm(_signal: libc::c_int) {
    if let Some(shutdown) = TERMINATE.get() {
        shutdown.request(Shutdown::Abandon);
    }
}
