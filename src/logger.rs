/* Logger initialization */
use std::panic::{self, PanicHookInfo};
use std::thread;

use tracing::{error, level_filters::LevelFilter};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::Targets;

use crate::CargoEnv;

pub struct LoggerGuards {
    pub _tracing_guard: WorkerGuard,
    // option because sentry is optional
    pub _sentry_guard: Option<sentry::ClientInitGuard>,
}

pub struct Logger {}

impl Logger {
    pub fn init(cargo_env: CargoEnv, log_dir: &str, sentry_dsn: Option<String>) -> LoggerGuards {
        let (writer, guard) = Self::writer(cargo_env, log_dir);
        let sentry_guard = sentry_dsn.map(|dsn| Self::init_sentry(dsn, cargo_env));

        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let registry = tracing_subscriber::registry()
            .with(Self::filter(cargo_env))
            .with(tracing_subscriber::fmt::layer().with_writer(writer));

        if sentry_guard.is_some() {
            registry.with(sentry_tracing::layer()).init();
        } else {
            registry.init();
        }

        install_panic_hook();

        // both guards have to outlive main or the last logs get lost
        LoggerGuards {
            _tracing_guard: guard,
            _sentry_guard: sentry_guard,
        }
    }

    // stdout while developing, daily files once deployed
    fn writer(cargo_env: CargoEnv, log_dir: &str) -> (NonBlocking, WorkerGuard) {
        match cargo_env {
            CargoEnv::Development => tracing_appender::non_blocking(std::io::stdout()),
            CargoEnv::Production => tracing_appender::non_blocking(
                tracing_appender::rolling::daily(log_dir, "portal_proxy.log"),
            ),
        }
    }

    /// link resolution is chatty at debug so production stays at info. The http stack logs every
    /// connection at debug, that never helps.
    fn filter(cargo_env: CargoEnv) -> Targets {
        let level = match cargo_env {
            CargoEnv::Development => LevelFilter::DEBUG,
            CargoEnv::Production => LevelFilter::INFO,
        };

        Targets::new()
            .with_default(level)
            .with_target("hyper", LevelFilter::WARN)
            .with_target("hyper_util", LevelFilter::WARN)
            .with_target("reqwest", LevelFilter::WARN)
    }

    fn init_sentry(dsn: String, cargo_env: CargoEnv) -> sentry::ClientInitGuard {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(cargo_env.as_str().into()),
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    }
}

fn panic_message<'a>(info: &'a PanicHookInfo<'_>) -> &'a str {
    if let Some(s) = info.payload().downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<Any>"
    }
}

// panics inside a request task would otherwise only hit stderr, which nobody reads in production
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let thread = thread::current();
        let thread = thread.name().unwrap_or("unknown");
        let msg = panic_message(info);
        let backtrace = backtrace::Backtrace::new();

        match info.location() {
            Some(location) => error!(
                target: "panic", "thread '{}' panicked at '{}': {}:{}\n{:?}",
                thread,
                msg,
                location.file(),
                location.line(),
                backtrace
            ),
            None => error!(
                target: "panic", "thread '{}' panicked at '{}'\n{:?}",
                thread, msg, backtrace
            ),
        }
    }));
}
