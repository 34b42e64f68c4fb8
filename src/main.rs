use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use jobmail::config::{ClassifierConfig, ServiceConfig};
use jobmail::error::Result;
use jobmail::llm::{LlmConfig, create_provider};
use jobmail::mailbox::{GmailConfig, GmailMailbox};
use jobmail::pipeline::classifier::Classifier;
use jobmail::pipeline::runner::BatchRunner;
use jobmail::pipeline::service::{BatchService, ShutdownSignal, spawn_service};

/// Stderr logging, plus a daily-rolling file under `log_dir` when set.
/// The returned guard must live until exit so buffered lines are flushed.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "jobmail.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

/// Everything read from the environment at startup.
struct Settings {
    service: ServiceConfig,
    llm: LlmConfig,
    classifier: ClassifierConfig,
    gmail: GmailConfig,
}

impl Settings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            service: ServiceConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            classifier: ClassifierConfig::from_env()?,
            gmail: GmailConfig::from_env()?,
        })
    }

    fn print_banner(&self) {
        eprintln!("📬 jobmail v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("   Backend: {}", self.llm.backend.name());
        eprintln!("   Model: {}", self.llm.model);
        eprintln!(
            "   Window: last {} day(s), up to {} emails",
            self.service.lookback_days, self.service.max_messages
        );
        if self.service.run_once {
            eprintln!("   Mode: single run\n");
        } else {
            eprintln!(
                "   Mode: every {} min (Ctrl-C to stop)\n",
                self.service.check_interval.as_secs() / 60
            );
        }
    }
}

fn build_service(settings: Settings, shutdown: Arc<ShutdownSignal>) -> Result<BatchService> {
    let llm = create_provider(&settings.llm)?;
    let mailbox = Arc::new(GmailMailbox::new(settings.gmail)?);
    let classifier = Arc::new(Classifier::new(llm, settings.classifier));

    let runner = BatchRunner::new(classifier, mailbox.clone()).with_shutdown(shutdown);
    Ok(BatchService::new(mailbox, runner, settings.service))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let _log_guard = init_logging(settings.service.log_dir.as_deref());
    settings.print_banner();

    let shutdown = Arc::new(ShutdownSignal::new());
    let service = build_service(settings, shutdown.clone())?;
    let mut handle = spawn_service(service, shutdown.clone());

    let stats = tokio::select! {
        joined = &mut handle => joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, finishing the current message");
            shutdown.trigger();
            handle.await?
        }
    };

    info!(
        cycles = stats.cycles,
        processed = stats.processed,
        labeled = stats.labeled,
        fetch_failures = stats.fetch_failures,
        "jobmail exiting"
    );
    Ok(())
}
