use std::sync::Arc;

use anyhow::{Context, Result};
use marketplace_probe::HttpMarketplaceProbe;
use region_sweep::{
    NotificationChannel, NotificationContext, NotifierDispatcher, ProbeAdapter, RegionCatalog,
    RegionCode, SeenSetStore, SweepError, SweepEvent, SweepEventBus, SweepOutcome, SweepRequest,
    SweepScheduler, SweepSummary,
};
use telegram_notifier::{LogChannel, TelegramChannel};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::settings::RunnerSettings;

/// Wires configuration, the sweep engine, notifications and signals together
pub struct SweepManager {
    settings: RunnerSettings,
}

impl SweepManager {
    /// Create a new sweep manager
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    /// Run one sweep, or keep sweeping on the configured interval until Ctrl-C
    pub async fn run(self) -> Result<()> {
        let settings = &self.settings;
        info!("Starting region sweep for '{}' in {}", settings.keyword, settings.region_selector);

        let catalog = RegionCatalog::from_path(&settings.city_codes_path)
            .context("Failed to load region catalog")?;
        let mut region_codes = self.expand_regions(&catalog)?;

        let seen = Arc::new(
            SeenSetStore::load(&settings.seen_path)
                .await
                .context("Failed to load seen-set")?,
        );

        let probe = Arc::new(HttpMarketplaceProbe::new(None).context("Failed to create probe")?);
        let adapter = Arc::new(ProbeAdapter::new(probe, Some(settings.probe.clone())));

        let events = SweepEventBus::new();
        let scheduler = Arc::new(SweepScheduler::new(
            adapter,
            seen,
            events.clone(),
            Some(settings.sweep.clone()),
        ));

        let notifier = NotifierDispatcher::new(
            self.notification_channel(),
            NotificationContext {
                keyword: settings.keyword.clone(),
                region_label: settings.region_selector.clone(),
            },
        )
        .spawn(events.subscribe());
        let console = spawn_console_logger(events.subscribe());

        loop {
            let summary = self.run_once(&scheduler, region_codes).await?;
            log_summary(&summary);

            if matches!(summary.outcome, SweepOutcome::Aborted { .. }) {
                break;
            }

            let Some(interval) = settings.interval else {
                break;
            };

            info!("⏰ Next sweep in {:?}", interval);
            tokio::select! {
                _ = sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received while idle, exiting");
                    break;
                }
            }

            // Reshuffles the "all" selector between sweeps.
            region_codes = self.expand_regions(&catalog)?;
        }

        // Subscribers finish once every handle on the bus is gone.
        drop(scheduler);
        drop(events);
        for (name, handle) in [("notifier", notifier), ("console", console)] {
            if let Err(e) = handle.await {
                error!("{} task failed: {}", name, e);
            }
        }

        info!("Region sweep finished");
        Ok(())
    }

    /// Run a single sweep, cancelling it on Ctrl-C
    async fn run_once(
        &self,
        scheduler: &Arc<SweepScheduler>,
        region_codes: Vec<RegionCode>,
    ) -> Result<SweepSummary> {
        let request = SweepRequest::new(
            self.settings.keyword.clone(),
            region_codes,
            self.settings.concurrency,
        );
        let handle = scheduler.spawn(request);

        let token = handle.cancellation_token();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⏹️ Ctrl-C received, stopping after in-flight checks");
                token.cancel();
            }
        });

        let result = handle.wait().await;
        signal_task.abort();

        result.context("Sweep failed")
    }

    fn expand_regions(&self, catalog: &RegionCatalog) -> Result<Vec<RegionCode>> {
        match catalog.expand(&self.settings.region_selector) {
            Ok(codes) => Ok(codes),
            Err(e @ SweepError::UnknownRegion { .. }) => {
                let groups: Vec<&str> = catalog.group_names().collect();
                error!("Available region groups: {}", groups.join(", "));
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn notification_channel(&self) -> Arc<dyn NotificationChannel> {
        let Some(credentials) = &self.settings.telegram else {
            info!("📨 Telegram credentials not set, notifications go to the log");
            return Arc::new(LogChannel);
        };

        match TelegramChannel::new(credentials.token.clone(), credentials.chat_id.clone()) {
            Ok(channel) => {
                info!("📨 Telegram notifications enabled for chat {}", credentials.chat_id);
                Arc::new(channel)
            }
            Err(e) => {
                warn!("Telegram channel unavailable ({}), notifications go to the log", e);
                Arc::new(LogChannel)
            }
        }
    }
}

/// Log per-region results and progress to the console
fn spawn_console_logger(mut events: UnboundedReceiver<SweepEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SweepEvent::RegionChecked { code, verdict } => {
                    debug!("Region {} -> {:?}", code, verdict);
                }
                SweepEvent::Progress { done, total } => {
                    info!("📊 Progress: {}/{} regions checked", done, total);
                }
                _ => {}
            }
        }
    })
}

fn log_summary(summary: &SweepSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    info!(
        "Sweep {} ({:?}): {}/{} checked, {} found, {} new, {} errors in {}s",
        summary.sweep_id,
        summary.outcome,
        summary.checked,
        summary.total,
        summary.found,
        summary.new_count,
        summary.errors,
        elapsed.num_seconds()
    );
}
