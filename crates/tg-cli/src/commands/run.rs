//! The `run` command: the native messaging host loop.
//!
//! One `tokio::select!` loop multiplexes inbound frames, the flush tick, the
//! alarm tick, the next service timer and ctrl-c. Each handler runs to
//! completion and its effects are carried out before the next event is read.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tg_core::{BrowserEvent, Effect, Service};
use tg_db::Store;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::time::MissedTickBehavior;

use crate::Config;
use crate::protocol::{FrameError, FrameReader, FrameWriter, Framing};

/// Serves events from `input` until it closes or ctrl-c arrives.
pub async fn run<R, W>(
    input: R,
    output: W,
    framing: Framing,
    store: &mut Store,
    config: &Config,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let usage = store.load_usage().context("failed to load usage data")?;
    tracing::info!(tabs = usage.len(), ?framing, "host started");

    let mut service = Service::new(config.guard_config(), usage);
    let mut frames = FrameReader::new(input, framing);
    let mut host = Host {
        store,
        writer: FrameWriter::new(output, framing),
    };

    let mut flush = tokio::time::interval(config.flush_interval());
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    flush.tick().await;
    let mut alarms = tokio::time::interval(config.alarm_check_interval());
    alarms.set_missed_tick_behavior(MissedTickBehavior::Delay);
    alarms.tick().await;

    loop {
        let deadline = service.next_deadline();
        tokio::select! {
            frame = frames.next_frame() => match frame {
                Ok(Some(bytes)) => {
                    let now = Utc::now();
                    match serde_json::from_slice::<BrowserEvent>(&bytes) {
                        Ok(event) => {
                            tracing::trace!(?event, "event");
                            let effects = service.handle(event, now);
                            host.apply(&service, effects, now).await?;
                        }
                        Err(e) => tracing::warn!(error = %e, "skipping undecodable event"),
                    }
                }
                Ok(None) => {
                    tracing::info!("input closed");
                    break;
                }
                Err(e @ FrameError::TooLarge { .. }) => {
                    tracing::warn!(error = %e, "skipping oversized frame");
                }
                Err(e) => return Err(e).context("failed to read frame"),
            },
            _ = flush.tick() => {
                let now = Utc::now();
                let effects = service.tick(now);
                host.apply(&service, effects, now).await?;
            }
            _ = alarms.tick() => {
                let now = Utc::now();
                let effects = service.check_alarms(now);
                host.apply(&service, effects, now).await?;
            }
            () = sleep_until(deadline) => {
                let now = Utc::now();
                let effects = service.fire_due(now);
                host.apply(&service, effects, now).await?;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                tracing::info!("interrupted");
                break;
            }
        }
    }

    let now = Utc::now();
    let effects = service.shutdown(now);
    host.apply(&service, effects, now).await?;
    tracing::info!("host stopped");
    Ok(())
}

/// Sleeps until `deadline`, or forever without one.
async fn sleep_until(deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(at) => {
            let wait = (at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending().await,
    }
}

/// Carries out effects: store writes and commands for the extension.
struct Host<'a, W> {
    store: &'a mut Store,
    writer: FrameWriter<W>,
}

impl<W: AsyncWrite + Unpin> Host<'_, W> {
    async fn apply(
        &mut self,
        service: &Service,
        effects: Vec<Effect>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut persist = false;
        for effect in effects {
            match effect {
                Effect::PersistUsage => persist = true,
                Effect::Host(command) => match self.writer.send(&command).await {
                    Ok(()) => tracing::debug!(?command, "command sent"),
                    Err(e @ FrameError::TooLarge { .. }) => {
                        tracing::warn!(error = %e, ?command, "dropping oversized command");
                    }
                    Err(e) => return Err(e).context("failed to write command"),
                },
                Effect::ScheduleTimer { key, .. } | Effect::CancelTimer(key) => {
                    tracing::debug!(?key, "ignoring unabsorbed timer effect");
                }
            }
        }

        if persist {
            // A failed write is retried by the next flush.
            if let Err(e) = self.store.save_usage(service.usage(), now) {
                tracing::error!(error = %e, "failed to save usage data");
            }
        }
        Ok(())
    }
}
