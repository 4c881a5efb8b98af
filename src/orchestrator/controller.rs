//! Caption lifecycle controller.
//!
//! Runs blocking caption calls off the UI thread and emits events back to the
//! presentation layer. The session itself never leaves the UI thread.

use crate::caption::{self, CaptionMode, CaptionSource, ImageSource};
use crate::model::{InfoEvent, SessionEvent};
use crate::prompt::SessionError;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Caption {
        source: ImageSource,
        mode: CaptionMode,
    },
    Quit,
}

type CaptionTask = JoinHandle<Result<String, SessionError>>;

/// Spawn one caption on a blocking worker.
fn start_caption(
    captioner: Arc<dyn CaptionSource>,
    source: ImageSource,
    mode: CaptionMode,
) -> CaptionTask {
    tokio::task::spawn_blocking(move || caption::acquire_caption(captioner.as_ref(), &source, mode))
}

/// Serve caption requests until the UI quits or drops its sender.
pub(crate) async fn run_controller(
    captioner: Arc<dyn CaptionSource>,
    event_tx: UnboundedSender<SessionEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut in_flight: Option<CaptionTask> = None;
    let mut quit_pending = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Caption { source, mode }) => {
                        if in_flight.is_some() {
                            let _ = event_tx.send(SessionEvent::Info(InfoEvent::CaptionBusy));
                            continue;
                        }
                        tracing::debug!(source = %source, mode = mode.as_str(), "caption requested");
                        let _ = event_tx.send(SessionEvent::CaptionStarted {
                            source: source.clone(),
                            mode,
                        });
                        in_flight = Some(start_caption(captioner.clone(), source, mode));
                    }
                    Some(UiCommand::Quit) | None => {
                        // A blocking caption cannot be interrupted; let it finish so the
                        // worker is not left holding the runtime open.
                        if in_flight.is_none() {
                            break;
                        }
                        tracing::info!("quit requested, waiting for running caption");
                        quit_pending = true;
                    }
                }
            }
            // Keep the JoinHandle in place until this branch wins, so a
            // competing branch never drops it unobserved.
            done = async {
                match in_flight.as_mut() {
                    Some(handle) => handle.await,
                    None => futures::future::pending().await,
                }
            } => {
                in_flight = None;
                let event = match done {
                    Ok(Ok(prompt)) => SessionEvent::CaptionCompleted { prompt },
                    Ok(Err(e)) => {
                        tracing::warn!("caption failed: {e}");
                        SessionEvent::CaptionFailed {
                            no_image: matches!(e, SessionError::NoImage(_)),
                            message: e.to_string(),
                        }
                    }
                    Err(e) => SessionEvent::CaptionFailed {
                        no_image: false,
                        message: format!("Caption task failed: {e}"),
                    },
                };
                let _ = event_tx.send(event);
                if quit_pending {
                    break;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    struct Echo;

    impl CaptionSource for Echo {
        fn caption(&self, img: &DynamicImage, mode: CaptionMode) -> anyhow::Result<String> {
            Ok(format!("{}x{} image, {}", img.width(), img.height(), mode.as_str()))
        }
    }

    fn png(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("c.png");
        image::RgbaImage::from_pixel(5, 7, image::Rgba([9, 9, 9, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_caption_round_trip_through_controller() {
        let dir = tempfile::tempdir().unwrap();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(run_controller(Arc::new(Echo), event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::Caption {
                source: ImageSource::File(png(dir.path())),
                mode: CaptionMode::Best,
            })
            .unwrap();

        assert!(matches!(
            event_rx.recv().await,
            Some(SessionEvent::CaptionStarted { mode: CaptionMode::Best, .. })
        ));
        match event_rx.recv().await {
            Some(SessionEvent::CaptionCompleted { prompt }) => {
                assert_eq!(prompt, "5x7 image, best")
            }
            other => panic!("unexpected event {other:?}"),
        }

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_image_reports_no_image() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(run_controller(Arc::new(Echo), event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::Caption {
                source: ImageSource::File(PathBuf::from("/missing.png")),
                mode: CaptionMode::Fast,
            })
            .unwrap();

        let _started = event_rx.recv().await;
        assert!(matches!(
            event_rx.recv().await,
            Some(SessionEvent::CaptionFailed { no_image: true, .. })
        ));

        drop(cmd_tx);
        controller.await.unwrap().unwrap();
    }
}
