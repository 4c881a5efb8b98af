use anyhow::Result;
use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Export the prompt list and report the outcome in the UI.
pub fn export_list(state: &mut UiState, path: &Path) {
    match state.session.export_file(path) {
        Ok(written) => {
            state.info = format!(
                "Exported {} prompt(s) to {}",
                state.session.prompts().len(),
                written.display()
            );
            state.last_list_path = Some(written.display().to_string());
        }
        Err(e) => state.show_error(format!("Export failed: {e}")),
    }
}

/// Replace the prompt list from a file. A bad file leaves the list as it was.
pub fn import_list(state: &mut UiState, path: &Path) {
    match state.session.import_file(path) {
        Ok(count) => {
            state.reset_list_view();
            state.info = format!("Imported {} prompt(s) from {}", count, path.display());
            state.last_list_path = Some(path.display().to_string());
        }
        Err(e) => state.show_error(format!("Import failed: {e}")),
    }
}

/// Copy the active prompt to the clipboard.
pub fn copy_result(state: &mut UiState) {
    let text = state.session.active().to_string();
    if text.is_empty() {
        state.info = "Nothing to copy".into();
        return;
    }
    match copy_to_clipboard(&text) {
        Ok(()) => state.info = "Copied result to clipboard".into(),
        Err(e) => state.info = format!("Copy failed: {e:#}"),
    }
}

/// Initialize the clipboard manager thread if not already initialized.
/// Each copy gets its own clipboard instance, kept alive long enough for
/// clipboard managers on Linux to read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                match Clipboard::new() {
                    Ok(mut clipboard) => {
                        if let Err(e) = clipboard.set_text(&text) {
                            tracing::warn!("clipboard write failed: {e}");
                            continue;
                        }
                        std::thread::sleep(Duration::from_secs(2));
                    }
                    Err(e) => tracing::warn!("clipboard unavailable: {e}"),
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue text for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
