//! Terminal implementations of the session's host ports.

use anyhow::{Context, Result};
use arboard::Clipboard;
use client_core::{ClipboardSink, Navigator};
use url::Url;

/// A terminal cannot leave the page, so navigation prints the destination.
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, url: &Url) -> Result<()> {
        println!("Continue to secure checkout:\n  {url}");
        Ok(())
    }

    fn open_in_new_context(&self, url: &Url) -> Result<()> {
        println!("Download your revelation:\n  {url}");
        Ok(())
    }
}

pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        let mut clipboard = Clipboard::new().context("system clipboard is unavailable")?;
        clipboard
            .set_text(text.to_owned())
            .context("failed to write to the system clipboard")
    }
}
