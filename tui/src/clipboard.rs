//! System clipboard access for copying code blocks.

#[cfg(not(target_os = "android"))]
pub(crate) struct Clipboard {
    // Some platforms only serve the selection while the handle is alive.
    inner: Option<arboard::Clipboard>,
}

#[cfg(not(target_os = "android"))]
impl Clipboard {
    pub(crate) fn new() -> Self {
        Self { inner: None }
    }

    pub(crate) fn copy(&mut self, text: &str) -> Result<(), String> {
        let clipboard = match self.inner.as_mut() {
            Some(clipboard) => clipboard,
            None => {
                let created = arboard::Clipboard::new().map_err(|err| err.to_string())?;
                self.inner.insert(created)
            }
        };
        clipboard.set_text(text).map_err(|err| err.to_string())
    }
}

#[cfg(target_os = "android")]
pub(crate) struct Clipboard;

#[cfg(target_os = "android")]
impl Clipboard {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn copy(&mut self, _text: &str) -> Result<(), String> {
        Err("clipboard is not available on this platform".to_string())
    }
}
