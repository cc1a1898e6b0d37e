//! A host page backed by a local file
//!
//! The file plays the `new_content` field: external writes to it count as user
//! edits, and content the server sends back is written into it. The baseline
//! lives in memory, the save button and preview report through tracing.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use watom_autosave::dom::{
    fire_listeners as fire, Anchor, FormSubmitter, HostPage, Listener, PageForm, PreviewSurface,
    SaveButton, TextField,
};
use watom_autosave::memory::MemoryField;
use watom_core::{PageSelectors, Result, WatomError};

/// Text field mirrored to a file on disk
pub struct FileField {
    path: PathBuf,
    value: Mutex<String>,
    input_listeners: Mutex<Vec<Listener>>,
}

impl FileField {
    pub fn open(path: &Path) -> Result<Self> {
        let value = std::fs::read_to_string(path).map_err(|e| {
            WatomError::file_system(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            value: Mutex::new(value),
            input_listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, firing input listeners if it changed
    ///
    /// Our own writes are already cached, so they never read back as edits.
    pub fn refresh_from_disk(&self) -> Result<bool> {
        let on_disk = std::fs::read_to_string(&self.path).map_err(|e| {
            WatomError::file_system(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        {
            let mut value = self.value.lock();
            if *value == on_disk {
                return Ok(false);
            }
            *value = on_disk;
        }

        fire(&self.input_listeners);
        Ok(true)
    }
}

impl TextField for FileField {
    fn value(&self) -> String {
        self.value.lock().clone()
    }

    fn set_value(&self, value: &str) {
        *self.value.lock() = value.to_string();
        if let Err(e) = std::fs::write(&self.path, value) {
            warn!("Failed to write {}: {}", self.path.display(), e);
        } else {
            info!("Server content written to {}", self.path.display());
        }
    }

    fn on_input(&self, listener: Listener) {
        self.input_listeners.lock().push(listener);
    }
}

/// Save button that logs when the saving marker changes
pub struct TerminalButton {
    saving_class: String,
    classes: Mutex<BTreeSet<String>>,
    click_listeners: Mutex<Vec<Listener>>,
}

impl TerminalButton {
    pub fn new(saving_class: &str) -> Self {
        Self {
            saving_class: saving_class.to_string(),
            classes: Mutex::new(BTreeSet::new()),
            click_listeners: Mutex::new(Vec::new()),
        }
    }
}

impl SaveButton for TerminalButton {
    fn add_class(&self, class: &str) {
        if self.classes.lock().insert(class.to_string()) && class == self.saving_class {
            info!("Saving...");
        }
    }

    fn remove_class(&self, class: &str) {
        if self.classes.lock().remove(class) && class == self.saving_class {
            info!("Saved");
        }
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.lock().contains(class)
    }

    fn on_click(&self, listener: Listener) {
        self.click_listeners.lock().push(listener);
    }
}

/// Preview with no document of its own
#[derive(Default)]
pub struct TerminalPreview {
    load_listeners: Mutex<Vec<Listener>>,
}

impl PreviewSurface for TerminalPreview {
    fn reload(&self) {
        debug!("Preview reloaded");
        fire(&self.load_listeners);
    }

    fn anchors(&self) -> Vec<Arc<dyn Anchor>> {
        Vec::new()
    }

    fn on_load(&self, listener: Listener) {
        self.load_listeners.lock().push(listener);
    }
}

struct FileForm {
    page: Arc<FilePageElements>,
}

impl PageForm for FileForm {
    fn field(&self, name: &str) -> Option<Arc<dyn TextField>> {
        let selectors = &self.page.selectors;
        if name == selectors.new_content_field {
            Some(self.page.new_content.clone() as Arc<dyn TextField>)
        } else if name == selectors.old_content_field {
            Some(self.page.old_content.clone() as Arc<dyn TextField>)
        } else {
            None
        }
    }

    fn submitter(&self) -> Arc<dyn FormSubmitter> {
        Arc::clone(&self.page.submitter)
    }
}

struct FilePageElements {
    selectors: PageSelectors,
    new_content: Arc<FileField>,
    old_content: Arc<MemoryField>,
    submitter: Arc<dyn FormSubmitter>,
}

/// Edit page over a local file
pub struct FilePage {
    elements: Arc<FilePageElements>,
    pub save_button: Arc<TerminalButton>,
    pub preview: Arc<TerminalPreview>,
}

impl FilePage {
    /// Open `path` as the edit buffer with `baseline` as the last known server text
    pub fn open(
        path: &Path,
        baseline: Option<String>,
        selectors: PageSelectors,
        saving_class: &str,
        submitter: Arc<dyn FormSubmitter>,
    ) -> Result<Self> {
        let new_content = Arc::new(FileField::open(path)?);
        let old_content = Arc::new(MemoryField::new(
            baseline.unwrap_or_else(|| new_content.value()),
        ));

        Ok(Self {
            elements: Arc::new(FilePageElements {
                selectors,
                new_content,
                old_content,
                submitter,
            }),
            save_button: Arc::new(TerminalButton::new(saving_class)),
            preview: Arc::new(TerminalPreview::default()),
        })
    }

    pub fn new_content(&self) -> &Arc<FileField> {
        &self.elements.new_content
    }
}

impl HostPage for FilePage {
    fn form(&self, name: &str) -> Option<Arc<dyn PageForm>> {
        (name == self.elements.selectors.form_name).then(|| {
            Arc::new(FileForm {
                page: Arc::clone(&self.elements),
            }) as Arc<dyn PageForm>
        })
    }

    fn button_by_id(&self, id: &str) -> Option<Arc<dyn SaveButton>> {
        (id == self.elements.selectors.save_button_id)
            .then(|| self.save_button.clone() as Arc<dyn SaveButton>)
    }

    fn preview_by_selector(&self, selector: &str) -> Option<Arc<dyn PreviewSurface>> {
        (selector == self.elements.selectors.preview_selector)
            .then(|| self.preview.clone() as Arc<dyn PreviewSurface>)
    }
}
